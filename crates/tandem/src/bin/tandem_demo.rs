//! # TANDEM Demo
//!
//! Runs a logic thread and a render thread against an in-memory scene for a
//! fixed wall-clock duration, then prints the loop statistics.
//!
//! ```text
//! RUST_LOG=debug cargo run --bin tandem_demo -- --seconds 3 --nodes 256
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use glam::{Quat, Vec3, Vec4};
use tandem::{FixedStepLoop, GraphicsModule, LogicSide, MemoryScene, RenderLoop};
use tandem_core::error::panic_message;
use tandem_core::tracking::{CameraId, MaterialId, NodeId, PassId, Pose, ScrollSpeeds, Transform, TransformSpace};
use tandem_core::{FrameConfig, FrameError, FrameResult};

#[derive(Parser, Debug)]
#[command(name = "tandem_demo", version, about = "Fixed-step logic with interpolated rendering")]
struct DemoArgs {
    /// TOML file with frame configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Wall-clock run time in seconds
    #[arg(long, default_value_t = 2.0)]
    seconds: f64,

    /// Number of orbiting scene nodes
    #[arg(long, default_value_t = 64)]
    nodes: u64,

    /// Render frame rate cap
    #[arg(long, default_value_t = 144)]
    render_fps: u32,
}

const CAMERA: CameraId = CameraId(1);
const SKY_PASS: PassId = PassId(1);
const GLOW: MaterialId = MaterialId(1);

fn main() -> FrameResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = DemoArgs::parse();
    let config = match &args.config {
        Some(path) => FrameConfig::load(path)?,
        None => FrameConfig::default(),
    };
    tracing::info!("TANDEM demo v{}", env!("CARGO_PKG_VERSION"));

    let scene = Arc::new(build_scene(args.nodes));
    let module = GraphicsModule::new(config.clone(), Arc::clone(&scene))?;
    let handle = module.handle();
    let (mut logic, render) = module.into_parts();

    for id in 0..args.nodes {
        logic.add_tracked_node(NodeId(id), TransformSpace::Local);
    }
    logic.add_tracked_camera(CAMERA);
    logic.add_tracked_pass(SKY_PASS);
    logic.add_tracked_material(GLOW, Vec4::ZERO);

    let closure_runs = Arc::new(AtomicU64::new(0));
    let runs = Arc::clone(&closure_runs);
    handle.register_closure(
        "count_frames",
        move |_alpha| {
            runs.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
        false,
    )?;

    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(args.render_fps.max(1)));
    let render_thread = thread::Builder::new()
        .name("render".into())
        .spawn(move || RenderLoop::new(render).with_frame_interval(frame_interval).run(|_, _| {}))
        .map_err(|e| FrameError::InvalidConfig(format!("cannot spawn render thread: {e}")))?;

    let controller = {
        let handle = handle.clone();
        let scene = Arc::clone(&scene);
        let seconds = args.seconds.max(0.0);
        thread::spawn(move || -> FrameResult<()> {
            thread::sleep(Duration::from_secs_f64(seconds / 2.0));
            let reader = Arc::clone(&scene);
            let objects = handle.enqueue_and_wait_with_result("count_nodes", move || Ok(reader.nodes.len()))?;
            tracing::info!(objects, logic_frame = handle.logic_frame_id(), "render thread answered");

            // Simulate releasing a GPU buffer that frames in flight may still use.
            handle.schedule_destroy("release_vertex_buffer", || {
                tracing::info!("vertex buffer released");
            })?;

            thread::sleep(Duration::from_secs_f64(seconds / 2.0));
            handle.request_shutdown();
            Ok(())
        })
    };

    let stats = FixedStepLoop::new(&config).run(&mut logic, orbit);

    let controller = controller.join().map_err(|payload| FrameError::CommandPanicked {
        name: "controller".into(),
        message: panic_message(payload.as_ref()),
    })?;
    let render_stats = render_thread.join().map_err(|payload| FrameError::CommandPanicked {
        name: "render".into(),
        message: panic_message(payload.as_ref()),
    })??;
    controller?;

    tracing::info!(
        iterations = stats.iterations,
        ticks = stats.ticks,
        capped = stats.capped_iterations,
        clamped = stats.clamped_deltas,
        "logic summary"
    );
    tracing::info!(
        frames = render_stats.frames,
        commands = render_stats.commands_executed,
        closures = render_stats.closures_executed,
        destroys = render_stats.destroys_executed,
        interpolated = render_stats.objects_interpolated,
        closure_runs = closure_runs.load(Ordering::Relaxed),
        "render summary"
    );
    Ok(())
}

fn build_scene(nodes: u64) -> MemoryScene {
    let scene = MemoryScene::new();
    for id in 0..nodes {
        scene.nodes.insert(NodeId(id), Transform::IDENTITY);
    }
    scene.cameras.insert(CAMERA, Pose { position: Vec3::new(0.0, 5.0, 20.0), ..Pose::IDENTITY });
    scene.passes.insert(SKY_PASS, ScrollSpeeds::default());
    scene.materials.insert(GLOW, Default::default());
    scene
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn orbit(logic: &mut LogicSide<MemoryScene>, dt: f64) {
    let time = (logic.ticks() as f64 * dt) as f32;
    let nodes = logic.backend().nodes.len();
    let count = nodes.max(1) as f32;
    for id in 0..nodes as u64 {
        let phase = std::f32::consts::TAU * id as f32 / count;
        let position = Vec3::new((time + phase).cos(), 0.0, (time + phase).sin()) * 10.0;
        logic.update_node_position(NodeId(id), position, TransformSpace::Local);
        logic.update_node_orientation(NodeId(id), Quat::from_rotation_y(time + phase), TransformSpace::Local);
    }
    logic.update_camera_orientation(CAMERA, Quat::from_rotation_y(time * 0.1));
    if let Err(error) = logic.update_pass_speed_x(SKY_PASS, 0, time.sin()) {
        tracing::warn!(%error, "sky scroll update rejected");
    }
    let pulse = 0.5 + 0.5 * time.sin();
    logic.update_material_value(GLOW, Vec4::ZERO, Vec4::new(pulse, 0.2, 0.8, 1.0));
}
