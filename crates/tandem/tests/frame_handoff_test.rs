//! Integration test for the logic to render handoff across real threads.
//!
//! The render thread runs a [`RenderLoop`], the test thread plays logic, and
//! a controller thread talks to the module only through a [`ModuleHandle`].
//! Covers the published blend pair, blocking commands from a third thread,
//! closures registered off-thread, and exactly-once destruction through
//! shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec3;
use tandem::{
    FixedStepLoop, GraphicsModule, LogicSide, MemoryScene, ModuleHandle, RenderLoop, RenderSide, RenderStats,
};
use tandem_core::tracking::{NodeId, Transform, TransformSpace};
use tandem_core::{Dispatch, FrameConfig, FrameResult, LoopState};

const NODE: NodeId = NodeId(7);
const DESTROYS: usize = 32;

fn spawn_render(render: RenderSide<MemoryScene>) -> thread::JoinHandle<FrameResult<RenderStats>> {
    thread::spawn(move || {
        RenderLoop::new(render)
            .with_frame_interval(Duration::from_millis(1))
            .run(|_, _| {})
    })
}

/// Spins until `condition` holds or five seconds pass.
fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn scene_with_node() -> Arc<MemoryScene> {
    let scene = Arc::new(MemoryScene::new());
    scene.nodes.insert(NODE, Transform::IDENTITY);
    scene
}

/// Two markers in a row guarantee a whole render frame ran after the call.
fn settle(handle: &ModuleHandle) {
    handle.wait_for_render_completion().unwrap();
    handle.wait_for_render_completion().unwrap();
}

#[test]
fn test_render_thread_blends_published_pair() {
    let scene = scene_with_node();
    let config = FrameConfig::default();
    let module = GraphicsModule::new(config.clone(), Arc::clone(&scene)).unwrap();
    let handle = module.handle();
    let (mut logic, render) = module.into_parts();
    let render_thread = spawn_render(render);

    assert!(logic.add_tracked_node(NODE, TransformSpace::Local));
    let mut fixed = FixedStepLoop::new(&config);
    let tick = fixed.fixed_tick_seconds();

    let first = fixed.advance(tick, &mut logic, &mut |_: &mut LogicSide<MemoryScene>, _: f64| {});
    assert_eq!(first.ticks, 1);
    let second = fixed.advance(tick * 1.5, &mut logic, &mut |side: &mut LogicSide<MemoryScene>, _: f64| {
        side.update_node_position(NODE, Vec3::new(10.0, 0.0, 0.0), TransformSpace::Local);
    });
    assert_eq!(second.ticks, 1);
    assert!((second.alpha - 0.5).abs() < 1e-4);
    assert_eq!(second.logic_frame, Some(2));

    settle(&handle);
    let position = scene.nodes.get(NODE).unwrap().position;
    assert!(position.abs_diff_eq(Vec3::new(5.0, 0.0, 0.0), 1e-3), "got {position}");

    handle.request_shutdown();
    let stats = render_thread.join().unwrap().unwrap();
    assert!(stats.objects_interpolated >= 1);
    assert_eq!(handle.state(), LoopState::Stopped);
}

#[test]
fn test_controller_thread_drives_module_through_handle() {
    let scene = scene_with_node();
    let config = FrameConfig::default();
    let module = GraphicsModule::new(config.clone(), Arc::clone(&scene)).unwrap();
    let handle = module.handle();
    let (mut logic, render) = module.into_parts();
    assert!(logic.add_tracked_node(NODE, TransformSpace::Local));
    let render_thread = spawn_render(render);

    let persistent_runs = Arc::new(AtomicUsize::new(0));
    let once_runs = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));

    let controller = {
        let handle = handle.clone();
        let scene = Arc::clone(&scene);
        let persistent_runs = Arc::clone(&persistent_runs);
        let once_runs = Arc::clone(&once_runs);
        let destroyed = Arc::clone(&destroyed);
        thread::spawn(move || {
            assert!(wait_until(|| handle.lifecycle().render_active()));
            assert!(handle.wait_for_logic_frame(2, Duration::from_secs(5)).is_some());

            let reader = Arc::clone(&scene);
            let nodes = handle
                .enqueue_and_wait_with_result("count_nodes", move || Ok(reader.nodes.len()))
                .unwrap();
            assert_eq!(nodes, 1);

            handle
                .register_closure(
                    "every_frame",
                    move |_alpha| {
                        persistent_runs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    },
                    false,
                )
                .unwrap();
            handle
                .register_closure(
                    "once",
                    move |_alpha| {
                        once_runs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    },
                    true,
                )
                .unwrap();

            for i in 0..DESTROYS {
                let witness = Arc::clone(&destroyed);
                handle
                    .schedule_destroy(format!("buffer_{i}"), move || {
                        witness.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
            }
            settle(&handle);
            handle.request_shutdown();
        })
    };

    let stats = FixedStepLoop::new(&config).run(&mut logic, |side: &mut LogicSide<MemoryScene>, _| {
        #[allow(clippy::cast_precision_loss)]
        let x = side.ticks() as f32;
        side.update_node_position(NODE, Vec3::new(x, 0.0, 0.0), TransformSpace::Local);
    });

    controller.join().unwrap();
    let render_stats = render_thread.join().unwrap().unwrap();

    assert!(stats.ticks >= 2);
    assert_eq!(handle.state(), LoopState::Stopped);
    assert!(!handle.lifecycle().render_active());
    assert!(persistent_runs.load(Ordering::SeqCst) >= 1);
    assert_eq!(once_runs.load(Ordering::SeqCst), 1);
    assert_eq!(destroyed.load(Ordering::SeqCst), DESTROYS);
    assert_eq!(render_stats.destroys_executed, DESTROYS as u64);
}

#[test]
fn test_calls_after_shutdown_run_on_caller() {
    let module = GraphicsModule::new(FrameConfig::default(), Arc::new(MemoryScene::new())).unwrap();
    let handle = module.handle();
    let (_logic, render) = module.into_parts();
    let render_thread = spawn_render(render);
    assert!(wait_until(|| handle.lifecycle().render_active()));

    handle.request_shutdown();
    render_thread.join().unwrap().unwrap();
    assert_eq!(handle.state(), LoopState::Stopped);

    let hit = Arc::new(AtomicUsize::new(0));
    let witness = Arc::clone(&hit);
    let dispatch = handle
        .enqueue("late_upload", move || {
            witness.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    assert_eq!(dispatch, Dispatch::Immediate);

    let witness = Arc::clone(&hit);
    handle
        .schedule_destroy("late_release", move || {
            witness.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    handle.wait_for_render_completion().unwrap();
    assert_eq!(hit.load(Ordering::SeqCst), 2);
    assert!(!handle.has_pending_render_commands());
}

#[test]
fn test_waiter_blocked_across_shutdown_is_released() {
    let module = GraphicsModule::new(FrameConfig::default(), Arc::new(MemoryScene::new())).unwrap();
    let handle = module.handle();
    let (_logic, render) = module.into_parts();
    let render_thread = spawn_render(render);
    assert!(wait_until(|| handle.lifecycle().render_active()));

    let waiters: Vec<_> = (0..4)
        .map(|i| {
            let handle = handle.clone();
            thread::spawn(move || handle.enqueue_and_wait_with_result(format!("query_{i}"), move || Ok(i * 2)))
        })
        .collect();
    handle.request_shutdown();

    for (i, waiter) in waiters.into_iter().enumerate() {
        assert_eq!(waiter.join().unwrap().unwrap(), i * 2);
    }
    render_thread.join().unwrap().unwrap();
    assert_eq!(handle.state(), LoopState::Stopped);
}
