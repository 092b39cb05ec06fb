//! # Render Loop
//!
//! Per-frame driver of the render thread.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         RENDER FRAME                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  1. advance_and_destroy_old   one destroy slot comes due        │
//! │  2. process_all_commands      everything queued so far          │
//! │  3. consume alpha             acquire pairs with logic release  │
//! │  4. interpolate_all           newest published tick             │
//! │  5. drain closures            registrations, then run all       │
//! │  6. draw                      caller's submission               │
//! │  7. dump                      every buffer_dump_interval frames │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::time::{Duration, Instant};

use tandem_core::sync::ClosureDrainReport;
use tandem_core::{FrameResult, LoopState, SceneBackend};

use crate::render::{RenderSide, RenderStats};

/// What one [`RenderLoop::frame`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    /// Destroys that came due.
    pub destroys: usize,
    /// Render commands executed.
    pub commands: usize,
    /// Blend weight used.
    pub alpha: f32,
    /// Objects written by interpolation.
    pub interpolated: usize,
    /// Closure drain result.
    pub closures: ClosureDrainReport,
}

/// Drives a [`RenderSide`] frame by frame.
#[derive(Debug)]
pub struct RenderLoop<B: SceneBackend> {
    render: RenderSide<B>,
    frames: u64,
    dump_interval: Option<u64>,
    frame_interval: Option<Duration>,
}

impl<B: SceneBackend> RenderLoop<B> {
    /// Wraps `render`. Buffer dumps follow the module configuration.
    #[must_use]
    pub fn new(render: RenderSide<B>) -> Self {
        let config = render.handle().config();
        let dump_interval = (config.debug_buffers && config.buffer_dump_interval > 0)
            .then_some(config.buffer_dump_interval);
        Self { render, frames: 0, dump_interval, frame_interval: None }
    }

    /// Paces [`RenderLoop::run`] to at most one frame per `interval`.
    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// The wrapped render side.
    #[must_use]
    pub fn render(&self) -> &RenderSide<B> {
        &self.render
    }

    /// The wrapped render side, mutably.
    pub fn render_mut(&mut self) -> &mut RenderSide<B> {
        &mut self.render
    }

    /// Frames run so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Runs one render frame. `draw` gets the render side and the alpha.
    ///
    /// Alpha and the blend pairs are published separately, so the alpha read
    /// here may belong to the tick before the frame being blended. The skew
    /// is at most one tick and never shows a frame older than the alpha.
    ///
    /// # Errors
    ///
    /// [`FrameError::NotRenderThread`](tandem_core::FrameError::NotRenderThread)
    /// when called off the render thread.
    pub fn frame<F>(&mut self, draw: &mut F) -> FrameResult<FrameReport>
    where
        F: FnMut(&mut RenderSide<B>, f32),
    {
        let destroys = self.render.advance_and_destroy_old();
        let commands = self.render.process_all_commands()?;
        let alpha = self.render.consume_interpolation_alpha();
        let interpolated = self.render.interpolate_all(alpha);
        let closures = self.render.drain_and_execute_closures(alpha);
        draw(&mut self.render, alpha);

        self.frames += 1;
        if let Some(interval) = self.dump_interval {
            if self.frames % interval == 0 {
                self.render.dump_buffer_state();
            }
        }
        Ok(FrameReport { destroys, commands, alpha, interpolated, closures })
    }

    /// Marks the calling thread as the render thread and runs frames until
    /// shutdown is requested or the logic side leaves `Running`. Then drains
    /// and flushes everything and stops.
    ///
    /// # Errors
    ///
    /// Only if the render thread registration was lost mid-run.
    pub fn run<F>(mut self, mut draw: F) -> FrameResult<RenderStats>
    where
        F: FnMut(&mut RenderSide<B>, f32),
    {
        self.render.mark_current_thread_as_render_thread();
        let outcome = loop {
            let lifecycle = self.render.handle().lifecycle();
            let live = matches!(lifecycle.state(), LoopState::Idle | LoopState::Running);
            if lifecycle.shutdown_requested() || !live {
                break Ok(());
            }
            let started = Instant::now();
            if let Err(error) = self.frame(&mut draw) {
                break Err(error);
            }
            if let Some(interval) = self.frame_interval {
                if let Some(rest) = interval.checked_sub(started.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
        };
        self.render.shutdown()?;
        tracing::info!(frames = self.frames, "render loop stopped");
        outcome.map(|()| self.render.stats())
    }
}
