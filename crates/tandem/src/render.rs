//! # Render Side
//!
//! Owned by the render thread: drains the command and closure queues,
//! advances the destroy ring, and writes interpolated values to the scene.

use std::sync::Arc;

use tandem_core::sync::{ClosureDrainReport, Subscriber};
use tandem_core::{
    ClosureRegistry, CommandName, DestructionScheduler, FrameError, FrameResult, InterpolationFrame,
    LoopState, SceneBackend,
};

use crate::module::ModuleHandle;

/// Per-frame counters of the render side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Render frames interpolated.
    pub frames: u64,
    /// Render commands executed by drains.
    pub commands_executed: u64,
    /// Closure invocations.
    pub closures_executed: u64,
    /// Deferred destroys executed.
    pub destroys_executed: u64,
    /// Objects written by interpolation.
    pub objects_interpolated: u64,
}

/// Render-thread half of the graphics module.
pub struct RenderSide<B: SceneBackend> {
    handle: ModuleHandle,
    backend: Arc<B>,
    subscriber: Subscriber<InterpolationFrame>,
    closures: ClosureRegistry,
    destroys: DestructionScheduler,
    stats: RenderStats,
}

impl<B: SceneBackend> RenderSide<B> {
    pub(crate) fn new(
        handle: ModuleHandle,
        backend: Arc<B>,
        subscriber: Subscriber<InterpolationFrame>,
        closures: ClosureRegistry,
        destroys: DestructionScheduler,
    ) -> Self {
        Self { handle, backend, subscriber, closures, destroys, stats: RenderStats::default() }
    }

    /// Shared handle.
    #[must_use]
    pub fn handle(&self) -> &ModuleHandle {
        &self.handle
    }

    /// The scene interpolated values are written to.
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Registers the calling thread as the render thread and starts routing
    /// destroys through the delayed ring.
    pub fn mark_current_thread_as_render_thread(&self) {
        self.handle.shared.queue.mark_current_thread_as_render_thread();
        self.handle.lifecycle().set_render_active(true);
        tracing::info!("render thread registered");
    }

    /// Runs the render commands queued so far. Returns how many ran.
    ///
    /// # Errors
    ///
    /// [`FrameError::NotRenderThread`] off the render thread.
    pub fn process_all_commands(&mut self) -> FrameResult<usize> {
        let executed = self.handle.shared.queue.process_all_commands()?;
        self.stats.commands_executed += executed as u64;
        Ok(executed)
    }

    /// Applies queued closure registrations and runs every closure.
    pub fn drain_and_execute_closures(&mut self, alpha: f32) -> ClosureDrainReport {
        let report = self.closures.drain_and_execute(alpha);
        self.stats.closures_executed += report.closures_run as u64;
        report
    }

    /// Advances the destroy ring one slot. Returns how many destroys ran.
    pub fn advance_and_destroy_old(&mut self) -> usize {
        let executed = self.destroys.advance_and_destroy_old();
        self.stats.destroys_executed += executed as u64;
        executed
    }

    /// Schedules a delayed destroy from the render thread itself.
    pub fn schedule_destroy<F>(&mut self, name: impl Into<CommandName>, command: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.destroys.schedule(name, command);
    }

    /// True if any destroy has not run yet.
    #[must_use]
    pub fn has_pending_destroy_commands(&self) -> bool {
        self.destroys.has_pending()
    }

    /// Latest published blend weight.
    #[must_use]
    pub fn consume_interpolation_alpha(&self) -> f32 {
        self.handle.consume_interpolation_alpha()
    }

    /// Writes `previous -> current` blended by `alpha` for every object of
    /// the newest published tick. Returns how many objects were written.
    pub fn interpolate_all(&mut self, alpha: f32) -> usize {
        let written = self.subscriber.latest().apply(alpha, self.backend.as_ref());
        self.stats.frames += 1;
        self.stats.objects_interpolated += written as u64;
        written
    }

    /// Logic tick of the frame the next interpolation will blend.
    pub fn latest_logic_frame(&mut self) -> u64 {
        self.subscriber.latest().logic_frame
    }

    /// Runs every pending destroy now and drops every closure. Used when the
    /// scene is torn down between levels.
    pub fn clear_scene_resources(&mut self) -> usize {
        let flushed = self.destroys.flush();
        self.stats.destroys_executed += flushed as u64;
        self.closures.clear_all();
        flushed
    }

    /// Logs queue depths and ring state at debug level.
    pub fn dump_buffer_state(&mut self) {
        let frame = self.subscriber.latest();
        tracing::debug!(
            logic_frame = frame.logic_frame,
            frame_entries = frame.len(),
            pending_commands = self.handle.pending_render_commands(),
            closures = self.closures.len(),
            pending_closure_commands = self.closures.pending_commands(),
            pending_destroys = self.destroys.pending(),
            destroy_advances = self.destroys.advances(),
            "render buffer state"
        );
    }

    /// Final render-side teardown.
    ///
    /// Drains every command, flushes every destroy slot oldest first, drops
    /// the closures, then closes the queue so later callers run inline.
    /// Ends in [`LoopState::Stopped`].
    ///
    /// # Errors
    ///
    /// [`FrameError::NotRenderThread`] off the render thread.
    pub fn shutdown(&mut self) -> FrameResult<()> {
        let queue = &self.handle.shared.queue;
        if !queue.role().is_render_thread() {
            return Err(FrameError::NotRenderThread { operation: "shutdown" });
        }
        let lifecycle = self.handle.lifecycle();
        // Either side may have initiated the stop.
        if !lifecycle.transition(LoopState::Running, LoopState::Stopping) {
            lifecycle.transition(LoopState::Idle, LoopState::Stopping);
        }

        let mut commands = queue.drain_until_empty()?;
        let destroys = self.destroys.flush();
        self.closures.clear_all();
        queue.close();
        // Anything that slipped in between the drain and the close.
        commands += queue.drain_until_empty()?;
        lifecycle.set_render_active(false);
        lifecycle.transition(LoopState::Stopping, LoopState::Stopped);

        self.stats.commands_executed += commands as u64;
        self.stats.destroys_executed += destroys as u64;
        tracing::info!(commands, destroys, "render side shut down");
        Ok(())
    }
}

impl<B: SceneBackend> std::fmt::Debug for RenderSide<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSide")
            .field("stats", &self.stats)
            .field("closures", &self.closures)
            .field("destroys", &self.destroys)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::GraphicsModule;
    use crate::scene::MemoryScene;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tandem_core::FrameConfig;

    fn render() -> RenderSide<MemoryScene> {
        let module = GraphicsModule::new(FrameConfig::default(), Arc::new(MemoryScene::new())).unwrap();
        module.into_parts().1
    }

    #[test]
    fn test_process_off_render_thread_fails() {
        let mut render = render();
        assert_eq!(
            render.process_all_commands(),
            Err(FrameError::NotRenderThread { operation: "process_all_commands" })
        );
        assert_eq!(render.shutdown(), Err(FrameError::NotRenderThread { operation: "shutdown" }));
    }

    #[test]
    fn test_shutdown_flushes_and_stops() {
        let mut render = render();
        render.mark_current_thread_as_render_thread();
        let hit = Arc::new(AtomicUsize::new(0));
        for i in 0..3 {
            let witness = Arc::clone(&hit);
            render.schedule_destroy(format!("res_{i}"), move || {
                witness.fetch_add(1, Ordering::SeqCst);
            });
        }
        render.shutdown().unwrap();

        assert_eq!(hit.load(Ordering::SeqCst), 3);
        assert!(!render.has_pending_destroy_commands());
        assert_eq!(render.handle().state(), LoopState::Stopped);
        assert!(!render.handle().lifecycle().render_active());
        assert_eq!(render.stats().destroys_executed, 3);
    }

    #[test]
    fn test_interpolate_empty_frame() {
        let mut render = render();
        assert_eq!(render.interpolate_all(0.5), 0);
        assert_eq!(render.latest_logic_frame(), 0);
        assert_eq!(render.stats().frames, 1);
    }
}
