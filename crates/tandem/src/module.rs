//! # Graphics Module
//!
//! The explicitly constructed instance every thread talks to. Construction
//! splits it three ways:
//!
//! ```text
//!                     GraphicsModule::new(config, scene)
//!                                   │
//!          ┌────────────────────────┼────────────────────────┐
//!          ▼                        ▼                        ▼
//!     LogicSide               ModuleHandle               RenderSide
//!   (logic thread)         (clone to any thread)       (render thread)
//!   trackers, frame        commands, closures,         drains, destroy ring,
//!   publisher              destroys, alpha, ids        frame subscriber
//! ```
//!
//! Ownership replaces the process-wide singleton: whoever builds the module
//! decides which thread gets which side.

use std::sync::Arc;
use std::time::Duration;

use tandem_core::sync::{execute_guarded, triple_buffer};
use tandem_core::{
    ClosureProducer, ClosureRegistry, CommandFault, CommandName, CommandQueue, DestroySender,
    DestructionScheduler, Dispatch, FrameConfig, FrameResult, InterpolationAlpha, InterpolationFrame,
    Lifecycle, LogicFrameClock, LoopState, SceneBackend, ThreadRole, TrackerSet,
};

use crate::logic::LogicSide;
use crate::render::RenderSide;

/// State reachable from every thread.
pub(crate) struct Shared {
    pub(crate) config: FrameConfig,
    pub(crate) queue: CommandQueue,
    pub(crate) closures: ClosureProducer,
    pub(crate) destroys: DestroySender,
    pub(crate) alpha: InterpolationAlpha,
    pub(crate) clock: LogicFrameClock,
    pub(crate) lifecycle: Lifecycle,
}

/// Cloneable entry point for any thread.
#[derive(Clone)]
pub struct ModuleHandle {
    pub(crate) shared: Arc<Shared>,
}

impl ModuleHandle {
    /// Configuration the module was built with.
    #[must_use]
    pub fn config(&self) -> &FrameConfig {
        &self.shared.config
    }

    /// Loop lifecycle shared by both sides.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.shared.lifecycle
    }

    /// Current loop state.
    #[must_use]
    pub fn state(&self) -> LoopState {
        self.shared.lifecycle.state()
    }

    /// Asks both loops to stop.
    pub fn request_shutdown(&self) {
        self.shared.lifecycle.request_shutdown();
    }

    /// True on the thread registered as the render thread.
    #[must_use]
    pub fn is_render_thread(&self) -> bool {
        self.shared.queue.role().is_render_thread()
    }

    /// Queues a render command. Runs it immediately on the render thread.
    ///
    /// # Errors
    ///
    /// See [`CommandQueue::enqueue`].
    pub fn enqueue<F>(&self, name: impl Into<CommandName>, command: F) -> FrameResult<Dispatch>
    where
        F: FnOnce() -> Result<(), CommandFault> + Send + 'static,
    {
        self.shared.queue.enqueue(name, command)
    }

    /// Queues a render command and blocks until it ran.
    ///
    /// # Errors
    ///
    /// See [`CommandQueue::enqueue_and_wait`].
    pub fn enqueue_and_wait<F>(&self, name: impl Into<CommandName>, command: F) -> FrameResult<()>
    where
        F: FnOnce() -> Result<(), CommandFault> + Send + 'static,
    {
        self.shared.queue.enqueue_and_wait(name, command)
    }

    /// Queues a render command, blocks, and returns its value.
    ///
    /// # Errors
    ///
    /// See [`CommandQueue::enqueue_and_wait_with_result`].
    pub fn enqueue_and_wait_with_result<T, F>(&self, name: impl Into<CommandName>, command: F) -> FrameResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, CommandFault> + Send + 'static,
    {
        self.shared.queue.enqueue_and_wait_with_result(name, command)
    }

    /// Blocks until everything queued so far has run.
    ///
    /// # Errors
    ///
    /// See [`CommandQueue::wait_for_render_completion`].
    pub fn wait_for_render_completion(&self) -> FrameResult<()> {
        self.shared.queue.wait_for_render_completion()
    }

    /// True if commands are waiting for the render thread.
    #[must_use]
    pub fn has_pending_render_commands(&self) -> bool {
        self.shared.queue.has_pending()
    }

    /// Number of commands waiting for the render thread.
    #[must_use]
    pub fn pending_render_commands(&self) -> usize {
        self.shared.queue.pending()
    }

    /// Changes the blocking-wait timeout. `None` waits forever.
    pub fn set_command_timeout(&self, timeout: Option<Duration>) {
        self.shared.queue.set_command_timeout(timeout);
    }

    /// Current blocking-wait timeout.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.shared.queue.command_timeout()
    }

    /// Schedules a resource teardown.
    ///
    /// While the render loop runs, the teardown is delayed until every frame
    /// in flight is done with the resource. While it shuts down, the
    /// teardown goes through the blocking command path. With no render loop
    /// at all it runs right here.
    ///
    /// # Errors
    ///
    /// Only on the blocking path, see [`CommandQueue::enqueue_and_wait`],
    /// or when the teardown panicked while run directly.
    pub fn schedule_destroy<F>(&self, name: impl Into<CommandName>, command: F) -> FrameResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let lifecycle = &self.shared.lifecycle;
        if !lifecycle.render_active() {
            tracing::debug!(destroy = %name, "no render loop, destroying on caller");
            return execute_guarded(&name, move || {
                command();
                Ok(())
            });
        }
        match lifecycle.state() {
            LoopState::Stopping | LoopState::Stopped => self.shared.queue.enqueue_and_wait(name, move || {
                command();
                Ok(())
            }),
            LoopState::Idle | LoopState::Running => {
                self.shared.destroys.schedule(name, command);
                Ok(())
            }
        }
    }

    /// Registers or replaces a per-frame closure.
    ///
    /// # Errors
    ///
    /// [`FrameError::QueueFull`](tandem_core::FrameError::QueueFull) if the
    /// closure queue is at capacity.
    pub fn register_closure<F>(
        &self,
        name: impl Into<CommandName>,
        closure: F,
        fire_and_forget: bool,
    ) -> FrameResult<()>
    where
        F: FnMut(f32) -> Result<(), CommandFault> + Send + 'static,
    {
        self.shared.closures.upsert(name, closure, fire_and_forget)
    }

    /// Unregisters a per-frame closure.
    ///
    /// # Errors
    ///
    /// [`FrameError::QueueFull`](tandem_core::FrameError::QueueFull) if the
    /// closure queue is at capacity.
    pub fn remove_closure(&self, name: impl Into<CommandName>) -> FrameResult<()> {
        self.shared.closures.remove(name)
    }

    /// Drops every registered closure at the next drain.
    ///
    /// # Errors
    ///
    /// [`FrameError::QueueFull`](tandem_core::FrameError::QueueFull) if the
    /// closure queue is at capacity.
    pub fn clear_all_closures(&self) -> FrameResult<()> {
        self.shared.closures.clear()
    }

    /// Publishes the blend weight for the render thread.
    pub fn publish_interpolation_alpha(&self, alpha: f32) {
        self.shared.alpha.publish(alpha);
    }

    /// Latest published blend weight.
    #[must_use]
    pub fn consume_interpolation_alpha(&self) -> f32 {
        self.shared.alpha.consume()
    }

    /// Id of the last completed logic frame.
    #[must_use]
    pub fn logic_frame_id(&self) -> u64 {
        self.shared.clock.current()
    }

    /// Blocks until a logic frame newer than `after` completes.
    #[must_use]
    pub fn wait_for_logic_frame(&self, after: u64, timeout: Duration) -> Option<u64> {
        self.shared.clock.wait_for_frame(after, timeout)
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("state", &self.state())
            .field("queue", &self.shared.queue)
            .field("logic_frame", &self.logic_frame_id())
            .finish_non_exhaustive()
    }
}

/// The whole module before it is split across threads.
#[derive(Debug)]
pub struct GraphicsModule<B: SceneBackend> {
    logic: LogicSide<B>,
    render: RenderSide<B>,
}

impl<B: SceneBackend> GraphicsModule<B> {
    /// Builds the module against `backend`.
    ///
    /// # Errors
    ///
    /// [`FrameError::InvalidConfig`](tandem_core::FrameError::InvalidConfig)
    /// if `config` does not validate.
    pub fn new(config: FrameConfig, backend: Arc<B>) -> FrameResult<Self> {
        config.validate()?;

        let closures = ClosureRegistry::new(&config);
        let destroys = DestructionScheduler::new(&config);
        let trackers = TrackerSet::new(&config);
        let (publisher, subscriber) = triple_buffer(&InterpolationFrame::default());

        let shared = Arc::new(Shared {
            queue: CommandQueue::new(&config, Arc::new(ThreadRole::new())),
            closures: closures.producer(),
            destroys: destroys.sender(),
            alpha: InterpolationAlpha::new(),
            clock: LogicFrameClock::new(),
            lifecycle: Lifecycle::new(),
            config,
        });
        let handle = ModuleHandle { shared };
        tracing::info!(
            tick_seconds = handle.config().fixed_tick_seconds,
            transform_buffers = handle.config().num_transform_buffers,
            destroy_slots = handle.config().num_destroy_slots,
            "graphics module created"
        );

        Ok(Self {
            logic: LogicSide::new(handle.clone(), Arc::clone(&backend), trackers, publisher),
            render: RenderSide::new(handle, backend, subscriber, closures, destroys),
        })
    }

    /// Handle for any thread.
    #[must_use]
    pub fn handle(&self) -> ModuleHandle {
        self.logic.handle().clone()
    }

    /// Logic side, for single-threaded use.
    pub fn logic_mut(&mut self) -> &mut LogicSide<B> {
        &mut self.logic
    }

    /// Render side, for single-threaded use.
    pub fn render_mut(&mut self) -> &mut RenderSide<B> {
        &mut self.render
    }

    /// Splits the module for the two threads.
    #[must_use]
    pub fn into_parts(self) -> (LogicSide<B>, RenderSide<B>) {
        (self.logic, self.render)
    }
}
