//! # Loop Lifecycle
//!
//! `Idle -> Running -> Stopping -> Stopped`. Ticks only execute while
//! `Running`. The render side owns the final `Stopping -> Stopped` step,
//! after it has drained commands and flushed destroys.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// State of the dual-rate loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    /// Constructed, not started.
    Idle = 0,
    /// Ticking.
    Running = 1,
    /// Shutdown observed; draining.
    Stopping = 2,
    /// Fully drained.
    Stopped = 3,
}

impl LoopState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Shared lifecycle cell plus the render-active flag.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
    render_active: AtomicBool,
    shutdown_requested: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Starts `Idle`, render inactive.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(LoopState::Idle as u8),
            render_active: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves `from -> to` if the state is still `from`.
    pub fn transition(&self, from: LoopState, to: LoopState) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            tracing::info!(?from, ?to, "loop state changed");
        }
        moved
    }

    /// Asks the loops to stop at the top of their next iteration.
    pub fn request_shutdown(&self) {
        if !self.shutdown_requested.swap(true, Ordering::AcqRel) {
            tracing::info!("shutdown requested");
        }
    }

    /// True once [`Lifecycle::request_shutdown`] was called.
    #[inline]
    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Sets whether a render loop is currently servicing the queues.
    pub fn set_render_active(&self, active: bool) {
        self.render_active.store(active, Ordering::Release);
    }

    /// True while a render loop is servicing the queues.
    #[inline]
    #[must_use]
    pub fn render_active(&self) -> bool {
        self.render_active.load(Ordering::Acquire)
    }
}
