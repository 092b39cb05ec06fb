//! # Thread Roles
//!
//! Which OS thread is the render thread, and how deep the current thread is
//! inside render commands and blocking waits.
//!
//! Invariant: while [`command_depth`] is non-zero, every blocking call made on
//! this thread executes synchronously right here. Queueing and waiting from
//! inside a command would wait on the very loop that is running it.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Next thread token to hand out. 0 is reserved for "no render thread".
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static TOKEN: u64 = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    static COMMAND_DEPTH: Cell<u32> = const { Cell::new(0) };
    static WAIT_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Process-unique token of the calling thread.
#[inline]
#[must_use]
pub fn current_thread_token() -> u64 {
    TOKEN.with(|token| *token)
}

/// Registry of the render thread's identity.
///
/// Owned by the engine instance rather than a global, so two engines in one
/// process (tests) never see each other's render thread.
#[derive(Debug, Default)]
pub struct ThreadRole {
    render_token: AtomicU64,
}

impl ThreadRole {
    /// Creates a registry with no render thread.
    #[must_use]
    pub const fn new() -> Self {
        Self { render_token: AtomicU64::new(0) }
    }

    /// Marks the calling thread as the render thread.
    pub fn mark_current_thread_as_render_thread(&self) {
        let token = current_thread_token();
        let previous = self.render_token.swap(token, Ordering::AcqRel);
        if previous != 0 && previous != token {
            tracing::warn!(previous, token, "render thread reassigned");
        } else {
            tracing::debug!(token, "render thread marked");
        }
    }

    /// True if the calling thread is the render thread.
    #[inline]
    #[must_use]
    pub fn is_render_thread(&self) -> bool {
        self.render_token.load(Ordering::Acquire) == current_thread_token()
    }

    /// True once some thread has been marked.
    #[inline]
    #[must_use]
    pub fn has_render_thread(&self) -> bool {
        self.render_token.load(Ordering::Acquire) != 0
    }

    /// Forgets the render thread. Blocking calls after this run on the caller.
    pub fn clear(&self) {
        self.render_token.store(0, Ordering::Release);
    }
}

/// Depth of nested render-command execution on the calling thread.
#[inline]
#[must_use]
pub fn command_depth() -> u32 {
    COMMAND_DEPTH.with(Cell::get)
}

/// Depth of nested blocking waits on the calling thread.
#[inline]
#[must_use]
pub fn wait_depth() -> u32 {
    WAIT_DEPTH.with(Cell::get)
}

/// Increments [`command_depth`] for its lifetime. Restored on unwind.
#[derive(Debug)]
pub struct CommandDepthGuard(());

impl CommandDepthGuard {
    /// Enters one level of command execution.
    #[must_use]
    pub fn enter() -> Self {
        COMMAND_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self(())
    }
}

impl Drop for CommandDepthGuard {
    fn drop(&mut self) {
        COMMAND_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Increments [`wait_depth`] for its lifetime. Restored on unwind.
#[derive(Debug)]
pub struct WaitDepthGuard(());

impl WaitDepthGuard {
    /// Enters one level of blocking wait.
    #[must_use]
    pub fn enter() -> Self {
        WAIT_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self(())
    }
}

impl Drop for WaitDepthGuard {
    fn drop(&mut self) {
        WAIT_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}
