//! # Completion Signals
//!
//! One-shot result channel between a blocked caller and the render thread.
//!
//! The signal is consumed by [`CompletionSignal::fulfill`], so a result can
//! be delivered at most once. A signal dropped without a result resolves the
//! future to [`FrameError::Abandoned`] instead of hanging the waiter.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{CommandName, FrameError, FrameResult};

/// Creates a linked signal/future pair for the named command.
#[must_use]
pub fn completion<T>(name: impl Into<CommandName>) -> (CompletionSignal<T>, CompletionFuture<T>) {
    let name = name.into();
    let (sender, receiver) = crossbeam_channel::bounded(1);
    (
        CompletionSignal { sender },
        CompletionFuture { receiver, name },
    )
}

/// Producer half. Held by the queued command.
#[derive(Debug)]
pub struct CompletionSignal<T> {
    sender: Sender<FrameResult<T>>,
}

impl<T> CompletionSignal<T> {
    /// Delivers the result. Ignored if the waiter already gave up.
    pub fn fulfill(self, result: FrameResult<T>) {
        // A waiter that timed out and returned has dropped its receiver.
        let _ = self.sender.send(result);
    }
}

/// Consumer half. Held by the blocked caller.
#[derive(Debug)]
pub struct CompletionFuture<T> {
    receiver: Receiver<FrameResult<T>>,
    name: CommandName,
}

impl<T> CompletionFuture<T> {
    /// Name of the command this future waits on.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks until the result arrives.
    ///
    /// # Errors
    ///
    /// Returns the command's error, or [`FrameError::Abandoned`] if the
    /// signal was dropped unfulfilled.
    pub fn wait(self) -> FrameResult<T> {
        self.receiver.recv().unwrap_or_else(|_| Err(self.abandoned()))
    }

    /// Blocks for at most `timeout`. `None` means nothing arrived yet.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<FrameResult<T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(self.abandoned())),
        }
    }

    /// Returns the result if it has already arrived.
    pub fn try_get(&self) -> Option<FrameResult<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(self.abandoned())),
        }
    }

    fn abandoned(&self) -> FrameError {
        FrameError::Abandoned { name: self.name.to_string() }
    }
}
