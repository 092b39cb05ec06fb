//! # Frame Error Types
//!
//! Every failure the logic/render handoff can surface. Nothing here is fatal
//! to the render thread: faults are caught at the drain site and routed back
//! to whichever caller is waiting on them.

use std::borrow::Cow;

use thiserror::Error;

/// Name attached to every queued command, closure and destroy request.
///
/// Borrowed for literals, owned for names built at runtime.
pub type CommandName = Cow<'static, str>;

/// Error returned by a render command or per-frame closure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CommandFault {
    /// Human-readable description of what went wrong.
    pub message: String,
}

impl CommandFault {
    /// Creates a fault from any message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<&str> for CommandFault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for CommandFault {
    fn from(message: String) -> Self {
        Self { message }
    }
}

/// Errors that can occur while handing work between logic and render.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A bounded queue rejected the entry.
    #[error("{queue} queue full, dropped '{name}'")]
    QueueFull {
        /// Which queue overflowed.
        queue: &'static str,
        /// Name of the rejected entry.
        name: String,
    },

    /// The consuming side of a queue no longer exists.
    #[error("{queue} queue disconnected")]
    Disconnected {
        /// Which queue lost its consumer.
        queue: &'static str,
    },

    /// A command returned an error.
    #[error("command '{name}' failed: {source}")]
    CommandFailed {
        /// Name of the failing command.
        name: String,
        /// The error the command returned.
        source: CommandFault,
    },

    /// A command panicked. The panic was caught on the render thread.
    #[error("command '{name}' panicked: {message}")]
    CommandPanicked {
        /// Name of the panicking command.
        name: String,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// The completion signal was dropped without a result.
    #[error("command '{name}' was dropped before completing")]
    Abandoned {
        /// Name of the abandoned command.
        name: String,
    },

    /// A blocking wait ran out of time and the timeout policy is `Fail`.
    #[error("timed out after {waited_ms} ms waiting for '{name}'")]
    Timeout {
        /// Name of the command being waited on.
        name: String,
        /// Total time spent waiting.
        waited_ms: u64,
    },

    /// A render-thread-only operation was called from another thread.
    #[error("{operation} must be called from the render thread")]
    NotRenderThread {
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// Shader pass layer index out of range.
    #[error("layer index {index} out of range (pass has {layers} layers)")]
    InvalidLayer {
        /// Requested layer.
        index: usize,
        /// Number of layers a pass has.
        layers: usize,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration text could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Configuration file could not be read.
    #[error("config io error: {0}")]
    ConfigIo(String),
}

/// Result type for frame handoff operations.
pub type FrameResult<T> = Result<T, FrameError>;

/// Extracts a readable message from a caught panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
