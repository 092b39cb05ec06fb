//! # TANDEM Core
//!
//! Building blocks for running a fixed-tick simulation thread independently
//! of a variable-rate render thread:
//! - Render command queue with blocking completion and same-thread reentrancy
//! - Per-frame closure registry
//! - Deferred destruction ring
//! - Transform rings per tracked entity, blended by a published alpha
//!
//! ## Architecture Rules
//!
//! 1. **Single writer per slot** - logic writes the write slot, render reads
//!    only what was published
//! 2. **No mutex on the hot path** - every per-frame exchange is a channel or
//!    an atomic
//! 3. **Nothing escapes the render thread** - command faults and panics are
//!    routed to the waiting caller
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tandem_core::{CommandQueue, FrameConfig, ThreadRole};
//!
//! let queue = CommandQueue::new(&FrameConfig::default(), Arc::new(ThreadRole::new()));
//! queue.enqueue("create_mesh", || Ok(()))?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod sync;
pub mod tracking;

pub use config::{FrameConfig, TimeoutPolicy};
pub use error::{CommandFault, CommandName, FrameError, FrameResult};
pub use sync::{
    ClosureProducer, ClosureRegistry, CommandQueue, DestroySender, DestructionScheduler, Dispatch,
    InterpolationAlpha, Lifecycle, LogicFrameClock, LoopState, ThreadRole,
};
pub use tracking::{EntityTracker, InterpolationFrame, LiveTable, SceneBackend, TrackerSet};
