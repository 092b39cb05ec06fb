//! # Logic/Render Synchronization
//!
//! Everything that crosses the thread boundary.
//!
//! ```text
//!  ┌──────────────────┐   commands    ┌──────────────────┐
//!  │   Logic thread   │ ────────────► │  Render thread   │
//!  │                  │   closures    │                  │
//!  │  FixedStepLoop   │ ────────────► │  process_all     │
//!  │  trackers.write  │   destroys    │  drain closures  │
//!  │                  │ ────────────► │  destroy ring    │
//!  │                  │  frame+alpha  │  interpolate     │
//!  │                  │ ════════════► │                  │
//!  └──────────────────┘ triple buffer └──────────────────┘
//! ```
//!
//! No mutex is taken on any per-frame path.

pub mod alpha;
pub mod closure;
pub mod command_queue;
pub mod completion;
pub mod destruction;
pub mod lifecycle;
pub mod thread_role;
pub mod triple_buffer;

pub use alpha::{InterpolationAlpha, LogicFrameClock};
pub use closure::{ClosureDrainReport, ClosureProducer, ClosureRegistry, FrameClosure};
pub use command_queue::{execute_guarded, CommandQueue, Dispatch};
pub use completion::{completion, CompletionFuture, CompletionSignal};
pub use destruction::{DestroyCommand, DestroySender, DestructionScheduler};
pub use lifecycle::{Lifecycle, LoopState};
pub use thread_role::{command_depth, wait_depth, ThreadRole};
pub use triple_buffer::{triple_buffer, Publisher, Subscriber};
