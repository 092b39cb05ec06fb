//! # Transform Tracking
//!
//! Per-kind ring buffers of transform history, written by the logic thread
//! and blended by the render thread.
//!
//! ```text
//!   slot:      0        1        2        3
//!           ┌───────┬────────┬────────┬───────┐
//!           │ prev  │ current│ write  │ older │   N = 4
//!           └───────┴────────┴────────┴───────┘
//!             ▲          ▲        ▲
//!             └─ blend ──┘        └── logic writes here only
//! ```

pub mod frame;
pub mod kinds;
pub mod ring;
pub mod tracker;

pub use frame::{InterpolationFrame, SceneBackend, TrackerSet};
pub use kinds::{
    BoneId, BoneKind, CameraId, CameraKind, MaterialId, MaterialKind, MaterialValue, NodeId, NodeKind, PassId,
    PassKind, Pose, ScrollSpeeds, TrackedKind, Transform, TransformSpace, PASS_LAYERS,
};
pub use ring::TransformRing;
pub use tracker::{AdvanceReport, EntityTracker, FrameEntry, LiveTable, TrackedRecord};
