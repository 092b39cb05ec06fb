//! # Tracked Entity Kinds
//!
//! Each kind names its handle type, its per-slot snapshot and how two
//! snapshots blend. Handles are opaque ids into tables the scene owns; a
//! tracker never owns the object behind a handle.

use std::fmt::Debug;
use std::hash::Hash;

use glam::{Quat, Vec3, Vec4};

/// Number of scroll layers in a shader pass.
pub const PASS_LAYERS: usize = 9;

/// Which transform API a record reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformSpace {
    /// Parent-relative transform.
    #[default]
    Local,
    /// Derived world transform, for nodes driven by a physics body.
    World,
}

/// One family of interpolated entities.
pub trait TrackedKind: Debug + Clone + Copy + PartialEq + Eq + Send + Sync + 'static {
    /// Opaque id of the externally owned object.
    type Handle: Copy + Eq + Hash + Debug + Send + Sync + 'static;
    /// What one ring slot stores.
    type Snapshot: Copy + Default + Debug + PartialEq + Send + Sync + 'static;

    /// Kind name for logs.
    const NAME: &'static str;

    /// Whether records are evicted after a run of ticks without writes.
    const EVICTS_WHEN_STABLE: bool = false;

    /// Blends `previous` towards `current` by `alpha` in `[0, 1]`.
    fn blend(previous: &Self::Snapshot, current: &Self::Snapshot, alpha: f32) -> Self::Snapshot;
}

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

handle_type!(
    /// Scene node id.
    NodeId
);
handle_type!(
    /// Camera id.
    CameraId
);
handle_type!(
    /// Skeletal bone id.
    BoneId
);
handle_type!(
    /// Shader pass id.
    PassId
);
handle_type!(
    /// Material parameter block id.
    MaterialId
);

/// Full node transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Translation.
    pub position: Vec3,
    /// Rotation. Kept normalised.
    pub orientation: Quat,
    /// Non-uniform scale.
    pub scale: Vec3,
}

impl Transform {
    /// No translation, no rotation, unit scale.
    pub const IDENTITY: Self = Self { position: Vec3::ZERO, orientation: Quat::IDENTITY, scale: Vec3::ONE };

    /// Identity rotation and scale at `position`.
    #[must_use]
    pub const fn from_position(position: Vec3) -> Self {
        Self { position, ..Self::IDENTITY }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Position and orientation, for cameras and bones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Translation.
    pub position: Vec3,
    /// Rotation. Kept normalised.
    pub orientation: Quat,
}

impl Pose {
    /// Origin, no rotation.
    pub const IDENTITY: Self = Self { position: Vec3::ZERO, orientation: Quat::IDENTITY };
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Per-layer texture scroll speeds of a shader pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollSpeeds {
    /// Horizontal speed per layer.
    pub x: [f32; PASS_LAYERS],
    /// Vertical speed per layer.
    pub y: [f32; PASS_LAYERS],
}

/// Colour parameter of a material block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MaterialValue {
    /// RGBA.
    pub colour: Vec4,
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Scene nodes. Evicted once stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {}

impl TrackedKind for NodeKind {
    type Handle = NodeId;
    type Snapshot = Transform;
    const NAME: &'static str = "node";
    const EVICTS_WHEN_STABLE: bool = true;

    fn blend(previous: &Transform, current: &Transform, alpha: f32) -> Transform {
        Transform {
            position: previous.position.lerp(current.position, alpha),
            // glam's lerp takes the shorter arc and renormalises.
            orientation: previous.orientation.lerp(current.orientation, alpha),
            scale: previous.scale.lerp(current.scale, alpha),
        }
    }
}

fn blend_pose(previous: &Pose, current: &Pose, alpha: f32) -> Pose {
    Pose {
        position: previous.position.lerp(current.position, alpha),
        orientation: previous.orientation.lerp(current.orientation, alpha),
    }
}

/// Cameras.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraKind {}

impl TrackedKind for CameraKind {
    type Handle = CameraId;
    type Snapshot = Pose;
    const NAME: &'static str = "camera";

    fn blend(previous: &Pose, current: &Pose, alpha: f32) -> Pose {
        blend_pose(previous, current, alpha)
    }
}

/// Skeletal bones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoneKind {}

impl TrackedKind for BoneKind {
    type Handle = BoneId;
    type Snapshot = Pose;
    const NAME: &'static str = "bone";

    fn blend(previous: &Pose, current: &Pose, alpha: f32) -> Pose {
        blend_pose(previous, current, alpha)
    }
}

/// Shader passes with scrolling layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {}

impl TrackedKind for PassKind {
    type Handle = PassId;
    type Snapshot = ScrollSpeeds;
    const NAME: &'static str = "pass";

    fn blend(previous: &ScrollSpeeds, current: &ScrollSpeeds, alpha: f32) -> ScrollSpeeds {
        let mut out = ScrollSpeeds::default();
        for layer in 0..PASS_LAYERS {
            out.x[layer] = lerp(previous.x[layer], current.x[layer], alpha);
            out.y[layer] = lerp(previous.y[layer], current.y[layer], alpha);
        }
        out
    }
}

/// Material parameter blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {}

impl TrackedKind for MaterialKind {
    type Handle = MaterialId;
    type Snapshot = MaterialValue;
    const NAME: &'static str = "material";

    fn blend(previous: &MaterialValue, current: &MaterialValue, alpha: f32) -> MaterialValue {
        MaterialValue { colour: previous.colour.lerp(current.colour, alpha) }
    }
}
