//! # Interpolation Frames
//!
//! The five trackers as one unit, and the frame they publish to the render
//! thread at every logic tick.

use crate::config::FrameConfig;
use crate::tracking::kinds::{BoneKind, CameraKind, MaterialKind, NodeKind, PassKind, TrackedKind};
use crate::tracking::tracker::{AdvanceReport, EntityTracker, FrameEntry, LiveTable};

/// A scene that can serve every tracked kind.
pub trait SceneBackend:
    LiveTable<NodeKind>
    + LiveTable<CameraKind>
    + LiveTable<BoneKind>
    + LiveTable<PassKind>
    + LiveTable<MaterialKind>
{
}

impl<T> SceneBackend for T where
    T: LiveTable<NodeKind>
        + LiveTable<CameraKind>
        + LiveTable<BoneKind>
        + LiveTable<PassKind>
        + LiveTable<MaterialKind>
{
}

/// Previous/current pairs of every active record, for one completed tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterpolationFrame {
    /// Logic frame id this frame was completed on. 0 before the first tick.
    pub logic_frame: u64,
    /// Scene nodes.
    pub nodes: Vec<FrameEntry<NodeKind>>,
    /// Cameras.
    pub cameras: Vec<FrameEntry<CameraKind>>,
    /// Skeletal bones.
    pub bones: Vec<FrameEntry<BoneKind>>,
    /// Shader passes.
    pub passes: Vec<FrameEntry<PassKind>>,
    /// Material blocks.
    pub materials: Vec<FrameEntry<MaterialKind>>,
}

impl InterpolationFrame {
    /// Blends every pair by `alpha` and writes it to `backend`.
    /// Returns the number of objects written.
    pub fn apply<B: SceneBackend + ?Sized>(&self, alpha: f32, backend: &B) -> usize {
        apply_kind(&self.nodes, alpha, backend)
            + apply_kind(&self.cameras, alpha, backend)
            + apply_kind(&self.bones, alpha, backend)
            + apply_kind(&self.passes, alpha, backend)
            + apply_kind(&self.materials, alpha, backend)
    }

    /// Total entries across kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() + self.cameras.len() + self.bones.len() + self.passes.len() + self.materials.len()
    }

    /// True if nothing would be written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn apply_kind<K, B>(entries: &[FrameEntry<K>], alpha: f32, backend: &B) -> usize
where
    K: TrackedKind,
    B: LiveTable<K> + ?Sized,
{
    for entry in entries {
        entry.apply(alpha, backend);
    }
    entries.len()
}

/// One tracker per kind.
#[derive(Debug)]
pub struct TrackerSet {
    /// Scene nodes.
    pub nodes: EntityTracker<NodeKind>,
    /// Cameras.
    pub cameras: EntityTracker<CameraKind>,
    /// Skeletal bones.
    pub bones: EntityTracker<BoneKind>,
    /// Shader passes.
    pub passes: EntityTracker<PassKind>,
    /// Material blocks.
    pub materials: EntityTracker<MaterialKind>,
}

impl TrackerSet {
    /// Creates empty trackers sized from `config`.
    #[must_use]
    pub fn new(config: &FrameConfig) -> Self {
        let slots = config.num_transform_buffers;
        let stable = config.stable_frame_threshold;
        Self {
            nodes: EntityTracker::new(slots, stable),
            cameras: EntityTracker::new(slots, stable),
            bones: EntityTracker::new(slots, stable),
            passes: EntityTracker::new(slots, stable),
            materials: EntityTracker::new(slots, stable),
        }
    }

    /// Advances every tracker by one tick.
    pub fn advance_all<B: SceneBackend + ?Sized>(&mut self, backend: &B) -> AdvanceReport {
        let reports = [
            self.nodes.advance(backend),
            self.cameras.advance(backend),
            self.bones.advance(backend),
            self.passes.advance(backend),
            self.materials.advance(backend),
        ];
        reports.iter().fold(AdvanceReport::default(), |acc, r| AdvanceReport {
            seeded: acc.seeded + r.seeded,
            evicted: acc.evicted + r.evicted,
        })
    }

    /// Blends every tracker directly into `backend`. Single-threaded use.
    pub fn interpolate_all<B: SceneBackend + ?Sized>(&self, alpha: f32, backend: &B) -> usize {
        self.nodes.interpolate(alpha, backend)
            + self.cameras.interpolate(alpha, backend)
            + self.bones.interpolate(alpha, backend)
            + self.passes.interpolate(alpha, backend)
            + self.materials.interpolate(alpha, backend)
    }

    /// Overwrites `frame` with the current blend pairs, reusing its buffers.
    pub fn collect_into(&self, frame: &mut InterpolationFrame, logic_frame: u64) {
        frame.logic_frame = logic_frame;
        self.nodes.collect_frame(&mut frame.nodes);
        self.cameras.collect_frame(&mut frame.cameras);
        self.bones.collect_frame(&mut frame.bones);
        self.passes.collect_frame(&mut frame.passes);
        self.materials.collect_frame(&mut frame.materials);
    }

    /// Total tracked records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() + self.cameras.len() + self.bones.len() + self.passes.len() + self.materials.len()
    }

    /// True if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every record of every kind.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.cameras.clear();
        self.bones.clear();
        self.passes.clear();
        self.materials.clear();
    }

    /// Logs every tracker at debug level.
    pub fn dump(&self, limit: usize) {
        self.nodes.dump(limit);
        self.cameras.dump(limit);
        self.bones.dump(limit);
        self.passes.dump(limit);
        self.materials.dump(limit);
    }
}
