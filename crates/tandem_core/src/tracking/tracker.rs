//! # Entity Tracker
//!
//! Dense array of tracked records plus a handle-to-index map. O(1) add,
//! lookup and swap-with-last removal.
//!
//! The tracker lives on the logic thread. Render never sees it directly; it
//! gets an [`InterpolationFrame`](crate::tracking::InterpolationFrame) copy
//! of the blended pairs at every advance.

use std::collections::HashMap;

use crate::tracking::kinds::{TrackedKind, TransformSpace};
use crate::tracking::ring::TransformRing;

/// The scene owner's table of live objects for one kind.
///
/// Implementations are shared between threads; `write` is only ever called
/// from the render thread.
pub trait LiveTable<K: TrackedKind>: Send + Sync {
    /// Current state of `handle`, or `None` if the object no longer exists.
    fn read(&self, handle: K::Handle, space: TransformSpace) -> Option<K::Snapshot>;

    /// Applies an interpolated value to `handle`.
    fn write(&self, handle: K::Handle, value: &K::Snapshot, space: TransformSpace);
}

/// One tracked object and its transform history.
#[derive(Debug, Clone)]
pub struct TrackedRecord<K: TrackedKind> {
    handle: K::Handle,
    transforms: Vec<K::Snapshot>,
    space: TransformSpace,
    active: bool,
    is_new: bool,
    updated_this_tick: bool,
    stable_frames: u32,
}

impl<K: TrackedKind> TrackedRecord<K> {
    fn new(handle: K::Handle, seed: K::Snapshot, slots: usize, space: TransformSpace) -> Self {
        Self {
            handle,
            transforms: vec![seed; slots],
            space,
            active: true,
            is_new: true,
            updated_this_tick: false,
            stable_frames: 0,
        }
    }

    /// Handle of the tracked object.
    #[must_use]
    pub fn handle(&self) -> K::Handle {
        self.handle
    }

    /// All ring slots.
    #[must_use]
    pub fn transforms(&self) -> &[K::Snapshot] {
        &self.transforms
    }

    /// Local or world writes.
    #[must_use]
    pub fn space(&self) -> TransformSpace {
        self.space
    }

    /// Whether the record takes part in interpolation.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True until the first advance after creation.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Consecutive ticks without a write.
    #[must_use]
    pub fn stable_frames(&self) -> u32 {
        self.stable_frames
    }
}

/// Blended pair for one active record, as published to the render thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEntry<K: TrackedKind> {
    /// Object to write.
    pub handle: K::Handle,
    /// Older completed slot.
    pub previous: K::Snapshot,
    /// Newer completed slot.
    pub current: K::Snapshot,
    /// Local or world write.
    pub space: TransformSpace,
}

impl<K: TrackedKind> FrameEntry<K> {
    /// Blends the pair and writes it through `live`.
    #[inline]
    pub fn apply<L: LiveTable<K> + ?Sized>(&self, alpha: f32, live: &L) {
        live.write(self.handle, &K::blend(&self.previous, &self.current, alpha), self.space);
    }
}

/// What one [`EntityTracker::advance`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    /// New records seeded from their live object.
    pub seeded: usize,
    /// Records removed by the stable-frame rule.
    pub evicted: usize,
}

/// All tracked records of one kind.
#[derive(Debug)]
pub struct EntityTracker<K: TrackedKind> {
    records: Vec<TrackedRecord<K>>,
    index: HashMap<K::Handle, usize>,
    ring: TransformRing,
    stable_threshold: u32,
}

impl<K: TrackedKind> EntityTracker<K> {
    /// Creates an empty tracker with `slots` ring slots.
    ///
    /// `stable_threshold` only matters for kinds that evict; 0 disables it.
    #[must_use]
    pub fn new(slots: usize, stable_threshold: u32) -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            ring: TransformRing::new(slots),
            stable_threshold,
        }
    }

    /// Starts tracking `handle`, seeding every slot from its live state.
    ///
    /// Returns false if already tracked or if the live object is missing.
    pub fn add_tracked<L: LiveTable<K> + ?Sized>(
        &mut self,
        handle: K::Handle,
        space: TransformSpace,
        live: &L,
    ) -> bool {
        if self.index.contains_key(&handle) {
            return false;
        }
        let Some(seed) = live.read(handle, space) else {
            tracing::debug!(kind = K::NAME, ?handle, "cannot track missing object");
            return false;
        };
        self.insert(handle, seed, space);
        true
    }

    /// Starts tracking `handle` with every slot set to `seed`.
    ///
    /// For objects whose live state cannot be read back. The record skips
    /// the live reseed on its first advance. Returns false if already tracked.
    pub fn add_seeded(&mut self, handle: K::Handle, seed: K::Snapshot, space: TransformSpace) -> bool {
        if self.index.contains_key(&handle) {
            return false;
        }
        let index = self.insert(handle, seed, space);
        self.records[index].is_new = false;
        true
    }

    /// Writes into the current write slot, tracking `handle` first if needed.
    ///
    /// A lazily created record is seeded from the live object. When the live
    /// object is missing, the write is applied to a default snapshot and that
    /// seeds every slot.
    pub fn update<L, F>(&mut self, handle: K::Handle, space: TransformSpace, live: &L, write: F)
    where
        L: LiveTable<K> + ?Sized,
        F: FnOnce(&mut K::Snapshot),
    {
        let existing = self.index.get(&handle).copied();
        let index = match existing {
            Some(index) => index,
            None => match live.read(handle, space) {
                Some(seed) => self.insert(handle, seed, space),
                None => {
                    let mut seed = <K::Snapshot as Default>::default();
                    write(&mut seed);
                    let index = self.insert(handle, seed, space);
                    self.mark_written(index, space);
                    return;
                }
            },
        };
        let slot = self.ring.write_index();
        write(&mut self.records[index].transforms[slot]);
        self.mark_written(index, space);
    }

    /// Stops tracking `handle`. No-op if absent.
    pub fn remove(&mut self, handle: K::Handle) -> bool {
        let Some(index) = self.index.remove(&handle) else {
            return false;
        };
        self.swap_remove_at(index);
        true
    }

    /// Ring slots of `handle`.
    #[must_use]
    pub fn find_transforms(&self, handle: K::Handle) -> Option<&[K::Snapshot]> {
        self.index.get(&handle).map(|&index| self.records[index].transforms())
    }

    /// Record of `handle`.
    #[must_use]
    pub fn record(&self, handle: K::Handle) -> Option<&TrackedRecord<K>> {
        self.index.get(&handle).map(|&index| &self.records[index])
    }

    /// True if `handle` is tracked.
    #[must_use]
    pub fn contains(&self, handle: K::Handle) -> bool {
        self.index.contains_key(&handle)
    }

    /// Number of tracked records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every tracked record, in dense order.
    pub fn records(&self) -> impl Iterator<Item = &TrackedRecord<K>> {
        self.records.iter()
    }

    /// Shared slot cursor.
    #[must_use]
    pub fn ring(&self) -> &TransformRing {
        &self.ring
    }

    /// Completes the tick. Called once per logic tick.
    ///
    /// New records are reseeded from their live object in every slot except
    /// the one just completed, which keeps a value written this tick. Every
    /// record then carries its completed value into the next write slot.
    pub fn advance<L: LiveTable<K> + ?Sized>(&mut self, live: &L) -> AdvanceReport {
        let (completed, next) = self.ring.advance();
        let evicts = K::EVICTS_WHEN_STABLE && self.stable_threshold > 0;
        let mut report = AdvanceReport::default();

        let mut i = 0;
        while i < self.records.len() {
            let threshold = self.stable_threshold;
            let record = &mut self.records[i];
            if record.is_new {
                match live.read(record.handle, record.space) {
                    Some(seed) => {
                        let keep_written = record.updated_this_tick;
                        for (slot, value) in record.transforms.iter_mut().enumerate() {
                            if !(keep_written && slot == completed) {
                                *value = seed;
                            }
                        }
                    }
                    // Nothing to seed from and nothing to write to.
                    None if !record.updated_this_tick => record.active = false,
                    None => {}
                }
                record.is_new = false;
                report.seeded += 1;
            } else if evicts {
                if record.updated_this_tick {
                    record.stable_frames = 0;
                } else {
                    record.stable_frames += 1;
                }
            }

            record.transforms[next] = record.transforms[completed];
            record.updated_this_tick = false;

            if evicts && record.stable_frames >= threshold {
                let handle = record.handle;
                tracing::trace!(kind = K::NAME, ?handle, "evicting stable record");
                self.index.remove(&handle);
                self.swap_remove_at(i);
                report.evicted += 1;
                continue;
            }
            i += 1;
        }
        report
    }

    /// Blends `previous -> current` for every active record and writes the
    /// result through `live`. Returns how many were written.
    pub fn interpolate<L: LiveTable<K> + ?Sized>(&self, alpha: f32, live: &L) -> usize {
        let previous = self.ring.previous_index();
        let current = self.ring.current_index();
        let mut written = 0;
        for record in self.records.iter().filter(|r| r.active) {
            let value = K::blend(&record.transforms[previous], &record.transforms[current], alpha);
            live.write(record.handle, &value, record.space);
            written += 1;
        }
        written
    }

    /// Replaces `out` with the blend pairs of every active record.
    pub fn collect_frame(&self, out: &mut Vec<FrameEntry<K>>) {
        let previous = self.ring.previous_index();
        let current = self.ring.current_index();
        out.clear();
        out.extend(self.records.iter().filter(|r| r.active).map(|r| FrameEntry {
            handle: r.handle,
            previous: r.transforms[previous],
            current: r.transforms[current],
            space: r.space,
        }));
    }

    /// Drops every record and rewinds the ring.
    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
        self.ring.reset();
    }

    /// Logs ring position and up to `limit` records at debug level.
    pub fn dump(&self, limit: usize) {
        tracing::debug!(
            kind = K::NAME,
            records = self.records.len(),
            write = self.ring.write_index(),
            previous = self.ring.previous_index(),
            current = self.ring.current_index(),
            "tracker state"
        );
        for record in self.records.iter().take(limit) {
            tracing::debug!(
                kind = K::NAME,
                handle = ?record.handle,
                active = record.active,
                is_new = record.is_new,
                stable = record.stable_frames,
                slots = ?record.transforms,
                "tracked record"
            );
        }
    }

    fn insert(&mut self, handle: K::Handle, seed: K::Snapshot, space: TransformSpace) -> usize {
        let index = self.records.len();
        self.records.push(TrackedRecord::new(handle, seed, self.ring.len(), space));
        self.index.insert(handle, index);
        index
    }

    /// Removes the record at `index`; the map entry must already be gone.
    fn swap_remove_at(&mut self, index: usize) {
        self.records.swap_remove(index);
        if let Some(moved) = self.records.get(index) {
            self.index.insert(moved.handle, index);
        }
    }

    fn mark_written(&mut self, index: usize, space: TransformSpace) {
        let record = &mut self.records[index];
        record.space = space;
        record.active = true;
        record.updated_this_tick = true;
        record.stable_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::kinds::{NodeId, NodeKind, PassId, PassKind, Transform};
    use glam::Vec3;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Scene {
        nodes: Mutex<HashMap<NodeId, (Transform, TransformSpace)>>,
    }

    impl Scene {
        fn with(nodes: &[(u64, Vec3)]) -> Self {
            let scene = Self::default();
            for &(id, position) in nodes {
                scene
                    .nodes
                    .lock()
                    .insert(NodeId(id), (Transform::from_position(position), TransformSpace::Local));
            }
            scene
        }

        fn position(&self, id: u64) -> Vec3 {
            self.nodes.lock()[&NodeId(id)].0.position
        }
    }

    impl LiveTable<NodeKind> for Scene {
        fn read(&self, handle: NodeId, _space: TransformSpace) -> Option<Transform> {
            self.nodes.lock().get(&handle).map(|(t, _)| *t)
        }

        fn write(&self, handle: NodeId, value: &Transform, space: TransformSpace) {
            self.nodes.lock().insert(handle, (*value, space));
        }
    }

    struct NoPasses;

    impl LiveTable<PassKind> for NoPasses {
        fn read(&self, _handle: PassId, _space: TransformSpace) -> Option<crate::tracking::ScrollSpeeds> {
            None
        }

        fn write(&self, _handle: PassId, _value: &crate::tracking::ScrollSpeeds, _space: TransformSpace) {}
    }

    fn set_position(position: Vec3) -> impl FnOnce(&mut Transform) {
        move |t| t.position = position
    }

    #[test]
    fn test_add_is_idempotent_and_seeds_every_slot() {
        let scene = Scene::with(&[(1, Vec3::new(3.0, 0.0, 0.0))]);
        let mut tracker = EntityTracker::<NodeKind>::new(4, 0);
        assert!(tracker.add_tracked(NodeId(1), TransformSpace::Local, &scene));
        assert!(!tracker.add_tracked(NodeId(1), TransformSpace::Local, &scene));
        assert_eq!(tracker.len(), 1);

        let slots = tracker.find_transforms(NodeId(1)).unwrap();
        assert!(slots.iter().all(|t| t.position == Vec3::new(3.0, 0.0, 0.0)));
        assert!(tracker.record(NodeId(1)).unwrap().is_new());
    }

    #[test]
    fn test_add_missing_object_is_refused() {
        let scene = Scene::default();
        let mut tracker = EntityTracker::<NodeKind>::new(3, 0);
        assert!(!tracker.add_tracked(NodeId(9), TransformSpace::Local, &scene));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_interpolate_before_advance_does_not_jump() {
        let start = Vec3::new(5.0, 1.0, -2.0);
        let scene = Scene::with(&[(1, start)]);
        let mut tracker = EntityTracker::<NodeKind>::new(3, 0);
        tracker.add_tracked(NodeId(1), TransformSpace::Local, &scene);

        assert_eq!(tracker.interpolate(0.37, &scene), 1);
        assert!(scene.position(1).abs_diff_eq(start, 1e-6));
    }

    #[test]
    fn test_midpoint_of_two_ticks() {
        let scene = Scene::with(&[(1, Vec3::ZERO)]);
        let mut tracker = EntityTracker::<NodeKind>::new(4, 0);
        let pos1 = Vec3::new(2.0, 0.0, 0.0);
        let pos2 = Vec3::new(4.0, 2.0, 0.0);

        tracker.update(NodeId(1), TransformSpace::Local, &scene, set_position(pos1));
        tracker.advance(&scene);
        tracker.update(NodeId(1), TransformSpace::Local, &scene, set_position(pos2));
        tracker.advance(&scene);
        tracker.interpolate(0.5, &scene);

        assert!(scene.position(1).abs_diff_eq(Vec3::new(3.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn test_carry_forward_without_second_update() {
        let scene = Scene::with(&[(1, Vec3::ZERO)]);
        let mut tracker = EntityTracker::<NodeKind>::new(3, 0);
        let pos1 = Vec3::new(2.0, 0.0, 0.0);

        tracker.update(NodeId(1), TransformSpace::Local, &scene, set_position(pos1));
        tracker.advance(&scene);
        tracker.advance(&scene);
        tracker.interpolate(0.5, &scene);

        assert!(scene.position(1).abs_diff_eq(pos1, 1e-6));
    }

    #[test]
    fn test_ring_consistency_carries_value() {
        let scene = Scene::with(&[(1, Vec3::ZERO), (2, Vec3::ONE)]);
        let mut tracker = EntityTracker::<NodeKind>::new(5, 0);
        tracker.add_tracked(NodeId(1), TransformSpace::Local, &scene);
        tracker.add_tracked(NodeId(2), TransformSpace::Local, &scene);

        for step in 0..12_u8 {
            if step % 3 == 0 {
                let x = f32::from(step);
                tracker.update(NodeId(1), TransformSpace::Local, &scene, set_position(Vec3::splat(x)));
            }
            tracker.advance(&scene);
            let ring = *tracker.ring();
            for record in tracker.records() {
                let slots = record.transforms();
                assert_eq!(slots[ring.write_index()], slots[ring.current_index()]);
            }
        }
    }

    #[test]
    fn test_written_value_survives_first_advance() {
        let scene = Scene::with(&[(1, Vec3::ZERO)]);
        let mut tracker = EntityTracker::<NodeKind>::new(3, 0);
        tracker.add_tracked(NodeId(1), TransformSpace::Local, &scene);
        tracker.update(NodeId(1), TransformSpace::Local, &scene, set_position(Vec3::X));
        tracker.advance(&scene);

        let ring = *tracker.ring();
        let slots = tracker.find_transforms(NodeId(1)).unwrap();
        assert_eq!(slots[ring.previous_index()].position, Vec3::ZERO);
        assert_eq!(slots[ring.current_index()].position, Vec3::X);
        assert!(!tracker.record(NodeId(1)).unwrap().is_new());
    }

    #[test]
    fn test_remove_single_element() {
        let scene = Scene::with(&[(1, Vec3::ZERO)]);
        let mut tracker = EntityTracker::<NodeKind>::new(3, 0);
        tracker.add_tracked(NodeId(1), TransformSpace::Local, &scene);
        assert!(tracker.remove(NodeId(1)));
        assert!(tracker.is_empty());
        assert!(tracker.find_transforms(NodeId(1)).is_none());
        assert!(!tracker.remove(NodeId(1)));

        assert!(tracker.add_tracked(NodeId(1), TransformSpace::Local, &scene));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_swap_remove_fixes_moved_index() {
        let scene = Scene::with(&[(1, Vec3::X), (2, Vec3::Y), (3, Vec3::Z)]);
        let mut tracker = EntityTracker::<NodeKind>::new(3, 0);
        for id in 1..=3 {
            tracker.add_tracked(NodeId(id), TransformSpace::Local, &scene);
        }
        tracker.remove(NodeId(1));
        assert_eq!(tracker.find_transforms(NodeId(3)).unwrap()[0].position, Vec3::Z);
        assert_eq!(tracker.find_transforms(NodeId(2)).unwrap()[0].position, Vec3::Y);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_stable_nodes_evicted_and_reseeded() {
        let scene = Scene::with(&[(1, Vec3::ZERO)]);
        let mut tracker = EntityTracker::<NodeKind>::new(3, 4);
        tracker.update(NodeId(1), TransformSpace::Local, &scene, set_position(Vec3::X));

        let mut evicted = 0;
        for _ in 0..5 {
            evicted += tracker.advance(&scene).evicted;
        }
        assert_eq!(evicted, 1);
        assert!(!tracker.contains(NodeId(1)));

        // Comes back through the seed-all-slots path.
        tracker.update(NodeId(1), TransformSpace::Local, &scene, set_position(Vec3::Y));
        assert!(tracker.record(NodeId(1)).unwrap().is_new());
        tracker.advance(&scene);
        tracker.interpolate(0.0, &scene);
        assert_eq!(scene.nodes.lock()[&NodeId(1)].0.position, Vec3::ZERO);
        tracker.interpolate(1.0, &scene);
        assert_eq!(scene.nodes.lock()[&NodeId(1)].0.position, Vec3::Y);
    }

    #[test]
    fn test_updates_reset_stable_counter() {
        let scene = Scene::with(&[(1, Vec3::ZERO)]);
        let mut tracker = EntityTracker::<NodeKind>::new(3, 2);
        tracker.add_tracked(NodeId(1), TransformSpace::Local, &scene);
        for step in 0..10_u8 {
            tracker.update(NodeId(1), TransformSpace::Local, &scene, set_position(Vec3::splat(f32::from(step))));
            tracker.advance(&scene);
        }
        assert!(tracker.contains(NodeId(1)));
        assert_eq!(tracker.record(NodeId(1)).unwrap().stable_frames(), 0);
    }

    #[test]
    fn test_world_space_flag_recorded() {
        let scene = Scene::with(&[(1, Vec3::ZERO)]);
        let mut tracker = EntityTracker::<NodeKind>::new(3, 0);
        tracker.update(NodeId(1), TransformSpace::World, &scene, set_position(Vec3::X));
        tracker.advance(&scene);
        tracker.interpolate(1.0, &scene);
        assert_eq!(scene.nodes.lock()[&NodeId(1)].1, TransformSpace::World);
    }

    #[test]
    fn test_lazy_add_without_live_object() {
        let mut tracker = EntityTracker::<PassKind>::new(3, 0);
        tracker.update(PassId(4), TransformSpace::Local, &NoPasses, |s| s.x[2] = 1.5);
        let slots = tracker.find_transforms(PassId(4)).unwrap();
        assert!(slots.iter().all(|s| (s.x[2] - 1.5).abs() < f32::EPSILON));

        tracker.advance(&NoPasses);
        let record = tracker.record(PassId(4)).unwrap();
        assert!(record.is_active());
        assert!(!record.is_new());
    }

    #[test]
    fn test_collect_frame_skips_inactive() {
        let mut tracker = EntityTracker::<PassKind>::new(3, 0);
        tracker.update(PassId(1), TransformSpace::Local, &NoPasses, |s| s.y[0] = 1.0);
        tracker.advance(&NoPasses);

        let mut frame = Vec::new();
        tracker.collect_frame(&mut frame);
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].handle, PassId(1));
        assert!((frame[0].current.y[0] - 1.0).abs() < f32::EPSILON);

        tracker.clear();
        tracker.collect_frame(&mut frame);
        assert!(frame.is_empty());
        assert_eq!(tracker.ring().advances(), 0);
    }

    #[test]
    fn test_seeded_record_blends_from_seed() {
        let mut tracker = EntityTracker::<PassKind>::new(3, 0);
        let mut seed = crate::tracking::ScrollSpeeds::default();
        seed.x[0] = 2.0;
        assert!(tracker.add_seeded(PassId(9), seed, TransformSpace::Local));
        assert!(!tracker.add_seeded(PassId(9), seed, TransformSpace::Local));

        tracker.update(PassId(9), TransformSpace::Local, &NoPasses, |s| s.x[0] = 4.0);
        tracker.advance(&NoPasses);

        let mut frame = Vec::new();
        tracker.collect_frame(&mut frame);
        assert!((frame[0].previous.x[0] - 2.0).abs() < f32::EPSILON);
        assert!((frame[0].current.x[0] - 4.0).abs() < f32::EPSILON);
    }
}
