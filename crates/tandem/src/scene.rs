//! # In-Memory Scene
//!
//! A [`SceneBackend`](tandem_core::SceneBackend) that keeps every object in
//! a hash map. Stands in for a real scene graph in the demo and in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tandem_core::tracking::{
    BoneKind, CameraKind, MaterialKind, NodeKind, PassKind, TrackedKind, TransformSpace,
};
use tandem_core::LiveTable;

#[derive(Debug, Clone, Copy)]
struct Stored<S> {
    value: S,
    space: TransformSpace,
}

/// Live objects of one kind.
pub struct MemoryTable<K: TrackedKind> {
    entries: RwLock<HashMap<K::Handle, Stored<K::Snapshot>>>,
    writes: AtomicU64,
}

impl<K: TrackedKind> MemoryTable<K> {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()), writes: AtomicU64::new(0) }
    }

    /// Creates or replaces an object.
    pub fn insert(&self, handle: K::Handle, value: K::Snapshot) {
        self.entries.write().insert(handle, Stored { value, space: TransformSpace::Local });
    }

    /// Deletes an object. Later writes to it are ignored.
    pub fn remove(&self, handle: K::Handle) -> Option<K::Snapshot> {
        self.entries.write().remove(&handle).map(|stored| stored.value)
    }

    /// Last value of `handle`.
    #[must_use]
    pub fn get(&self, handle: K::Handle) -> Option<K::Snapshot> {
        self.entries.read().get(&handle).map(|stored| stored.value)
    }

    /// Space of the last write to `handle`.
    #[must_use]
    pub fn space_of(&self, handle: K::Handle) -> Option<TransformSpace> {
        self.entries.read().get(&handle).map(|stored| stored.space)
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if the table holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Interpolated writes received so far.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl<K: TrackedKind> Default for MemoryTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TrackedKind> std::fmt::Debug for MemoryTable<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTable")
            .field("kind", &K::NAME)
            .field("objects", &self.len())
            .field("writes", &self.writes())
            .finish()
    }
}

impl<K: TrackedKind> LiveTable<K> for MemoryTable<K> {
    fn read(&self, handle: K::Handle, _space: TransformSpace) -> Option<K::Snapshot> {
        self.get(handle)
    }

    fn write(&self, handle: K::Handle, value: &K::Snapshot, space: TransformSpace) {
        match self.entries.write().get_mut(&handle) {
            Some(stored) => {
                stored.value = *value;
                stored.space = space;
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
            None => tracing::trace!(kind = K::NAME, ?handle, "write to missing object ignored"),
        }
    }
}

/// One [`MemoryTable`] per tracked kind.
#[derive(Debug, Default)]
pub struct MemoryScene {
    /// Scene nodes.
    pub nodes: MemoryTable<NodeKind>,
    /// Cameras.
    pub cameras: MemoryTable<CameraKind>,
    /// Skeletal bones.
    pub bones: MemoryTable<BoneKind>,
    /// Shader passes.
    pub passes: MemoryTable<PassKind>,
    /// Material blocks.
    pub materials: MemoryTable<MaterialKind>,
}

impl MemoryScene {
    /// Empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

macro_rules! delegate_live_table {
    ($($kind:ty => $field:ident),* $(,)?) => {
        $(
            impl LiveTable<$kind> for MemoryScene {
                #[inline]
                fn read(
                    &self,
                    handle: <$kind as TrackedKind>::Handle,
                    space: TransformSpace,
                ) -> Option<<$kind as TrackedKind>::Snapshot> {
                    self.$field.read(handle, space)
                }

                #[inline]
                fn write(
                    &self,
                    handle: <$kind as TrackedKind>::Handle,
                    value: &<$kind as TrackedKind>::Snapshot,
                    space: TransformSpace,
                ) {
                    self.$field.write(handle, value, space);
                }
            }
        )*
    };
}

delegate_live_table!(
    NodeKind => nodes,
    CameraKind => cameras,
    BoneKind => bones,
    PassKind => passes,
    MaterialKind => materials,
);
