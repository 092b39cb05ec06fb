//! Slot positions shared by every record of one entity kind.

/// Ring cursor for N transform slots.
///
/// The logic thread writes only [`TransformRing::write_index`]. The two slots
/// completed most recently are `previous` and `current`; with N >= 3 neither
/// can be the write slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformRing {
    len: usize,
    write: usize,
    advances: u64,
}

impl TransformRing {
    /// Creates a ring of `len` slots, clamped to at least 3.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { len: len.max(3), write: 0, advances: 0 }
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always false; a ring has at least 3 slots.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Slot the logic thread writes this tick.
    #[inline]
    #[must_use]
    pub const fn write_index(&self) -> usize {
        self.write
    }

    /// Most recently completed slot.
    #[inline]
    #[must_use]
    pub const fn current_index(&self) -> usize {
        (self.write + self.len - 1) % self.len
    }

    /// Slot completed before `current`.
    #[inline]
    #[must_use]
    pub const fn previous_index(&self) -> usize {
        (self.write + self.len - 2) % self.len
    }

    /// Completed ticks since creation or the last reset.
    #[inline]
    #[must_use]
    pub const fn advances(&self) -> u64 {
        self.advances
    }

    /// Completes the write slot. Returns `(completed, next_write)`.
    #[inline]
    pub fn advance(&mut self) -> (usize, usize) {
        let completed = self.write;
        self.write = (self.write + 1) % self.len;
        self.advances += 1;
        (completed, self.write)
    }

    /// Back to slot 0.
    pub fn reset(&mut self) {
        self.write = 0;
        self.advances = 0;
    }
}
