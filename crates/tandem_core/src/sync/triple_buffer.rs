//! # Triple Buffer
//!
//! Wait-free single-producer, single-consumer handoff of the latest value.
//!
//! ## Safety Note
//!
//! This module requires unsafe code for lock-free slot ownership.
//! All unsafe blocks are documented with the invariant they rely on.

#![allow(unsafe_code)]
//!
//! ## Architecture
//!
//! ```text
//!     Publisher            shared            Subscriber
//!   ┌──────────┐      ┌──────────────┐      ┌──────────┐
//!   │ write: 0 │ ───► │ back: 1 |new │ ───► │ read: 2  │
//!   └──────────┘ swap └──────────────┘ swap └──────────┘
//! ```
//!
//! Each of the three slots is owned by exactly one party at any time. The
//! only exchange is an atomic swap of slot indices, so neither side ever
//! blocks or sees a half-written value.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Set in `back` when the back slot holds a value the reader has not taken.
const FRESH: u8 = 0b100;
const INDEX_MASK: u8 = 0b011;

struct Shared<T> {
    slots: [UnsafeCell<T>; 3],
    back: AtomicU8,
}

// SAFETY: a slot is only accessed by the party whose index currently names
// it. Indices change hands through `back` with AcqRel swaps, which order all
// writes to a slot before the other party's first read of it.
unsafe impl<T: Send> Sync for Shared<T> {}
unsafe impl<T: Send> Send for Shared<T> {}

/// Creates a linked publisher/subscriber pair, all slots cloned from `initial`.
#[must_use]
pub fn triple_buffer<T: Clone + Send>(initial: &T) -> (Publisher<T>, Subscriber<T>) {
    let shared = Arc::new(Shared {
        slots: [
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial.clone()),
        ],
        back: AtomicU8::new(1),
    });
    (
        Publisher { shared: Arc::clone(&shared), write: 0 },
        Subscriber { shared, read: 2 },
    )
}

/// Writing half. Owned by exactly one thread at a time.
pub struct Publisher<T> {
    shared: Arc<Shared<T>>,
    write: u8,
}

impl<T> Publisher<T> {
    /// The slot being prepared. Contents are whatever was published two or
    /// three rounds ago; overwrite every field you publish.
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut T {
        // SAFETY: `write` is owned by this publisher until the next swap, and
        // `&mut self` rules out a second live borrow.
        unsafe { &mut *self.shared.slots[usize::from(self.write)].get() }
    }

    /// Hands the prepared slot to the subscriber.
    #[inline]
    pub fn publish(&mut self) {
        let previous = self.shared.back.swap(self.write | FRESH, Ordering::AcqRel);
        self.write = previous & INDEX_MASK;
    }
}

impl<T> std::fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher").field("write", &self.write).finish_non_exhaustive()
    }
}

/// Reading half. Owned by exactly one thread at a time.
pub struct Subscriber<T> {
    shared: Arc<Shared<T>>,
    read: u8,
}

impl<T> Subscriber<T> {
    /// True if a value newer than the one last read is waiting.
    #[inline]
    #[must_use]
    pub fn has_update(&self) -> bool {
        self.shared.back.load(Ordering::Relaxed) & FRESH != 0
    }

    /// Takes the newest published value if there is one, then returns the
    /// current read slot.
    #[inline]
    pub fn latest(&mut self) -> &T {
        if self.has_update() {
            let previous = self.shared.back.swap(self.read, Ordering::AcqRel);
            self.read = previous & INDEX_MASK;
        }
        // SAFETY: `read` is owned by this subscriber until the next swap,
        // which needs `&mut self`.
        unsafe { &*self.shared.slots[usize::from(self.read)].get() }
    }
}

impl<T> std::fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("read", &self.read).finish_non_exhaustive()
    }
}
