//! # Deferred Destruction
//!
//! A ring of K slots. A destroy request lands in the slot furthest in the
//! future, so the resource survives K-1 more advances and no frame still in
//! flight on the render thread can touch freed memory.
//!
//! ```text
//!   cursor ──► [ slot 0 ] executed this advance
//!              [ slot 1 ]
//!              [ slot 2 ]
//!              [ slot 3 ] ◄── schedule() lands here (cursor + K - 1)
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;

use crate::config::FrameConfig;
use crate::error::{panic_message, CommandName};

/// Tears down one resource. Runs exactly once.
pub type DestroyCommand = Box<dyn FnOnce() + Send + 'static>;

struct DestroyEntry {
    name: CommandName,
    command: DestroyCommand,
}

/// Cloneable handle for scheduling destroys from any thread.
#[derive(Clone)]
pub struct DestroySender {
    sender: Sender<DestroyEntry>,
    /// True while the scheduler still accepts entries. Sends happen under
    /// the read lock, so once the scheduler takes the write lock no send is
    /// in flight.
    open: Arc<RwLock<bool>>,
}

impl DestroySender {
    /// Schedules a destroy. It is placed in the ring on the next advance.
    ///
    /// The inbox is unbounded so a destroy is never dropped. Once the
    /// scheduler is gone the command runs on the calling thread instead.
    pub fn schedule<F>(&self, name: impl Into<CommandName>, command: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let entry = DestroyEntry { name: name.into(), command: Box::new(command) };
        let rejected = {
            let open = self.open.read();
            if *open {
                self.sender.send(entry).err().map(crossbeam_channel::SendError::into_inner)
            } else {
                Some(entry)
            }
        };
        if let Some(entry) = rejected {
            tracing::warn!(destroy = %entry.name, "destruction ring gone, destroying inline");
            run_destroy(entry);
        }
    }

    /// Requests waiting in the inbox.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}

impl std::fmt::Debug for DestroySender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestroySender").field("pending", &self.sender.len()).finish()
    }
}

/// Render-owned ring of deferred destroys.
pub struct DestructionScheduler {
    slots: Vec<Vec<DestroyEntry>>,
    cursor: usize,
    inbox: Receiver<DestroyEntry>,
    sender: DestroySender,
    advances: u64,
    executed: u64,
}

impl DestructionScheduler {
    /// Creates a ring with `config.num_destroy_slots` slots.
    #[must_use]
    pub fn new(config: &FrameConfig) -> Self {
        let slot_count = config.num_destroy_slots.max(2);
        let (sender, inbox) = crossbeam_channel::unbounded();
        Self {
            slots: (0..slot_count).map(|_| Vec::new()).collect(),
            cursor: 0,
            inbox,
            sender: DestroySender { sender, open: Arc::new(RwLock::new(true)) },
            advances: 0,
            executed: 0,
        }
    }

    /// Handle for other threads.
    #[must_use]
    pub fn sender(&self) -> DestroySender {
        self.sender.clone()
    }

    /// Schedules a destroy from the owning thread.
    pub fn schedule<F>(&mut self, name: impl Into<CommandName>, command: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let entry = DestroyEntry { name: name.into(), command: Box::new(command) };
        let slot = self.future_slot();
        tracing::trace!(destroy = %entry.name, slot, "destroy scheduled");
        self.slots[slot].push(entry);
    }

    /// Moves inbox requests into the ring, advances the cursor one slot and
    /// executes everything in the slot it lands on. Returns how many ran.
    pub fn advance_and_destroy_old(&mut self) -> usize {
        self.absorb_inbox();
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.advances += 1;
        let mut due = std::mem::take(&mut self.slots[self.cursor]);
        let count = due.len();
        for entry in due.drain(..) {
            run_destroy(entry);
        }
        // Hand the allocation back to the slot.
        self.slots[self.cursor] = due;
        self.executed += count as u64;
        count
    }

    /// Executes every pending destroy, oldest slot first. Used at shutdown.
    pub fn flush(&mut self) -> usize {
        self.absorb_inbox();
        let slot_count = self.slots.len();
        let mut count = 0;
        for offset in 1..=slot_count {
            let slot = (self.cursor + offset) % slot_count;
            for entry in std::mem::take(&mut self.slots[slot]) {
                run_destroy(entry);
                count += 1;
            }
        }
        if count > 0 {
            tracing::info!(count, "flushed deferred destroys");
        }
        self.executed += count as u64;
        count
    }

    /// Destroys that have not run yet, including the inbox.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.slots.iter().map(Vec::len).sum::<usize>() + self.inbox.len()
    }

    /// True if any destroy has not run yet.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending() > 0
    }

    /// Number of ring advances so far.
    #[must_use]
    pub fn advances(&self) -> u64 {
        self.advances
    }

    /// Number of destroys executed so far.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Number of slots in the ring.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn future_slot(&self) -> usize {
        (self.cursor + self.slots.len() - 1) % self.slots.len()
    }

    fn absorb_inbox(&mut self) {
        let slot = self.future_slot();
        while let Ok(entry) = self.inbox.try_recv() {
            self.slots[slot].push(entry);
        }
    }
}

impl Drop for DestructionScheduler {
    fn drop(&mut self) {
        // Stop accepting first so nothing lands after the final flush.
        *self.sender.open.write() = false;
        if self.has_pending() {
            self.flush();
        }
    }
}

impl std::fmt::Debug for DestructionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestructionScheduler")
            .field("slots", &self.slots.iter().map(Vec::len).collect::<Vec<_>>())
            .field("cursor", &self.cursor)
            .field("advances", &self.advances)
            .finish_non_exhaustive()
    }
}

fn run_destroy(entry: DestroyEntry) {
    let DestroyEntry { name, command } = entry;
    tracing::trace!(destroy = %name, "destroying");
    if let Err(payload) = catch_unwind(AssertUnwindSafe(command)) {
        tracing::error!(destroy = %name, panic = %panic_message(payload.as_ref()), "destroy panicked");
    }
}
