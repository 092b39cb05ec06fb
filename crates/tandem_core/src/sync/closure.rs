//! # Closure Registry
//!
//! Named per-frame callbacks that run on the render thread with the current
//! interpolation weight.
//!
//! Producers only send commands (insert/replace, remove, run-once) through a
//! lock-free channel. The render thread owns the persistent map and applies
//! a bounded number of commands per frame before running every closure.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::config::FrameConfig;
use crate::error::{panic_message, CommandFault, CommandName, FrameError, FrameResult};

const QUEUE_NAME: &str = "closure";

/// A per-frame callback. Receives the interpolation weight in `[0, 1]`.
pub type FrameClosure = Box<dyn FnMut(f32) -> Result<(), CommandFault> + Send + 'static>;

enum ClosureCommand {
    Upsert { name: CommandName, closure: FrameClosure },
    FireOnce { name: CommandName, closure: FrameClosure },
    Remove { name: CommandName },
    Clear,
}

impl ClosureCommand {
    fn name(&self) -> &str {
        match self {
            Self::Upsert { name, .. } | Self::FireOnce { name, .. } | Self::Remove { name } => &**name,
            Self::Clear => "<clear>",
        }
    }
}

/// Cloneable producer half. Safe to use from any thread.
#[derive(Clone)]
pub struct ClosureProducer {
    sender: Sender<ClosureCommand>,
}

impl ClosureProducer {
    /// Registers or replaces a closure.
    ///
    /// With `fire_and_forget` the closure runs once on the next drain and is
    /// never stored.
    ///
    /// # Errors
    ///
    /// [`FrameError::QueueFull`] or [`FrameError::Disconnected`].
    pub fn upsert<F>(&self, name: impl Into<CommandName>, closure: F, fire_and_forget: bool) -> FrameResult<()>
    where
        F: FnMut(f32) -> Result<(), CommandFault> + Send + 'static,
    {
        let name = name.into();
        let closure: FrameClosure = Box::new(closure);
        let command = if fire_and_forget {
            ClosureCommand::FireOnce { name, closure }
        } else {
            ClosureCommand::Upsert { name, closure }
        };
        self.send(command)
    }

    /// Removes a persistent closure by name. Unknown names are ignored.
    ///
    /// # Errors
    ///
    /// [`FrameError::QueueFull`] or [`FrameError::Disconnected`].
    pub fn remove(&self, name: impl Into<CommandName>) -> FrameResult<()> {
        self.send(ClosureCommand::Remove { name: name.into() })
    }

    /// Removes every persistent closure, in order with other commands.
    ///
    /// # Errors
    ///
    /// [`FrameError::QueueFull`] or [`FrameError::Disconnected`].
    pub fn clear(&self) -> FrameResult<()> {
        self.send(ClosureCommand::Clear)
    }

    fn send(&self, command: ClosureCommand) -> FrameResult<()> {
        match self.sender.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                tracing::warn!(closure = command.name(), "closure queue full, dropping");
                Err(FrameError::QueueFull { queue: QUEUE_NAME, name: command.name().to_owned() })
            }
            Err(TrySendError::Disconnected(_)) => Err(FrameError::Disconnected { queue: QUEUE_NAME }),
        }
    }
}

impl std::fmt::Debug for ClosureProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureProducer").field("queued", &self.sender.len()).finish()
    }
}

/// What one [`ClosureRegistry::drain_and_execute`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClosureDrainReport {
    /// Registration commands applied.
    pub commands_applied: usize,
    /// Closures invoked, persistent and fire-once.
    pub closures_run: usize,
    /// Closures dropped because they failed.
    pub closures_removed: usize,
}

/// Render-owned closure registry.
pub struct ClosureRegistry {
    producer: ClosureProducer,
    receiver: Receiver<ClosureCommand>,
    persistent: HashMap<String, FrameClosure>,
    max_commands_per_frame: usize,
    failed: Vec<String>,
}

impl ClosureRegistry {
    /// Creates a registry sized from `config`.
    #[must_use]
    pub fn new(config: &FrameConfig) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(config.closure_queue_capacity);
        Self {
            producer: ClosureProducer { sender },
            receiver,
            persistent: HashMap::new(),
            max_commands_per_frame: config.max_closure_commands_per_frame.max(1),
            failed: Vec::new(),
        }
    }

    /// A producer for other threads.
    #[must_use]
    pub fn producer(&self) -> ClosureProducer {
        self.producer.clone()
    }

    /// See [`ClosureProducer::upsert`].
    ///
    /// # Errors
    ///
    /// [`FrameError::QueueFull`] if the command queue is at capacity.
    pub fn upsert<F>(&self, name: impl Into<CommandName>, closure: F, fire_and_forget: bool) -> FrameResult<()>
    where
        F: FnMut(f32) -> Result<(), CommandFault> + Send + 'static,
    {
        self.producer.upsert(name, closure, fire_and_forget)
    }

    /// See [`ClosureProducer::remove`].
    ///
    /// # Errors
    ///
    /// [`FrameError::QueueFull`] if the command queue is at capacity.
    pub fn remove(&self, name: impl Into<CommandName>) -> FrameResult<()> {
        self.producer.remove(name)
    }

    /// Applies up to the per-frame command budget, then runs every persistent
    /// closure with `alpha`. Failing or panicking closures are removed.
    pub fn drain_and_execute(&mut self, alpha: f32) -> ClosureDrainReport {
        let mut report = ClosureDrainReport::default();

        while report.commands_applied < self.max_commands_per_frame {
            let Ok(command) = self.receiver.try_recv() else {
                break;
            };
            report.commands_applied += 1;
            match command {
                ClosureCommand::Upsert { name, closure } => {
                    tracing::trace!(closure = %name, "closure registered");
                    self.persistent.insert(name.into_owned(), closure);
                }
                ClosureCommand::Remove { name } => {
                    tracing::trace!(closure = %name, "closure removed");
                    self.persistent.remove(&*name);
                }
                ClosureCommand::Clear => self.persistent.clear(),
                ClosureCommand::FireOnce { name, mut closure } => {
                    report.closures_run += 1;
                    // Runs once either way; a failure is only logged.
                    let _ = run_closure(&name, &mut closure, alpha);
                }
            }
        }

        let backlog = self.receiver.len();
        if backlog > 0 {
            tracing::debug!(backlog, "closure commands deferred to next frame");
        }

        for (name, closure) in &mut self.persistent {
            report.closures_run += 1;
            if !run_closure(name, closure, alpha) {
                self.failed.push(name.clone());
            }
        }
        for name in self.failed.drain(..) {
            tracing::warn!(closure = %name, "removing failing closure");
            self.persistent.remove(&name);
            report.closures_removed += 1;
        }
        report
    }

    /// Drops every persistent closure and every queued command immediately.
    pub fn clear_all(&mut self) {
        while self.receiver.try_recv().is_ok() {}
        self.persistent.clear();
    }

    /// True if a persistent closure with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.persistent.contains_key(name)
    }

    /// Number of persistent closures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.persistent.len()
    }

    /// True if no persistent closure is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.persistent.is_empty()
    }

    /// Commands waiting to be applied.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.receiver.len()
    }
}

impl std::fmt::Debug for ClosureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureRegistry")
            .field("persistent", &self.persistent.len())
            .field("pending", &self.receiver.len())
            .finish_non_exhaustive()
    }
}

/// Runs one closure. Returns false if it failed or panicked.
fn run_closure(name: &str, closure: &mut FrameClosure, alpha: f32) -> bool {
    match catch_unwind(AssertUnwindSafe(|| closure(alpha))) {
        Ok(Ok(())) => true,
        Ok(Err(fault)) => {
            tracing::error!(closure = name, error = %fault, "closure failed");
            false
        }
        Err(payload) => {
            tracing::error!(closure = name, panic = %panic_message(payload.as_ref()), "closure panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut(f32) -> Result<(), CommandFault> + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move |_: f32| {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_persistent_runs_every_frame() {
        let mut registry = ClosureRegistry::new(&FrameConfig::default());
        let (count, closure) = counter();
        registry.upsert("spin", closure, false).unwrap();

        registry.drain_and_execute(0.0);
        registry.drain_and_execute(0.5);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(registry.contains("spin"));
    }

    #[test]
    fn test_remove_before_drain() {
        let mut registry = ClosureRegistry::new(&FrameConfig::default());
        let (count, closure) = counter();
        registry.upsert("X", closure, false).unwrap();
        registry.remove("X").unwrap();

        registry.drain_and_execute(0.5);
        assert!(!registry.contains("X"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_then_reregister_keeps_closure() {
        let mut registry = ClosureRegistry::new(&FrameConfig::default());
        let (_, first) = counter();
        let (count, second) = counter();
        registry.upsert("X", first, false).unwrap();
        registry.remove("X").unwrap();
        registry.upsert("X", second, false).unwrap();

        registry.drain_and_execute(1.0);
        assert!(registry.contains("X"));
        assert_eq!(registry.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fire_and_forget_runs_once() {
        let mut registry = ClosureRegistry::new(&FrameConfig::default());
        let (count, closure) = counter();
        registry.upsert("once", closure, true).unwrap();

        registry.drain_and_execute(0.2);
        registry.drain_and_execute(0.4);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failing_closure_removed() {
        let mut registry = ClosureRegistry::new(&FrameConfig::default());
        registry.upsert("bad", |_| Err("broken".into()), false).unwrap();
        registry.upsert("worse", |_| panic!("really broken"), false).unwrap();

        let report = registry.drain_and_execute(0.0);
        assert_eq!(report.closures_removed, 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_command_budget_per_frame() {
        let config = FrameConfig { max_closure_commands_per_frame: 3, ..FrameConfig::default() };
        let mut registry = ClosureRegistry::new(&config);
        for i in 0..5 {
            registry.upsert(format!("c{i}"), |_| Ok(()), false).unwrap();
        }
        let report = registry.drain_and_execute(0.0);
        assert_eq!(report.commands_applied, 3);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.pending_commands(), 2);

        registry.drain_and_execute(0.0);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_alpha_passed_through() {
        let mut registry = ClosureRegistry::new(&FrameConfig::default());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry
            .producer()
            .upsert(
                "watch",
                move |alpha| {
                    sink.lock().push(alpha);
                    Ok(())
                },
                false,
            )
            .unwrap();
        registry.drain_and_execute(0.25);
        registry.drain_and_execute(0.75);
        assert_eq!(*seen.lock(), vec![0.25, 0.75]);
    }

    #[test]
    fn test_clear_orders_with_other_commands() {
        let mut registry = ClosureRegistry::new(&FrameConfig::default());
        let producer = registry.producer();
        producer.upsert("a", |_| Ok(()), false).unwrap();
        producer.clear().unwrap();
        producer.upsert("b", |_| Ok(()), false).unwrap();
        registry.drain_and_execute(0.0);
        assert!(!registry.contains("a"));
        assert!(registry.contains("b"));

        registry.clear_all();
        assert!(registry.is_empty());
    }
}
