//! # Render Command Queue
//!
//! Multi-producer, single-consumer queue of callables that must run on the
//! render thread.
//!
//! ```text
//!   logic thread ──┐
//!   editor thread ─┼──► [ bounded lock-free channel ] ──► render thread
//!   any thread ────┘            ▲                          process_all_commands()
//!                               │
//!             render thread ────┘ never enqueues: runs the command inline
//! ```
//!
//! ## Reentrancy
//!
//! A call made on the render thread, or from inside a running command, never
//! enters the queue. It executes on the spot. Queueing there and then waiting
//! would block the only thread able to drain the queue.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{fence, AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::config::{FrameConfig, TimeoutPolicy};
use crate::error::{panic_message, CommandFault, CommandName, FrameError, FrameResult};
use crate::sync::completion::{completion, CompletionFuture};
use crate::sync::thread_role::{command_depth, CommandDepthGuard, ThreadRole, WaitDepthGuard};

/// Name used in errors for this queue.
const QUEUE_NAME: &str = "render command";

/// Stored in the timeout cell to mean "wait forever".
const NO_TIMEOUT: u64 = u64::MAX;

/// How often a blocked waiter re-checks whether the queue was closed.
const CLOSED_POLL: Duration = Duration::from_millis(50);

/// Type-erased queued job. Result routing is baked in at enqueue time.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// How an enqueue was serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Ran synchronously on the calling thread.
    Immediate,
    /// Pushed onto the queue for the render thread.
    Queued,
}

struct CommandEntry {
    name: CommandName,
    job: Job,
}

/// Runs `command` as a render command on the calling thread.
///
/// Bumps the command depth for the duration and converts both returned
/// faults and panics into [`FrameError`].
///
/// # Errors
///
/// [`FrameError::CommandFailed`] if the command returned an error,
/// [`FrameError::CommandPanicked`] if it panicked.
pub fn execute_guarded<T, F>(name: &str, command: F) -> FrameResult<T>
where
    F: FnOnce() -> Result<T, CommandFault>,
{
    let _depth = CommandDepthGuard::enter();
    match catch_unwind(AssertUnwindSafe(command)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(fault)) => {
            tracing::error!(command = name, error = %fault, "render command failed");
            Err(FrameError::CommandFailed { name: name.to_owned(), source: fault })
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(command = name, panic = %message, "render command panicked");
            Err(FrameError::CommandPanicked { name: name.to_owned(), message })
        }
    }
}

/// The render command queue.
///
/// Shared by reference (usually behind an [`Arc`]) between every producer and
/// the render thread.
pub struct CommandQueue {
    sender: Sender<CommandEntry>,
    receiver: Receiver<CommandEntry>,
    role: Arc<ThreadRole>,
    /// Set by a timed-out waiter. The next drain empties the queue fully.
    drain_requested: AtomicBool,
    timeout_ms: AtomicU64,
    timeout_policy: TimeoutPolicy,
    executed: AtomicU64,
    /// Set once the render thread has stopped draining.
    closed: AtomicBool,
}

impl CommandQueue {
    /// Creates a queue sized and timed from `config`.
    #[must_use]
    pub fn new(config: &FrameConfig, role: Arc<ThreadRole>) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(config.command_queue_capacity);
        Self {
            sender,
            receiver,
            role,
            drain_requested: AtomicBool::new(false),
            timeout_ms: AtomicU64::new(config.command_timeout_ms.unwrap_or(NO_TIMEOUT)),
            timeout_policy: config.timeout_policy,
            executed: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// The thread-role registry this queue consults.
    #[must_use]
    pub fn role(&self) -> &Arc<ThreadRole> {
        &self.role
    }

    /// Marks the calling thread as the render thread.
    pub fn mark_current_thread_as_render_thread(&self) {
        self.role.mark_current_thread_as_render_thread();
    }

    /// Submits a command without waiting for it.
    ///
    /// On the render thread the command runs immediately. A failure there is
    /// logged and returned; a failure of a queued command is only logged.
    ///
    /// # Errors
    ///
    /// [`FrameError::QueueFull`] if the queue is at capacity, or the
    /// command's own error when it ran immediately.
    pub fn enqueue<F>(&self, name: impl Into<CommandName>, command: F) -> FrameResult<Dispatch>
    where
        F: FnOnce() -> Result<(), CommandFault> + Send + 'static,
    {
        let name = name.into();
        if self.role.is_render_thread() || self.is_closed() {
            execute_guarded(&name, command)?;
            return Ok(Dispatch::Immediate);
        }

        let job_name = name.clone();
        let job: Job = Box::new(move || {
            // Errors and panics are already logged by execute_guarded.
            let _ = execute_guarded(&job_name, command);
        });
        self.push(CommandEntry { name, job })?;
        Ok(Dispatch::Queued)
    }

    /// Submits a command and blocks until it has run on the render thread.
    ///
    /// Executes immediately on the render thread or inside another command.
    ///
    /// # Errors
    ///
    /// The command's error or panic, [`FrameError::QueueFull`], or
    /// [`FrameError::Timeout`] under [`TimeoutPolicy::Fail`].
    pub fn enqueue_and_wait<F>(&self, name: impl Into<CommandName>, command: F) -> FrameResult<()>
    where
        F: FnOnce() -> Result<(), CommandFault> + Send + 'static,
    {
        let name = name.into();
        if self.must_execute_inline() {
            return execute_guarded(&name, command);
        }
        let future = self.push_waiting(name, command)?;
        match self.wait_with_recovery(future) {
            WaitOutcome::Done(result) => result,
            WaitOutcome::TimedOut { name, waited_ms } => match self.timeout_policy {
                TimeoutPolicy::Fail => Err(FrameError::Timeout { name, waited_ms }),
                TimeoutPolicy::Recover => {
                    tracing::error!(
                        command = %name,
                        waited_ms,
                        "continuing without completion of blocking render command"
                    );
                    Ok(())
                }
            },
        }
    }

    /// Like [`CommandQueue::enqueue_and_wait`] but hands back the command's value.
    ///
    /// A timeout is always an error here: there is no value to return.
    ///
    /// # Errors
    ///
    /// Same as [`CommandQueue::enqueue_and_wait`], plus [`FrameError::Timeout`]
    /// regardless of policy.
    pub fn enqueue_and_wait_with_result<T, F>(
        &self,
        name: impl Into<CommandName>,
        command: F,
    ) -> FrameResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, CommandFault> + Send + 'static,
    {
        let name = name.into();
        if self.must_execute_inline() {
            return execute_guarded(&name, command);
        }
        let future = self.push_waiting(name, command)?;
        match self.wait_with_recovery(future) {
            WaitOutcome::Done(result) => result,
            WaitOutcome::TimedOut { name, waited_ms } => Err(FrameError::Timeout { name, waited_ms }),
        }
    }

    /// Blocks until everything queued before this call has run.
    ///
    /// On the render thread this drains the queue directly instead.
    ///
    /// # Errors
    ///
    /// Same as [`CommandQueue::enqueue_and_wait`].
    pub fn wait_for_render_completion(&self) -> FrameResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        if self.role.is_render_thread() {
            if command_depth() == 0 {
                self.drain(true);
            }
            return Ok(());
        }
        self.enqueue_and_wait("sync_marker", || Ok(()))
    }

    /// Runs every command queued at the moment of the call.
    ///
    /// After a timed-out waiter requested it, drains until empty instead.
    /// Returns the number of commands executed.
    ///
    /// # Errors
    ///
    /// [`FrameError::NotRenderThread`] when called from another thread.
    pub fn process_all_commands(&self) -> FrameResult<usize> {
        if !self.role.is_render_thread() {
            tracing::warn!("process_all_commands called off the render thread");
            return Err(FrameError::NotRenderThread { operation: "process_all_commands" });
        }
        let forced = self.drain_requested.swap(false, Ordering::AcqRel);
        if forced {
            tracing::warn!(pending = self.receiver.len(), "forced drain of render command queue");
        }
        Ok(self.drain(forced))
    }

    /// Runs commands until the queue is empty. Used at shutdown.
    ///
    /// # Errors
    ///
    /// [`FrameError::NotRenderThread`] when called from another thread.
    pub fn drain_until_empty(&self) -> FrameResult<usize> {
        if !self.role.is_render_thread() {
            return Err(FrameError::NotRenderThread { operation: "drain_until_empty" });
        }
        self.drain_requested.store(false, Ordering::Release);
        Ok(self.drain(true))
    }

    /// True if any command is waiting for the render thread.
    #[inline]
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.receiver.is_empty()
    }

    /// Number of queued commands.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Total commands executed by the drain loop.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// True if a waiter has requested a forced drain.
    #[must_use]
    pub fn drain_requested(&self) -> bool {
        self.drain_requested.load(Ordering::Acquire)
    }

    /// Stops routing commands to the render thread. Every later call runs
    /// on its caller, and anything still queued is drained by whichever
    /// waiter notices first.
    pub fn close(&self) {
        let already = self.closed.swap(true, Ordering::SeqCst);
        // Pairs with the fence in `push`: a producer either sees the close or
        // its entry is visible to the drain that follows.
        fence(Ordering::SeqCst);
        if !already {
            tracing::info!(pending = self.receiver.len(), "render command queue closed");
        }
    }

    /// True once [`CommandQueue::close`] has been called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Changes the blocking-wait timeout. `None` waits forever.
    pub fn set_command_timeout(&self, timeout: Option<Duration>) {
        let ms = timeout.map_or(NO_TIMEOUT, |t| u64::try_from(t.as_millis()).unwrap_or(NO_TIMEOUT - 1));
        self.timeout_ms.store(ms, Ordering::Relaxed);
    }

    /// Current blocking-wait timeout.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        match self.timeout_ms.load(Ordering::Relaxed) {
            NO_TIMEOUT => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    #[inline]
    fn must_execute_inline(&self) -> bool {
        command_depth() > 0 || self.role.is_render_thread() || self.is_closed()
    }

    /// Queues `entry`. If the queue was closed meanwhile, the final drain may
    /// already be over, so the caller drains what is left itself.
    fn push(&self, entry: CommandEntry) -> FrameResult<()> {
        match self.sender.try_send(entry) {
            Ok(()) => {
                fence(Ordering::SeqCst);
                if self.closed.load(Ordering::SeqCst) {
                    let executed = self.drain(true);
                    tracing::debug!(executed, "queue closed during enqueue, drained on caller");
                }
                Ok(())
            }
            Err(TrySendError::Full(entry)) => {
                tracing::warn!(command = %entry.name, "render command queue full, dropping");
                Err(FrameError::QueueFull { queue: QUEUE_NAME, name: entry.name.into_owned() })
            }
            Err(TrySendError::Disconnected(_)) => Err(FrameError::Disconnected { queue: QUEUE_NAME }),
        }
    }

    fn push_waiting<T, F>(&self, name: CommandName, command: F) -> FrameResult<CompletionFuture<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, CommandFault> + Send + 'static,
    {
        let (signal, future) = completion::<T>(name.clone());
        let job_name = name.clone();
        let job: Job = Box::new(move || signal.fulfill(execute_guarded(&job_name, command)));
        // On rejection the job, and with it the signal, is dropped here; the
        // caller gets QueueFull directly and never waits.
        self.push(CommandEntry { name, job })?;
        Ok(future)
    }

    fn wait_with_recovery<T>(&self, future: CompletionFuture<T>) -> WaitOutcome<T> {
        let _wait = WaitDepthGuard::enter();
        let Some(timeout) = self.command_timeout() else {
            return WaitOutcome::Done(self.wait_window(&future, None).unwrap_or_else(|| future.wait()));
        };
        if let Some(result) = self.wait_window(&future, Some(timeout)) {
            return WaitOutcome::Done(result);
        }

        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        tracing::error!(
            command = future.name(),
            timeout_ms,
            pending = self.receiver.len(),
            "blocking render command timed out, requesting forced drain"
        );
        self.drain_requested.store(true, Ordering::Release);

        if let Some(result) = self.wait_window(&future, Some(timeout)) {
            return WaitOutcome::Done(result);
        }
        let waited_ms = timeout_ms.saturating_mul(2);
        tracing::error!(command = future.name(), waited_ms, "forced drain did not complete command");
        WaitOutcome::TimedOut { name: future.name().to_owned(), waited_ms }
    }

    /// Waits up to `window` (forever when `None`) in short slices. If the
    /// queue gets closed meanwhile, the waiter drains it itself.
    ///
    /// Returns `None` only when the window expired.
    fn wait_window<T>(&self, future: &CompletionFuture<T>, window: Option<Duration>) -> Option<FrameResult<T>> {
        let deadline = window.map(|w| Instant::now() + w);
        loop {
            if self.is_closed() {
                self.drain(true);
                return future.wait_timeout(Duration::ZERO).or_else(|| {
                    // Our job was taken by a concurrent drain that is still running it.
                    future.wait_timeout(window.unwrap_or(CLOSED_POLL))
                });
            }
            let slice = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return None;
                    }
                    left.min(CLOSED_POLL)
                }
                None => CLOSED_POLL,
            };
            if let Some(result) = future.wait_timeout(slice) {
                return Some(result);
            }
        }
    }

    fn drain(&self, until_empty: bool) -> usize {
        let budget = if until_empty { usize::MAX } else { self.receiver.len() };
        let mut executed = 0_usize;
        while executed < budget {
            let Ok(entry) = self.receiver.try_recv() else {
                break;
            };
            tracing::trace!(command = %entry.name, "executing render command");
            (entry.job)();
            executed += 1;
        }
        self.executed.fetch_add(executed as u64, Ordering::Relaxed);
        executed
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("pending", &self.receiver.len())
            .field("drain_requested", &self.drain_requested())
            .field("timeout", &self.command_timeout())
            .finish_non_exhaustive()
    }
}

enum WaitOutcome<T> {
    Done(FrameResult<T>),
    TimedOut { name: String, waited_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn queue() -> Arc<CommandQueue> {
        Arc::new(CommandQueue::new(&FrameConfig::default(), Arc::new(ThreadRole::new())))
    }

    #[test]
    fn test_enqueue_off_render_thread_is_queued() {
        let queue = queue();
        let dispatch = queue.enqueue("noop", || Ok(())).unwrap();
        assert_eq!(dispatch, Dispatch::Queued);
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn test_enqueue_on_render_thread_is_immediate() {
        let queue = queue();
        queue.mark_current_thread_as_render_thread();
        let hit = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&hit);
        let dispatch = queue
            .enqueue("inline", move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        assert_eq!(dispatch, Dispatch::Immediate);
        assert!(hit.load(Ordering::SeqCst));
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_process_requires_render_thread() {
        let queue = queue();
        assert_eq!(
            queue.process_all_commands(),
            Err(FrameError::NotRenderThread { operation: "process_all_commands" })
        );
    }

    #[test]
    fn test_fifo_and_fault_isolation() {
        let queue = queue();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let log = Arc::clone(&log);
            queue
                .enqueue(format!("cmd_{i}"), move || {
                    log.lock().push(i);
                    if i == 2 {
                        return Err("odd one out".into());
                    }
                    if i == 3 {
                        panic!("three");
                    }
                    Ok(())
                })
                .unwrap();
        }
        queue.mark_current_thread_as_render_thread();
        assert_eq!(queue.process_all_commands(), Ok(5));
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.executed(), 5);
    }

    #[test]
    fn test_snapshot_drain_leaves_late_arrivals() {
        let queue = queue();
        let producer = Arc::clone(&queue);
        queue
            .enqueue("spawn_more", move || {
                let late = Arc::clone(&producer);
                std::thread::spawn(move || late.enqueue("late", || Ok(())).map(|_| ()))
                    .join()
                    .map_err(|_| CommandFault::new("producer panicked"))?
                    .map_err(|e| CommandFault::new(e.to_string()))
            })
            .unwrap();
        queue.mark_current_thread_as_render_thread();

        // "late" arrived mid-drain and waits for the next frame.
        assert_eq!(queue.process_all_commands(), Ok(1));
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.process_all_commands(), Ok(1));
        assert_eq!(queue.process_all_commands(), Ok(0));
    }

    #[test]
    fn test_inline_wait_inside_command() {
        let queue = queue();
        let inner_ran = Arc::new(AtomicBool::new(false));
        let outer_queue = Arc::clone(&queue);
        let flag = Arc::clone(&inner_ran);
        queue
            .enqueue("outer", move || {
                let witness = Arc::clone(&flag);
                outer_queue
                    .enqueue_and_wait("inner", move || {
                        witness.store(true, Ordering::SeqCst);
                        Ok(())
                    })
                    .map_err(|e| CommandFault::new(e.to_string()))?;
                if flag.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err("inner side effect not visible".into())
                }
            })
            .unwrap();
        queue.mark_current_thread_as_render_thread();
        assert_eq!(queue.process_all_commands(), Ok(1));
        assert!(inner_ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_queue_full_is_explicit() {
        let config = FrameConfig { command_queue_capacity: 1, ..FrameConfig::default() };
        let queue = CommandQueue::new(&config, Arc::new(ThreadRole::new()));
        queue.enqueue("a", || Ok(())).unwrap();
        assert!(matches!(queue.enqueue("b", || Ok(())), Err(FrameError::QueueFull { .. })));
        // A waiter on a full queue returns instead of hanging.
        assert!(matches!(
            queue.enqueue_and_wait("c", || Ok(())),
            Err(FrameError::QueueFull { .. })
        ));
    }

    #[test]
    fn test_timeout_requests_forced_drain() {
        let config = FrameConfig {
            command_timeout_ms: Some(10),
            timeout_policy: TimeoutPolicy::Fail,
            ..FrameConfig::default()
        };
        let queue = CommandQueue::new(&config, Arc::new(ThreadRole::new()));
        let result = queue.enqueue_and_wait("never_drained", || Ok(()));
        assert!(matches!(result, Err(FrameError::Timeout { waited_ms: 20, .. })));
        assert!(queue.drain_requested());
    }

    #[test]
    fn test_timeout_recover_returns_ok() {
        let queue = queue();
        queue.set_command_timeout(Some(Duration::from_millis(5)));
        assert_eq!(queue.command_timeout(), Some(Duration::from_millis(5)));
        assert_eq!(queue.enqueue_and_wait("never_drained", || Ok(())), Ok(()));

        let valued: FrameResult<u32> = queue.enqueue_and_wait_with_result("value", || Ok(1));
        assert!(matches!(valued, Err(FrameError::Timeout { .. })));

        queue.set_command_timeout(None);
        assert_eq!(queue.command_timeout(), None);
    }

    #[test]
    fn test_forced_drain_empties_queue() {
        let queue = queue();
        queue.mark_current_thread_as_render_thread();
        queue.drain_requested.store(true, Ordering::Release);
        let producer = Arc::clone(&queue);
        std::thread::spawn(move || {
            for i in 0..10 {
                producer.enqueue(format!("bulk_{i}"), || Ok(())).unwrap();
            }
        })
        .join()
        .unwrap();
        assert_eq!(queue.process_all_commands(), Ok(10));
        assert!(!queue.drain_requested());
    }
}
