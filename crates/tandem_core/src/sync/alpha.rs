//! # Interpolation Alpha and Logic Frame Clock
//!
//! The two values the logic thread publishes every iteration: how far the
//! accumulator is into the next tick, and how many ticks have completed.
//! Publishing uses `Release`, consuming uses `Acquire`, so a reader that sees
//! a new value also sees every ring advance made before it.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Interpolation weight shared between logic and render.
///
/// Stored as the bit pattern of an `f32`. Always in `[0, 1]`, never NaN.
#[derive(Debug, Default)]
pub struct InterpolationAlpha {
    bits: AtomicU32,
}

impl InterpolationAlpha {
    /// Starts at 0.
    #[must_use]
    pub const fn new() -> Self {
        Self { bits: AtomicU32::new(0) }
    }

    /// Publishes a new weight. NaN becomes 0, everything else is clamped.
    #[inline]
    pub fn publish(&self, alpha: f32) {
        self.bits.store(sanitize(alpha).to_bits(), Ordering::Release);
    }

    /// Reads the latest weight.
    #[inline]
    #[must_use]
    pub fn consume(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// Clamps `alpha` into `[0, 1]`, mapping NaN to 0.
#[inline]
#[must_use]
pub fn sanitize(alpha: f32) -> f32 {
    if alpha.is_nan() {
        0.0
    } else {
        alpha.clamp(0.0, 1.0)
    }
}

/// Monotonic count of completed logic frames.
///
/// The counter itself is lock-free. The condition variable only serves
/// callers that want to block until a frame completes.
#[derive(Debug, Default)]
pub struct LogicFrameClock {
    frame_id: AtomicU64,
    gate: Mutex<()>,
    completed: Condvar,
}

impl LogicFrameClock {
    /// Starts at frame 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the frame id and wakes any waiter. Returns the new id.
    pub fn publish(&self) -> u64 {
        let id = self.frame_id.fetch_add(1, Ordering::Release) + 1;
        let _gate = self.gate.lock();
        self.completed.notify_all();
        id
    }

    /// Latest published frame id.
    #[inline]
    #[must_use]
    pub fn current(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }

    /// Blocks until the frame id exceeds `after` or `timeout` passes.
    ///
    /// Returns the id observed, or `None` on timeout.
    #[must_use]
    pub fn wait_for_frame(&self, after: u64, timeout: Duration) -> Option<u64> {
        let deadline = Instant::now() + timeout;
        let mut gate = self.gate.lock();
        loop {
            let id = self.current();
            if id > after {
                return Some(id);
            }
            if self.completed.wait_until(&mut gate, deadline).timed_out() {
                let id = self.current();
                return (id > after).then_some(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_alpha_sanitized() {
        let alpha = InterpolationAlpha::new();
        for (input, expected) in [
            (0.5, 0.5),
            (-3.0, 0.0),
            (7.0, 1.0),
            (f32::NAN, 0.0),
            (f32::INFINITY, 1.0),
            (f32::NEG_INFINITY, 0.0),
        ] {
            alpha.publish(input);
            assert!((alpha.consume() - expected).abs() < f32::EPSILON, "input {input}");
        }
    }

    #[test]
    fn test_frame_clock_monotonic() {
        let clock = LogicFrameClock::new();
        assert_eq!(clock.current(), 0);
        assert_eq!(clock.publish(), 1);
        assert_eq!(clock.publish(), 2);
        assert_eq!(clock.current(), 2);
    }

    #[test]
    fn test_wait_for_frame_wakes() {
        let clock = Arc::new(LogicFrameClock::new());
        let publisher = Arc::clone(&clock);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            publisher.publish();
        });
        assert_eq!(clock.wait_for_frame(0, Duration::from_secs(5)), Some(1));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_frame_times_out() {
        let clock = LogicFrameClock::new();
        assert_eq!(clock.wait_for_frame(0, Duration::from_millis(5)), None);
        clock.publish();
        assert_eq!(clock.wait_for_frame(0, Duration::from_millis(5)), Some(1));
    }

    #[test]
    fn test_wakeups_without_new_frame_keep_deadline() {
        let clock = Arc::new(LogicFrameClock::new());
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let noise = {
            let clock = Arc::clone(&clock);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    {
                        let _gate = clock.gate.lock();
                        clock.completed.notify_all();
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            })
        };

        let started = Instant::now();
        assert_eq!(clock.wait_for_frame(0, Duration::from_millis(50)), None);
        let waited = started.elapsed();
        stop.store(true, Ordering::Release);
        noise.join().unwrap();
        assert!(waited < Duration::from_secs(1), "waited {waited:?}");
    }
}
