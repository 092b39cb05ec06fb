//! # Fixed-Step Logic Loop
//!
//! One top-level iteration of the logic thread:
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. MEASURE                                                          │
//! │    └─ Wall-clock delta, clamped to max_frame_delta_seconds          │
//! │                                                                     │
//! │ 2. ACCUMULATE                                                       │
//! │    └─ accumulator += delta                                          │
//! │                                                                     │
//! │ 3. TICK (at most max_steps_per_frame times)                         │
//! │    ├─ begin_logic_frame                                             │
//! │    ├─ game callback with the fixed tick                             │
//! │    └─ end_logic_frame: advance rings, publish blend pairs           │
//! │                                                                     │
//! │ 4. DROP BACKLOG                                                     │
//! │    └─ Still behind after the cap: keep at most half a tick          │
//! │                                                                     │
//! │ 5. PUBLISH ALPHA                                                    │
//! │    └─ accumulator / tick, clamped, NaN-guarded                      │
//! │                                                                     │
//! │ 6. PUBLISH FRAME ID (only if a tick ran)                            │
//! │    └─ Wakes lockstep waiters                                        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::{Duration, Instant};

use tandem_core::{FrameConfig, Lifecycle, LoopState};

/// Fraction of a tick kept when backlog is dropped.
const BACKLOG_KEEP_TICKS: f64 = 0.5;

/// Poll interval while waiting for the render side to finish shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(1);

/// What the loop drives once per tick.
pub trait TickDriver {
    /// Opens a tick.
    fn begin_logic_frame(&mut self);
    /// Closes a tick and publishes its result.
    fn end_logic_frame(&mut self);
    /// Publishes the blend weight for the render thread.
    fn publish_interpolation_alpha(&mut self, alpha: f32);
    /// Marks a logic frame complete. Returns its id.
    fn publish_logic_frame_id(&mut self) -> u64;
    /// Lifecycle shared with the render side.
    fn lifecycle(&self) -> &Lifecycle;
}

/// Result of one [`FixedStepLoop::advance`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepReport {
    /// Ticks run this iteration.
    pub ticks: u32,
    /// Published alpha.
    pub alpha: f32,
    /// Seconds of backlog discarded after the step cap.
    pub dropped_seconds: f64,
    /// True if the input delta was clamped.
    pub clamped: bool,
    /// Published logic frame id, if a tick ran.
    pub logic_frame: Option<u64>,
}

/// Counters over the lifetime of the loop.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LoopStats {
    /// Top-level iterations.
    pub iterations: u64,
    /// Fixed ticks run.
    pub ticks: u64,
    /// Iterations that hit the step cap.
    pub capped_iterations: u64,
    /// Total backlog discarded, in seconds.
    pub backlog_dropped_seconds: f64,
    /// Deltas clamped to the maximum.
    pub clamped_deltas: u64,
    /// Alpha published by the last iteration.
    pub last_alpha: f32,
}

/// Accumulator loop with a catch-up cap.
#[derive(Debug)]
pub struct FixedStepLoop {
    /// Fixed tick in seconds.
    tick: f64,
    /// Tick cap per iteration.
    max_steps: u32,
    /// Delta clamp in seconds.
    max_delta: f64,
    /// Unsimulated time in seconds.
    accumulator: f64,
    /// Lifetime counters.
    stats: LoopStats,
}

impl FixedStepLoop {
    /// Creates a loop timed from `config`.
    #[must_use]
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            tick: config.fixed_tick_seconds,
            max_steps: config.max_steps_per_frame,
            max_delta: config.max_frame_delta_seconds,
            accumulator: 0.0,
            stats: LoopStats::default(),
        }
    }

    /// Fixed tick in seconds.
    #[inline]
    #[must_use]
    pub fn fixed_tick_seconds(&self) -> f64 {
        self.tick
    }

    /// Unsimulated time carried to the next iteration.
    #[inline]
    #[must_use]
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Runs one iteration with an explicit `delta_seconds`.
    ///
    /// Negative or NaN deltas count as zero. `game` is called once per tick
    /// with the driver and the fixed tick length.
    pub fn advance<D, G>(&mut self, delta_seconds: f64, driver: &mut D, game: &mut G) -> StepReport
    where
        D: TickDriver,
        G: FnMut(&mut D, f64),
    {
        let mut report = StepReport::default();
        let delta = if delta_seconds.is_nan() || delta_seconds < 0.0 {
            0.0
        } else if delta_seconds > self.max_delta {
            // Debugger break or OS suspend.
            tracing::debug!(delta_seconds, max = self.max_delta, "clamping frame delta");
            report.clamped = true;
            self.max_delta
        } else {
            delta_seconds
        };
        self.accumulator += delta;

        while self.accumulator >= self.tick && report.ticks < self.max_steps {
            driver.begin_logic_frame();
            game(driver, self.tick);
            driver.end_logic_frame();
            self.accumulator -= self.tick;
            report.ticks += 1;
        }

        if self.accumulator >= self.tick {
            let keep = self.accumulator.min(BACKLOG_KEEP_TICKS * self.tick);
            report.dropped_seconds = self.accumulator - keep;
            self.accumulator = keep;
            tracing::debug!(dropped_seconds = report.dropped_seconds, "dropping logic backlog");
        }

        #[allow(clippy::cast_possible_truncation)]
        let alpha = (self.accumulator / self.tick) as f32;
        driver.publish_interpolation_alpha(alpha);
        report.alpha = tandem_core::sync::alpha::sanitize(alpha);

        if report.ticks > 0 {
            report.logic_frame = Some(driver.publish_logic_frame_id());
        }

        self.stats.iterations += 1;
        self.stats.ticks += u64::from(report.ticks);
        self.stats.last_alpha = report.alpha;
        self.stats.backlog_dropped_seconds += report.dropped_seconds;
        if report.dropped_seconds > 0.0 {
            self.stats.capped_iterations += 1;
        }
        if report.clamped {
            self.stats.clamped_deltas += 1;
        }
        report
    }

    /// Runs until shutdown is requested, measuring wall-clock time.
    ///
    /// Moves the lifecycle `Idle -> Running -> Stopping`, then waits for the
    /// render side to finish its drain and mark `Stopped`. With no render
    /// side attached it marks `Stopped` itself.
    pub fn run<D, G>(&mut self, driver: &mut D, mut game: G) -> LoopStats
    where
        D: TickDriver,
        G: FnMut(&mut D, f64),
    {
        if !driver.lifecycle().transition(LoopState::Idle, LoopState::Running) {
            tracing::warn!(state = ?driver.lifecycle().state(), "logic loop not started from idle");
            return self.stats;
        }

        let mut last = Instant::now();
        while !driver.lifecycle().shutdown_requested() {
            let now = Instant::now();
            let delta = now.duration_since(last).as_secs_f64();
            last = now;
            self.advance(delta, driver, &mut game);

            let until_next = self.tick - self.accumulator;
            if until_next > 0.0 {
                std::thread::sleep(Duration::from_secs_f64(until_next));
            }
        }

        let lifecycle = driver.lifecycle();
        lifecycle.transition(LoopState::Running, LoopState::Stopping);
        while lifecycle.render_active() && lifecycle.state() != LoopState::Stopped {
            std::thread::sleep(SHUTDOWN_POLL);
        }
        lifecycle.transition(LoopState::Stopping, LoopState::Stopped);

        tracing::info!(
            iterations = self.stats.iterations,
            ticks = self.stats.ticks,
            capped = self.stats.capped_iterations,
            "logic loop stopped"
        );
        self.stats
    }
}
