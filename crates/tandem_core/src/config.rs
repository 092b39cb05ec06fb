//! # Frame Configuration
//!
//! Knobs consumed once at construction. Loaded from TOML at startup, never
//! touched on the hot path.
//!
//! ```toml
//! fixed_tick_seconds = 0.016666668
//! max_steps_per_frame = 5
//! num_transform_buffers = 4
//! num_destroy_slots = 4
//! command_timeout_ms = 5000
//! timeout_policy = "recover"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{FrameError, FrameResult};

/// What a blocking wait does once its timeout expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Log, request a forced drain, and return `Ok` to the caller.
    #[default]
    Recover,
    /// Log, request a forced drain, and return [`FrameError::Timeout`].
    Fail,
}

/// Construction-time configuration for the dual-rate engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Fixed logic tick in seconds.
    pub fixed_tick_seconds: f64,
    /// Maximum logic ticks per loop iteration.
    pub max_steps_per_frame: u32,
    /// Wall-clock deltas above this are clamped (debugger stalls, OS suspend).
    pub max_frame_delta_seconds: f64,
    /// Ring size per tracked entity. At least 3.
    pub num_transform_buffers: usize,
    /// Deferred destroy slots. At least 2.
    pub num_destroy_slots: usize,
    /// Wait timeout for blocking render commands. `None` waits forever.
    pub command_timeout_ms: Option<u64>,
    /// Behaviour once `command_timeout_ms` expires.
    pub timeout_policy: TimeoutPolicy,
    /// Capacity of the render command queue.
    pub command_queue_capacity: usize,
    /// Capacity of the closure command queue.
    pub closure_queue_capacity: usize,
    /// Closure registration commands applied per render frame.
    pub max_closure_commands_per_frame: usize,
    /// Ticks without a write before a tracked node is evicted. 0 disables.
    pub stable_frame_threshold: u32,
    /// Dump ring state periodically at debug level.
    pub debug_buffers: bool,
    /// Render frames between dumps.
    pub buffer_dump_interval: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            fixed_tick_seconds: 1.0 / 60.0,
            max_steps_per_frame: 5,
            max_frame_delta_seconds: 0.25,
            num_transform_buffers: 4,
            num_destroy_slots: 4,
            command_timeout_ms: None,
            timeout_policy: TimeoutPolicy::Recover,
            command_queue_capacity: 65_536,
            closure_queue_capacity: 16_384,
            max_closure_commands_per_frame: 1000,
            stable_frame_threshold: 4,
            debug_buffers: false,
            buffer_dump_interval: 300,
        }
    }
}

impl FrameConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ConfigParse`] for malformed TOML and
    /// [`FrameError::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> FrameResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| FrameError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ConfigIo`] if the file cannot be read, otherwise
    /// the same errors as [`FrameConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> FrameResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FrameError::ConfigIo(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> FrameResult<()> {
        if !self.fixed_tick_seconds.is_finite() || self.fixed_tick_seconds <= 0.0 {
            return Err(FrameError::InvalidConfig(format!(
                "fixed_tick_seconds must be positive, got {}",
                self.fixed_tick_seconds
            )));
        }
        if !self.max_frame_delta_seconds.is_finite() || self.max_frame_delta_seconds <= 0.0 {
            return Err(FrameError::InvalidConfig(format!(
                "max_frame_delta_seconds must be positive, got {}",
                self.max_frame_delta_seconds
            )));
        }
        if self.max_steps_per_frame == 0 {
            return Err(FrameError::InvalidConfig("max_steps_per_frame must be at least 1".into()));
        }
        if self.num_transform_buffers < 3 {
            return Err(FrameError::InvalidConfig(format!(
                "num_transform_buffers must be at least 3, got {}",
                self.num_transform_buffers
            )));
        }
        if self.num_destroy_slots < 2 {
            return Err(FrameError::InvalidConfig(format!(
                "num_destroy_slots must be at least 2, got {}",
                self.num_destroy_slots
            )));
        }
        if self.command_queue_capacity == 0 || self.closure_queue_capacity == 0 {
            return Err(FrameError::InvalidConfig("queue capacities must be non-zero".into()));
        }
        Ok(())
    }

    /// Fixed tick as a [`Duration`].
    #[must_use]
    pub fn fixed_tick(&self) -> Duration {
        Duration::from_secs_f64(self.fixed_tick_seconds)
    }

    /// Command timeout as a [`Duration`].
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_ms.map(Duration::from_millis)
    }
}
