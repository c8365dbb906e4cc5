//! Engine configuration
//!
//! All timing behavior of the scheduler is driven by a small set of numeric
//! constants plus the transition mode. Every field has a built-in default so
//! an empty TOML file (or no file at all) yields a working configuration.
//!
//! Settings sources, in priority order:
//! 1. Command-line arguments (demo binary)
//! 2. TOML configuration file
//! 3. Built-in defaults (code constants below)

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// How the scheduler swaps between the two playback slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionMode {
    /// Instantaneous swap; only the active slot is ever rendered
    Cut,
    /// Timed opacity blend; the incoming slot fades in above the outgoing one
    Crossfade,
}

impl FromStr for TransitionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cut" => Ok(TransitionMode::Cut),
            "crossfade" => Ok(TransitionMode::Crossfade),
            other => Err(Error::Config(format!("unknown transition mode: {other}"))),
        }
    }
}

impl std::fmt::Display for TransitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionMode::Cut => write!(f, "cut"),
            TransitionMode::Crossfade => write!(f, "crossfade"),
        }
    }
}

/// Scheduler configuration
///
/// The five timing constants of the transition algorithm plus two
/// failure-handling knobs. All durations are milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Transition mode (cut or crossfade)
    #[serde(default = "default_mode")]
    pub mode: TransitionMode,

    /// Cadence at which the active slot's position is polled
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Remaining-time threshold at which the next transition is triggered
    ///
    /// Slightly early so the outgoing clip's final frames are never visibly
    /// skipped while the transition mechanism is still initializing.
    #[serde(default = "default_trigger_threshold_ms")]
    pub trigger_threshold_ms: u64,

    /// Length of the crossfade opacity ramp (ignored in cut mode)
    #[serde(default = "default_fade_duration_ms")]
    pub fade_duration_ms: u64,

    /// Delay before preparing the second clip at session start
    ///
    /// Lets the first clip's decoder stabilize before competing for resources.
    #[serde(default = "default_initial_preload_delay_ms")]
    pub initial_preload_delay_ms: u64,

    /// Delay before preparing the next-next clip after each swap
    ///
    /// Longer than the priming delay since the system is simultaneously
    /// driving live playback.
    #[serde(default = "default_repreload_delay_ms")]
    pub repreload_delay_ms: u64,

    /// Bound on how long a prepare may take before it is treated as failed
    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,

    /// Backoff before retrying (or skipping past) a failed prepare
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_mode() -> TransitionMode {
    TransitionMode::Crossfade
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_trigger_threshold_ms() -> u64 {
    200
}

fn default_fade_duration_ms() -> u64 {
    2000
}

fn default_initial_preload_delay_ms() -> u64 {
    3000
}

fn default_repreload_delay_ms() -> u64 {
    4000
}

fn default_readiness_timeout_ms() -> u64 {
    10_000
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            poll_interval_ms: default_poll_interval_ms(),
            trigger_threshold_ms: default_trigger_threshold_ms(),
            fade_duration_ms: default_fade_duration_ms(),
            initial_preload_delay_ms: default_initial_preload_delay_ms(),
            repreload_delay_ms: default_repreload_delay_ms(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    ///
    /// Missing fields fall back to built-in defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig =
            toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate timing constants
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be > 0".into()));
        }
        if self.trigger_threshold_ms == 0 {
            return Err(Error::Config("trigger_threshold_ms must be > 0".into()));
        }
        if self.readiness_timeout_ms == 0 {
            return Err(Error::Config("readiness_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Effective fade length for the configured mode (zero in cut mode)
    pub fn fade_duration(&self) -> Duration {
        match self.mode {
            TransitionMode::Cut => Duration::ZERO,
            TransitionMode::Crossfade => Duration::from_millis(self.fade_duration_ms),
        }
    }

    pub fn initial_preload_delay(&self) -> Duration {
        Duration::from_millis(self.initial_preload_delay_ms)
    }

    pub fn repreload_delay(&self) -> Duration {
        Duration::from_millis(self.repreload_delay_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
