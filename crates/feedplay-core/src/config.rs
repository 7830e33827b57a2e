//! Feed media configuration
//!
//! Every knob has a default; a JSON document only needs the fields it
//! overrides.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the whole feed media stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Maximum decoded assets kept
    pub asset_cache_capacity: usize,
    /// Maximum non-displayed players kept
    pub player_cache_capacity: usize,
    /// Idle time after which a cached asset expires (milliseconds)
    pub asset_ttl_ms: u64,
    /// Maximum simultaneous background loads
    pub max_concurrent_loads: usize,
    /// Timeout for each manifest existence probe (milliseconds)
    pub probe_timeout_ms: u64,
    /// Timeout for a whole manifest fetch (milliseconds)
    pub request_timeout_ms: u64,
    /// Per-position delay for normal priority loads (milliseconds)
    pub normal_delay_ms: u64,
    /// Per-position delay for low priority loads (milliseconds)
    pub low_delay_ms: u64,
    /// Pause between queued dispatches (milliseconds)
    pub dispatch_pause_ms: u64,
    /// Loads allowed in the burst window before throttling applies
    pub burst_threshold: usize,
    /// Rolling window for burst counting (milliseconds)
    pub burst_window_ms: u64,
    /// Minimum gap since the last start once the burst threshold is hit (milliseconds)
    pub burst_min_gap_ms: u64,
    /// UI-thread probe interval (milliseconds)
    pub probe_interval_ms: u64,
    /// Tick gap that counts as a stall (milliseconds)
    pub stall_threshold_ms: u64,
    /// Admission cooldown after a stall (milliseconds)
    pub cooldown_ms: u64,
    /// Stalls inside the escalation window that trigger an emergency purge
    pub escalation_count: usize,
    /// Rolling window for escalation (milliseconds)
    pub escalation_window_ms: u64,
    /// Background interval after which every player is refreshed (milliseconds)
    pub extended_idle_ms: u64,
    /// Forward buffer hint handed to new players (seconds)
    pub forward_buffer_secs: f64,
    /// Peak bitrate cap for new players (0 = no cap)
    pub peak_bitrate: u64,
    /// Attempts to prepare a player before reporting it unavailable
    pub playback_retry_attempts: u32,
    /// Base backoff between prepare attempts (milliseconds)
    pub playback_retry_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            asset_cache_capacity: 30,
            player_cache_capacity: 15,
            asset_ttl_ms: 600_000,
            max_concurrent_loads: 3,
            probe_timeout_ms: 3_000,
            request_timeout_ms: 10_000,
            normal_delay_ms: 100,
            low_delay_ms: 300,
            dispatch_pause_ms: 100,
            burst_threshold: 10,
            burst_window_ms: 60_000,
            burst_min_gap_ms: 500,
            probe_interval_ms: 50,
            stall_threshold_ms: 100,
            cooldown_ms: 2_000,
            escalation_count: 3,
            escalation_window_ms: 5_000,
            extended_idle_ms: 300_000,
            forward_buffer_secs: 30.0,
            peak_bitrate: 0,
            playback_retry_attempts: 3,
            playback_retry_delay_ms: 250,
        }
    }
}

impl FeedConfig {
    /// Parse a JSON document, filling missing fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: FeedConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Reject configurations the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.asset_cache_capacity == 0 {
            return Err(Error::InvalidConfig("asset_cache_capacity must be > 0".into()));
        }
        if self.player_cache_capacity == 0 {
            return Err(Error::InvalidConfig("player_cache_capacity must be > 0".into()));
        }
        if self.max_concurrent_loads == 0 {
            return Err(Error::InvalidConfig("max_concurrent_loads must be > 0".into()));
        }
        if self.probe_interval_ms == 0 {
            return Err(Error::InvalidConfig("probe_interval_ms must be > 0".into()));
        }
        if self.stall_threshold_ms <= self.probe_interval_ms {
            return Err(Error::InvalidConfig(format!(
                "stall_threshold_ms ({}) must exceed probe_interval_ms ({})",
                self.stall_threshold_ms, self.probe_interval_ms
            )));
        }
        if self.probe_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig("timeouts must be > 0".into()));
        }
        if self.escalation_count == 0 {
            return Err(Error::InvalidConfig("escalation_count must be > 0".into()));
        }
        if self.playback_retry_attempts == 0 {
            return Err(Error::InvalidConfig("playback_retry_attempts must be > 0".into()));
        }
        if self.forward_buffer_secs.is_nan() || self.forward_buffer_secs < 0.0 {
            return Err(Error::InvalidConfig("forward_buffer_secs must be >= 0".into()));
        }
        Ok(())
    }

    pub fn asset_ttl(&self) -> Duration {
        Duration::from_millis(self.asset_ttl_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn extended_idle(&self) -> Duration {
        Duration::from_millis(self.extended_idle_ms)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
