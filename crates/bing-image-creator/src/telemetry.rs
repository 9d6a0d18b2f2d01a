//! Telemetry query parameters (`kseed`, `SFX`).
//!
//! The endpoint expects these to grow from one request to the next. Their
//! meaning is opaque; only monotonic growth matters.

use crate::config::TelemetryConfig;

/// Per-client telemetry counters. Values never decrease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySequencer {
    current_seed: u64,
    seed_increment: u64,
    current_suffix: u32,
    suffix_increment: u32,
    suffix_enabled: bool,
}

impl TelemetrySequencer {
    pub fn new(config: &TelemetryConfig, suffix_enabled: bool) -> Self {
        Self {
            current_seed: config.kseed_base,
            seed_increment: config.kseed_increment,
            current_suffix: config.inst_suffix,
            suffix_increment: config.inst_suffix_increment,
            suffix_enabled,
        }
    }

    /// Advance the seed and return the new value.
    pub fn next_seed(&mut self) -> u64 {
        self.current_seed = self.current_seed.saturating_add(self.seed_increment);
        self.current_seed
    }

    /// Advance the suffix counter and render it. A counter of 1 renders as
    /// an empty string; a disabled suffix always renders empty and leaves
    /// the counter alone.
    pub fn next_suffix(&mut self) -> String {
        if !self.suffix_enabled {
            return String::new();
        }
        self.current_suffix = self.current_suffix.saturating_add(self.suffix_increment);
        if self.current_suffix > 1 {
            self.current_suffix.to_string()
        } else {
            String::new()
        }
    }

    /// `&kseed=..&SFX=..` for the next submission.
    pub fn next_query(&mut self) -> String {
        let seed = self.next_seed();
        let suffix = self.next_suffix();
        format!("&kseed={seed}&SFX={suffix}")
    }

    pub fn current_seed(&self) -> u64 {
        self.current_seed
    }

    pub fn current_suffix(&self) -> u32 {
        self.current_suffix
    }
}

impl Default for TelemetrySequencer {
    fn default() -> Self {
        Self::new(&TelemetryConfig::default(), true)
    }
}
