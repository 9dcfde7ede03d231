//! Subscriber-side rate control for the telemetry stream

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How often a telemetry subscriber wants frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRate {
    /// Every decoded frame, at the source rate (60 Hz from a console)
    #[default]
    Native,

    /// At most this many frames per second, latest frame wins.
    /// Rates at or above the source rate behave like `Native`.
    Max(u32),
}

impl UpdateRate {
    /// Effective rate against a source producing `source_hz` frames per second.
    pub fn normalize(self, source_hz: f64) -> Self {
        match self {
            UpdateRate::Max(hz) if hz > 0 && f64::from(hz) < source_hz => UpdateRate::Max(hz),
            _ => UpdateRate::Native,
        }
    }

    /// Period between frames, or `None` when no throttling is needed.
    pub fn throttle_interval(self, source_hz: f64) -> Option<Duration> {
        match self.normalize(source_hz) {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / f64::from(hz))),
        }
    }
}
