//! Frame-time sampling for recordings

/// Keeps at most `rate_hz` frames per second of frame time.
///
/// A frame is kept when its timestamp is at least `1000 / rate_hz` ms after
/// the previously kept one. A timestamp that jumps backwards re-anchors the
/// limiter instead of stalling it.
#[derive(Debug, Clone)]
pub struct SampleRateLimiter {
    interval_ms: f64,
    last_kept_ms: Option<u64>,
}

impl SampleRateLimiter {
    pub fn new(rate_hz: u32) -> Self {
        Self { interval_ms: 1_000.0 / f64::from(rate_hz.max(1)), last_kept_ms: None }
    }

    pub fn accept(&mut self, timestamp_ms: u64) -> bool {
        let keep = match self.last_kept_ms {
            None => true,
            Some(last) if timestamp_ms < last => true,
            Some(last) => (timestamp_ms - last) as f64 >= self.interval_ms,
        };
        if keep {
            self.last_kept_ms = Some(timestamp_ms);
        }
        keep
    }
}
