//! Lap boundary detection
//!
//! [`LapDetector`] consumes decoded frames one at a time and produces a
//! [`LapRecord`] whenever the fused detectors in [`fusion`] declare a boundary.
//!
//! ```rust
//! use slipstream::lap::LapDetector;
//! use slipstream::TelemetryFrame;
//!
//! let mut detector = LapDetector::for_track("Tsukuba Circuit");
//! assert_eq!(detector.track_length_m(), 2_045.0);
//!
//! let frame = TelemetryFrame { current_lap: 0, ..Default::default() };
//! assert!(detector.update(&frame).is_none());
//! assert_eq!(detector.current_lap_number(), 0);
//! ```

pub mod fusion;
pub mod tracks;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

pub use fusion::{DetectorSnapshot, Signals, fuse};

use crate::types::{LapRecord, TelemetryFrame, Vec3};

/// Steps longer than this between consecutive frames are teleports (replays,
/// restarts, pit resets) and are not counted as driven distance.
pub const MAX_STEP_M: f32 = 50.0;

/// Below this speed the car is treated as stationary and position jitter is ignored.
pub const MIN_MOVING_SPEED_KMH: f32 = 5.0;

/// Running statistics for the lap being timed.
#[derive(Debug, Clone, Default)]
struct LapStats {
    points: u32,
    top_speed_kmh: f32,
    speed_sum: f64,
    fuel_at_start: Option<f32>,
    last_fuel: f32,
    sectors: [Option<u64>; 2],
    off_track: bool,
}

impl LapStats {
    fn record(&mut self, frame: &TelemetryFrame) {
        self.points += 1;
        self.top_speed_kmh = self.top_speed_kmh.max(frame.speed_kmh);
        self.speed_sum += f64::from(frame.speed_kmh);
        self.fuel_at_start.get_or_insert(frame.fuel_level);
        self.last_fuel = frame.fuel_level;
        if !frame.flags.car_on_track() {
            self.off_track = true;
        }
    }

    fn avg_speed_kmh(&self) -> f32 {
        if self.points == 0 { 0.0 } else { (self.speed_sum / f64::from(self.points)) as f32 }
    }

    fn fuel_consumed(&self) -> f32 {
        self.fuel_at_start.map_or(0.0, |start| (start - self.last_fuel).max(0.0))
    }
}

/// Infers lap boundaries from the counter, position and distance signals.
#[derive(Debug, Clone)]
pub struct LapDetector {
    track_length_m: f32,
    min_lap_duration: Option<Duration>,

    start_point: Option<Vec3>,
    last_position: Option<Vec3>,
    last_counter: Option<i16>,
    last_timestamp_ms: Option<u64>,

    lap_in_progress: bool,
    lap_number: u32,
    lap_started_ms: u64,
    lap_distance_m: f32,
    stats: LapStats,

    last_lap_ms: Option<u64>,
    best_lap_ms: Option<u64>,
}

impl Default for LapDetector {
    fn default() -> Self {
        Self::new(tracks::DEFAULT_TRACK_LENGTH_M)
    }
}

impl LapDetector {
    pub fn new(track_length_m: f32) -> Self {
        Self {
            track_length_m,
            min_lap_duration: None,
            start_point: None,
            last_position: None,
            last_counter: None,
            last_timestamp_ms: None,
            lap_in_progress: false,
            lap_number: 0,
            lap_started_ms: 0,
            lap_distance_m: 0.0,
            stats: LapStats::default(),
            last_lap_ms: None,
            best_lap_ms: None,
        }
    }

    /// Detector sized for `track`, falling back to the default length for unknown names.
    pub fn for_track(track: &str) -> Self {
        Self::new(tracks::track_length(track))
    }

    /// Ignore boundaries that arrive sooner than `duration` after the previous one.
    pub fn with_min_lap_duration(mut self, duration: Option<Duration>) -> Self {
        self.min_lap_duration = duration;
        self
    }

    /// Forget all state and re-estimate the track length from `track`.
    pub fn reset(&mut self, track: Option<&str>) {
        let track_length_m = track.map_or(self.track_length_m, tracks::track_length);
        *self = Self::new(track_length_m).with_min_lap_duration(self.min_lap_duration);
    }

    pub fn track_length_m(&self) -> f32 {
        self.track_length_m
    }

    /// Feed one frame; returns the completed lap when a boundary is detected.
    pub fn update(&mut self, frame: &TelemetryFrame) -> Option<LapRecord> {
        let now = frame.timestamp_ms;
        self.last_timestamp_ms = Some(now);

        let step = self.last_position.map(|last| last.distance(&frame.position));
        self.last_position = Some(frame.position);
        if let Some(step) = step
            && step < MAX_STEP_M
            && frame.speed_kmh > MIN_MOVING_SPEED_KMH
        {
            self.lap_distance_m += step;
        }

        let counter_increased = self.last_counter.is_some_and(|last| frame.current_lap > last);
        self.last_counter = Some(frame.current_lap);

        if counter_increased && (self.start_point.is_none() || !self.lap_in_progress) {
            self.begin_first_lap(frame);
            return None;
        }

        if !self.lap_in_progress {
            // Timing starts on the first moving frame; the counter baseline
            // restarts it at the line.
            if frame.speed_kmh <= MIN_MOVING_SPEED_KMH {
                return None;
            }
            debug!(
                x = frame.position.x,
                z = frame.position.z,
                "Lap timing started before the counter baseline"
            );
            self.start_lap(now, frame.fuel_level);
        }

        self.stats.record(frame);
        self.record_sectors(now);

        let snapshot = DetectorSnapshot {
            lap_in_progress: true,
            counter_increased,
            distance_to_start_m: self.start_point.map(|p| p.distance(&frame.position)),
            lap_distance_m: self.lap_distance_m,
            track_length_m: self.track_length_m,
        };
        let signals = fuse(&snapshot);
        if !signals.any() {
            return None;
        }

        let elapsed_ms = now.saturating_sub(self.lap_started_ms);
        if let Some(min) = self.min_lap_duration
            && u128::from(elapsed_ms) < min.as_millis()
        {
            debug!(
                elapsed_ms,
                signals = ?signals.fired(),
                "Lap boundary ignored, shorter than minimum lap duration"
            );
            return None;
        }

        info!(
            lap = self.lap_number,
            lap_time_ms = elapsed_ms,
            distance_m = self.lap_distance_m,
            signals = ?signals.fired(),
            "Lap completed"
        );
        let record = self.complete_lap(now, true);
        self.start_lap(now, frame.fuel_level);
        Some(record)
    }

    /// Close the lap in progress as invalid, e.g. when recording stops mid-lap.
    ///
    /// Returns `None` when no lap is being timed or it has no samples yet.
    pub fn finalize(&mut self, now_ms: u64) -> Option<LapRecord> {
        if !self.lap_in_progress || self.stats.points == 0 {
            self.lap_in_progress = false;
            return None;
        }
        debug!(lap = self.lap_number, "Finalizing lap in progress");
        let record = self.complete_lap(now_ms, false);
        self.lap_in_progress = false;
        Some(record)
    }

    /// Time spent in the current lap, as of the latest frame.
    pub fn current_lap_time(&self) -> Option<Duration> {
        if !self.lap_in_progress {
            return None;
        }
        let now = self.last_timestamp_ms?;
        Some(Duration::from_millis(now.saturating_sub(self.lap_started_ms)))
    }

    pub fn last_lap_time(&self) -> Option<Duration> {
        self.last_lap_ms.map(Duration::from_millis)
    }

    /// Fastest valid lap seen since the last reset.
    pub fn best_lap_time(&self) -> Option<Duration> {
        self.best_lap_ms.map(Duration::from_millis)
    }

    /// Number of the lap being timed, `0` before the first boundary.
    pub fn current_lap_number(&self) -> u32 {
        if self.lap_in_progress { self.lap_number } else { 0 }
    }

    fn begin_first_lap(&mut self, frame: &TelemetryFrame) {
        info!(
            counter = frame.current_lap,
            x = frame.position.x,
            z = frame.position.z,
            "Lap counter baseline set, start/finish point learned"
        );
        self.start_point = Some(frame.position);
        if self.lap_in_progress {
            // Restart the lap being timed rather than counting a new one.
            self.lap_number = self.lap_number.saturating_sub(1);
        }
        self.start_lap(frame.timestamp_ms, frame.fuel_level);
        self.stats.record(frame);
    }

    fn start_lap(&mut self, now_ms: u64, fuel: f32) {
        self.lap_in_progress = true;
        self.lap_number += 1;
        self.lap_started_ms = now_ms;
        self.lap_distance_m = 0.0;
        self.stats = LapStats { fuel_at_start: Some(fuel), last_fuel: fuel, ..LapStats::default() };
    }

    fn record_sectors(&mut self, now_ms: u64) {
        let elapsed = now_ms.saturating_sub(self.lap_started_ms);
        for (index, sector) in self.stats.sectors.iter_mut().enumerate() {
            let boundary = self.track_length_m * (index as f32 + 1.0) / 3.0;
            if sector.is_none() && self.lap_distance_m >= boundary {
                *sector = Some(elapsed);
                trace!(sector = index + 1, elapsed, "Sector boundary");
            }
        }
    }

    fn complete_lap(&mut self, now_ms: u64, natural: bool) -> LapRecord {
        let lap_time_ms = now_ms.saturating_sub(self.lap_started_ms);
        let valid = natural && !self.stats.off_track;

        let sector_times_ms = match self.stats.sectors {
            [Some(first), Some(second)] if natural => [
                Some(first),
                Some(second.saturating_sub(first)),
                Some(lap_time_ms.saturating_sub(second)),
            ],
            [first, second] => [first, second.zip(first).map(|(s, f)| s.saturating_sub(f)), None],
        };

        let personal_best = valid && self.best_lap_ms.is_none_or(|best| lap_time_ms < best);
        if personal_best {
            self.best_lap_ms = Some(lap_time_ms);
        }
        self.last_lap_ms = Some(lap_time_ms);

        LapRecord {
            lap_number: self.lap_number,
            lap_time_ms,
            valid,
            sector_times_ms,
            top_speed_kmh: self.stats.top_speed_kmh,
            avg_speed_kmh: self.stats.avg_speed_kmh(),
            fuel_consumed: self.stats.fuel_consumed(),
            telemetry_points: self.stats.points,
            completed_at: i64::try_from(now_ms)
                .ok()
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or_else(Utc::now),
            personal_best,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FrameBuilder;

    const TRACK_M: f32 = 5_000.0;

    /// Drives in a straight line from the origin, 5 m per 100 ms frame.
    struct Drive {
        ts: u64,
        x: f32,
    }

    impl Drive {
        fn new() -> Self {
            Self { ts: 0, x: 1_000.0 }
        }

        fn frame(&mut self, lap: i16) -> TelemetryFrame {
            let frame = FrameBuilder::new(self.ts)
                .position(self.x, 0.0, 0.0)
                .speed_kmh(180.0)
                .lap(lap)
                .fuel(50.0 - self.ts as f32 / 100_000.0, 100.0)
                .build();
            self.ts += 100;
            self.x += 5.0;
            frame
        }

        fn run(&mut self, detector: &mut LapDetector, lap: i16, frames: usize) -> Vec<LapRecord> {
            (0..frames).filter_map(|_| detector.update(&self.frame(lap))).collect()
        }
    }

    #[test]
    fn first_counter_increase_only_sets_baseline() {
        let mut detector = LapDetector::new(TRACK_M);
        assert!(detector.update(&FrameBuilder::new(0).lap(0).build()).is_none());
        assert_eq!(detector.current_lap_number(), 0, "stationary frames are not timed");

        let mut drive = Drive::new();
        assert!(drive.run(&mut detector, 0, 10).is_empty());
        assert_eq!(detector.current_lap_number(), 1);
        assert_eq!(detector.current_lap_time(), Some(Duration::from_millis(900)));

        assert!(drive.run(&mut detector, 1, 1).is_empty());
        assert_eq!(detector.current_lap_number(), 1);
        assert_eq!(detector.current_lap_time(), Some(Duration::ZERO));
    }

    #[test]
    fn counter_increase_completes_one_lap_with_frame_clock_time() {
        let mut detector = LapDetector::new(TRACK_M);
        let mut drive = Drive::new();

        drive.run(&mut detector, 0, 5);
        drive.run(&mut detector, 1, 1); // baseline at ts 500
        let laps = drive.run(&mut detector, 1, 600);
        assert!(laps.is_empty(), "3000 m on a 5000 m track must not complete a lap");

        let laps = drive.run(&mut detector, 2, 1); // counter at ts 60_600
        assert_eq!(laps.len(), 1);
        let lap = &laps[0];
        assert_eq!(lap.lap_number, 1);
        assert_eq!(lap.lap_time_ms, 60_100);
        assert!(lap.valid);
        assert!(lap.personal_best);
        assert_eq!(lap.telemetry_points, 602);
        assert_eq!(lap.top_speed_kmh, 180.0);
        assert!((lap.avg_speed_kmh - 180.0).abs() < 1e-3);
        assert!(lap.fuel_consumed > 0.0);
        assert_eq!(lap.sector_times_ms[0], Some(33_400));
        assert_eq!(lap.sector_times_ms[2], None);

        assert_eq!(detector.last_lap_time(), Some(Duration::from_millis(60_100)));
        assert_eq!(detector.best_lap_time(), Some(Duration::from_millis(60_100)));
        assert_eq!(detector.current_lap_number(), 2);
    }

    #[test]
    fn distance_alone_completes_a_lap() {
        let mut detector = LapDetector::new(1_000.0);
        let mut drive = Drive::new();

        drive.run(&mut detector, 0, 1);
        drive.run(&mut detector, 1, 1);
        // 5 m per frame: the 201st step passes 1000 m.
        let laps = drive.run(&mut detector, 1, 201);
        assert_eq!(laps.len(), 1);
        assert_eq!(laps[0].lap_time_ms, 20_100);
        assert_eq!(laps[0].sector_times_ms.iter().flatten().count(), 3);
    }

    #[test]
    fn distance_completes_laps_when_counter_never_moves() {
        let mut detector = LapDetector::new(TRACK_M);
        let mut drive = Drive::new();

        // 6.5 km with the counter stuck at zero.
        let laps = drive.run(&mut detector, 0, 1_300);
        assert_eq!(laps.len(), 1);
        assert_eq!(laps[0].lap_number, 1);
        // Timed from the first frame; the 1001st step passes 5000 m.
        assert_eq!(laps[0].lap_time_ms, 100_100);
        assert!(laps[0].valid);
        assert_eq!(detector.current_lap_number(), 2);
        assert!(detector.start_point.is_none(), "only the counter teaches the start point");
    }

    #[test]
    fn position_fires_near_learned_start_point() {
        let mut detector = LapDetector::new(1_000.0);
        let radius = 1_000.0 / std::f32::consts::TAU;
        let frame_at = |ts: u64, phase: f32, lap: i16| {
            let angle = phase * std::f32::consts::TAU;
            FrameBuilder::new(ts)
                .position(radius * angle.cos(), 0.0, radius * angle.sin())
                .speed_kmh(100.0)
                .lap(lap)
                .build()
        };

        assert!(detector.update(&frame_at(0, 0.99, 0)).is_none());
        assert!(detector.update(&frame_at(100, 0.0, 1)).is_none());

        // 4 m steps; the counter never moves again.
        let mut completed = None;
        for i in 1..=250u64 {
            if let Some(lap) = detector.update(&frame_at(100 + i * 100, i as f32 * 0.004, 1)) {
                completed = Some((i, lap));
                break;
            }
        }
        let (i, lap) = completed.expect("position detector fires");
        // Fires once over 90 % of the lap and within 50 m of the line.
        assert!((226..=240).contains(&i), "fired at step {i}");
        assert_eq!(lap.lap_number, 1);
    }

    #[test]
    fn teleports_and_stationary_jitter_are_not_counted() {
        let mut detector = LapDetector::new(TRACK_M);
        let base = |ts: u64, x: f32, speed: f32| {
            FrameBuilder::new(ts).position(x, 0.0, 0.0).speed_kmh(speed).lap(1).build()
        };
        detector.update(&FrameBuilder::new(0).lap(0).build());
        detector.update(&base(100, 0.0, 100.0));

        // Teleport far beyond the track length.
        assert!(detector.update(&base(200, 6_000.0, 100.0)).is_none());
        // Stationary jitter.
        for i in 0..100 {
            let x = 6_000.0 + if i % 2 == 0 { 40.0 } else { 0.0 };
            assert!(detector.update(&base(300 + i * 100, x, 1.0)).is_none());
        }
        assert_eq!(detector.current_lap_number(), 1);
    }

    #[test]
    fn off_track_lap_is_invalid_and_not_best() {
        let mut detector = LapDetector::new(TRACK_M);
        detector.update(&FrameBuilder::new(0).lap(0).build());
        detector.update(&FrameBuilder::new(100).lap(1).build());
        detector.update(&FrameBuilder::new(30_000).lap(1).on_track(false).build());

        let lap = detector.update(&FrameBuilder::new(60_000).lap(2).build()).expect("lap");
        assert!(!lap.valid);
        assert!(!lap.personal_best);
        assert_eq!(detector.best_lap_time(), None);
        assert_eq!(detector.last_lap_time(), Some(Duration::from_millis(59_900)));
    }

    #[test]
    fn minimum_duration_guard_suppresses_double_trigger() {
        let frames = [
            FrameBuilder::new(0).lap(0).build(),
            FrameBuilder::new(1_000).lap(1).build(),
            FrameBuilder::new(61_000).lap(2).build(),
            // Counter glitch right after the line.
            FrameBuilder::new(62_000).lap(3).build(),
        ];

        let mut unguarded = LapDetector::new(TRACK_M);
        let laps: Vec<_> = frames.iter().filter_map(|f| unguarded.update(f)).collect();
        assert_eq!(laps.len(), 2);
        assert_eq!(laps[1].lap_time_ms, 1_000);

        let mut guarded = LapDetector::new(TRACK_M).with_min_lap_duration(Some(Duration::from_secs(10)));
        let laps: Vec<_> = frames.iter().filter_map(|f| guarded.update(f)).collect();
        assert_eq!(laps.len(), 1);
        assert_eq!(laps[0].lap_time_ms, 60_000);
    }

    #[test]
    fn finalize_produces_invalid_partial_lap_once() {
        let mut detector = LapDetector::new(TRACK_M);
        detector.update(&FrameBuilder::new(0).lap(0).build());
        detector.update(&FrameBuilder::new(1_000).lap(1).build());
        detector.update(&FrameBuilder::new(5_000).lap(1).build());

        let lap = detector.finalize(6_000).expect("partial lap");
        assert!(!lap.valid);
        assert_eq!(lap.lap_time_ms, 5_000);
        assert!(detector.finalize(7_000).is_none());
        assert_eq!(detector.current_lap_number(), 0);

        // The next line crossing restarts timing.
        assert!(detector.update(&FrameBuilder::new(8_000).lap(2).build()).is_none());
        assert_eq!(detector.current_lap_number(), 2);
        assert_eq!(detector.current_lap_time(), Some(Duration::ZERO));
    }

    #[test]
    fn reset_uses_track_lookup_and_keeps_guard() {
        let mut detector = LapDetector::new(TRACK_M).with_min_lap_duration(Some(Duration::from_secs(5)));
        detector.update(&FrameBuilder::new(0).lap(0).build());
        detector.update(&FrameBuilder::new(100).lap(1).build());

        detector.reset(Some("Suzuka Circuit"));
        assert_eq!(detector.track_length_m(), 5_807.0);
        assert_eq!(detector.current_lap_number(), 0);
        assert_eq!(detector.min_lap_duration, Some(Duration::from_secs(5)));

        detector.reset(None);
        assert_eq!(detector.track_length_m(), 5_807.0);
    }
}
