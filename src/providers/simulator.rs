//! Simulation provider
//!
//! Drives a car around a circular track at constant speed and emits sealed
//! datagrams, so simulated frames take the same cipher and parser path as
//! console traffic. The track circumference equals the configured track
//! length and the start/finish line sits at phase zero.

use std::f32::consts::TAU;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::cipher;
use crate::lap::tracks;
use crate::protocol::{PacketType, encode};
use crate::provider::{Provider, RawDatagram};
use crate::types::{Corners, SimulatorFlags, TelemetryFrame, TireState, Vec3, simulator_flags};
use crate::{Result, TelemetryError};

/// Slack applied when deciding whether the car has reached the line.
const LINE_TOLERANCE_M: f64 = 1e-3;

/// Settings for [`SimulatorProvider`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Track name, used for the length lookup
    pub track: String,
    /// Overrides the looked-up track length
    pub track_length_m: Option<f32>,
    pub speed_kmh: f32,
    /// Frames per second
    pub tick_rate_hz: f64,
    pub packet_type: PacketType,
    /// Lap phase at the first frame, in `[0, 1)`
    pub start_phase: f32,
    /// Stop after this many completed laps
    pub lap_limit: Option<u32>,
    pub car_code: i32,
    /// Milliseconds since the Unix epoch for the first frame; `None` uses the wall clock
    pub start_time_ms: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            track: "Tsukuba Circuit".to_string(),
            track_length_m: None,
            speed_kmh: 180.0,
            tick_rate_hz: 60.0,
            packet_type: PacketType::Type1,
            start_phase: 0.95,
            lap_limit: None,
            car_code: 3_383,
            start_time_ms: None,
        }
    }
}

impl SimulatorConfig {
    pub fn track_length(&self) -> f32 {
        self.track_length_m.unwrap_or_else(|| tracks::track_length(&self.track))
    }

    /// Time one lap takes at the configured speed.
    pub fn lap_duration(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.track_length()) / f64::from(self.speed_kmh / 3.6))
    }

    fn validate(&self) -> Result<()> {
        if !(self.speed_kmh > 0.0) {
            return Err(TelemetryError::config_error("simulator speed_kmh must be positive"));
        }
        if !(self.tick_rate_hz > 0.0) {
            return Err(TelemetryError::config_error("simulator tick_rate_hz must be positive"));
        }
        if !(self.track_length() > 0.0) {
            return Err(TelemetryError::config_error("simulator track length must be positive"));
        }
        if !(0.0..1.0).contains(&self.start_phase) {
            return Err(TelemetryError::config_error("simulator start_phase must be in [0, 1)"));
        }
        Ok(())
    }
}

/// Provider that synthesizes a steady lap around a circular track
pub struct SimulatorProvider {
    config: SimulatorConfig,
    interval: Interval,
    track_length: f32,
    /// Metres travelled per frame
    step_m: f64,
    frame_ms: f64,
    start_ms: u64,
    tick: u64,
    /// Distance from the start line of lap zero
    distance_m: f64,
    phase: f32,
    lap_counter: i16,
    lap_started_ms: Option<u64>,
    last_lap_ms: Option<u32>,
    best_lap_ms: Option<u32>,
    fuel: f32,
    finished: bool,
    heartbeats: u64,
}

impl SimulatorProvider {
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;

        let track_length = config.track_length();
        let frame_secs = 1.0 / config.tick_rate_hz;
        let step_m = f64::from(config.speed_kmh) / 3.6 * frame_secs;
        let mut interval = interval(Duration::from_secs_f64(frame_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let start_ms =
            config.start_time_ms.unwrap_or_else(|| Utc::now().timestamp_millis().max(0) as u64);

        info!(
            track = %config.track,
            track_length,
            speed_kmh = config.speed_kmh,
            rate_hz = config.tick_rate_hz,
            "Simulator started"
        );

        Ok(Self {
            distance_m: f64::from(config.start_phase) * f64::from(track_length),
            phase: config.start_phase,
            config,
            interval,
            track_length,
            step_m,
            frame_ms: frame_secs * 1_000.0,
            start_ms,
            tick: 0,
            lap_counter: 0,
            lap_started_ms: None,
            last_lap_ms: None,
            best_lap_ms: None,
            fuel: 100.0,
            finished: false,
            heartbeats: 0,
        })
    }

    /// Heartbeats received so far.
    pub fn heartbeats(&self) -> u64 {
        self.heartbeats
    }

    fn completed_laps(&self) -> u32 {
        self.lap_counter.max(1) as u32 - 1
    }

    /// Advance one frame and build it.
    fn step(&mut self) -> TelemetryFrame {
        let now_ms = self.start_ms + (self.tick as f64 * self.frame_ms).round() as u64;
        if self.tick > 0 {
            self.distance_m += self.step_m;
        }
        self.tick += 1;

        let length = f64::from(self.track_length);
        let laps = ((self.distance_m + LINE_TOLERANCE_M) / length).floor();
        self.phase = (self.distance_m / length - laps).max(0.0) as f32;

        let counter = laps.min(f64::from(i16::MAX)) as i16;
        if counter > self.lap_counter {
            self.lap_counter = counter;
            if let Some(started) = self.lap_started_ms {
                let lap_ms = now_ms.saturating_sub(started).min(u64::from(u32::MAX)) as u32;
                self.last_lap_ms = Some(lap_ms);
                self.best_lap_ms = Some(self.best_lap_ms.map_or(lap_ms, |best| best.min(lap_ms)));
                debug!(lap = self.lap_counter, lap_ms, "Simulated lap completed");
            }
            self.lap_started_ms = Some(now_ms);
        }

        let radius = self.track_length / TAU;
        let angle = self.phase * TAU;
        let speed_mps = self.config.speed_kmh / 3.6;
        // Small throttle and rpm wobble so recorded traces are not flat.
        let wobble = (angle * 6.0).sin();

        self.fuel = (self.fuel - 0.000_5).max(0.0);

        let tire = TireState {
            temperature_c: 78.0 + 4.0 * wobble,
            wheel_rps: speed_mps / (TAU * 0.33),
            radius_m: 0.33,
            suspension_height_m: 0.08,
        };

        TelemetryFrame {
            packet_id: self.tick.min(i32::MAX as u64) as i32,
            timestamp_ms: now_ms,
            position: Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin()),
            velocity: Vec3::new(-speed_mps * angle.sin(), 0.0, speed_mps * angle.cos()),
            angular_velocity: Vec3::new(0.0, speed_mps / radius, 0.0),
            body_height_m: 0.11,
            speed_kmh: self.config.speed_kmh,
            rpm: 6_500.0 + 500.0 * wobble,
            gear: 4,
            throttle: (0.85 + 0.15 * wobble).clamp(0.0, 1.0),
            brake: 0.0,
            tires: Corners::from_array([tire; 4]),
            fuel_level: self.fuel,
            fuel_capacity: 100.0,
            oil_pressure: 4.5,
            water_temp_c: 85.0,
            oil_temp_c: 105.0,
            current_lap: self.lap_counter,
            best_lap_ms: self.best_lap_ms,
            last_lap_ms: self.last_lap_ms,
            time_of_day_ms: (now_ms % 86_400_000) as u32,
            race_position: 1,
            cars_in_race: 1,
            min_alert_rpm: 7_000,
            max_alert_rpm: 7_800,
            top_speed_kmh: 260,
            flags: SimulatorFlags::default()
                .with(simulator_flags::CAR_ON_TRACK, true)
                .with(simulator_flags::IN_GEAR, true),
            lap_distance_m: Some(self.phase * self.track_length),
            car_code: self.config.car_code,
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl Provider for SimulatorProvider {
    async fn next_datagram(&mut self) -> Result<Option<RawDatagram>> {
        if self.finished {
            return Ok(None);
        }

        self.interval.tick().await;

        let frame = self.step();
        if let Some(limit) = self.config.lap_limit
            && self.completed_laps() >= limit
        {
            info!(laps = limit, "Simulator reached lap limit");
            self.finished = true;
        }

        trace!(packet_id = frame.packet_id, phase = self.phase, "Simulated frame");

        let packet_type = self.config.packet_type;
        // Vary the IV per frame like the console does.
        let iv = (self.tick as u32).wrapping_mul(0x9E37_79B9);
        let datagram = cipher::seal_datagram(&encode(&frame, packet_type), iv, packet_type);

        let raw = RawDatagram::new(datagram, frame.timestamp_ms);
        Ok(Some(match frame.lap_distance_m {
            Some(distance) => raw.with_lap_distance(distance),
            None => raw,
        }))
    }

    async fn heartbeat(&mut self) -> Result<()> {
        self.heartbeats += 1;
        trace!(count = self.heartbeats, "Simulator heartbeat");
        Ok(())
    }

    fn tick_rate(&self) -> f64 {
        self.config.tick_rate_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_datagram;

    fn config() -> SimulatorConfig {
        SimulatorConfig {
            track: "Test Oval".to_string(),
            track_length_m: Some(1_000.0),
            speed_kmh: 360.0,
            tick_rate_hz: 10.0,
            start_phase: 0.9,
            start_time_ms: Some(1_000_000),
            ..SimulatorConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn frames_decode_and_counter_increments_at_start_line() {
        let mut provider = SimulatorProvider::new(config()).expect("valid config");

        let mut frames = Vec::new();
        for _ in 0..120 {
            let raw = provider.next_datagram().await.expect("ok").expect("datagram");
            let frame = decode_datagram(&raw.bytes, raw.received_at_ms).expect("decodes");
            assert!(raw.lap_distance_m.is_some());
            frames.push(frame);
        }

        // 100 m/s at 10 Hz is 10 m per frame; 100 m to the line from phase 0.9.
        assert_eq!(frames[0].current_lap, 0);
        assert_eq!(frames[10].current_lap, 1);
        assert_eq!(frames[9].current_lap, 0);
        assert_eq!(frames[110].current_lap, 2);
        assert_eq!(frames[110].last_lap_ms, Some(10_000));
        assert_eq!(frames[1].timestamp_ms - frames[0].timestamp_ms, 100);
        assert!((frames[10].position.x - 1_000.0 / TAU).abs() < 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn lap_limit_ends_the_feed() {
        let mut provider =
            SimulatorProvider::new(SimulatorConfig { lap_limit: Some(1), ..config() }).expect("valid");

        let mut count = 0;
        while provider.next_datagram().await.expect("ok").is_some() {
            count += 1;
            assert!(count < 1_000, "simulator never stopped");
        }
        // Baseline crossing at frame 10, first completed lap 100 frames later.
        assert_eq!(count, 111);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = SimulatorProvider::new(SimulatorConfig { speed_kmh: 0.0, ..config() });
        assert!(matches!(result, Err(TelemetryError::Config { .. })));
        let result = SimulatorProvider::new(SimulatorConfig { start_phase: 1.0, ..config() });
        assert!(matches!(result, Err(TelemetryError::Config { .. })));
    }

    #[test]
    fn lap_duration_follows_speed() {
        assert_eq!(config().lap_duration(), Duration::from_secs(10));
        assert_eq!(
            SimulatorConfig { track: "Tsukuba Circuit".into(), ..SimulatorConfig::default() }.track_length(),
            2_045.0
        );
    }
}
