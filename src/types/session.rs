//! Recorded sessions and their laps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upload lifecycle of a recorded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Pending,
    Uploading,
    Uploaded,
    Failed,
}

/// One completed lap. Created once per detected boundary and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub lap_number: u32,
    pub lap_time_ms: u64,
    /// False for laps cut short by `stop` or driven partly off track
    pub valid: bool,
    /// Splits at one and two thirds of the estimated track length
    pub sector_times_ms: [Option<u64>; 3],
    pub top_speed_kmh: f32,
    pub avg_speed_kmh: f32,
    pub fuel_consumed: f32,
    pub telemetry_points: u32,
    pub completed_at: DateTime<Utc>,
    /// Fastest lap seen by the detector at the time of completion
    pub personal_best: bool,
}

/// A recording from `start_recording` to `stop_recording`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub track_id: String,
    pub car_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub laps: Vec<LapRecord>,
    /// Lap number of the fastest valid lap
    pub best_lap: Option<u32>,
    pub sample_rate_hz: u32,
    pub telemetry_points: u64,
    pub sync_status: SyncStatus,
    /// Identifier assigned by the upload target
    #[serde(default)]
    pub remote_id: Option<String>,
}

impl Session {
    /// Create a fresh session with a generated identifier.
    pub fn new(track_id: impl Into<String>, car_id: impl Into<String>, sample_rate_hz: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            track_id: track_id.into(),
            car_id: car_id.into(),
            started_at: Utc::now(),
            ended_at: None,
            laps: Vec::new(),
            best_lap: None,
            sample_rate_hz,
            telemetry_points: 0,
            sync_status: SyncStatus::Pending,
            remote_id: None,
        }
    }

    /// Append a lap and update the best-lap reference.
    pub fn push_lap(&mut self, lap: LapRecord) {
        let is_best = lap.valid
            && self.best_lap_record().is_none_or(|best| lap.lap_time_ms < best.lap_time_ms);
        if is_best {
            self.best_lap = Some(lap.lap_number);
        }
        self.laps.push(lap);
    }

    pub fn best_lap_record(&self) -> Option<&LapRecord> {
        let number = self.best_lap?;
        self.laps.iter().find(|lap| lap.lap_number == number)
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }
}
