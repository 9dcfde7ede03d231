//! Upload of finished sessions to a remote collaborator.
//!
//! The remote side is abstracted by [`RemoteSink`]; [`Uploader`] drives one
//! upload attempt, reporting progress and persisting the session's
//! [`SyncStatus`](crate::SyncStatus) as it goes.

mod uploader;

pub use uploader::Uploader;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::types::{LapRecord, Session, TelemetryFrame};

/// Session summary sent when the remote session is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub track_id: String,
    pub car_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub sample_rate_hz: u32,
    pub telemetry_points: u64,
    pub best_lap_ms: Option<u64>,
    pub laps: Vec<LapRecord>,
}

impl From<&Session> for SessionMetadata {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            track_id: session.track_id.clone(),
            car_id: session.car_id.clone(),
            started_at: session.started_at,
            ended_at: session.ended_at,
            sample_rate_hz: session.sample_rate_hz,
            telemetry_points: session.telemetry_points,
            best_lap_ms: session.best_lap_record().map(|lap| lap.lap_time_ms),
            laps: session.laps.clone(),
        }
    }
}

/// Reduced frame used on the wire to the remote collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompactPoint {
    pub timestamp_ms: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub speed_kmh: f32,
    pub rpm: f32,
    pub gear: u8,
    pub throttle: f32,
    pub brake: f32,
    pub steering: Option<f32>,
    pub lap: i16,
    pub lap_distance_m: Option<f32>,
}

impl From<&TelemetryFrame> for CompactPoint {
    fn from(frame: &TelemetryFrame) -> Self {
        Self {
            timestamp_ms: frame.timestamp_ms,
            x: frame.position.x,
            y: frame.position.y,
            z: frame.position.z,
            speed_kmh: frame.speed_kmh,
            rpm: frame.rpm,
            gear: frame.gear,
            throttle: frame.throttle,
            brake: frame.brake,
            steering: frame.steering,
            lap: frame.current_lap,
            lap_distance_m: frame.lap_distance_m,
        }
    }
}

/// Remote collaborator that accepts finished sessions.
#[async_trait::async_trait]
pub trait RemoteSink: Send + Sync + 'static {
    /// Create the remote session and return its identifier.
    async fn create_session(&self, metadata: &SessionMetadata) -> Result<String>;

    /// Append one batch of points to a remote session.
    async fn append_telemetry(&self, remote_id: &str, points: &[CompactPoint]) -> Result<()>;
}
