//! Session recording
//!
//! [`SessionRecorder`] turns the decoded frame feed into a persisted
//! [`Session`]: frames are down-sampled, buffered and written in chunks, laps
//! are appended as they complete and the session record is rewritten after
//! every change so a crash loses at most one unflushed chunk.

mod sampler;

pub use sampler::SampleRateLimiter;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::storage::{ChunkLog, RecordingLease, SessionRepository};
use crate::types::{ConnectionStatus, LapRecord, Session, TelemetryFrame};
use crate::{Result, TelemetryError};

struct ActiveRecording {
    session: Session,
    chunks: ChunkLog,
    buffer: Vec<TelemetryFrame>,
    sampler: SampleRateLimiter,
    _lease: RecordingLease,
}

/// Records one session at a time.
pub struct SessionRecorder {
    repository: SessionRepository,
    sample_rate_hz: u32,
    chunk_size: usize,
    active: Option<ActiveRecording>,
}

impl SessionRecorder {
    pub fn new(repository: SessionRepository, sample_rate_hz: u32, chunk_size: usize) -> Self {
        Self { repository, sample_rate_hz, chunk_size: chunk_size.max(1), active: None }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// The session being recorded, if any.
    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref().map(|active| &active.session)
    }

    /// Frames kept but not yet written.
    pub fn buffered(&self) -> usize {
        self.active.as_ref().map_or(0, |active| active.buffer.len())
    }

    /// Begin a new session.
    ///
    /// Fails without side effects when the link is not connected, a recording
    /// is already running, or the initial session record cannot be written.
    pub fn start(&mut self, status: ConnectionStatus, track_id: &str, car_id: &str) -> Result<Session> {
        if status != ConnectionStatus::Connected {
            return Err(TelemetryError::precondition(format!(
                "cannot start recording while {status:?}"
            )));
        }
        if let Some(active) = &self.active {
            return Err(TelemetryError::precondition(format!(
                "session {} is already recording",
                active.session.id
            )));
        }

        let session = Session::new(track_id, car_id, self.sample_rate_hz);
        self.repository.save_session(&session)?;
        info!(session_id = %session.id, track = track_id, car = car_id, "Recording started");

        self.active = Some(ActiveRecording {
            _lease: self.repository.claim(&session.id),
            chunks: self.repository.chunk_log(&session.id),
            session: session.clone(),
            buffer: Vec::with_capacity(self.chunk_size),
            sampler: SampleRateLimiter::new(self.sample_rate_hz),
        });
        Ok(session)
    }

    /// Offer one frame. Returns an error only when a due flush failed; the
    /// frames stay buffered for the next attempt.
    pub fn record_frame(&mut self, frame: &TelemetryFrame) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        if !active.sampler.accept(frame.timestamp_ms) {
            return Ok(());
        }
        active.buffer.push(frame.clone());
        active.session.telemetry_points += 1;

        if active.buffer.len() >= self.chunk_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Append a completed lap and persist the session record.
    pub fn record_lap(&mut self, lap: LapRecord) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        debug!(session_id = %active.session.id, lap = lap.lap_number, "Lap recorded");
        active.session.push_lap(lap);
        self.repository.save_session(&active.session)
    }

    /// Write buffered frames as the next chunk and rewrite the session record.
    pub fn flush(&mut self) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        if !active.buffer.is_empty() {
            if let Err(e) = active.chunks.append(&active.buffer) {
                warn!(
                    session_id = %active.session.id,
                    buffered = active.buffer.len(),
                    error = %e,
                    "Chunk write failed, keeping frames for the next flush"
                );
                return Err(e);
            }
            active.buffer.clear();
        }
        self.repository.save_session(&active.session)
    }

    /// Finish the session.
    ///
    /// `partial_lap` is the force-finalized lap in progress, if any. Returns
    /// `Ok(None)` when nothing is recording. If the final write fails the
    /// recording stays active so `stop` can be retried.
    pub fn stop(&mut self, partial_lap: Option<LapRecord>) -> Result<Option<Session>> {
        let Some(active) = self.active.as_mut() else {
            debug!("Stop requested with no active recording");
            return Ok(None);
        };

        if active.session.ended_at.is_none() {
            active.session.ended_at = Some(Utc::now());
            if let Some(lap) = partial_lap {
                active.session.push_lap(lap);
            }
        }
        self.flush()?;

        let Some(active) = self.active.take() else {
            return Ok(None);
        };
        info!(
            session_id = %active.session.id,
            laps = active.session.laps.len(),
            points = active.session.telemetry_points,
            "Recording stopped"
        );
        Ok(Some(active.session))
    }
}
