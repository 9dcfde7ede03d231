//! Background upload of one stored session

use std::sync::Arc;

use chrono::DateTime;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{CompactPoint, RemoteSink, SessionMetadata};
use crate::storage::SessionRepository;
use crate::types::{ClientEvent, Session, SyncStatus};
use crate::{Result, TelemetryError};

/// Uploads one stored session per call.
///
/// The telemetry is read from storage once, up front, so a recording that
/// starts while the upload runs never interleaves with it. Local data is never
/// modified beyond the session's sync status and remote id, so a failed
/// upload can simply be retried.
#[derive(Clone)]
pub struct Uploader {
    repository: SessionRepository,
    sink: Arc<dyn RemoteSink>,
    batch_size: usize,
    events: Option<broadcast::Sender<ClientEvent>>,
}

impl Uploader {
    pub fn new(repository: SessionRepository, sink: Arc<dyn RemoteSink>, batch_size: usize) -> Self {
        Self { repository, sink, batch_size: batch_size.max(1), events: None }
    }

    /// Report progress and status changes on `events`.
    pub fn with_events(mut self, events: broadcast::Sender<ClientEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run [`upload`](Self::upload) on its own task.
    pub fn spawn(self, session_id: String) -> JoinHandle<Result<Session>> {
        tokio::spawn(async move { self.upload(&session_id).await })
    }

    /// Upload `session_id`. Already uploaded sessions are returned unchanged.
    pub async fn upload(&self, session_id: &str) -> Result<Session> {
        let mut session = self
            .repository
            .load_session(session_id)?
            .ok_or_else(|| TelemetryError::precondition(format!("unknown session {session_id}")))?;
        if !session.is_finished() {
            if self.repository.is_live(session_id) {
                return Err(TelemetryError::precondition(format!(
                    "session {session_id} is still recording"
                )));
            }
            self.close_orphan(&mut session)?;
        }
        if session.sync_status == SyncStatus::Uploaded {
            debug!(session_id, "Session already uploaded");
            return Ok(session);
        }

        self.set_status(&mut session, SyncStatus::Uploading)?;
        info!(session_id, "Upload started");

        match self.send(&session).await {
            Ok(remote_id) => {
                session.remote_id = Some(remote_id);
                self.set_status(&mut session, SyncStatus::Uploaded)?;
                info!(session_id, remote_id = ?session.remote_id, "Upload finished");
                Ok(session)
            }
            Err(e) => {
                warn!(session_id, error = %e, "Upload failed, local data kept for retry");
                if let Err(persist) = self.set_status(&mut session, SyncStatus::Failed) {
                    warn!(session_id, error = %persist, "Could not persist failed sync status");
                }
                Err(e)
            }
        }
    }

    async fn send(&self, session: &Session) -> Result<String> {
        let frames = self.repository.chunk_log(&session.id).read_all()?;
        let points: Vec<CompactPoint> = frames.iter().map(CompactPoint::from).collect();

        let remote_id = self.sink.create_session(&SessionMetadata::from(session)).await?;
        debug!(session_id = %session.id, remote_id = %remote_id, points = points.len(), "Remote session created");

        let batches = points.len().div_ceil(self.batch_size);
        if batches == 0 {
            self.emit(ClientEvent::UploadProgress { session_id: session.id.clone(), percent: 100.0 });
        }
        for (index, batch) in points.chunks(self.batch_size).enumerate() {
            self.sink.append_telemetry(&remote_id, batch).await?;
            let percent = (index + 1) as f32 / batches as f32 * 100.0;
            self.emit(ClientEvent::UploadProgress { session_id: session.id.clone(), percent });
        }
        Ok(remote_id)
    }

    /// End a session whose recorder went away without a final write, at the
    /// last frame that reached storage.
    fn close_orphan(&self, session: &mut Session) -> Result<()> {
        let frames = self.repository.chunk_log(&session.id).read_all()?;
        let ended_at = frames
            .last()
            .and_then(|frame| i64::try_from(frame.timestamp_ms).ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(session.started_at);
        warn!(session_id = %session.id, %ended_at, "Closing session left open by its recorder");
        session.ended_at = Some(ended_at);
        session.telemetry_points = frames.len() as u64;
        Ok(())
    }

    fn set_status(&self, session: &mut Session, status: SyncStatus) -> Result<()> {
        session.sync_status = status;
        self.repository.save_session(session)?;
        self.emit(ClientEvent::SyncStatusChanged { session_id: session.id.clone(), status });
        Ok(())
    }

    fn emit(&self, event: ClientEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
