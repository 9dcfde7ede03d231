//! Lifecycle events broadcast to subscribers

use std::sync::Arc;

use super::{LapRecord, Session, SyncStatus, TelemetryFrame};

/// Events emitted by the client, in the order they happened.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    Error { message: String },
    /// Non-fatal condition such as a silent feed
    Warning { message: String },
    Telemetry(Arc<TelemetryFrame>),
    LapCompleted(LapRecord),
    RecordingStarted { session_id: String },
    RecordingStopped { session: Box<Session> },
    UploadProgress { session_id: String, percent: f32 },
    SyncStatusChanged { session_id: String, status: SyncStatus },
}

impl ClientEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Connected => "connected",
            ClientEvent::Disconnected => "disconnected",
            ClientEvent::Error { .. } => "error",
            ClientEvent::Warning { .. } => "warning",
            ClientEvent::Telemetry(_) => "telemetry",
            ClientEvent::LapCompleted(_) => "lapCompleted",
            ClientEvent::RecordingStarted { .. } => "recordingStarted",
            ClientEvent::RecordingStopped { .. } => "recordingStopped",
            ClientEvent::UploadProgress { .. } => "uploadProgress",
            ClientEvent::SyncStatusChanged { .. } => "syncStatusChange",
        }
    }
}
