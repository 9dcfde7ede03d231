//! Connection lifecycle state shared with every consumer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of the link to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Snapshot of the protocol client's state.
///
/// Only the driver task writes it; readers observe it through a watch channel.
/// `ConnectionState::default()` is the zero value restored on disconnect.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Arrival time of the most recent datagram
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub packet_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub(crate) fn connecting() -> Self {
        Self { status: ConnectionStatus::Connecting, ..Self::default() }
    }

    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self { status: ConnectionStatus::Error, last_error: Some(message.into()), ..Self::default() }
    }
}
