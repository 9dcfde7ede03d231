//! Client configuration
//!
//! Every field has a default, so a YAML file only needs the keys it changes:
//!
//! ```rust
//! use slipstream::ClientConfig;
//!
//! let config = ClientConfig::from_yaml_str("console_addr: 192.168.1.40\nsample_rate_hz: 10\n")?;
//! assert_eq!(config.sample_rate_hz, 10);
//! assert_eq!(config.recv_port, 33740);
//! # Ok::<(), slipstream::TelemetryError>(())
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{PacketType, RECV_PORT, SEND_PORT};
use crate::{Result, TelemetryError};

/// Settings for the protocol client, recorder and uploader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Console address heartbeats are sent to; broadcast reaches any console on the LAN
    pub console_addr: IpAddr,
    /// Local address the receive socket binds to
    pub bind_addr: IpAddr,
    pub recv_port: u16,
    pub send_port: u16,
    /// Layout requested through the heartbeat byte
    pub packet_type: PacketType,
    pub heartbeat_interval_ms: u64,
    /// Silence after which a "connection unstable" warning is emitted
    pub liveness_timeout_ms: u64,
    /// Frames per second retained by the recorder
    pub sample_rate_hz: u32,
    /// Frames per persisted chunk
    pub chunk_size: usize,
    /// Telemetry points per upload request
    pub upload_batch_size: usize,
    /// Laps shorter than this are ignored by the lap detector; off unless set
    pub min_lap_duration_ms: Option<u64>,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            console_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            recv_port: RECV_PORT,
            send_port: SEND_PORT,
            packet_type: PacketType::Type1,
            heartbeat_interval_ms: 1_000,
            liveness_timeout_ms: 5_000,
            sample_rate_hz: 20,
            chunk_size: 500,
            upload_batch_size: 500,
            min_lap_duration_ms: None,
            event_capacity: 1_024,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ClientConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| TelemetryError::config_error(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            TelemetryError::config_error(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Reject values that would stall the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate_hz == 0 {
            return Err(TelemetryError::config_error("sample_rate_hz must be greater than zero"));
        }
        if self.chunk_size == 0 {
            return Err(TelemetryError::config_error("chunk_size must be greater than zero"));
        }
        if self.upload_batch_size == 0 {
            return Err(TelemetryError::config_error("upload_batch_size must be greater than zero"));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(TelemetryError::config_error("heartbeat_interval_ms must be greater than zero"));
        }
        if self.event_capacity == 0 {
            return Err(TelemetryError::config_error("event_capacity must be greater than zero"));
        }
        Ok(())
    }

    pub fn bind_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.recv_port)
    }

    pub fn console_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.console_addr, self.send_port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn min_lap_duration(&self) -> Option<Duration> {
        self.min_lap_duration_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ClientConfig::from_yaml_str(
            "console_addr: 10.0.0.7\npacket_type: type3\n",
        )
        .expect("valid config");

        assert_eq!(config.console_addr, "10.0.0.7".parse::<IpAddr>().unwrap());
        assert_eq!(config.packet_type, PacketType::Type3);
        assert_eq!(config.min_lap_duration(), None);
        assert_eq!(config.recv_port, RECV_PORT);
        assert_eq!(config.console_socket_addr().port(), SEND_PORT);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
    }

    #[test]
    fn minimum_lap_duration_is_opt_in() {
        assert_eq!(ClientConfig::default().min_lap_duration(), None);

        let config = ClientConfig::from_yaml_str("min_lap_duration_ms: 8000\n").expect("valid config");
        assert_eq!(config.min_lap_duration(), Some(Duration::from_secs(8)));
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let result = ClientConfig::from_yaml_str("sample_rate_hz: 0\n");
        assert!(matches!(result, Err(TelemetryError::Config { .. })));
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let result = ClientConfig::load("/nonexistent/slipstream.yaml");
        assert!(matches!(result, Err(TelemetryError::Config { .. })));
    }
}
