//! UDP provider talking to a real console

use std::net::SocketAddr;

use chrono::Utc;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

use crate::config::ClientConfig;
use crate::protocol::{MAX_PACKET_SIZE, PacketType};
use crate::provider::{Provider, RawDatagram};
use crate::{Result, TelemetryError};

/// Native broadcast rate of the console.
const CONSOLE_TICK_RATE: f64 = 60.0;

/// Provider that owns the receive socket and sends heartbeats to the console
pub struct UdpProvider {
    socket: UdpSocket,
    console: SocketAddr,
    packet_type: PacketType,
    buf: Vec<u8>,
}

impl UdpProvider {
    /// Bind the receive socket.
    ///
    /// No heartbeat is sent here; the driver sends the first one as soon as it
    /// takes ownership so the feed starts with the heartbeat timer.
    pub async fn bind(config: &ClientConfig) -> Result<Self> {
        let bind_addr = config.bind_socket_addr();
        let socket = UdpSocket::bind(bind_addr).await.map_err(|e| {
            TelemetryError::connection_failed_with_source(
                format!("cannot bind UDP socket on {bind_addr}"),
                Box::new(e),
            )
        })?;

        let console = config.console_socket_addr();
        if console.ip().is_unspecified() {
            return Err(TelemetryError::config_error("console_addr must not be unspecified"));
        }
        if is_broadcast(&console) {
            socket
                .set_broadcast(true)
                .map_err(|e| TelemetryError::socket_error("enable broadcast", e))?;
        }

        info!(
            local = %socket.local_addr().map_err(|e| TelemetryError::socket_error("local_addr", e))?,
            console = %console,
            packet_type = ?config.packet_type,
            "UDP telemetry socket bound"
        );

        Ok(Self {
            socket,
            console,
            packet_type: config.packet_type,
            buf: vec![0u8; MAX_PACKET_SIZE + 64],
        })
    }

    /// Address the receive socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|e| TelemetryError::socket_error("local_addr", e))
    }
}

fn is_broadcast(addr: &SocketAddr) -> bool {
    match addr {
        SocketAddr::V4(v4) => v4.ip().is_broadcast(),
        SocketAddr::V6(_) => false,
    }
}

#[async_trait::async_trait]
impl Provider for UdpProvider {
    async fn next_datagram(&mut self) -> Result<Option<RawDatagram>> {
        let (len, source) = self
            .socket
            .recv_from(&mut self.buf)
            .await
            .map_err(|e| TelemetryError::socket_error("receive datagram", e))?;

        trace!(len, %source, "Datagram received");

        let received_at_ms = Utc::now().timestamp_millis().max(0) as u64;
        Ok(Some(RawDatagram::new(self.buf[..len].to_vec(), received_at_ms)))
    }

    async fn heartbeat(&mut self) -> Result<()> {
        let payload = [self.packet_type.heartbeat()];
        self.socket
            .send_to(&payload, self.console)
            .await
            .map_err(|e| TelemetryError::socket_error("send heartbeat", e))?;
        debug!(console = %self.console, "Heartbeat sent");
        Ok(())
    }

    fn tick_rate(&self) -> f64 {
        CONSOLE_TICK_RATE
    }
}
