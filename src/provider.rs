//! Provider trait for datagram sources

use crate::Result;

/// One datagram as received from the network, before decryption.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDatagram {
    pub bytes: Vec<u8>,
    /// Arrival time in milliseconds since the Unix epoch
    pub received_at_ms: u64,
    /// Distance into the lap when the source knows it; the wire layout has no slot for it
    pub lap_distance_m: Option<f32>,
}

impl RawDatagram {
    pub fn new(bytes: Vec<u8>, received_at_ms: u64) -> Self {
        Self { bytes, received_at_ms, lap_distance_m: None }
    }

    pub fn with_lap_distance(mut self, lap_distance_m: f32) -> Self {
        self.lap_distance_m = Some(lap_distance_m);
        self
    }
}

/// Trait for telemetry datagram sources
///
/// Providers abstract over the real console socket and synthetic sources. The
/// driver task owns the provider and calls it from a single `select!` loop, so
/// implementations never see concurrent calls.
#[async_trait::async_trait]
pub trait Provider: Send + 'static {
    /// Wait for the next datagram
    ///
    /// Returns:
    /// - `Ok(Some(datagram))` - Datagram received
    /// - `Ok(None)` - Source closed (normal termination)
    /// - `Err(e)` - Socket failure; the driver moves to the error state
    ///
    /// Must be cancel-safe: the driver drops the future whenever a heartbeat
    /// or command is due.
    async fn next_datagram(&mut self) -> Result<Option<RawDatagram>>;

    /// Send one heartbeat to keep the feed flowing
    async fn heartbeat(&mut self) -> Result<()>;

    /// Get the native datagram rate in Hz
    fn tick_rate(&self) -> f64;
}
