//! Telemetry capture for Gran Turismo 7 consoles.
//!
//! Slipstream talks to a PlayStation running GT7 over its UDP telemetry
//! interface: it keeps the console streaming with heartbeats, decrypts and
//! decodes every datagram, splits the drive into laps and records sessions
//! into a key-value store. Finished sessions can be pushed to a remote sink.
//!
//! # Features
//!
//! - **Live Telemetry**: 60 Hz frames from the console, Salsa20 decrypted
//! - **Lap Detection**: lap counter, start/finish position and distance fused
//! - **Recording**: down-sampled frames persisted in fixed-size chunks
//! - **Simulation**: a built-in fake console for development without hardware
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use slipstream::{ClientConfig, Slipstream, UpdateRate};
//!
//! #[tokio::main]
//! async fn main() -> slipstream::Result<()> {
//!     let config = ClientConfig { console_addr: "192.168.1.40".parse().unwrap(), ..Default::default() };
//!     let client = Slipstream::connect(config).await?;
//!
//!     let mut frames = client.telemetry(UpdateRate::Max(10));
//!     while let Some(frame) = frames.next().await {
//!         println!("{:.1} km/h in gear {}", frame.speed_kmh, frame.gear);
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire format
pub mod cipher;
pub mod protocol;

// Stream-based telemetry architecture
pub mod client;
pub mod config;
mod driver;
pub mod provider;
pub mod providers;
pub mod stream;

// Laps, recording and persistence
pub mod lap;
pub mod recorder;
pub mod storage;
pub mod sync;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use client::TelemetryClient;
pub use config::ClientConfig;
pub use lap::LapDetector;
pub use protocol::PacketType;
pub use providers::SimulatorConfig;
pub use storage::{FileStore, KeyValueStore, MemoryStore, SessionRepository};
pub use sync::RemoteSink;

use std::path::Path;
use std::sync::Arc;

/// Unified entry point for Slipstream telemetry clients.
///
/// Every constructor returns a connected [`TelemetryClient`]. Use
/// [`TelemetryClient::new`] directly when the client should be created
/// before connecting, or to plug in a custom store.
///
/// # Examples
///
/// ## Live Telemetry
/// ```rust,no_run
/// use slipstream::{ClientConfig, Slipstream};
///
/// #[tokio::main]
/// async fn main() -> slipstream::Result<()> {
///     let client = Slipstream::connect(ClientConfig::load("slipstream.yaml")?).await?;
///     // Use client...
///     Ok(())
/// }
/// ```
///
/// ## Simulated Console
/// ```rust,no_run
/// use slipstream::{Slipstream, SimulatorConfig};
///
/// #[tokio::main]
/// async fn main() -> slipstream::Result<()> {
///     let client = Slipstream::simulate(SimulatorConfig::default()).await?;
///     // Use client...
///     Ok(())
/// }
/// ```
pub struct Slipstream;

impl Slipstream {
    /// Connect to a console, keeping recorded sessions in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The receive socket cannot be bound
    /// - The console address is unspecified
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use slipstream::{ClientConfig, Slipstream};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> slipstream::Result<()> {
    /// let client = Slipstream::connect(ClientConfig::default()).await?;
    /// println!("{:?}", client.state().status);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(config: ClientConfig) -> Result<TelemetryClient> {
        Self::connect_with_repository(config, SessionRepository::in_memory()).await
    }

    /// Connect to a console, persisting sessions as files under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be created or the
    /// connection fails, see [`Slipstream::connect`].
    pub async fn connect_with_store<P: AsRef<Path>>(config: ClientConfig, dir: P) -> Result<TelemetryClient> {
        let store = FileStore::open(dir)?;
        Self::connect_with_repository(config, SessionRepository::new(Arc::new(store))).await
    }

    /// Connect to a console using an existing repository.
    pub async fn connect_with_repository(
        config: ClientConfig,
        repository: SessionRepository,
    ) -> Result<TelemetryClient> {
        let mut client = TelemetryClient::new(config, repository);
        client.connect().await?;
        Ok(client)
    }

    /// Start a client fed by the built-in simulator.
    ///
    /// The simulator emits the same sealed datagrams a console would, so the
    /// full decrypt, decode and lap pipeline runs.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the simulator settings are invalid.
    pub async fn simulate(config: SimulatorConfig) -> Result<TelemetryClient> {
        let mut client = TelemetryClient::new(ClientConfig::default(), SessionRepository::in_memory());
        client.simulate(config).await?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulate_returns_connected_client() {
        let mut client = Slipstream::simulate(SimulatorConfig::default()).await.unwrap();
        let mut updates = client.state_updates();
        updates.wait_for(|state| state.status == ConnectionStatus::Connected).await.unwrap();
        client.disconnect().await;
        assert_eq!(client.state().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn connect_rejects_invalid_config() {
        let config = ClientConfig { chunk_size: 0, ..Default::default() };
        let err = Slipstream::connect(config).await.err().unwrap();
        assert!(matches!(err, TelemetryError::Config { .. }));
    }
}
