//! Public entry point tying the protocol client, recorder and uploader together

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::driver::{Driver, DriverHandle};
use crate::provider::Provider;
use crate::providers::{SimulatorConfig, SimulatorProvider, UdpProvider};
use crate::storage::SessionRepository;
use crate::stream::ThrottleExt;
use crate::sync::{RemoteSink, Uploader};
use crate::types::{ClientEvent, ConnectionState, ConnectionStatus, Session, TelemetryFrame, UpdateRate};
use crate::{Result, TelemetryError};

/// Telemetry client for one console
///
/// Owns at most one running connection. Every observable change is published
/// as a [`ClientEvent`]; the connection state can also be read directly.
pub struct TelemetryClient {
    config: ClientConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    events: broadcast::Sender<ClientEvent>,
    repository: SessionRepository,
    sink: Option<Arc<dyn RemoteSink>>,
    driver: Option<DriverHandle>,
}

impl TelemetryClient {
    pub fn new(config: ClientConfig, repository: SessionRepository) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (state, _) = watch::channel(ConnectionState::default());
        Self { config, state: Arc::new(state), events, repository, sink: None, driver: None }
    }

    /// Enable [`upload`](Self::upload) against `sink`.
    pub fn with_remote(mut self, sink: Arc<dyn RemoteSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn repository(&self) -> &SessionRepository {
        &self.repository
    }

    /// Bind the UDP socket and start heartbeating the configured console.
    pub async fn connect(&mut self) -> Result<()> {
        self.prepare_connect().await?;
        match UdpProvider::bind(&self.config).await {
            Ok(provider) => {
                self.spawn_driver(provider);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Connect failed");
                self.state.send_replace(ConnectionState::failed(e.to_string()));
                self.emit(ClientEvent::Error { message: e.to_string() });
                Err(e)
            }
        }
    }

    /// Connect to the built-in simulator instead of a console.
    pub async fn simulate(&mut self, config: SimulatorConfig) -> Result<()> {
        self.prepare_connect().await?;
        match SimulatorProvider::new(config) {
            Ok(provider) => {
                self.spawn_driver(provider);
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(ConnectionState::default());
                Err(e)
            }
        }
    }

    /// Connect to any [`Provider`].
    pub async fn connect_with<P: Provider>(&mut self, provider: P) -> Result<()> {
        self.prepare_connect().await?;
        self.spawn_driver(provider);
        Ok(())
    }

    async fn prepare_connect(&mut self) -> Result<()> {
        self.config.validate()?;
        if let Some(driver) = &self.driver {
            if !driver.is_finished() {
                return Err(TelemetryError::precondition("already connected"));
            }
            // Previous connection ended on its own; reap it.
            if let Some(driver) = self.driver.take() {
                driver.shutdown().await;
            }
        }
        info!(console = %self.config.console_socket_addr(), "Connecting");
        self.state.send_replace(ConnectionState::connecting());
        Ok(())
    }

    fn spawn_driver<P: Provider>(&mut self, provider: P) {
        let handle = Driver::spawn(
            provider,
            self.config.clone(),
            self.repository.clone(),
            Arc::clone(&self.state),
            self.events.clone(),
        );
        self.driver = Some(handle);
    }

    /// Stop the connection, any recording and the heartbeat timer.
    ///
    /// Safe to call repeatedly; the state returns to its zero value.
    pub async fn disconnect(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.shutdown().await;
        }
        if self.state.borrow().status != ConnectionStatus::Disconnected {
            self.state.send_replace(ConnectionState::default());
            self.emit(ClientEvent::Disconnected);
            info!("Disconnected");
        } else {
            debug!("Disconnect requested while already disconnected");
        }
    }

    /// Start recording a session. Requires an established connection.
    pub async fn start_recording(&self, track_id: &str, car_id: &str) -> Result<Session> {
        match &self.driver {
            Some(driver) => driver.start_recording(track_id, car_id).await,
            None => Err(TelemetryError::precondition("not connected")),
        }
    }

    /// Stop the current recording. Returns `Ok(None)` when nothing is recording.
    pub async fn stop_recording(&self) -> Result<Option<Session>> {
        match &self.driver {
            Some(driver) if !driver.is_finished() => driver.stop_recording().await,
            _ => Ok(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Watch receiver for connection state changes.
    pub fn state_updates(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Subscribe to all events from now on.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Decoded frames as a stream, throttled to `rate`.
    ///
    /// Frames a slow subscriber misses are skipped rather than queued.
    pub fn telemetry(&self, rate: UpdateRate) -> impl Stream<Item = Arc<TelemetryFrame>> + 'static {
        let source_hz = self.driver.as_ref().map_or(60.0, DriverHandle::source_hz);
        let frames = BroadcastStream::new(self.events.subscribe()).filter_map(|event| async move {
            match event {
                Ok(ClientEvent::Telemetry(frame)) => Some(frame),
                _ => None,
            }
        });

        match rate.throttle_interval(source_hz) {
            None => frames.boxed(),
            Some(period) => frames.throttle(period).boxed(),
        }
    }

    /// All stored sessions, oldest first.
    pub fn sessions(&self) -> Result<Vec<Session>> {
        self.repository.list_sessions()
    }

    pub fn load_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.repository.load_session(session_id)
    }

    /// Delete a session and its telemetry, unless it is still being recorded.
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        if self.repository.is_live(session_id) {
            return Err(TelemetryError::precondition(format!(
                "session {session_id} is still recording"
            )));
        }
        self.repository.delete_session(session_id)
    }

    /// Upload a finished session on a background task.
    pub fn upload(&self, session_id: &str) -> Result<JoinHandle<Result<Session>>> {
        let sink = self
            .sink
            .clone()
            .ok_or_else(|| TelemetryError::config_error("no remote configured for uploads"))?;
        let uploader = Uploader::new(self.repository.clone(), sink, self.config.upload_batch_size)
            .with_events(self.events.clone());
        Ok(uploader.spawn(session_id.to_string()))
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for TelemetryClient {
    fn drop(&mut self) {
        if let Some(driver) = &self.driver {
            debug!("Dropping telemetry client");
            driver.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ChannelProvider, FrameBuilder, RecordingSink};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn client() -> TelemetryClient {
        let _ = tracing_subscriber::fmt::try_init();
        TelemetryClient::new(ClientConfig::default(), SessionRepository::in_memory())
    }

    async fn wait_for<F>(events: &mut broadcast::Receiver<ClientEvent>, mut matches: F) -> ClientEvent
    where
        F: FnMut(&ClientEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(60), async {
            loop {
                let event = events.recv().await.expect("channel open");
                if matches(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event within timeout")
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_disconnected_fails_without_session() {
        let client = client();
        let result = client.start_recording("Monza", "car").await;
        assert!(matches!(result, Err(TelemetryError::Precondition { .. })));
        assert!(client.sessions().unwrap().is_empty());
        assert!(client.stop_recording().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_idempotent_and_resets_state() {
        let mut client = client();
        let mut events = client.events();
        let (provider, feed) = ChannelProvider::new();
        client.connect_with(provider).await.expect("connect");
        wait_for(&mut events, |e| matches!(e, ClientEvent::Connected)).await;

        feed.send_frame(&FrameBuilder::new(1_000).build());
        wait_for(&mut events, |e| matches!(e, ClientEvent::Telemetry(_))).await;
        assert_eq!(client.state().packet_count, 1);

        let second = client.connect_with(ChannelProvider::new().0).await;
        assert!(matches!(second, Err(TelemetryError::Precondition { .. })));

        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::default());
        assert!(matches!(events.recv().await, Ok(ClientEvent::Disconnected)));

        client.disconnect().await;
        assert!(events.try_recv().is_err());
        assert_eq!(client.state(), ConnectionState::default());
    }

    #[tokio::test]
    async fn bind_failure_sets_error_state() {
        let blocker = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind blocker");
        let port = blocker.local_addr().expect("addr").port();
        let config = ClientConfig {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            recv_port: port,
            console_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..ClientConfig::default()
        };
        let mut client = TelemetryClient::new(config, SessionRepository::in_memory());
        let mut events = client.events();

        let result = client.connect().await;
        assert!(matches!(result, Err(TelemetryError::Connection { .. })));
        assert_eq!(client.state().status, ConnectionStatus::Error);
        assert!(matches!(events.try_recv(), Ok(ClientEvent::Error { .. })));

        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_telemetry_stream() {
        let mut client = client();
        let mut events = client.events();
        let (provider, feed) = ChannelProvider::new();
        client.connect_with(provider).await.expect("connect");
        wait_for(&mut events, |e| matches!(e, ClientEvent::Connected)).await;

        let mut frames = client.telemetry(UpdateRate::Max(10));
        for i in 0..5 {
            feed.send_frame(&FrameBuilder::new(i * 16).packet_id(i as i32).build());
        }
        wait_for(&mut events, |e| matches!(e, ClientEvent::Telemetry(f) if f.packet_id == 4)).await;

        let frame = frames.next().await.expect("frame");
        assert_eq!(frame.packet_id, 4, "burst collapses to the latest frame");
        client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn upload_requires_remote_and_runs_in_background() {
        let repository = SessionRepository::in_memory();
        let sink = Arc::new(RecordingSink::new());
        let mut client = TelemetryClient::new(ClientConfig::default(), repository.clone());
        assert!(matches!(client.upload("x"), Err(TelemetryError::Config { .. })));

        client = client.with_remote(sink.clone());
        let mut events = client.events();
        let (provider, feed) = ChannelProvider::new();
        client.connect_with(provider).await.expect("connect");
        wait_for(&mut events, |e| matches!(e, ClientEvent::Connected)).await;

        let session = client.start_recording("Monza", "gt7_1").await.expect("start");
        assert!(matches!(client.delete_session(&session.id), Err(TelemetryError::Precondition { .. })));
        for i in 0..20u64 {
            feed.send_frame(&FrameBuilder::new(i * 100).packet_id(i as i32).build());
        }
        wait_for(&mut events, |e| matches!(e, ClientEvent::Telemetry(f) if f.packet_id == 19)).await;
        let stopped = client.stop_recording().await.expect("stop").expect("session");
        assert_eq!(stopped.telemetry_points, 20);

        let uploaded = client.upload(&session.id).expect("spawn").await.expect("join").expect("upload");
        assert_eq!(uploaded.sync_status, crate::SyncStatus::Uploaded);
        assert_eq!(sink.batches().iter().map(Vec::len).sum::<usize>(), 20);
        wait_for(&mut events, |e| {
            matches!(e, ClientEvent::SyncStatusChanged { status: crate::SyncStatus::Uploaded, .. })
        })
        .await;

        client.delete_session(&session.id).expect("delete");
        assert!(client.sessions().unwrap().is_empty());
        client.disconnect().await;
    }
}
