//! Driver actor that owns the provider and the capture pipeline

use std::sync::Arc;

use chrono::DateTime;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ClientConfig;
use crate::lap::LapDetector;
use crate::protocol::{MIN_PACKET_SIZE, decode_datagram};
use crate::provider::{Provider, RawDatagram};
use crate::recorder::SessionRecorder;
use crate::storage::SessionRepository;
use crate::types::{ClientEvent, ConnectionState, ConnectionStatus, Session, TelemetryFrame};
use crate::{Result, TelemetryError};

/// Lifecycle commands handled inside the driver task
pub(crate) enum DriverCommand {
    StartRecording { track_id: String, car_id: String, reply: oneshot::Sender<Result<Session>> },
    StopRecording { reply: oneshot::Sender<Result<Option<Session>>> },
}

/// Handle to a running driver task
pub(crate) struct DriverHandle {
    commands: mpsc::Sender<DriverCommand>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    source_hz: f64,
}

impl DriverHandle {
    pub(crate) async fn start_recording(&self, track_id: &str, car_id: &str) -> Result<Session> {
        let (reply, rx) = oneshot::channel();
        let command = DriverCommand::StartRecording {
            track_id: track_id.to_string(),
            car_id: car_id.to_string(),
            reply,
        };
        self.request(command, rx).await
    }

    pub(crate) async fn stop_recording(&self) -> Result<Option<Session>> {
        let (reply, rx) = oneshot::channel();
        self.request(DriverCommand::StopRecording { reply }, rx).await
    }

    async fn request<T>(&self, command: DriverCommand, rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TelemetryError::precondition("not connected"))?;
        rx.await.map_err(|_| TelemetryError::precondition("connection closed before the command completed"))?
    }

    pub(crate) fn source_hz(&self) -> f64 {
        self.source_hz
    }

    /// The task has exited (provider ended or failed).
    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel the task and wait for it to wind down.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("Driver task panicked: {}", e);
        }
    }
}

/// Single-task state machine for one connection
///
/// Datagram receive, heartbeat ticks, lifecycle commands and cancellation are
/// branches of one `select!`, so the connection counters, the lap detector and
/// the recorder are only ever touched from this task.
pub(crate) struct Driver<P> {
    provider: P,
    config: ClientConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    events: broadcast::Sender<ClientEvent>,
    detector: LapDetector,
    recorder: SessionRecorder,
    last_datagram: Instant,
    silence_reported: bool,
    storage_failing: bool,
    last_frame_ms: Option<u64>,
}

impl<P: Provider> Driver<P> {
    /// Spawn the driver task for `provider`
    pub(crate) fn spawn(
        provider: P,
        config: ClientConfig,
        repository: SessionRepository,
        state: Arc<watch::Sender<ConnectionState>>,
        events: broadcast::Sender<ClientEvent>,
    ) -> DriverHandle {
        let (command_tx, command_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let source_hz = provider.tick_rate();

        let driver = Driver {
            provider,
            detector: LapDetector::default().with_min_lap_duration(config.min_lap_duration()),
            recorder: SessionRecorder::new(repository, config.sample_rate_hz, config.chunk_size),
            config,
            state,
            events,
            last_datagram: Instant::now(),
            silence_reported: false,
            storage_failing: false,
            last_frame_ms: None,
        };

        let task = tokio::spawn(driver.run(command_rx, cancel.clone()));
        DriverHandle { commands: command_tx, cancel, task, source_hz }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<DriverCommand>, cancel: CancellationToken) {
        info!(source_hz = self.provider.tick_rate(), "Driver task started");

        // The console only starts streaming after the first heartbeat.
        if let Err(e) = self.provider.heartbeat().await {
            self.fail(e);
            return;
        }

        let mut heartbeat = interval(self.config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        self.last_datagram = Instant::now();
        self.state.send_modify(|state| state.status = ConnectionStatus::Connected);
        self.emit(ClientEvent::Connected);
        info!("Connected, waiting for telemetry");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Driver cancelled");
                    self.auto_stop("disconnect");
                    break;
                }

                Some(command) = commands.recv() => self.handle_command(command),

                _ = heartbeat.tick() => {
                    if let Err(e) = self.provider.heartbeat().await {
                        self.fail(e);
                        break;
                    }
                    self.check_liveness();
                }

                result = self.provider.next_datagram() => match result {
                    Ok(Some(datagram)) => self.handle_datagram(datagram),
                    Ok(None) => {
                        info!(packets = self.state.borrow().packet_count, "Telemetry source closed");
                        self.auto_stop("source closed");
                        self.state.send_replace(ConnectionState::default());
                        self.emit(ClientEvent::Disconnected);
                        break;
                    }
                    Err(e) => {
                        self.fail(e);
                        break;
                    }
                },
            }
        }

        info!(packets = self.state.borrow().packet_count, "Driver task ended");
    }

    fn handle_datagram(&mut self, datagram: RawDatagram) {
        if datagram.bytes.len() < MIN_PACKET_SIZE {
            trace!(len = datagram.bytes.len(), "Ignoring short datagram");
            return;
        }

        self.last_datagram = Instant::now();
        self.silence_reported = false;
        let arrived = i64::try_from(datagram.received_at_ms).ok().and_then(DateTime::from_timestamp_millis);

        match decode_datagram(&datagram.bytes, datagram.received_at_ms) {
            Ok(mut frame) => {
                self.state.send_modify(|state| {
                    state.packet_count += 1;
                    state.last_heartbeat = arrived;
                });
                if frame.lap_distance_m.is_none() {
                    frame.lap_distance_m = datagram.lap_distance_m;
                }
                self.handle_frame(Arc::new(frame));
            }
            Err(e) => {
                debug!(len = datagram.bytes.len(), error = %e, "Dropping undecodable datagram");
                self.state.send_modify(|state| {
                    state.packet_count += 1;
                    state.last_heartbeat = arrived;
                    state.error_count += 1;
                    state.last_error = Some(e.to_string());
                });
            }
        }
    }

    fn handle_frame(&mut self, frame: Arc<TelemetryFrame>) {
        trace!(packet_id = frame.packet_id, lap = frame.current_lap, "Frame decoded");
        self.last_frame_ms = Some(frame.timestamp_ms);
        self.emit(ClientEvent::Telemetry(Arc::clone(&frame)));

        if let Some(lap) = self.detector.update(&frame) {
            self.emit(ClientEvent::LapCompleted(lap.clone()));
            let result = self.recorder.record_lap(lap);
            self.storage_result(result);
        }

        let result = self.recorder.record_frame(&frame);
        self.storage_result(result);
    }

    fn handle_command(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::StartRecording { track_id, car_id, reply } => {
                let status = self.state.borrow().status;
                let result = self.recorder.start(status, &track_id, &car_id);
                if let Ok(session) = &result {
                    self.detector.reset(Some(&track_id));
                    self.storage_failing = false;
                    self.emit(ClientEvent::RecordingStarted { session_id: session.id.clone() });
                }
                let _ = reply.send(result);
            }
            DriverCommand::StopRecording { reply } => {
                let result = self.stop_recording();
                let _ = reply.send(result);
            }
        }
    }

    fn stop_recording(&mut self) -> Result<Option<Session>> {
        if !self.recorder.is_recording() {
            return Ok(None);
        }
        let partial = self.last_frame_ms.and_then(|now| self.detector.finalize(now));
        match self.recorder.stop(partial) {
            Ok(Some(session)) => {
                self.emit(ClientEvent::RecordingStopped { session: Box::new(session.clone()) });
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(error = %e, "Could not finish recording");
                self.emit(ClientEvent::Error { message: e.to_string() });
                Err(e)
            }
        }
    }

    fn auto_stop(&mut self, reason: &str) {
        if self.recorder.is_recording() {
            info!(reason, "Stopping recording");
            let _ = self.stop_recording();
        }
    }

    fn check_liveness(&mut self) {
        let silence = self.last_datagram.elapsed();
        if silence >= self.config.liveness_timeout() && !self.silence_reported {
            self.silence_reported = true;
            warn!(silence_ms = silence.as_millis() as u64, "No telemetry received, connection unstable");
            self.emit(ClientEvent::Warning {
                message: format!("connection unstable: no telemetry for {}s", silence.as_secs()),
            });
        }
    }

    fn storage_result(&mut self, result: Result<()>) {
        match result {
            Ok(()) => self.storage_failing = false,
            Err(e) => {
                if !self.storage_failing {
                    warn!(error = %e, "Recording storage write failed");
                    self.emit(ClientEvent::Error { message: e.to_string() });
                }
                self.storage_failing = true;
            }
        }
    }

    fn fail(&mut self, error: TelemetryError) {
        error!(error = %error, "Telemetry connection failed");
        let message = error.to_string();
        self.state.send_modify(|state| {
            state.status = ConnectionStatus::Error;
            state.last_error = Some(message.clone());
        });
        self.emit(ClientEvent::Error { message });
        self.auto_stop("connection error");
    }

    fn emit(&self, event: ClientEvent) {
        trace!(event = event.name(), "Event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
