//! Test utilities: frame builders, scripted providers and fake collaborators
//!
//! Shared by unit tests, the integration tests and the benches.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cipher;
use crate::protocol::{PacketType, encode};
use crate::provider::{Provider, RawDatagram};
use crate::storage::KeyValueStore;
use crate::sync::{CompactPoint, RemoteSink, SessionMetadata};
use crate::types::{SimulatorFlags, TelemetryFrame, Vec3, simulator_flags};
use crate::{Result, TelemetryError};

/// Builder for [`TelemetryFrame`]s with the car on track and everything else zeroed.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    frame: TelemetryFrame,
}

impl FrameBuilder {
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            frame: TelemetryFrame {
                timestamp_ms,
                flags: SimulatorFlags::default().with(simulator_flags::CAR_ON_TRACK, true),
                ..TelemetryFrame::default()
            },
        }
    }

    pub fn packet_id(mut self, id: i32) -> Self {
        self.frame.packet_id = id;
        self
    }

    pub fn position(mut self, x: f32, y: f32, z: f32) -> Self {
        self.frame.position = Vec3::new(x, y, z);
        self
    }

    pub fn speed_kmh(mut self, speed: f32) -> Self {
        self.frame.speed_kmh = speed;
        self
    }

    pub fn lap(mut self, lap: i16) -> Self {
        self.frame.current_lap = lap;
        self
    }

    pub fn last_lap_ms(mut self, ms: Option<u32>) -> Self {
        self.frame.last_lap_ms = ms;
        self
    }

    pub fn throttle(mut self, throttle: f32) -> Self {
        self.frame.throttle = throttle;
        self
    }

    pub fn gear(mut self, gear: u8) -> Self {
        self.frame.gear = gear;
        self
    }

    pub fn fuel(mut self, level: f32, capacity: f32) -> Self {
        self.frame.fuel_level = level;
        self.frame.fuel_capacity = capacity;
        self
    }

    pub fn on_track(mut self, on_track: bool) -> Self {
        self.frame.flags = self.frame.flags.with(simulator_flags::CAR_ON_TRACK, on_track);
        self
    }

    pub fn build(self) -> TelemetryFrame {
        self.frame
    }
}

/// Encode and seal `frame` the way a console would send it.
pub fn sealed_datagram(frame: &TelemetryFrame, packet_type: PacketType) -> Vec<u8> {
    let iv = (frame.packet_id as u32).wrapping_mul(0x0101_0101) ^ 0x5A5A_5A5A;
    cipher::seal_datagram(&encode(frame, packet_type), iv, packet_type)
}

/// Provider fed from a channel, for driving the client step by step.
pub struct ChannelProvider {
    rx: mpsc::UnboundedReceiver<Result<RawDatagram>>,
    heartbeats: Arc<AtomicU64>,
    tick_rate: f64,
}

/// Sending side of a [`ChannelProvider`]. Dropping it closes the feed.
#[derive(Clone)]
pub struct ChannelHandle {
    tx: mpsc::UnboundedSender<Result<RawDatagram>>,
    heartbeats: Arc<AtomicU64>,
}

impl ChannelProvider {
    pub fn new() -> (Self, ChannelHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let heartbeats = Arc::new(AtomicU64::new(0));
        let provider = Self { rx, heartbeats: Arc::clone(&heartbeats), tick_rate: 60.0 };
        (provider, ChannelHandle { tx, heartbeats })
    }
}

impl ChannelHandle {
    /// Seal and send `frame`, stamped with its own timestamp.
    pub fn send_frame(&self, frame: &TelemetryFrame) {
        let datagram = sealed_datagram(frame, PacketType::Type1);
        self.send_raw(datagram, frame.timestamp_ms);
    }

    pub fn send_raw(&self, bytes: Vec<u8>, received_at_ms: u64) {
        let _ = self.tx.send(Ok(RawDatagram::new(bytes, received_at_ms)));
    }

    /// Make the provider report a socket failure.
    pub fn fail(&self, error: TelemetryError) {
        let _ = self.tx.send(Err(error));
    }

    pub fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Provider for ChannelProvider {
    async fn next_datagram(&mut self) -> Result<Option<RawDatagram>> {
        match self.rx.recv().await {
            Some(Ok(datagram)) => Ok(Some(datagram)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn heartbeat(&mut self) -> Result<()> {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn tick_rate(&self) -> f64 {
        self.tick_rate
    }
}

#[derive(Default)]
struct SinkState {
    created: Vec<SessionMetadata>,
    batches: Vec<Vec<CompactPoint>>,
    fail_after: Option<usize>,
    appended: usize,
}

/// [`RemoteSink`] that keeps everything it receives, optionally failing.
#[derive(Default)]
pub struct RecordingSink {
    state: Mutex<SinkState>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `batches` appends, then reject every further one.
    pub fn failing_after(batches: usize) -> Self {
        let sink = Self::new();
        sink.set_fail_after(Some(batches));
        sink
    }

    pub fn set_fail_after(&self, batches: Option<usize>) {
        let mut state = self.state.lock().expect("sink lock");
        state.fail_after = batches;
        state.appended = 0;
    }

    pub fn created(&self) -> Vec<SessionMetadata> {
        self.state.lock().expect("sink lock").created.clone()
    }

    pub fn batches(&self) -> Vec<Vec<CompactPoint>> {
        self.state.lock().expect("sink lock").batches.clone()
    }
}

#[async_trait::async_trait]
impl RemoteSink for RecordingSink {
    async fn create_session(&self, metadata: &SessionMetadata) -> Result<String> {
        let mut state = self.state.lock().expect("sink lock");
        state.created.push(metadata.clone());
        Ok(format!("remote-{}", state.created.len()))
    }

    async fn append_telemetry(&self, remote_id: &str, points: &[CompactPoint]) -> Result<()> {
        let mut state = self.state.lock().expect("sink lock");
        if state.fail_after.is_some_and(|limit| state.appended >= limit) {
            return Err(TelemetryError::upload_failed(remote_id, "remote rejected batch"));
        }
        state.appended += 1;
        state.batches.push(points.to_vec());
        Ok(())
    }
}

/// Store wrapper whose writes can be switched to fail.
pub struct FailingStore<S> {
    inner: S,
    failing: AtomicBool,
}

impl<S: KeyValueStore> FailingStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, failing: AtomicBool::new(false) }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TelemetryError::storage_error(key, "injected write failure"));
        }
        Ok(())
    }
}

impl<S: KeyValueStore> KeyValueStore for FailingStore<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check(key)?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check(key)?;
        self.inner.remove(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.keys_with_prefix(prefix)
    }
}
