//! Mock transport for testing
//!
//! Scriptable transport client used by unit and integration tests: per-call
//! results are queued ahead of time, every call is recorded with start and
//! end instants, and an in-flight gauge lets tests assert that reads against
//! one endpoint never overlap.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use fusion_model::{DeviceSerial, Field, TransportKind};

use super::traits::{RangePayload, ReadRange, TransportClient, TransportError};

/// One recorded call against the mock
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub device: DeviceSerial,
    pub range: Option<ReadRange>,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
struct MockState {
    /// Scripted results per (device, range); popped front first
    range_results: HashMap<(DeviceSerial, ReadRange), VecDeque<Result<RangePayload, TransportError>>>,
    /// Scripted batch results; popped front first
    batch_results: VecDeque<Result<HashMap<DeviceSerial, RangePayload>, TransportError>>,
    calls: Vec<CallRecord>,
    writes: Vec<(DeviceSerial, Field, f64)>,
}

/// Scriptable mock transport
#[derive(Clone)]
pub struct MockTransport {
    kind: TransportKind,
    /// Simulated per-read latency
    read_delay: Duration,
    state: Arc<Mutex<MockState>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("kind", &self.kind)
            .field("read_delay", &self.read_delay)
            .finish()
    }
}

impl MockTransport {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            read_delay: Duration::from_millis(0),
            state: Arc::new(Mutex::new(MockState::default())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Queue a successful range read
    pub fn push_range(&self, device: impl Into<DeviceSerial>, range: ReadRange, payload: RangePayload) {
        self.state
            .lock()
            .range_results
            .entry((device.into(), range))
            .or_default()
            .push_back(Ok(payload));
    }

    /// Queue a failing range read
    pub fn push_range_error(
        &self,
        device: impl Into<DeviceSerial>,
        range: ReadRange,
        error: TransportError,
    ) {
        self.state
            .lock()
            .range_results
            .entry((device.into(), range))
            .or_default()
            .push_back(Err(error));
    }

    /// Queue a successful batch read
    pub fn push_batch(&self, payload: HashMap<DeviceSerial, RangePayload>) {
        self.state.lock().batch_results.push_back(Ok(payload));
    }

    /// Queue a failing batch read
    pub fn push_batch_error(&self, error: TransportError) {
        self.state.lock().batch_results.push_back(Err(error));
    }

    /// All calls recorded so far
    pub fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().calls.clone()
    }

    /// All parameter writes recorded so far
    pub fn writes(&self) -> Vec<(DeviceSerial, Field, f64)> {
        self.state.lock().writes.clone()
    }

    /// Highest number of simultaneously in-flight reads observed
    pub fn max_observed_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn track_call<T>(
        &self,
        device: &DeviceSerial,
        range: Option<ReadRange>,
        result: Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let started = Instant::now();
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.state.lock().calls.push(CallRecord {
            device: device.clone(),
            range,
            started,
            finished: Instant::now(),
        });
        result
    }
}

#[async_trait]
impl TransportClient for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn read_range(
        &self,
        device: &DeviceSerial,
        range: ReadRange,
    ) -> Result<RangePayload, TransportError> {
        let scripted = self
            .state
            .lock()
            .range_results
            .get_mut(&(device.clone(), range))
            .and_then(|q| q.pop_front());
        let result = scripted.unwrap_or_else(|| {
            Err(TransportError::RangeRead {
                range: range.as_str().to_string(),
                reason: "no scripted response".to_string(),
            })
        });
        self.track_call(device, Some(range), result).await
    }

    async fn read_batch(
        &self,
        devices: &[DeviceSerial],
    ) -> Result<HashMap<DeviceSerial, RangePayload>, TransportError> {
        let scripted = self.state.lock().batch_results.pop_front();
        let result = scripted.unwrap_or_else(|| {
            Err(TransportError::Io("no scripted batch response".to_string()))
        });
        let probe = devices
            .first()
            .cloned()
            .unwrap_or_else(|| DeviceSerial::new("batch"));
        self.track_call(&probe, None, result).await
    }

    async fn write_param(
        &self,
        device: &DeviceSerial,
        field: Field,
        value: f64,
    ) -> Result<(), TransportError> {
        self.state
            .lock()
            .writes
            .push((device.clone(), field, value));
        Ok(())
    }
}
