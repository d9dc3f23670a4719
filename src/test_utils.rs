//! Test utilities: an in-memory feed, a recording sink and WebM fixtures
//!
//! These helpers are shared by the unit tests of every module and are
//! exported under the `test-utils` feature for downstream integration tests.

#![cfg(any(test, feature = "test-utils"))]

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::container::{CLUSTER_ID, CLUSTER_TIMESTAMP, TIMESTAMP_SCALE};
use crate::sink::MediaSink;
use crate::transport::FeedTransport;
use crate::types::{FeedIndex, FeedUpdate, Segment};
use crate::{PlayerError, Result};

const EBML_HEADER_ID: [u8; 4] = [0x1a, 0x45, 0xdf, 0xa3];
const SEGMENT_ID: [u8; 4] = [0x18, 0x53, 0x80, 0x67];
const INFO_ID: [u8; 4] = [0x15, 0x49, 0xa9, 0x66];
const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];

/// Minimal big-endian bytes of an unsigned value, at least one byte.
fn uint_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take(7).take_while(|&&b| b == 0).count();
    bytes[skip..].to_vec()
}

/// Container metadata: EBML header, segment start and an info element
/// carrying the given timestamp scale.
pub fn metadata_payload(timestamp_scale_ns: u64) -> Vec<u8> {
    let mut bytes = Vec::new();

    bytes.extend_from_slice(&EBML_HEADER_ID);
    bytes.push(0x87);
    bytes.extend_from_slice(&[0x42, 0x82, 0x84]);
    bytes.extend_from_slice(b"webm");

    bytes.extend_from_slice(&SEGMENT_ID);
    bytes.extend_from_slice(&UNKNOWN_SIZE);

    let scale = uint_bytes(timestamp_scale_ns);
    bytes.extend_from_slice(&INFO_ID);
    bytes.push(0x80 | (TIMESTAMP_SCALE.len() + 1 + scale.len()) as u8);
    bytes.extend_from_slice(&TIMESTAMP_SCALE);
    bytes.push(0x80 | scale.len() as u8);
    bytes.extend(scale);

    bytes
}

/// A payload with `offset` bytes of padding followed by a cluster whose
/// timestamp is `timestamp` ticks.
pub fn cluster_payload(offset: usize, timestamp: u64) -> Vec<u8> {
    let mut bytes = vec![0xa3; offset];

    bytes.extend_from_slice(&CLUSTER_ID);
    bytes.extend_from_slice(&UNKNOWN_SIZE);

    let ticks = uint_bytes(timestamp);
    bytes.extend_from_slice(&CLUSTER_TIMESTAMP);
    bytes.push(0x80 | ticks.len() as u8);
    bytes.extend(ticks);

    // One small SimpleBlock
    bytes.extend_from_slice(&[0xa3, 0x84, 0x81, 0x00, 0x00, 0x80]);
    bytes
}

/// A payload without any cluster boundary.
pub fn filler_payload(index: u64, len: usize) -> Vec<u8> {
    vec![0x40 | (index % 32) as u8; len]
}

#[derive(Default)]
struct FeedState {
    payloads: BTreeMap<FeedIndex, Vec<u8>>,
    fetches: HashMap<FeedIndex, usize>,
    latest_fetches: usize,
    latest_failure: Option<String>,
    failing: HashMap<FeedIndex, String>,
}

/// In-memory feed.
///
/// Fetching an index that was never published returns
/// [`PlayerError::NotPublished`]. Fetching without an index returns the
/// highest published slot.
#[derive(Default)]
pub struct MockFeed {
    state: Mutex<FeedState>,
    latency: Duration,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed with filler payloads published at every index of `range`.
    pub fn with_segments(range: std::ops::Range<u64>) -> Self {
        let feed = Self::new();
        for index in range {
            feed.publish(FeedIndex::new(index), filler_payload(index, 64));
        }
        feed
    }

    /// Delay every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn publish(&self, index: FeedIndex, payload: Vec<u8>) {
        self.state.lock().payloads.insert(index, payload);
    }

    pub fn payload(&self, index: FeedIndex) -> Option<Vec<u8>> {
        self.state.lock().payloads.get(&index).cloned()
    }

    /// Highest published index.
    pub fn head(&self) -> Option<FeedIndex> {
        self.state.lock().payloads.keys().next_back().copied()
    }

    /// Make fetches of the latest slot fail with a transport error.
    pub fn fail_latest_with(&self, reason: impl Into<String>) {
        self.state.lock().latest_failure = Some(reason.into());
    }

    /// Make fetches of `index` fail with a transport error.
    pub fn fail_index_with(&self, index: FeedIndex, reason: impl Into<String>) {
        self.state.lock().failing.insert(index, reason.into());
    }

    /// Number of fetches issued for `index`.
    pub fn fetch_count(&self, index: FeedIndex) -> usize {
        self.state.lock().fetches.get(&index).copied().unwrap_or(0)
    }

    /// Number of fetches issued without an index.
    pub fn latest_fetches(&self) -> usize {
        self.state.lock().latest_fetches
    }
}

#[async_trait::async_trait]
impl FeedTransport for MockFeed {
    async fn fetch_payload(&self, index: Option<FeedIndex>) -> Result<FeedUpdate> {
        {
            let mut state = self.state.lock();
            match index {
                Some(index) => *state.fetches.entry(index).or_default() += 1,
                None => state.latest_fetches += 1,
            }
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let state = self.state.lock();
        let (index, payload) = match index {
            Some(index) => {
                if let Some(reason) = state.failing.get(&index) {
                    return Err(PlayerError::transport(reason.clone()));
                }
                let payload = state.payloads.get(&index).ok_or(PlayerError::not_published(Some(index)))?;
                (index, payload)
            }
            None => {
                if let Some(reason) = &state.latest_failure {
                    return Err(PlayerError::transport(reason.clone()));
                }
                state.payloads.iter().next_back().map(|(i, p)| (*i, p)).ok_or(PlayerError::not_published(None))?
            }
        };

        Ok(FeedUpdate::new(Segment::new(index, payload.clone()), Some(index.next())))
    }
}

/// One call recorded by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Opened(String),
    Append(Vec<u8>),
    Clock(f64),
    Play,
    Pause,
    Reset,
}

/// Sink that records every call in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    append_latency: Duration,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every append by `latency`, as a busy decoder would.
    pub fn with_append_latency(mut self, latency: Duration) -> Self {
        self.append_latency = latency;
        self
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    /// Bytes of every append, in order.
    pub fn appends(&self) -> Vec<Vec<u8>> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Append(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clock_positions(&self) -> Vec<f64> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Clock(seconds) => Some(*seconds),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: SinkEvent) {
        self.events.lock().push(event);
    }
}

#[async_trait::async_trait]
impl MediaSink for RecordingSink {
    async fn open(&self, mime_type: &str) -> Result<()> {
        self.record(SinkEvent::Opened(mime_type.to_string()));
        Ok(())
    }

    async fn append(&self, bytes: Arc<[u8]>) -> Result<()> {
        if !self.append_latency.is_zero() {
            tokio::time::sleep(self.append_latency).await;
        }
        self.record(SinkEvent::Append(bytes.to_vec()));
        Ok(())
    }

    async fn set_clock_position(&self, seconds: f64) -> Result<()> {
        self.record(SinkEvent::Clock(seconds));
        Ok(())
    }

    async fn start_playback(&self) -> Result<()> {
        self.record(SinkEvent::Play);
        Ok(())
    }

    async fn pause_playback(&self) -> Result<()> {
        self.record(SinkEvent::Pause);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.record(SinkEvent::Reset);
        Ok(())
    }
}
