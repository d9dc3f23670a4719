//! Look-ahead segment prefetcher
//!
//! Keeps the current playback index and the next few indices in flight so
//! network latency overlaps with playback. Fetch completions only write into
//! the buffer map; the append task is the sole consumer and removes each
//! entry exactly once.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::transport::{FeedTransport, fetch_with_timeout};
use crate::types::{DEFAULT_FETCH_TIMEOUT_MS, FeedIndex, Segment};
use crate::PlayerError;

/// State of one buffered feed index.
#[derive(Debug, Clone)]
pub enum BufferEntry {
    /// Fetch in flight
    Loading,

    /// Payload fetched and waiting to be consumed
    Ready(Segment),

    /// Fetch failed; the next window fill or consume replaces it
    Errored(Arc<PlayerError>),
}

/// Outcome of [`SegmentPrefetcher::consume`].
#[derive(Debug, Clone)]
pub enum Consumed {
    /// The segment for the requested index, removed from the buffer
    Segment(Segment),

    /// Not fetched yet; try the same index again later
    Pending,

    /// The fetch failed, usually because the index is not published yet
    Errored(Arc<PlayerError>),
}

struct Slot {
    generation: u64,
    entry: BufferEntry,
}

struct BufferState {
    entries: BTreeMap<FeedIndex, Slot>,
    generation: u64,
    cancel: CancellationToken,
}

/// Bounded look-ahead window over the feed.
pub struct SegmentPrefetcher {
    transport: Arc<dyn FeedTransport>,
    look_ahead: usize,
    fetch_timeout: Duration,
    state: Arc<Mutex<BufferState>>,
}

impl SegmentPrefetcher {
    pub fn new(transport: Arc<dyn FeedTransport>, look_ahead: usize) -> Self {
        let state = BufferState { entries: BTreeMap::new(), generation: 0, cancel: CancellationToken::new() };
        Self {
            transport,
            look_ahead: look_ahead.max(1),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Bound every fetch; an expired fetch leaves an errored entry.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn look_ahead(&self) -> usize {
        self.look_ahead
    }

    /// Start fetches for `current` and the following indices that are
    /// neither loading nor ready.
    ///
    /// Missing and errored entries are (re)fetched, so a segment published
    /// after a failed fetch is picked up on the next tick. Loading and ready
    /// entries are left alone and calling this on every tick never
    /// duplicates a fetch. Returns the number of fetches started.
    pub fn ensure_window(&self, current: FeedIndex) -> usize {
        let mut state = self.state.lock();
        let generation = state.generation;
        let cancel = state.cancel.clone();
        let mut started = 0;
        let mut index = current;

        for _ in 0..self.look_ahead {
            let in_hand = matches!(
                state.entries.get(&index).map(|slot| &slot.entry),
                Some(BufferEntry::Loading | BufferEntry::Ready(_))
            );
            if !in_hand {
                state.entries.insert(index, Slot { generation, entry: BufferEntry::Loading });
                self.spawn_fetch(index, generation, cancel.clone());
                started += 1;
            }
            index = index.next();
        }

        if started > 0 {
            trace!("Prefetch window from {}: {} fetches started", current, started);
        }
        started
    }

    /// Take the entry for `current` if it is ready.
    ///
    /// Ready and errored entries are removed; a loading entry stays in place.
    pub fn consume(&self, current: FeedIndex) -> Consumed {
        let mut state = self.state.lock();
        let settled = matches!(
            state.entries.get(&current).map(|slot| &slot.entry),
            Some(BufferEntry::Ready(_) | BufferEntry::Errored(_))
        );
        if !settled {
            return Consumed::Pending;
        }

        match state.entries.remove(&current).map(|slot| slot.entry) {
            Some(BufferEntry::Ready(segment)) => Consumed::Segment(segment),
            Some(BufferEntry::Errored(cause)) => Consumed::Errored(cause),
            _ => Consumed::Pending,
        }
    }

    /// Current state of the entry for `index`, if any.
    pub fn entry(&self, index: FeedIndex) -> Option<BufferEntry> {
        self.state.lock().entries.get(&index).map(|slot| slot.entry.clone())
    }

    /// Number of buffered entries in any state.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and abandon in-flight fetches.
    ///
    /// Late completions from before the clear are discarded.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        state.generation += 1;
        state.cancel.cancel();
        state.cancel = CancellationToken::new();
        debug!("Segment buffer cleared ({} entries dropped)", dropped);
    }

    fn spawn_fetch(&self, index: FeedIndex, generation: u64, cancel: CancellationToken) {
        let transport = Arc::clone(&self.transport);
        let state = Arc::clone(&self.state);
        let limit = self.fetch_timeout;

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    trace!("Prefetch of {} abandoned", index);
                    return;
                }
                result = fetch_with_timeout(transport.as_ref(), Some(index), limit) => result,
            };

            let entry = match result {
                Ok(update) => {
                    trace!("Prefetched {} ({} bytes)", index, update.segment.len());
                    BufferEntry::Ready(Segment::new(index, update.segment.data))
                }
                Err(e) => {
                    if e.is_transient() {
                        trace!("Segment {} not available yet: {}", index, e);
                    } else {
                        warn!("Error with feed reader at {}: {}", index, e);
                    }
                    BufferEntry::Errored(Arc::new(e))
                }
            };

            // The completion lands atomically with respect to the next consume
            let mut state = state.lock();
            if let Some(slot) = state.entries.get_mut(&index) {
                if slot.generation == generation && matches!(slot.entry, BufferEntry::Loading) {
                    slot.entry = entry;
                }
            }
        });
    }
}

impl std::fmt::Debug for SegmentPrefetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SegmentPrefetcher")
            .field("look_ahead", &self.look_ahead)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("entries", &state.entries.len())
            .field("generation", &state.generation)
            .finish()
    }
}
