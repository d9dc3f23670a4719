//! Feed player session
//!
//! [`FeedPlayer`] binds one feed transport to one media sink and drives
//! playback:
//!
//! 1. **Initialization** locates a cluster, builds the initialization
//!    segment from the cached container metadata and the cluster bytes, sets
//!    the sink clock and appends the init segment.
//! 2. **Playback** runs a periodic timer. Every timeslice it enqueues an
//!    append task on a fire-and-forget [`OrderedTaskQueue`]. The task asks the
//!    [`SegmentPrefetcher`] for the segment at the current index, appends it
//!    and advances.
//!
//! `play`, `seek` and `restart` are serialized by the loading flag. A call
//! made while another initialization is in flight returns immediately.
//! `restart` and `seek` use the queue's clear barrier, so no stale append
//! lands after the sink is reset.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::container;
use crate::events::{PlayerEvents, PlayerSignal};
use crate::locator::ClusterLocator;
use crate::prefetch::{Consumed, SegmentPrefetcher};
use crate::queue::{OrderedTaskQueue, QueueOptions};
use crate::retry::retry_with_backoff;
use crate::sink::MediaSink;
use crate::transport::{FeedTransport, fetch_with_timeout};
use crate::types::{ClusterMeta, FeedIndex, PlaybackPhase, PlayerOptions, PlayerState, VideoDuration};
use crate::Result;

#[cfg(test)]
mod tests;

/// Container metadata fetched once per session.
struct ContainerHeader {
    bytes: Arc<[u8]>,
    time_scale_seconds: f64,
}

struct AppendTimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Session {
    transport: Arc<dyn FeedTransport>,
    sink: Arc<dyn MediaSink>,
    options: PlayerOptions,
    locator: ClusterLocator,
    prefetcher: SegmentPrefetcher,
    queue: OrderedTaskQueue,
    events: PlayerEvents,
    state: Mutex<PlayerState>,
    header: Mutex<Option<Arc<ContainerHeader>>>,
    cluster_meta: Mutex<Option<ClusterMeta>>,
    sink_open: AtomicBool,
    timer: Mutex<Option<AppendTimer>>,
    cancel: CancellationToken,
}

/// A player bound to one feed and one sink.
///
/// Dropping the player cancels its timer and any cluster search in flight.
pub struct FeedPlayer {
    session: Arc<Session>,
}

impl FeedPlayer {
    /// Bind a transport and a sink. Nothing is fetched until [`play`](Self::play).
    pub fn attach(transport: Arc<dyn FeedTransport>, sink: Arc<dyn MediaSink>, options: PlayerOptions) -> Result<Self> {
        options.validate()?;

        let session = Session {
            locator: ClusterLocator::new(Arc::clone(&transport), &options),
            prefetcher: SegmentPrefetcher::new(Arc::clone(&transport), options.look_ahead)
                .with_fetch_timeout(options.fetch_timeout()),
            queue: OrderedTaskQueue::new(QueueOptions::fire_and_forget()),
            events: PlayerEvents::new(),
            state: Mutex::new(PlayerState::default()),
            header: Mutex::new(None),
            cluster_meta: Mutex::new(None),
            sink_open: AtomicBool::new(false),
            timer: Mutex::new(None),
            cancel: CancellationToken::new(),
            transport,
            sink,
            options,
        };

        info!(
            "Player attached (timeslice {:?}, look-ahead {})",
            session.options.timeslice(),
            session.options.look_ahead
        );
        Ok(Self { session: Arc::new(session) })
    }

    /// Locate a cluster and start playback.
    ///
    /// Always re-initializes: the append timer is stopped, a cluster is
    /// located (backward from a pending seek target, forward from the feed
    /// head otherwise) and a fresh init segment is appended. No-op while
    /// another initialization is in flight.
    pub async fn play(&self) -> Result<()> {
        self.initialize(false).await
    }

    /// Discard the sink's buffered content and re-initialize.
    pub async fn restart(&self) -> Result<()> {
        self.initialize(true).await
    }

    /// Restart playback from the nearest cluster at or before `target`.
    pub async fn seek(&self, target: FeedIndex) -> Result<()> {
        info!("Seeking to {}", target);
        self.session.state.lock().seek_target = Some(target);
        self.initialize(true).await
    }

    /// Stop appending and pause the sink clock. The position is kept.
    ///
    /// Pausing while an initialization is in flight lets it finish locating
    /// and appending the init segment, but no append timer or sink playback
    /// is started afterwards.
    pub async fn pause(&self) -> Result<()> {
        let session = &self.session;
        {
            let mut state = session.state.lock();
            state.is_playing = false;
            state.phase = PlaybackPhase::Paused;
        }
        session.stop_timer().await;
        session.sink.pause_playback().await?;

        session.events.emit(PlayerSignal::IsPlaying, false);
        info!("Playback paused");
        Ok(())
    }

    /// Resume appending from the current index without locating a cluster.
    pub async fn continue_playback(&self) -> Result<()> {
        let session = &self.session;
        Session::start_timer(session);
        session.sink.start_playback().await?;

        let current = {
            let mut state = session.state.lock();
            state.is_playing = true;
            state.phase = PlaybackPhase::Playing;
            state.current_index
        };
        session.events.emit(PlayerSignal::IsPlaying, true);
        info!("Playback continued at {:?}", current);
        Ok(())
    }

    /// Estimate the published length of the feed: head index times timeslice.
    pub async fn approx_duration(&self) -> Result<VideoDuration> {
        let session = &self.session;
        let transport = session.transport.as_ref();
        let limit = session.options.fetch_timeout();
        let update = retry_with_backoff(&session.options.retry, "feed head fetch", move || {
            fetch_with_timeout(transport, None, limit)
        })
        .await?;

        let index = update.segment.index;
        let duration = Duration::from_millis(session.options.timeslice_ms.saturating_mul(index.value()));
        debug!("Feed head at {} (~{:?})", index, duration);
        Ok(VideoDuration { index, duration })
    }

    /// Stop playback and release the session.
    ///
    /// Waits for any running append to settle. Event subscriptions end once
    /// the session is dropped.
    pub async fn detach(self) {
        let session = &self.session;
        session.cancel.cancel();
        session.stop_timer().await;
        session.queue.clear().await;
        session.prefetcher.clear();
        *session.state.lock() = PlayerState::default();
        info!("Player detached");
    }

    /// Snapshot of the playback state.
    pub fn state(&self) -> PlayerState {
        self.session.state.lock().clone()
    }

    pub fn events(&self) -> &PlayerEvents {
        &self.session.events
    }

    /// Timing of the last located cluster.
    pub fn cluster_meta(&self) -> Option<ClusterMeta> {
        *self.session.cluster_meta.lock()
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.session.options
    }

    async fn initialize(&self, reset_sink: bool) -> Result<()> {
        let session = &self.session;
        if !session.begin_loading() {
            debug!("Initialization already in flight, ignoring request");
            return Ok(());
        }

        let seek = session.state.lock().seek_target;
        let result = Session::initialize(session, reset_sink, seek).await;
        if let Err(e) = &result {
            warn!("Playback initialization failed: {}", e);
            {
                let mut state = session.state.lock();
                state.is_loading = false;
                state.is_playing = false;
                // A target recorded while this attempt was running is kept for the next one
                if state.seek_target == seek {
                    state.seek_target = None;
                }
                state.phase = PlaybackPhase::Attached;
            }
            session.events.emit(PlayerSignal::IsPlaying, false);
            session.events.emit(PlayerSignal::LoadingPlaying, false);
        }
        result
    }
}

impl Drop for FeedPlayer {
    fn drop(&mut self) {
        debug!("Dropping feed player");
        self.session.cancel.cancel();
    }
}

impl std::fmt::Debug for FeedPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedPlayer")
            .field("state", &*self.session.state.lock())
            .field("prefetcher", &self.session.prefetcher)
            .finish()
    }
}

impl Session {
    /// Set the loading flag unless it is already set.
    fn begin_loading(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_loading {
                return false;
            }
            state.is_loading = true;
            state.phase = PlaybackPhase::Initializing;
        }
        self.events.emit(PlayerSignal::LoadingPlaying, true);
        true
    }

    async fn initialize(self: &Arc<Self>, reset_sink: bool, seek: Option<FeedIndex>) -> Result<()> {
        self.stop_timer().await;
        self.queue.clear().await;
        self.prefetcher.clear();

        if reset_sink {
            self.sink.reset().await?;
            self.sink_open.store(false, Ordering::SeqCst);
            self.state.lock().current_index = None;
        }

        let located = self.locator.locate(seek, &self.cancel).await?;
        let header = self.container_header().await?;

        let meta =
            container::cluster_meta(header.time_scale_seconds, located.segment.as_bytes(), located.cluster_offset)?;
        let init = container::build_init_segment(&header.bytes, located.segment.as_bytes(), located.cluster_offset)?;

        if !self.sink_open.swap(true, Ordering::SeqCst) {
            self.sink.open(&self.options.mime_type).await?;
        }
        self.sink.set_clock_position(meta.cluster_timestamp_seconds).await?;
        self.sink.append(init.into()).await?;
        debug!(
            "Init segment appended from {} (cluster at byte {}, t={:.3}s)",
            located.segment.index, located.cluster_offset, meta.cluster_timestamp_seconds
        );

        *self.cluster_meta.lock() = Some(meta);

        // The timer starts under the state lock so a concurrent pause either
        // sees it running or is seen here
        let timer_started = {
            let mut state = self.state.lock();
            state.current_index = Some(located.next_index);
            if state.seek_target == seek {
                state.seek_target = None;
            }
            let paused = state.phase == PlaybackPhase::Paused;
            if !paused {
                Self::start_timer(self);
            }
            !paused
        };

        if timer_started {
            let init_buffer = self.options.init_buffer();
            if !init_buffer.is_zero() {
                tokio::time::sleep(init_buffer).await;
            }
            if self.state.lock().phase != PlaybackPhase::Paused {
                self.sink.start_playback().await?;
            }
        }

        let playing = {
            let mut state = self.state.lock();
            state.is_loading = false;
            let playing = state.phase != PlaybackPhase::Paused;
            if playing {
                state.is_playing = true;
                state.phase = PlaybackPhase::Playing;
            }
            playing
        };

        if playing {
            self.events.emit(PlayerSignal::IsPlaying, true);
            info!("Playback started at {}", located.next_index);
        } else {
            info!("Initialized at {} while paused", located.next_index);
        }
        self.events.emit(PlayerSignal::LoadingPlaying, false);
        Ok(())
    }

    async fn container_header(&self) -> Result<Arc<ContainerHeader>> {
        if let Some(header) = self.header.lock().clone() {
            return Ok(header);
        }

        let index = self.options.metadata_index;
        let transport = self.transport.as_ref();
        let limit = self.options.fetch_timeout();
        let update = retry_with_backoff(&self.options.retry, "metadata fetch", move || {
            fetch_with_timeout(transport, Some(index), limit)
        })
        .await?;

        let time_scale_seconds = container::timestamp_scale_seconds(update.segment.as_bytes())?;
        let header = Arc::new(ContainerHeader { bytes: update.segment.data, time_scale_seconds });
        debug!("Container metadata cached ({} bytes, {}s per tick)", header.bytes.len(), time_scale_seconds);

        *self.header.lock() = Some(Arc::clone(&header));
        Ok(header)
    }

    fn start_timer(this: &Arc<Self>) {
        let mut timer = this.timer.lock();
        if timer.is_some() {
            return;
        }

        let cancel = this.cancel.child_token();
        let token = cancel.clone();
        let session: Weak<Self> = Arc::downgrade(this);
        let period = this.options.timeslice();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(strong) = session.upgrade() else { break };
                        Self::enqueue_append(&strong);
                    }
                }
            }
            trace!("Append timer stopped");
        });

        *timer = Some(AppendTimer { cancel, handle });
        debug!("Append timer started ({:?})", period);
    }

    async fn stop_timer(&self) {
        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            timer.cancel.cancel();
            if let Err(e) = timer.handle.await {
                warn!("Append timer ended abnormally: {}", e);
            }
        }
    }

    fn enqueue_append(this: &Arc<Self>) {
        let session = Arc::downgrade(this);
        this.queue.enqueue(move |_| async move {
            match session.upgrade() {
                Some(session) => session.append_next().await.map_err(anyhow::Error::from),
                None => Ok(()),
            }
        });
    }

    /// Append the segment at the current index if it is ready.
    async fn append_next(&self) -> Result<()> {
        let Some(current) = self.state.lock().current_index else {
            return Ok(());
        };

        self.prefetcher.ensure_window(current);
        match self.prefetcher.consume(current) {
            Consumed::Segment(segment) => {
                self.sink.append(Arc::clone(&segment.data)).await?;

                let mut state = self.state.lock();
                if state.current_index == Some(current) {
                    state.current_index = Some(current.next());
                }
                trace!("Appended {} ({} bytes)", current, segment.len());
            }
            Consumed::Pending => trace!("Segment {} still loading", current),
            Consumed::Errored(cause) => debug!("Segment {} unavailable: {}", current, cause),
        }
        Ok(())
    }
}
