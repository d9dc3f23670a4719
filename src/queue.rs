//! Ordered task queue
//!
//! Runs asynchronous tasks strictly one at a time in enqueue order. Enqueuing
//! never blocks: the first task to arrive on an idle queue spawns a drain
//! task that keeps pulling work until the queue is empty.
//!
//! Two switches control how tasks are run:
//!
//! - `indexed`: each task receives the queue's [`FeedIndex`] counter. The
//!   counter advances by one after a task succeeds and never on failure.
//! - `await_failures`: a failing task stops the drain and its error is
//!   returned from [`OrderedTaskQueue::settled`]. Remaining tasks wait for
//!   the next [`enqueue`](OrderedTaskQueue::enqueue). Without it failures
//!   are logged and draining continues.

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, trace};

use crate::types::FeedIndex;

/// A unit of deferred work, optionally parameterized by the queue counter.
pub type QueueTask = Box<dyn FnOnce(Option<FeedIndex>) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Queue behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueOptions {
    /// Pass the counter to every task
    pub indexed: bool,

    /// Stop draining and surface the first failure
    pub await_failures: bool,

    /// Initial counter value
    pub first_index: FeedIndex,
}

impl QueueOptions {
    /// Non-indexed queue that logs failures and keeps going.
    pub fn fire_and_forget() -> Self {
        Self::default()
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn awaiting_failures(mut self) -> Self {
        self.await_failures = true;
        self
    }

    pub fn starting_at(mut self, index: FeedIndex) -> Self {
        self.first_index = index;
        self
    }
}

struct QueueInner {
    pending: VecDeque<QueueTask>,
    index: FeedIndex,
    draining: bool,
    /// Mirrors `!draining` for waiters outside the lock
    idle: watch::Sender<bool>,
    /// Failure that stopped the last drain, kept until a waiter takes it
    failure: Option<anyhow::Error>,
}

impl QueueInner {
    fn set_draining(&mut self, draining: bool) {
        self.draining = draining;
        self.idle.send_replace(!draining);
    }
}

/// Serialized execution queue.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct OrderedTaskQueue {
    inner: Arc<Mutex<QueueInner>>,
    options: QueueOptions,
}

impl OrderedTaskQueue {
    pub fn new(options: QueueOptions) -> Self {
        let inner = QueueInner {
            pending: VecDeque::new(),
            index: options.first_index,
            draining: false,
            idle: watch::channel(true).0,
            failure: None,
        };
        Self { inner: Arc::new(Mutex::new(inner)), options }
    }

    pub fn options(&self) -> QueueOptions {
        self.options
    }

    /// Append a task and start draining if the queue is idle.
    ///
    /// Must be called from within a Tokio runtime. The task outcome is never
    /// returned here.
    pub fn enqueue<F, Fut>(&self, task: F)
    where
        F: FnOnce(Option<FeedIndex>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let task: QueueTask = Box::new(move |index| task(index).boxed());

        let mut inner = self.inner.lock();
        inner.pending.push_back(task);
        trace!("Task enqueued ({} pending)", inner.pending.len());

        if !inner.draining {
            inner.set_draining(true);
            tokio::spawn(Self::drain(Arc::clone(&self.inner), self.options));
        }
    }

    /// Drop every pending task, then wait for the running drain to settle.
    ///
    /// Acts as a barrier: when this returns no task of this queue is running
    /// and none will start until the next [`enqueue`](Self::enqueue). Any
    /// number of callers may wait at the same time.
    pub async fn clear(&self) {
        let dropped = {
            let mut inner = self.inner.lock();
            let dropped = inner.pending.len();
            inner.pending.clear();
            dropped
        };
        debug!("Queue cleared ({} pending tasks dropped)", dropped);

        self.wait_idle().await;
    }

    /// Wait until no drain is running and return the failure that stopped
    /// the last one, if any.
    ///
    /// With `await_failures`, this is where a failing task's error surfaces.
    /// The failure is handed to the first caller that observes it.
    pub async fn settled(&self) -> anyhow::Result<()> {
        self.wait_idle().await;
        match self.inner.lock().failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn wait_idle(&self) {
        let mut idle = self.inner.lock().idle.subscribe();
        if idle.wait_for(|idle| *idle).await.is_err() {
            trace!("Queue idle signal closed");
        }
    }

    /// Current counter value.
    pub fn current_index(&self) -> FeedIndex {
        self.inner.lock().index
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Whether a drain is running.
    pub fn is_draining(&self) -> bool {
        self.inner.lock().draining
    }

    async fn drain(inner: Arc<Mutex<QueueInner>>, options: QueueOptions) {
        loop {
            // Popping and clearing `draining` share one lock so a concurrent
            // enqueue either lands before the pop or starts a new drain.
            let (task, index) = {
                let mut guard = inner.lock();
                match guard.pending.pop_front() {
                    Some(task) => (task, guard.index),
                    None => {
                        guard.set_draining(false);
                        return;
                    }
                }
            };

            let argument = options.indexed.then_some(index);
            let outcome = match AssertUnwindSafe(task(argument)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => Err(anyhow::anyhow!("task panicked")),
            };

            match outcome {
                Ok(()) => {
                    let mut guard = inner.lock();
                    guard.index = guard.index.next();
                }
                Err(e) if options.await_failures => {
                    error!("Error processing queued task: {:#}", e);
                    let mut guard = inner.lock();
                    guard.failure = Some(e);
                    guard.set_draining(false);
                    return;
                }
                Err(e) => {
                    error!("Error processing queued task: {:#}", e);
                }
            }
        }
    }
}

impl std::fmt::Debug for OrderedTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("OrderedTaskQueue")
            .field("options", &self.options)
            .field("pending", &inner.pending.len())
            .field("index", &inner.index)
            .field("draining", &inner.draining)
            .finish()
    }
}
