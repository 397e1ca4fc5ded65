//! The Event Queue: priority, size-aware, resource-backpressured, optionally
//! persistent, deduplicating queue with an adaptive autoscaler and a global
//! concurrency semaphore.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use agentrt_sync::Semaphore;
use agentrt_types::{Event, EventStore, Persistor, QueueItem, Snapshot};
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::autoscaler::Autoscaler;
use crate::config::{AutoscalerConfig, EventQueueConfig};
use crate::persistor::stable_hash;
use crate::resource::{ResourceSample, ResourceSampler, SystemResourceSampler, is_backpressure_active};

/// A bounded, insertion-order-evicting set of processed event ids.
struct ProcessedSet {
    members: HashSet<String>,
    order: VecDeque<String>,
    max_len: usize,
}

impl ProcessedSet {
    fn new(max_len: usize) -> Self {
        Self {
            members: HashSet::new(),
            order: VecDeque::new(),
            max_len,
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    fn insert(&mut self, id: String) {
        if self.members.insert(id.clone()) {
            self.order.push_back(id);
            while self.order.len() > self.max_len {
                if let Some(oldest) = self.order.pop_front() {
                    self.members.remove(&oldest);
                }
            }
        }
    }
}

/// Outcome of one `process_batch`/`process_all` pass.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Ids of events the handler processed successfully.
    pub succeeded: Vec<String>,
    /// Events the handler failed on, paired with the handler's error message.
    ///
    /// The caller decides what to do with these (commonly: route to the
    /// Dead-Letter Queue), since the Event Queue has no DLQ dependency of its
    /// own.
    pub failed: Vec<(Event, String)>,
}

impl BatchOutcome {
    fn merge(&mut self, other: BatchOutcome) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }
}

struct QueueState {
    items: VecDeque<QueueItem>,
    processed: ProcessedSet,
}

/// Priority, resource-backpressured, optionally persistent event queue.
pub struct EventQueue {
    config: EventQueueConfig,
    state: Mutex<QueueState>,
    persistor: Option<Arc<dyn Persistor>>,
    event_store: Option<Arc<dyn EventStore>>,
    semaphore: Arc<Semaphore>,
    batch_size: Arc<AtomicUsize>,
    sampler: Mutex<Box<dyn ResourceSampler>>,
    processing: AtomicBool,
    autoscaler: Option<Arc<Autoscaler>>,
    cancel: CancellationToken,
    /// Average per-event processing time observed during the most recent
    /// `process_batch_inner` pass, in nanoseconds; `0` until the first batch
    /// with at least one processed item completes.
    avg_event_processing_nanos: Arc<AtomicU64>,
}

impl EventQueue {
    /// Construct a queue with the given configuration and no Persistor or
    /// Event Store wired (both are best-effort collaborators enabled
    /// explicitly via [`EventQueue::with_persistor`]/[`EventQueue::with_event_store`]).
    pub fn new(config: EventQueueConfig) -> Self {
        Self::with_sampler(config, Box::new(SystemResourceSampler::new()))
    }

    /// Construct a queue with an explicit [`ResourceSampler`], for tests that
    /// need deterministic backpressure behavior.
    pub fn with_sampler(config: EventQueueConfig, sampler: Box<dyn ResourceSampler>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        let batch_size = Arc::new(AtomicUsize::new(config.batch_size));
        let autoscaler = config.enable_auto_scaling.then(|| {
            Arc::new(Autoscaler::new(
                AutoscalerConfig::default(),
                config.max_cpu_usage,
                config.max_memory_usage,
                batch_size.clone(),
                semaphore.clone(),
            ))
        });
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                processed: ProcessedSet::new(config.max_processed_events),
            }),
            persistor: None,
            event_store: None,
            semaphore,
            batch_size,
            sampler: Mutex::new(sampler),
            processing: AtomicBool::new(false),
            autoscaler,
            cancel: CancellationToken::new(),
            avg_event_processing_nanos: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    /// Attach a Persistor; enqueue will persist critical/all events to it per
    /// `enable_persistence`/`persist_critical_events`/`persist_all_events`.
    #[must_use]
    pub fn with_persistor(mut self, persistor: Arc<dyn Persistor>) -> Self {
        self.persistor = Some(persistor);
        self
    }

    /// Attach an Event Store; enqueue will append to it when
    /// `enable_event_store` is set.
    #[must_use]
    pub fn with_event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    /// Start the adaptive autoscaler's background tick loop, if
    /// `enable_auto_scaling` was set. A second call is a no-op.
    pub fn spawn_autoscaler(self: &Arc<Self>) {
        let Some(autoscaler) = self.autoscaler.clone() else {
            return;
        };
        let queue = self.clone();
        let cancel = self.cancel.clone();
        let interval = self.config.auto_scaling_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let depth = queue.depth().await;
                        let sample = queue.sampler.lock().await.sample();
                        let avg_processing_time = Duration::from_nanos(
                            queue.avg_event_processing_nanos.load(Ordering::Relaxed),
                        );
                        autoscaler.tick(depth, sample, avg_processing_time).await;
                    }
                }
            }
        });
    }

    /// Current number of items held by the queue.
    pub async fn depth(&self) -> usize {
        self.state.lock().await.items.len()
    }

    /// The current batch size, as retuned by the autoscaler if enabled.
    pub fn batch_size(&self) -> usize {
        self.batch_size.load(Ordering::SeqCst)
    }

    /// Whether backpressure is currently active: over the memory/CPU budget,
    /// or at `max_queue_depth`. Advisory to producers; enqueue does not
    /// consult this to decide whether to drop.
    pub async fn is_full(&self) -> bool {
        let depth = self.depth().await;
        let sample = self.sampler.lock().await.sample();
        is_backpressure_active(
            sample,
            self.config.max_memory_usage,
            self.config.max_cpu_usage,
            self.config.max_queue_depth,
            depth,
        )
    }

    /// Attempt to enqueue `event` at `priority` (higher values dequeue
    /// first). Returns `false` if the event was rejected or was a duplicate;
    /// the caller is never blocked and nothing is ever silently dropped
    /// without a log line.
    pub async fn enqueue(&self, mut event: Event, priority: i32) -> bool {
        let mut state = self.state.lock().await;

        if state.processed.contains(&event.id) || state.items.iter().any(|i| i.event.id == event.id) {
            tracing::debug!(event_id = %event.id, "duplicate enqueue ignored");
            return false;
        }

        let size = serde_json::to_vec(&event).map(|b| b.len()).unwrap_or(usize::MAX);
        if size > self.config.max_event_size {
            tracing::warn!(event_id = %event.id, size, max = self.config.max_event_size, "event exceeds max_event_size, rejected");
            return false;
        }

        let is_huge = size >= self.config.huge_event_threshold;
        if is_huge && self.config.drop_huge_events {
            tracing::warn!(event_id = %event.id, size, "huge event dropped");
            return false;
        }

        let is_large = size >= self.config.large_event_threshold;
        let mut compressed = false;
        let mut original_size = None;
        if is_large && self.config.enable_compression {
            compressed = true;
            original_size = Some(size);
            event.metadata.compressed = Some(true);
            event.metadata.original_size = Some(size);
        }

        if let Some(max_depth) = self.config.max_queue_depth {
            if state.items.len() >= max_depth {
                tracing::warn!(event_id = %event.id, depth = state.items.len(), max_depth, "queue at max depth, rejected");
                return false;
            }
        }

        if self.should_persist(&event.event_type) {
            if let Some(persistor) = &self.persistor {
                let snapshot = Snapshot {
                    xc_id: event.id.clone(),
                    hash: stable_hash(&[&event.id, &event.timestamp.timestamp_millis().to_string()]),
                    ts: event.timestamp.timestamp_millis(),
                    events: vec![event.clone()],
                    state: serde_json::json!({ "type": "event" }),
                };
                if let Err(err) = persistor.append(snapshot).await {
                    tracing::warn!(event_id = %event.id, error = %err, "best-effort event persistence failed");
                }
            }
        }

        if self.config.enable_event_store {
            if let Some(store) = &self.event_store {
                if let Err(err) = store.append_events(vec![event.clone()]).await {
                    tracing::warn!(event_id = %event.id, error = %err, "best-effort event store append failed");
                }
            }
        }

        let enqueued_at = Utc::now();
        let persisted = self.should_persist(&event.event_type);
        let item = QueueItem {
            event,
            priority,
            enqueued_at,
            retry_count: 0,
            size,
            is_large,
            is_huge,
            compressed,
            original_size,
            persistent: persisted,
            persisted_at: persisted.then_some(enqueued_at),
        };

        let insert_at = state
            .items
            .iter()
            .position(|existing| existing.priority < item.priority)
            .unwrap_or(state.items.len());
        state.items.insert(insert_at, item);
        true
    }

    fn should_persist(&self, event_type: &str) -> bool {
        if !self.config.enable_persistence {
            return false;
        }
        if self.config.persist_all_events {
            return true;
        }
        if !self.config.persist_critical_events {
            return false;
        }
        self.config.critical_event_types.iter().any(|t| t == event_type)
            || self
                .config
                .critical_event_prefixes
                .iter()
                .any(|prefix| event_type.starts_with(prefix.as_str()))
    }

    /// Remove and return the highest-priority, oldest-enqueued item's event.
    pub async fn dequeue(&self) -> Option<Event> {
        let mut state = self.state.lock().await;
        state.items.pop_front().map(|item| item.event)
    }

    /// Process up to one batch (`batch_size` items) through `handler`.
    /// Concurrent callers observe a no-op if a pass is already running.
    pub async fn process_batch<F, Fut>(&self, handler: F) -> BatchOutcome
    where
        F: Fn(Event) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), String>> + Send,
    {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return BatchOutcome::default();
        }
        let outcome = self.process_batch_inner(&handler).await;
        self.processing.store(false, Ordering::SeqCst);
        outcome
    }

    /// Drain the queue through `handler`, one batch at a time, until empty.
    /// Concurrent callers observe a no-op if a pass is already running.
    pub async fn process_all<F, Fut>(&self, handler: F) -> BatchOutcome
    where
        F: Fn(Event) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), String>> + Send,
    {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return BatchOutcome::default();
        }
        let mut total = BatchOutcome::default();
        loop {
            let outcome = self.process_batch_inner(&handler).await;
            let made_progress = !outcome.succeeded.is_empty() || !outcome.failed.is_empty();
            total.merge(outcome);
            if !made_progress || self.depth().await == 0 {
                break;
            }
        }
        self.processing.store(false, Ordering::SeqCst);
        total
    }

    async fn process_batch_inner<F, Fut>(&self, handler: &F) -> BatchOutcome
    where
        F: Fn(Event) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), String>> + Send,
    {
        let batch_size = self.batch_size();
        let slice: Vec<QueueItem> = {
            let mut state = self.state.lock().await;
            let take = batch_size.min(state.items.len());
            state.items.drain(..take).collect()
        };
        if slice.is_empty() {
            return BatchOutcome::default();
        }

        let backpressure = self.is_full().await;
        let chunk_size = if backpressure { 1 } else { 5.min(slice.len()) };

        let mut outcome = BatchOutcome::default();
        let chunks: Vec<Vec<QueueItem>> = slice.chunks(chunk_size).map(|c| c.to_vec()).collect();
        let total_chunks = chunks.len();
        let batch_started = std::time::Instant::now();
        let mut items_processed: u64 = 0;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut futures = Vec::with_capacity(chunk.len());
            for item in chunk {
                futures.push(self.run_one(item, handler));
            }
            let results = futures::future::join_all(futures).await;
            for (event, result) in results {
                items_processed += 1;
                match result {
                    Ok(()) => {
                        let mut state = self.state.lock().await;
                        state.processed.insert(event.id.clone());
                        outcome.succeeded.push(event.id);
                    }
                    Err(err) => {
                        tracing::warn!(event_id = %event.id, error = %err, "event handler failed");
                        outcome.failed.push((event, err));
                    }
                }
            }
            if i + 1 < total_chunks {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
        if items_processed > 0 {
            let avg_nanos = (batch_started.elapsed().as_nanos() / items_processed as u128) as u64;
            self.avg_event_processing_nanos.store(avg_nanos, Ordering::Relaxed);
        }
        outcome
    }

    async fn run_one<F, Fut>(&self, item: QueueItem, handler: &F) -> (Event, Result<(), String>)
    where
        F: Fn(Event) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), String>> + Send,
    {
        let event = item.event;
        if self.config.enable_global_concurrency {
            let _permit = self.semaphore.acquire().await;
            let result = handler(event.clone()).await;
            (event, result)
        } else {
            let result = handler(event.clone()).await;
            (event, result)
        }
    }

    /// Stop the autoscaler's background task and clear all in-memory state.
    /// Safe to call more than once.
    pub async fn destroy(&self) {
        self.cancel.cancel();
        let mut state = self.state.lock().await;
        state.items.clear();
        state.processed = ProcessedSet::new(self.config.max_processed_events);
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
