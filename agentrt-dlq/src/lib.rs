//! Dead-letter queue: durable holding area for events that exhausted their
//! retry budget, with tagging, bulk reprocessing, and retention.
//!
//! Mirrors [`agentrt_queue::EventQueue`]'s shape — an `RwLock`-guarded
//! insertion-order map, an optional Persistor, and a background sweep task —
//! generalized from "process a batch" to "evict past a retention window".

#![deny(missing_docs)]

pub mod config;
pub mod stats;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use agentrt_types::{DLQItem, DlqError, ErrorRecord, Event, Persistor, ProcessingContext, Snapshot};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

pub use config::DlqConfig;
pub use stats::DlqStats;

/// Selection criteria for [`DeadLetterQueue::reprocess_by_criteria`]. All
/// provided fields must match (conjunction); omitted fields impose no
/// constraint.
#[derive(Debug, Clone, Default)]
pub struct ReprocessCriteria {
    /// Match the originating event's `type`.
    pub event_type: Option<String>,
    /// Match the `error:<class>` tag (pass the bare class, e.g. `"timeout"`).
    pub error_type: Option<String>,
    /// Match an exact tag, e.g. `"error:timeout"` or `"agent:a1"`.
    pub tag: Option<String>,
    /// Select items at least this old: `now - dlq_timestamp >= max_age`.
    pub max_age: Option<std::time::Duration>,
    /// Cap on the number of items selected.
    pub limit: Option<usize>,
}

struct State {
    order: VecDeque<String>,
    items: HashMap<String, DLQItem>,
}

/// A dead-letter queue keyed by event id, with derived tags, bulk
/// reprocessing, and a retention sweep.
pub struct DeadLetterQueue {
    config: DlqConfig,
    state: RwLock<State>,
    persistor: Option<Arc<dyn Persistor>>,
    cancel: CancellationToken,
}

impl DeadLetterQueue {
    /// Construct an empty DLQ with no Persistor wired.
    pub fn new(config: DlqConfig) -> Self {
        Self {
            config,
            state: RwLock::new(State {
                order: VecDeque::new(),
                items: HashMap::new(),
            }),
            persistor: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a Persistor; `send_to_dlq`/`mark_as_poison` persist to it
    /// best-effort when `enable_persistence` is set.
    #[must_use]
    pub fn with_persistor(mut self, persistor: Arc<dyn Persistor>) -> Self {
        self.persistor = Some(persistor);
        self
    }

    /// Rehydrate the in-memory map from prior `state.type == "dlq-item"`
    /// snapshots, in the order the Persistor returns them.
    pub async fn load_from_snapshots(&self, snapshots: Vec<Snapshot>) {
        let mut state = self.state.write().await;
        for snapshot in snapshots {
            if snapshot.state.get("type").and_then(|v| v.as_str()) != Some("dlq-item") {
                continue;
            }
            let Some(item) = snapshot
                .state
                .get("dlqItem")
                .and_then(|v| serde_json::from_value::<DLQItem>(v.clone()).ok())
            else {
                continue;
            };
            if !state.items.contains_key(&item.id) {
                state.order.push_back(item.id.clone());
            }
            state.items.insert(item.id.clone(), item);
        }
    }

    /// Start the periodic retention sweep, if `enable_auto_cleanup` was set.
    /// A second call is a no-op.
    pub fn spawn_cleanup(self: &Arc<Self>) {
        if !self.config.enable_auto_cleanup {
            return;
        }
        let dlq = self.clone();
        let cancel = self.cancel.clone();
        let interval = self.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => dlq.cleanup_old_items().await,
                }
            }
        });
    }

    /// Stop the background sweep task. Safe to call more than once.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Record a handler failure against `event`, upserting by `event.id`.
    pub async fn send_to_dlq(&self, event: Event, error_message: &str, attempts: u32, priority: i32, ctx: ProcessingContext) {
        let now = Utc::now();
        let mut state = self.state.write().await;

        if !state.items.contains_key(&event.id) && state.items.len() >= self.config.max_dlq_size {
            if let Some(oldest_id) = state.order.pop_front() {
                state.items.remove(&oldest_id);
            }
        }

        let is_new = !state.items.contains_key(&event.id);
        let item = state.items.entry(event.id.clone()).or_insert_with(|| DLQItem {
            id: event.id.clone(),
            event: event.clone(),
            errors: Vec::new(),
            attempts: 0,
            first_failed_at: now,
            last_failed_at: now,
            dlq_timestamp: now,
            original_priority: priority,
            processing_context: ctx.clone(),
            tags: Vec::new(),
            can_reprocess: true,
        });
        if is_new {
            state.order.push_back(event.id.clone());
        }

        item.errors.push(ErrorRecord {
            message: error_message.to_string(),
            stack: None,
            timestamp: now,
            attempt: i64::from(attempts),
        });
        item.attempts = item.attempts.max(attempts);
        item.last_failed_at = now;
        item.dlq_timestamp = now;
        item.processing_context = ctx;
        item.tags = derive_tags(&item.event, error_message, &item.tags);

        let snapshot = self.config.enable_persistence.then(|| dlq_snapshot(item));
        let len = state.items.len();
        let alert = len >= self.config.alert_threshold;
        drop(state);

        if let Some(snapshot) = snapshot {
            self.persist(snapshot).await;
        }
        if alert {
            tracing::warn!(size = len, threshold = self.config.alert_threshold, "DLQ size at or above alert threshold");
        }
    }

    /// Remove and return the event for `id`. Fails if absent or poisoned.
    pub async fn reprocess_from_dlq(&self, id: &str) -> Result<Event, DlqError> {
        let mut state = self.state.write().await;
        let item = state.items.get(id).ok_or_else(|| DlqError::NotFound(id.to_string()))?;
        if !item.can_reprocess {
            return Err(DlqError::Poisoned(id.to_string()));
        }
        let item = state.items.remove(id).expect("presence checked above");
        state.order.retain(|existing| existing != id);
        tracing::info!(event_id = %id, "DLQ item removed for reprocessing; persisted copy is not deleted");
        Ok(item.event)
    }

    /// Select items matching `criteria` (in insertion order, oldest first),
    /// remove them, and return their events.
    pub async fn reprocess_by_criteria(&self, criteria: &ReprocessCriteria) -> Vec<Event> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut selected = Vec::new();
        for id in state.order.iter() {
            if let Some(limit) = criteria.limit {
                if selected.len() >= limit {
                    break;
                }
            }
            if let Some(item) = state.items.get(id) {
                if matches(item, criteria, now) {
                    selected.push(id.clone());
                }
            }
        }

        let mut events = Vec::with_capacity(selected.len());
        for id in &selected {
            if let Some(item) = state.items.remove(id) {
                events.push(item.event);
            }
        }
        state.order.retain(|id| !selected.contains(id));
        events
    }

    /// Mark `id` as unable to be reprocessed, recording `reason` as an
    /// errors-log entry with `attempt = -1` and a `poison` tag.
    pub async fn mark_as_poison(&self, id: &str, reason: &str) -> Result<(), DlqError> {
        let now = Utc::now();
        let snapshot = {
            let mut state = self.state.write().await;
            let item = state.items.get_mut(id).ok_or_else(|| DlqError::NotFound(id.to_string()))?;
            item.can_reprocess = false;
            item.errors.push(ErrorRecord {
                message: reason.to_string(),
                stack: None,
                timestamp: now,
                attempt: -1,
            });
            if !item.tags.iter().any(|t| t == "poison") {
                item.tags.push("poison".to_string());
            }
            self.config.enable_persistence.then(|| dlq_snapshot(item))
        };
        if let Some(snapshot) = snapshot {
            self.persist(snapshot).await;
        }
        Ok(())
    }

    /// Aggregate statistics over the current contents.
    pub async fn get_dlq_stats(&self) -> DlqStats {
        let state = self.state.read().await;
        stats::compute(state.items.values().cloned())
    }

    /// Current number of distinct ids held.
    pub async fn len(&self) -> usize {
        self.state.read().await.items.len()
    }

    /// True if no ids are held.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Delete items whose `dlq_timestamp` is older than
    /// `max_retention_days`. Runs automatically from [`Self::spawn_cleanup`]
    /// when enabled; can also be invoked directly.
    pub async fn cleanup_old_items(&self) {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(self.config.max_retention_days));
        let mut state = self.state.write().await;
        let expired: Vec<String> = state
            .items
            .iter()
            .filter(|(_, item)| item.dlq_timestamp < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            state.items.remove(id);
        }
        state.order.retain(|id| !expired.contains(id));
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "DLQ retention sweep removed expired items");
        }
    }

    /// Remove every item without persisting the removal.
    pub async fn clear_dlq(&self) {
        let mut state = self.state.write().await;
        state.items.clear();
        state.order.clear();
    }

    async fn persist(&self, snapshot: Snapshot) {
        if let Some(persistor) = &self.persistor {
            if let Err(err) = persistor.append(snapshot).await {
                tracing::warn!(error = %err, "best-effort DLQ persistence failed");
            }
        }
    }
}

impl Drop for DeadLetterQueue {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn matches(item: &DLQItem, criteria: &ReprocessCriteria, now: DateTime<Utc>) -> bool {
    if let Some(event_type) = &criteria.event_type {
        if &item.event.event_type != event_type {
            return false;
        }
    }
    if let Some(error_type) = &criteria.error_type {
        let tag = format!("error:{error_type}");
        if !item.tags.iter().any(|t| t == &tag) {
            return false;
        }
    }
    if let Some(tag) = &criteria.tag {
        if !item.tags.iter().any(|t| t == tag) {
            return false;
        }
    }
    if let Some(max_age) = criteria.max_age {
        let age = now - item.dlq_timestamp;
        if age < ChronoDuration::from_std(max_age).unwrap_or(ChronoDuration::zero()) {
            return false;
        }
    }
    true
}

fn dlq_snapshot(item: &DLQItem) -> Snapshot {
    Snapshot {
        xc_id: item.id.clone(),
        hash: stable_hash(&item.id, item.dlq_timestamp.timestamp_millis(), item.attempts),
        ts: item.dlq_timestamp.timestamp_millis(),
        events: vec![item.event.clone()],
        state: serde_json::json!({ "type": "dlq-item", "dlqItem": item }),
    }
}

/// Same construction as `agentrt_queue::stable_hash`: a non-cryptographic,
/// fixed-seed digest for log correlation, not integrity.
fn stable_hash(id: &str, ts: i64, attempts: u32) -> String {
    use std::hash::{Hash, Hasher};
    let mut h1 = std::collections::hash_map::DefaultHasher::new();
    let mut h2 = std::collections::hash_map::DefaultHasher::new();
    0xA5A5_u64.hash(&mut h2);
    for part in [id, &ts.to_string(), &attempts.to_string()] {
        part.hash(&mut h1);
        part.hash(&mut h2);
    }
    format!("{:016x}{:016x}", h1.finish(), h2.finish())
}

fn derive_tags(event: &Event, latest_error_message: &str, existing: &[String]) -> Vec<String> {
    let head = event.event_type.split('.').next().unwrap_or(&event.event_type);
    let type_tag = format!("type:{head}");
    let error_tag = format!("error:{}", classify_error(latest_error_message));

    let mut tags: Vec<String> = existing
        .iter()
        .filter(|t| !t.starts_with("type:") && !t.starts_with("error:"))
        .cloned()
        .collect();
    tags.insert(0, error_tag);
    tags.insert(0, type_tag);

    for (field, prefix) in [(&event.metadata.agent_id, "agent"), (&event.metadata.workflow_id, "workflow")] {
        if let Some(value) = field {
            let tag = format!("{prefix}:{value}");
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    tags
}

fn classify_error(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    const CLASSES: &[(&str, &str)] = &[
        ("timeout", "timeout"),
        ("network", "network"),
        ("auth", "auth"),
        ("validation", "validation"),
        ("notfound", "notfound"),
        ("servererror", "servererror"),
    ];
    for (needle, class) in CLASSES {
        if lower.contains(needle) {
            return class;
        }
    }
    "unknown"
}
