//! The default in-process [`EventStore`] implementation.
//!
//! An append-only, timestamp-indexed log behind a single lock: async trait
//! methods that never actually await anything interesting, same as
//! [`crate::persistor::InMemoryPersistor`] but for a different access
//! pattern.

use std::collections::BTreeMap;

use agentrt_types::{Event, EventStore, PersistError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::RwLock;

struct Inner {
    events: Vec<Event>,
    by_timestamp: BTreeMap<i64, Vec<usize>>,
}

/// An in-memory, append-only [`EventStore`].
///
/// Suitable for tests and for single-process deployments that do not need
/// the store to survive a restart; production deployments wire a
/// durable-backed implementation of the same trait.
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                events: Vec::new(),
                by_timestamp: BTreeMap::new(),
            }),
        }
    }

    /// Total number of events appended so far.
    pub async fn len(&self) -> usize {
        self.inner.read().await.events.len()
    }

    /// True if no events have been appended.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_events(&self, events: Vec<Event>) -> Result<(), PersistError> {
        let mut inner = self.inner.write().await;
        for event in events {
            let ts = event.timestamp.timestamp_millis();
            let idx = inner.events.len();
            inner.events.push(event);
            inner.by_timestamp.entry(ts).or_default().push(idx);
        }
        Ok(())
    }

    fn replay_from_timestamp(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
        batch_size: usize,
    ) -> BoxStream<'_, Result<Vec<Event>, PersistError>> {
        let from_ms = from.timestamp_millis();
        let to_ms = to.map(|t| t.timestamp_millis());
        let batch_size = batch_size.max(1);

        // Replay is a finite, non-restartable sequence over a point-in-time
        // snapshot: the lock is held only long enough to collect the window,
        // then batches are handed out from an owned `Vec` so the caller can
        // advance through them without re-acquiring the lock per batch.
        Box::pin(stream::once(async move {
            let inner = self.inner.read().await;
            let mut matched = Vec::new();
            for (&ts, indices) in inner.by_timestamp.range(from_ms..) {
                if let Some(to_ms) = to_ms {
                    if ts > to_ms {
                        break;
                    }
                }
                for &idx in indices {
                    matched.push(inner.events[idx].clone());
                }
            }
            matched
        }))
        .flat_map(move |matched| stream::iter(matched.chunks(batch_size).map(|c| c.to_vec()).collect::<Vec<_>>()))
        .map(Ok)
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    fn event_at(id: &str, ms: i64) -> Event {
        Event {
            id: id.to_string(),
            event_type: "runtime.event_processed".to_string(),
            timestamp: DateTime::from_timestamp_millis(ms).unwrap(),
            data: json!({}),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn replay_yields_events_in_timestamp_order() {
        let store = InMemoryEventStore::new();
        store
            .append_events(vec![event_at("b", 200), event_at("a", 100)])
            .await
            .unwrap();

        let batches: Vec<_> = store
            .replay_from_timestamp(DateTime::from_timestamp_millis(0).unwrap(), None, 10)
            .collect()
            .await;
        let events: Vec<_> = batches.into_iter().flatten().flatten().collect();
        assert_eq!(events.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn replay_respects_from_bound() {
        let store = InMemoryEventStore::new();
        store
            .append_events(vec![event_at("a", 100), event_at("b", 200)])
            .await
            .unwrap();

        let batches: Vec<_> = store
            .replay_from_timestamp(DateTime::from_timestamp_millis(150).unwrap(), None, 10)
            .collect()
            .await;
        let events: Vec<_> = batches.into_iter().flatten().flatten().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "b");
    }
}
