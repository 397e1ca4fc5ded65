//! The default in-process [`Persistor`] implementation.
//!
//! Same lineage as [`crate::event_store::InMemoryEventStore`]: an
//! `RwLock`-guarded map, keyed by execution id instead of a composite
//! scope/key string.

use std::collections::HashMap;

use agentrt_types::{Persistor, PersistError, Snapshot};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// An in-memory, append-only [`Persistor`].
///
/// Suitable for tests and single-process deployments; a production
/// deployment backs the same trait with a real append-only file or object
/// store.
#[derive(Default)]
pub struct InMemoryPersistor {
    records: RwLock<HashMap<String, Vec<Snapshot>>>,
}

impl InMemoryPersistor {
    /// Construct an empty persistor.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistor for InMemoryPersistor {
    async fn append(&self, snapshot: Snapshot) -> Result<(), PersistError> {
        let mut records = self.records.write().await;
        records.entry(snapshot.xc_id.clone()).or_default().push(snapshot);
        Ok(())
    }

    async fn load(&self, xc_id: &str) -> Result<Vec<Snapshot>, PersistError> {
        let records = self.records.read().await;
        Ok(records.get(xc_id).cloned().unwrap_or_default())
    }
}

/// Computes the stable short digest used for `Snapshot.hash` and
/// `DLQItem` persistence: a non-cryptographic, fixed-seed hash rendered as
/// lowercase hex, at least 16 characters. This identifies a record for log
/// correlation, not for integrity, so a fast `Hasher` is the right tool
/// rather than a cryptographic digest.
pub fn stable_hash(parts: &[&str]) -> String {
    use std::hash::{Hash, Hasher};
    // DefaultHasher's algorithm is unspecified across compiler versions but
    // stable within one process run, which is all a log-correlation digest
    // needs; two halves with different seeds widen it past 16 hex chars.
    let mut h1 = std::collections::hash_map::DefaultHasher::new();
    let mut h2 = std::collections::hash_map::DefaultHasher::new();
    0xA5A5_u64.hash(&mut h2);
    for part in parts {
        part.hash(&mut h1);
        part.hash(&mut h2);
    }
    format!("{:016x}{:016x}", h1.finish(), h2.finish())
}
