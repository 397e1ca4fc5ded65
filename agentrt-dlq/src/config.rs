//! Configuration surface for the Dead-Letter Queue.

use std::time::Duration;

/// Tunables for a [`crate::DeadLetterQueue`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DlqConfig {
    /// Hard cap on the number of distinct ids held; oldest evicts past this.
    pub max_dlq_size: usize,
    /// Retention window for the cleanup sweep, in days.
    pub max_retention_days: u32,
    /// Whether the periodic retention sweep runs.
    pub enable_auto_cleanup: bool,
    /// How often the retention sweep runs.
    pub cleanup_interval: Duration,
    /// `send_to_dlq` logs a warning once the map size reaches this count.
    pub alert_threshold: usize,
    /// Whether `send_to_dlq`/`mark_as_poison` persist via the configured Persistor.
    pub enable_persistence: bool,
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            max_dlq_size: 1000,
            max_retention_days: 7,
            enable_auto_cleanup: true,
            cleanup_interval: Duration::from_secs(3600),
            alert_threshold: 100,
            enable_persistence: true,
        }
    }
}
