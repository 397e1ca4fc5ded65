//! Configuration surface for the Event Queue.

use std::time::Duration;

/// Tunables for an [`crate::EventQueue`].
///
/// Defaults match this runtime's canonical profile (`maxCpuUsage = 0.85`,
/// `batchSize = 20`, autoscaling off); the source material this was lifted
/// from has a second, coexisting profile (`0.7` / `100` / autoscaling on) —
/// construct that with [`EventQueueConfig::alternate_tuning`] rather than a
/// second code path.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EventQueueConfig {
    /// Fraction of host RAM, above which memory backpressure is active.
    pub max_memory_usage: f64,
    /// Fraction of host CPU, above which CPU backpressure is active.
    pub max_cpu_usage: f64,
    /// Hard cap on queue depth; `None` means unbounded.
    pub max_queue_depth: Option<usize>,
    /// Items taken per `process_batch`/`process_all` slice.
    pub batch_size: usize,
    /// Global concurrency permits when `enable_global_concurrency` is set.
    pub max_concurrent: usize,
    /// Whether the adaptive autoscaler runs.
    pub enable_auto_scaling: bool,
    /// How often the autoscaler re-evaluates batch size and concurrency.
    pub auto_scaling_interval: Duration,
    /// Byte size at or above which an event is annotated as large (compression candidate).
    pub large_event_threshold: usize,
    /// Byte size at or above which an event is annotated as huge.
    pub huge_event_threshold: usize,
    /// Byte size above which an event is rejected outright.
    pub max_event_size: usize,
    /// Whether large events get a compression annotation.
    pub enable_compression: bool,
    /// Whether huge events are rejected rather than merely annotated.
    pub drop_huge_events: bool,
    /// Whether enqueue persists events via the configured Persistor.
    pub enable_persistence: bool,
    /// Persist events whose type matches `critical_event_types`/`critical_event_prefixes`.
    pub persist_critical_events: bool,
    /// Persist every event regardless of type.
    pub persist_all_events: bool,
    /// Exact event types considered critical for persistence purposes.
    pub critical_event_types: Vec<String>,
    /// Dotted-namespace prefixes considered critical for persistence purposes.
    pub critical_event_prefixes: Vec<String>,
    /// Whether enqueue also appends to the configured Event Store.
    pub enable_event_store: bool,
    /// Bound on the processed-id set; oldest entries evict past this.
    pub max_processed_events: usize,
    /// Whether processing acquires the global concurrency semaphore.
    pub enable_global_concurrency: bool,
}

impl Default for EventQueueConfig {
    fn default() -> Self {
        Self {
            max_memory_usage: 0.8,
            max_cpu_usage: 0.85,
            max_queue_depth: None,
            batch_size: 20,
            max_concurrent: 25,
            enable_auto_scaling: false,
            auto_scaling_interval: Duration::from_secs(10),
            large_event_threshold: 1024 * 1024,
            huge_event_threshold: 10 * 1024 * 1024,
            max_event_size: 100 * 1024 * 1024,
            enable_compression: true,
            drop_huge_events: false,
            enable_persistence: false,
            persist_critical_events: true,
            persist_all_events: false,
            critical_event_types: Vec::new(),
            critical_event_prefixes: vec!["agent.".to_string(), "workflow.".to_string()],
            enable_event_store: false,
            max_processed_events: 10_000,
            enable_global_concurrency: false,
        }
    }
}

impl EventQueueConfig {
    /// The alternate tuning observed alongside the canonical defaults:
    /// looser CPU threshold, larger default batch, autoscaling on.
    pub fn alternate_tuning() -> Self {
        Self {
            max_cpu_usage: 0.7,
            batch_size: 100,
            enable_auto_scaling: true,
            ..Self::default()
        }
    }
}

/// Tunables for the adaptive autoscaler, used only when
/// `EventQueueConfig::enable_auto_scaling` is set.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AutoscalerConfig {
    /// Target throughput in events/second the scaler tunes towards.
    pub target_events_per_second: f64,
    /// Number of samples retained for rate/average calculations.
    pub history_len: usize,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            target_events_per_second: 1000.0,
            history_len: 50,
        }
    }
}
