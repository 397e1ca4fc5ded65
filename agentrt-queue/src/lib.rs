//! Priority, resource-backpressured, adaptively autoscaled event queue.
//!
//! [`EventQueue`] is the runtime's central ingestion point: producers call
//! [`EventQueue::enqueue`], the queue enforces size limits, annotates large
//! payloads for compression, best-effort persists and appends to an event
//! store, and hands work out in priority order through
//! [`EventQueue::process_batch`]/[`EventQueue::process_all`]. An optional
//! [`Autoscaler`] retunes batch size and global concurrency from a rolling
//! window of resource and throughput samples.

#![deny(missing_docs)]

pub mod autoscaler;
pub mod config;
pub mod event_store;
pub mod persistor;
pub mod queue;
pub mod resource;

pub use autoscaler::{AdjustmentLog, Autoscaler, AutoscalerSample};
pub use config::{AutoscalerConfig, EventQueueConfig};
pub use event_store::InMemoryEventStore;
pub use persistor::{InMemoryPersistor, stable_hash};
pub use queue::{BatchOutcome, EventQueue};
pub use resource::{FixedResourceSampler, ResourceSample, ResourceSampler, SystemResourceSampler, is_backpressure_active};
