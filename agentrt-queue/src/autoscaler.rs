//! The adaptive autoscaler: retunes batch size and global concurrency from
//! a rolling window of resource and throughput samples.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use agentrt_sync::Semaphore;
use chrono::{DateTime, Utc};

use crate::config::AutoscalerConfig;
use crate::resource::ResourceSample;

/// One point in the autoscaler's rolling history.
#[derive(Debug, Clone, Copy)]
pub struct AutoscalerSample {
    /// Memory usage fraction at this tick.
    pub memory_usage: f64,
    /// CPU usage fraction at this tick.
    pub cpu_usage: f64,
    /// Queue depth at this tick.
    pub depth: usize,
    /// Estimated events/second processed since the previous tick.
    pub processing_rate: f64,
    /// Average per-event processing time observed this tick.
    pub avg_processing_time: Duration,
    /// Wall-clock time of this tick.
    pub at: Instant,
}

/// A recorded before/after adjustment, with the rule that triggered it.
#[derive(Debug, Clone)]
pub struct AdjustmentLog {
    /// The field that was adjusted (`"batch_size"` or `"max_concurrent"`).
    pub field: &'static str,
    /// Value before the adjustment.
    pub before: f64,
    /// Value after the adjustment.
    pub after: f64,
    /// Which rule fired.
    pub rationale: &'static str,
    /// When the adjustment was made.
    pub at: DateTime<Utc>,
}

/// Retunes `batch_size` and a concurrency [`Semaphore`] from a rolling
/// window of `{memory, cpu, depth, rate}` samples.
pub struct Autoscaler {
    config: AutoscalerConfig,
    max_cpu_usage: f64,
    max_memory_usage: f64,
    history: std::sync::Mutex<VecDeque<AutoscalerSample>>,
    adjustments: std::sync::Mutex<VecDeque<AdjustmentLog>>,
    batch_size: Arc<AtomicUsize>,
    max_concurrent: AtomicUsize,
    semaphore: Arc<Semaphore>,
    last_depth: std::sync::Mutex<Option<(usize, Instant)>>,
}

const MAX_ADJUSTMENT_LOG: usize = 200;

impl Autoscaler {
    /// Construct an autoscaler sharing `batch_size` and `semaphore` with the
    /// owning Event Queue, so its adjustments take effect immediately.
    pub fn new(
        config: AutoscalerConfig,
        max_cpu_usage: f64,
        max_memory_usage: f64,
        batch_size: Arc<AtomicUsize>,
        semaphore: Arc<Semaphore>,
    ) -> Self {
        let max_concurrent = semaphore.capacity();
        Self {
            config,
            max_cpu_usage,
            max_memory_usage,
            history: std::sync::Mutex::new(VecDeque::new()),
            adjustments: std::sync::Mutex::new(VecDeque::new()),
            batch_size,
            max_concurrent: AtomicUsize::new(max_concurrent),
            semaphore,
            last_depth: std::sync::Mutex::new(None),
        }
    }

    /// Every recorded adjustment so far, oldest first.
    pub fn adjustments(&self) -> Vec<AdjustmentLog> {
        self.adjustments.lock().unwrap().iter().cloned().collect()
    }

    /// Run one tick: record a sample, compute the processing rate, and apply
    /// the scaling rules.
    pub async fn tick(&self, depth: usize, sample: ResourceSample, avg_processing_time: Duration) {
        let now = Instant::now();
        let processing_rate = {
            let mut last = self.last_depth.lock().unwrap();
            let rate = match *last {
                Some((prev_depth, prev_at)) => {
                    let elapsed = now.duration_since(prev_at).as_secs_f64().max(0.001);
                    let processed = prev_depth.saturating_sub(depth) as f64;
                    processed / elapsed
                }
                None => 0.0,
            };
            *last = Some((depth, now));
            rate
        };

        let record = AutoscalerSample {
            memory_usage: sample.memory_usage,
            cpu_usage: sample.cpu_usage,
            depth,
            processing_rate,
            avg_processing_time,
            at: now,
        };
        {
            let mut history = self.history.lock().unwrap();
            history.push_back(record);
            while history.len() > self.config.history_len {
                history.pop_front();
            }
        }

        self.apply_rules(record).await;
    }

    async fn apply_rules(&self, sample: AutoscalerSample) {
        let target = self.config.target_events_per_second;

        let current_batch = self.batch_size.load(Ordering::SeqCst) as f64;
        if sample.processing_rate < 0.8 * target {
            let new_batch = (current_batch * 0.8).max(10.0);
            self.set_batch_size(current_batch, new_batch, "processing rate below 0.8x target");
        } else if sample.processing_rate > 1.2 * target && sample.cpu_usage < 0.7 {
            let new_batch = (current_batch * 1.2).min(2000.0);
            self.set_batch_size(current_batch, new_batch, "processing rate above 1.2x target with CPU headroom");
        }

        let current_concurrent = self.max_concurrent.load(Ordering::SeqCst) as f64;
        if sample.cpu_usage < 0.5 * self.max_cpu_usage && sample.depth > 100 {
            let new_concurrent = (current_concurrent * 1.5).min(200.0);
            self.set_max_concurrent(current_concurrent, new_concurrent, "CPU well under budget with deep backlog")
                .await;
        } else if sample.cpu_usage > 0.9 * self.max_cpu_usage || sample.memory_usage > 0.8 * self.max_memory_usage {
            let new_concurrent = (current_concurrent * 0.7).max(5.0);
            self.set_max_concurrent(current_concurrent, new_concurrent, "CPU or memory near budget")
                .await;
        }

        let current_concurrent = self.max_concurrent.load(Ordering::SeqCst) as f64;
        if sample.depth > 5000 && current_concurrent < 100.0 {
            let new_concurrent = (current_concurrent * 2.0).min(300.0);
            self.set_max_concurrent(current_concurrent, new_concurrent, "emergency: deep backlog with low concurrency")
                .await;
        }
    }

    fn set_batch_size(&self, before: f64, after: f64, rationale: &'static str) {
        if before == after {
            return;
        }
        self.batch_size.store(after as usize, Ordering::SeqCst);
        self.log_adjustment("batch_size", before, after, rationale);
    }

    async fn set_max_concurrent(&self, before: f64, after: f64, rationale: &'static str) {
        if before == after {
            return;
        }
        self.max_concurrent.store(after as usize, Ordering::SeqCst);
        self.semaphore.resize(after as usize).await;
        self.log_adjustment("max_concurrent", before, after, rationale);
    }

    fn log_adjustment(&self, field: &'static str, before: f64, after: f64, rationale: &'static str) {
        tracing::info!(field, before, after, rationale, "autoscaler adjustment");
        let mut log = self.adjustments.lock().unwrap();
        log.push_back(AdjustmentLog {
            field,
            before,
            after,
            rationale,
            at: Utc::now(),
        });
        while log.len() > MAX_ADJUSTMENT_LOG {
            log.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn low_rate_shrinks_batch_size() {
        let batch_size = Arc::new(AtomicUsize::new(1000));
        let semaphore = Arc::new(Semaphore::new(25));
        let scaler = Autoscaler::new(
            AutoscalerConfig {
                target_events_per_second: 1000.0,
                history_len: 50,
            },
            0.85,
            0.8,
            batch_size.clone(),
            semaphore,
        );
        // First tick has no prior depth sample, so rate is 0 -- well under target.
        scaler
            .tick(
                10,
                ResourceSample {
                    memory_usage: 0.1,
                    cpu_usage: 0.1,
                },
                Duration::from_millis(1),
            )
            .await;
        assert_eq!(batch_size.load(Ordering::SeqCst), 800);
    }

    #[tokio::test]
    async fn emergency_rule_boosts_concurrency_on_deep_backlog() {
        let batch_size = Arc::new(AtomicUsize::new(20));
        let semaphore = Arc::new(Semaphore::new(10));
        let scaler = Autoscaler::new(AutoscalerConfig::default(), 0.85, 0.8, batch_size, semaphore.clone());
        scaler
            .tick(
                6000,
                ResourceSample {
                    memory_usage: 0.1,
                    cpu_usage: 0.1,
                },
                Duration::from_millis(1),
            )
            .await;
        assert!(semaphore.capacity() > 10);
    }
}
