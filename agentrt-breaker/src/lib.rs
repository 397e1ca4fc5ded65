//! Three-state circuit breaker: CLOSED/OPEN/HALF_OPEN around an operation
//! with a timeout.
//!
//! The breaker owns no concurrency of its own; callers that want to
//! serialize access to the guarded operation (or not) do so themselves. One
//! breaker's counters are only ever updated from within its own `execute`
//! call — sharing a breaker across logically independent contexts mixes
//! their failure accounting.

#![deny(missing_docs)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agentrt_types::{CircuitCounters, CircuitState, CircuitStateKind};
use chrono::Utc;
use tokio::sync::Mutex;

/// Tunables for a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (while CLOSED) that trip the breaker to OPEN.
    pub failure_threshold: u32,
    /// How long the breaker stays OPEN before allowing a probe call.
    pub recovery_timeout: Duration,
    /// Consecutive successes (while HALF_OPEN) needed to close the breaker.
    pub success_threshold: u32,
    /// Timeout applied to the wrapped operation; a timeout counts as a failure.
    pub operation_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
            operation_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// The tighter profile this runtime's tool calls use: trips faster and
    /// recovers slower than the generic default, since a misbehaving tool
    /// usually means a misbehaving downstream dependency worth backing off
    /// from harder.
    pub fn for_tools() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(150),
            success_threshold: 2,
            operation_timeout: Duration::from_secs(60),
        }
    }
}

/// A state transition observed by a [`CircuitBreaker`], for callers that want
/// to react to or log transitions (e.g. emit an event onto the Event Queue).
#[derive(Debug, Clone)]
pub struct CircuitTransition {
    /// Name of the circuit that transitioned.
    pub name: String,
    /// State before the transition.
    pub from: CircuitStateKind,
    /// State after the transition.
    pub to: CircuitStateKind,
}

/// Outcome of one `execute` call, independent of the operation's own result
/// type, used by callers that need the breaker's bookkeeping alongside the
/// value: whether it executed or was rejected, the state afterward, and how
/// long it took.
#[derive(Debug, Clone)]
pub struct ExecutionMeta {
    /// The circuit's state immediately after this call.
    pub state: CircuitStateKind,
    /// Whether the operation was actually invoked.
    pub executed: bool,
    /// Whether the call was rejected outright (breaker OPEN).
    pub rejected: bool,
    /// Wall-clock time spent, including rejection overhead.
    pub duration: Duration,
}

/// The error surfaced by [`CircuitBreaker::execute`]: either a rejection by
/// the breaker itself, a timeout, or the wrapped operation's own error.
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The breaker is OPEN and `next_attempt` has not elapsed.
    #[error("circuit breaker is OPEN for {name}")]
    Open {
        /// Name of the circuit that rejected the call.
        name: String,
    },
    /// The wrapped operation did not finish within `operation_timeout`.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    /// The wrapped operation ran and failed on its own terms.
    #[error(transparent)]
    Operation(E),
}

struct Inner {
    state: CircuitStateKind,
    failure_count: u32,
    success_count: u32,
    last_state_change: chrono::DateTime<Utc>,
    next_attempt: Option<chrono::DateTime<Utc>>,
    counters: CircuitCounters,
}

/// A named circuit breaker guarding a single operation.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    on_transition: Option<Arc<dyn Fn(CircuitTransition) + Send + Sync>>,
}

enum Admission {
    Proceed,
    Reject,
}

impl CircuitBreaker {
    /// Create a named breaker with the given configuration.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitStateKind::Closed,
                failure_count: 0,
                success_count: 0,
                last_state_change: Utc::now(),
                next_attempt: None,
                counters: CircuitCounters::default(),
            }),
            on_transition: None,
        }
    }

    /// Attach a callback invoked synchronously on every state transition.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Fn(CircuitTransition) + Send + Sync>) -> Self {
        self.on_transition = Some(observer);
        self
    }

    /// Name this breaker was constructed with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A snapshot of this breaker's current observable state.
    pub async fn state(&self) -> CircuitState {
        let inner = self.inner.lock().await;
        CircuitState {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_state_change: inner.last_state_change,
            next_attempt: inner.next_attempt,
            counters: inner.counters,
        }
    }

    /// Run `op` under this breaker's protection.
    ///
    /// `op` is raced against `operation_timeout`; a timeout is recorded as a
    /// failure. Returns the operation's value (or a [`BreakerError`]
    /// describing why it did not run or did not succeed) alongside an
    /// [`ExecutionMeta`] snapshot of the call's bookkeeping.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> (Result<T, BreakerError<E>>, ExecutionMeta)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = std::time::Instant::now();
        let admission = self.admit().await;
        if matches!(admission, Admission::Reject) {
            let meta = ExecutionMeta {
                state: self.current_state().await,
                executed: false,
                rejected: true,
                duration: started.elapsed(),
            };
            return (
                Err(BreakerError::Open {
                    name: self.name.clone(),
                }),
                meta,
            );
        }

        let outcome = tokio::time::timeout(self.config.operation_timeout, op()).await;
        let result = match outcome {
            Ok(Ok(value)) => {
                self.record_success().await;
                tracing::debug!(circuit = %self.name, elapsed = ?started.elapsed(), "circuit call succeeded");
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure().await;
                tracing::debug!(circuit = %self.name, elapsed = ?started.elapsed(), "circuit call failed");
                Err(BreakerError::Operation(err))
            }
            Err(_) => {
                self.record_failure().await;
                tracing::warn!(circuit = %self.name, timeout = ?self.config.operation_timeout, "circuit call timed out");
                Err(BreakerError::Timeout(self.config.operation_timeout))
            }
        };
        let meta = ExecutionMeta {
            state: self.current_state().await,
            executed: true,
            rejected: false,
            duration: started.elapsed(),
        };
        (result, meta)
    }

    async fn current_state(&self) -> CircuitStateKind {
        self.inner.lock().await.state
    }

    async fn admit(&self) -> Admission {
        let mut inner = self.inner.lock().await;
        inner.counters.total += 1;
        match inner.state {
            CircuitStateKind::Closed => Admission::Proceed,
            CircuitStateKind::HalfOpen => Admission::Proceed,
            CircuitStateKind::Open => {
                let now = Utc::now();
                if inner.next_attempt.is_some_and(|next| now >= next) {
                    self.transition(&mut inner, CircuitStateKind::HalfOpen);
                    inner.success_count = 0;
                    Admission::Proceed
                } else {
                    inner.counters.rejected += 1;
                    Admission::Reject
                }
            }
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.counters.successful += 1;
        match inner.state {
            CircuitStateKind::Closed => {
                inner.failure_count = 0;
            }
            CircuitStateKind::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.next_attempt = None;
                    self.transition(&mut inner, CircuitStateKind::Closed);
                }
            }
            CircuitStateKind::Open => {
                // A success cannot observe this state: `admit` always moves
                // OPEN to HALF_OPEN before letting the operation run.
            }
        }
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.counters.failed += 1;
        match inner.state {
            CircuitStateKind::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.next_attempt = Some(Utc::now() + self.config.recovery_timeout);
                    self.transition(&mut inner, CircuitStateKind::Open);
                }
            }
            CircuitStateKind::HalfOpen => {
                inner.success_count = 0;
                inner.next_attempt = Some(Utc::now() + self.config.recovery_timeout);
                self.transition(&mut inner, CircuitStateKind::Open);
            }
            CircuitStateKind::Open => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitStateKind) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        inner.last_state_change = Utc::now();
        tracing::info!(circuit = %self.name, ?from, ?to, "circuit breaker transitioned");
        if let Some(observer) = &self.on_transition {
            observer(CircuitTransition {
                name: self.name.clone(),
                from,
                to,
            });
        }
    }
}
