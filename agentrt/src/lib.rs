#![deny(missing_docs)]
//! # agentrt — umbrella crate
//!
//! Single import surface over the agent execution runtime: the shared data
//! model and traits (`core`), the event queue and autoscaler (`queue`), the
//! dead-letter queue (`dlq`), the tool pipeline (`tool`), and the Agent
//! Core's Think-Act-Observe loop (`agent`). Re-exports each crate behind its
//! feature flag, plus a `prelude` for the happy path.

#[cfg(feature = "agent")]
pub use agentrt_agent;
#[cfg(feature = "core")]
pub use agentrt_breaker;
#[cfg(feature = "dlq")]
pub use agentrt_dlq;
#[cfg(feature = "queue")]
pub use agentrt_queue;
#[cfg(feature = "core")]
pub use agentrt_sync;
#[cfg(feature = "tool")]
pub use agentrt_tool;
#[cfg(feature = "core")]
pub use agentrt_types;

/// Happy-path imports for composing an agent runtime.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use agentrt_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig};

    #[cfg(feature = "core")]
    pub use agentrt_sync::Semaphore;

    #[cfg(feature = "core")]
    pub use agentrt_types::{
        ActionResult, AgentAction, AgentContext, AgentError, CircuitState, CircuitStateKind, Planner, PlannerExecutionContext, ResultAnalysis,
        StepExecution, Thought,
    };

    #[cfg(feature = "queue")]
    pub use agentrt_queue::{EventQueue, EventQueueConfig};

    #[cfg(feature = "dlq")]
    pub use agentrt_dlq::{DeadLetterQueue, DlqConfig};

    #[cfg(feature = "tool")]
    pub use agentrt_tool::{EventEmitter, ToolDyn, ToolPipeline, ToolRegistry};

    #[cfg(feature = "agent")]
    pub use agentrt_agent::{AgentCore, AgentCoreBuilder, AgentCoreConfig, AgentRunResult, ObservabilityHook};
}
