//! Error taxonomy shared across the runtime's crates.
//!
//! Each crate that owns a component defines its own error enum here rather
//! than alongside the component itself, so a caller depending only on
//! `agentrt-types` can match on failures from every layer without pulling in
//! the layers themselves.

use std::time::Duration;

use thiserror::Error;

/// Failures from the Persistor / Event Store boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistError {
    /// Underlying I/O failure (file-backed persistors).
    #[error("persistence I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// A snapshot could not be encoded or decoded.
    #[error("snapshot (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Escape hatch for a collaborator-defined persistence backend.
    #[error("persistence error: {0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Failures from the Tool Pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolPipelineError {
    /// No tool is registered under this name.
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    /// The circuit breaker guarding this tool is open.
    #[error("circuit open for tool {tool_name}")]
    CircuitOpen {
        /// The tool whose breaker rejected the call.
        tool_name: String,
    },
    /// A tool call exceeded its timeout.
    #[error("tool {tool_name} timed out after {timeout:?}")]
    Timeout {
        /// The tool that timed out.
        tool_name: String,
        /// The timeout that was exceeded.
        timeout: Duration,
    },
    /// `dependency_tools` declared a cycle; no valid phase ordering exists.
    #[error("dependency graph contains a cycle")]
    DependencyCycle,
    /// Plan-step argument resolution left references unresolved.
    #[error("could not resolve arguments for tool(s): {0:?}")]
    UnresolvedArgs(Vec<String>),
    /// A tool itself reported a failure.
    #[error("tool execution failed: {0}")]
    ToolFailed(String),
    /// Escape hatch for a collaborator-defined tool backend.
    #[error("tool pipeline error: {0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Failures from the Agent Core.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    /// Construction-time failure: the loop refuses to run without a planner.
    #[error("no planner configured")]
    NoPlanner,
    /// `planner.think` or `planner.analyze_result` failed on the final
    /// allowed iteration (earlier failures are retried silently).
    #[error("planner failed: {0}")]
    Planner(String),
    /// The Act phase could not be dispatched (distinct from a tool-level
    /// error, which is captured as `ActionResult::Error` and never reaches
    /// here).
    #[error(transparent)]
    ToolPipeline(#[from] ToolPipelineError),
    /// Propagated from an Event Queue the caller wired into the run (e.g. to
    /// enqueue lifecycle events alongside the loop).
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// Propagated from a Dead-Letter Queue the caller wired into the run.
    #[error(transparent)]
    Dlq(#[from] DlqError),
    /// The run hit `max_iterations` without completing.
    #[error("max iterations ({0}) reached without completion")]
    MaxIterationsReached(u32),
    /// Stagnation was detected (see the Agent Core's termination conditions).
    #[error("stagnation detected: {0}")]
    Stagnated(String),
    /// Kernel/event growth crossed the emergency-stop thresholds.
    #[error("emergency stop: {0}")]
    EmergencyStop(String),
    /// Escape hatch for a collaborator-defined failure.
    #[error("agent error: {0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Failures from the Event Queue that are exceptional rather than ordinary
/// rejections (ordinary rejections are reported via `EnqueueOutcome`, not an
/// `Err`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueueError {
    /// The queue's background scaler or cleanup task has already been torn down.
    #[error("queue has been destroyed")]
    Destroyed,
    /// Escape hatch for a collaborator-defined failure (e.g. a handler panic
    /// surfaced as an error).
    #[error("queue error: {0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Failures from the Dead-Letter Queue.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DlqError {
    /// `reprocess_from_dlq` was called for an id that is not present.
    #[error("no DLQ item with id {0}")]
    NotFound(String),
    /// `reprocess_from_dlq` was called for an item marked as poison.
    #[error("DLQ item {0} is marked as poison and cannot be reprocessed")]
    Poisoned(String),
    /// Escape hatch for a collaborator-defined failure.
    #[error("DLQ error: {0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
