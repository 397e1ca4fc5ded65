//! The data model shared by every crate in this workspace: events, queue
//! items, dead-letter records, circuit state, and the planner-facing
//! action/result/history types that flow through the Think→Act→Observe
//! loop.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A duration expressed in whole milliseconds, the unit every wire and
/// snapshot payload in this crate uses.
///
/// Kept as a distinct type (mirroring `layer0::DurationMs` one layer up in
/// the agent framework this runtime descends from) rather than a bare
/// `u64`, so a duration field is never silently read as a count or an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DurationMs(pub u64);

impl From<std::time::Duration> for DurationMs {
    fn from(d: std::time::Duration) -> Self {
        DurationMs(d.as_millis() as u64)
    }
}

impl From<DurationMs> for std::time::Duration {
    fn from(d: DurationMs) -> Self {
        std::time::Duration::from_millis(d.0)
    }
}

/// Canonical metadata carried by every [`Event`].
///
/// `correlation_id`/`tenant_id`/`agent_id`/`workflow_id` are the keys named
/// canonical by the event taxonomy; `compressed`/`original_size` are set by
/// the Event Queue when a large event is annotated rather than dropped, and
/// must never cause `Event.data` itself to change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Opaque id threading one interaction across events, tool calls, spans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Tenant owning this event, in multi-tenant deployments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Agent that produced or owns this event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Workflow this event belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Set by the queue when the event was annotated as compressed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed: Option<bool>,
    /// Pre-compression size in bytes, set alongside `compressed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<usize>,
}

/// A unit of work moving through the queue, the store, the DLQ, and the
/// tool pipeline.
///
/// `event_type` is a lowercase dotted namespace (`agent.tool.error`); the
/// field is named `event_type` rather than `type` because the latter is a
/// reserved word, but serializes as `"type"` to match the wire contract in
/// the event taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique for the lifetime of the Event Queue that holds it.
    pub id: String,
    /// Dotted namespace, e.g. `"agent.tool.error"`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Opaque structured payload. Never mutated by the queue or the DLQ.
    pub data: Value,
    /// Canonical metadata (correlation/tenant/agent/workflow ids, compression flags).
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl Event {
    /// Build an event with a freshly generated id and the current timestamp.
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            data,
            metadata: EventMetadata::default(),
        }
    }

    /// Returns true if `event_type` is exactly `prefix` or starts with `prefix.`/`prefix` itself,
    /// matching the taxonomy's prefix-wildcard convention.
    pub fn type_has_prefix(&self, prefix: &str) -> bool {
        self.event_type == prefix || self.event_type.starts_with(prefix)
    }
}

/// An [`Event`] while it is held by the Event Queue.
///
/// Owned exclusively by the queue between enqueue and a successful handler
/// return; `priority` is immutable for the item's lifetime in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// The underlying event.
    pub event: Event,
    /// Higher values are dequeued first; immutable once enqueued.
    pub priority: i32,
    /// When this item was inserted into the queue.
    pub enqueued_at: DateTime<Utc>,
    /// Number of times this item has been re-enqueued after a handler failure.
    pub retry_count: u32,
    /// Byte length of the canonical encoding of `event`.
    pub size: usize,
    /// `size >= largeEventThreshold`.
    pub is_large: bool,
    /// `size >= hugeEventThreshold`.
    pub is_huge: bool,
    /// Mirrors `event.metadata.compressed`, kept for quick queue-side checks.
    pub compressed: bool,
    /// Mirrors `event.metadata.original_size`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<usize>,
    /// Whether a durable copy of `event` was written to the Persistor.
    pub persistent: bool,
    /// When the durable copy was written, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted_at: Option<DateTime<Utc>>,
}

/// A single recorded failure against a [`DLQItem`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Human-readable failure message.
    pub message: String,
    /// Optional stack trace or backtrace text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// When this failure was recorded.
    pub timestamp: DateTime<Utc>,
    /// The attempt number this failure corresponds to; `-1` marks a poison entry.
    pub attempt: i64,
}

/// Identifies the handler/correlation context under which an event failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingContext {
    /// Name of the handler that was processing the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler_name: Option<String>,
    /// Correlation id threaded from the originating event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Distributed trace id, if tracing context was available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Agent id, if present in the event's metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Workflow id, if present in the event's metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

/// A dead-lettered event: one that exhausted its retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DLQItem {
    /// Equal to `event.id`.
    pub id: String,
    /// The event that failed.
    pub event: Event,
    /// Every recorded failure, oldest first.
    pub errors: Vec<ErrorRecord>,
    /// Monotonically non-decreasing across the item's lifetime.
    pub attempts: u32,
    /// When this id first entered the DLQ.
    pub first_failed_at: DateTime<Utc>,
    /// When the most recent failure was recorded.
    pub last_failed_at: DateTime<Utc>,
    /// When this id was (re-)inserted into the DLQ map.
    pub dlq_timestamp: DateTime<Utc>,
    /// Priority the item had in the Event Queue before it failed.
    pub original_priority: i32,
    /// Handler/correlation context captured at send-to-DLQ time.
    pub processing_context: ProcessingContext,
    /// Derived tags: `type:<head>`, an error-class tag, `agent:<id>`, `workflow:<id>`.
    pub tags: Vec<String>,
    /// False once [`markAsPoison`](crate) has been called for this id.
    pub can_reprocess: bool,
}

/// The three states a [`CircuitState`] can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStateKind {
    /// Calls pass through normally.
    Closed,
    /// Calls are rejected without executing the operation.
    Open,
    /// A single probe call is allowed through to test recovery.
    HalfOpen,
}

/// Monotonic lifetime counters for a circuit breaker.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CircuitCounters {
    /// Every call presented to the breaker, executed or not.
    pub total: u64,
    /// Calls that executed and succeeded.
    pub successful: u64,
    /// Calls that executed and failed (including timeouts).
    pub failed: u64,
    /// Calls rejected outright because the breaker was OPEN.
    pub rejected: u64,
}

/// The observable state of one named circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitState {
    /// Current state.
    pub state: CircuitStateKind,
    /// Consecutive failures since the last reset (CLOSED) or this OPEN episode.
    pub failure_count: u32,
    /// Consecutive successes while HALF_OPEN.
    pub success_count: u32,
    /// When `state` last changed.
    pub last_state_change: DateTime<Utc>,
    /// Set iff `state == Open`; the earliest time a probe call is allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt: Option<DateTime<Utc>>,
    /// Lifetime counters.
    pub counters: CircuitCounters,
}

/// One tool invocation inside a multi-tool [`AgentAction`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Registered tool name.
    pub tool_name: String,
    /// Arguments passed to the tool.
    pub input: Value,
}

/// An edge in a [`AgentAction::DependencyTools`] graph: `to` depends on `from`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDependency {
    /// The tool that must complete first.
    pub from: String,
    /// The tool that depends on `from`.
    pub to: String,
}

/// A predicate a [`AgentAction::ConditionalTools`] step evaluates against the
/// accumulated results so far, to decide whether a given tool runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolCondition {
    /// Always run.
    Always,
    /// Run only if the named tool's result so far succeeded.
    IfSucceeded {
        /// The tool whose outcome gates this one.
        tool_name: String,
    },
    /// Run only if the named tool's result so far failed.
    IfFailed {
        /// The tool whose outcome gates this one.
        tool_name: String,
    },
}

/// Strategy selector for [`AgentAction::MixedTools`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixedStrategy {
    /// Force the parallel strategy.
    Parallel,
    /// Force the sequential strategy.
    Sequential,
    /// Force the conditional strategy.
    Conditional,
    /// Pick a strategy from the tool count and declared dependencies.
    Adaptive,
}

/// Configuration accompanying [`AgentAction::MixedTools`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MixedToolsConfig {
    /// Concurrency bound when the resolved strategy is parallel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    /// Per-tool conditions, used when the resolved strategy is conditional.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<HashMap<String, ToolCondition>>,
}

/// Configuration accompanying [`AgentAction::DependencyTools`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyToolsConfig {
    /// Concurrency bound within a single topological phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// Abort subsequent phases on the first error.
    #[serde(default)]
    pub fail_fast: bool,
}

/// The action a [`Thought`] asks the Agent Core to perform.
///
/// A sealed tagged union standing in for the dynamic, shape-detected action
/// objects described in the design notes: the dispatcher in the Tool
/// Pipeline and Agent Core is a single `match`, never a chain of "does this
/// look like a tool call" checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentAction {
    /// Invoke exactly one tool.
    ToolCall {
        /// Registered tool name.
        tool_name: String,
        /// Arguments passed to the tool.
        input: Value,
    },
    /// Terminate the run with a final answer for the caller.
    FinalAnswer {
        /// The answer content.
        content: String,
    },
    /// Defer to the caller; treated as a final answer by the loop.
    NeedMoreInfo {
        /// The question to surface to the caller.
        question: String,
    },
    /// Hand off to another agent.
    DelegateToAgent {
        /// Target agent name.
        agent_name: String,
        /// Input to forward.
        input: Value,
    },
    /// Execute a previously retrieved plan.
    ExecutePlan {
        /// Id of the plan to execute.
        plan_id: String,
    },
    /// Bounded-concurrency fan-out over independent tools.
    ParallelTools {
        /// Tools to invoke.
        tools: Vec<ToolInvocation>,
        /// Concurrency permits; defaults to `min(tools.len(), available)`.
        #[serde(skip_serializing_if = "Option::is_none")]
        concurrency: Option<usize>,
        /// Per-call timeout override.
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<DurationMs>,
        /// Cancel pending tools on the first error.
        #[serde(default)]
        fail_fast: bool,
    },
    /// Tools invoked strictly in array order.
    SequentialTools {
        /// Tools to invoke, in order.
        tools: Vec<ToolInvocation>,
        /// Short-circuit on the first error.
        #[serde(default)]
        stop_on_error: bool,
    },
    /// Tools gated by per-tool predicates over the accumulated results.
    ConditionalTools {
        /// Tools eligible to run.
        tools: Vec<ToolInvocation>,
        /// Predicate per tool name; tools with no entry default to `Always`.
        conditions: HashMap<String, ToolCondition>,
    },
    /// An explicit or adaptively chosen strategy over a tool set.
    MixedTools {
        /// Tools to invoke.
        tools: Vec<ToolInvocation>,
        /// Strategy selector.
        strategy: MixedStrategy,
        /// Strategy-specific configuration.
        #[serde(default)]
        config: MixedToolsConfig,
    },
    /// Tools ordered by a dependency graph, executed phase by phase.
    DependencyTools {
        /// Tools to invoke.
        tools: Vec<ToolInvocation>,
        /// Dependency edges between tool names.
        dependencies: Vec<ToolDependency>,
        /// Phase execution configuration.
        #[serde(default)]
        config: DependencyToolsConfig,
    },
}

/// Structured context carried by an `error`-typed [`ActionResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Tool that produced the error, if the error originated from one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Human-readable error message.
    pub error_message: String,
    /// When the error occurred.
    pub timestamp: DateTime<Utc>,
    /// Correlation id threaded from the originating action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// The outcome produced by the Act phase, consumed by the Observe phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionResult {
    /// Result of a tool call or multi-tool strategy.
    ToolResult {
        /// Tool output, or an array of per-tool outcomes for multi-tool strategies.
        content: Value,
        /// Free-form metadata accompanying the result.
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    /// A final answer produced directly by Act (e.g. `need_more_info`).
    FinalAnswer {
        /// The answer content.
        content: String,
    },
    /// Act failed; never propagated as a Rust error, always surfaced here.
    Error {
        /// Human-readable error message.
        error: String,
        /// Context to feed into the next Think if a replan is warranted.
        #[serde(skip_serializing_if = "Option::is_none")]
        replan_context: Option<Value>,
        /// Structured error context.
        metadata: ErrorContext,
    },
    /// The plan executor could not resolve every argument and needs the
    /// planner to regenerate the plan.
    NeedsReplan {
        /// Human-readable feedback for the planner.
        feedback: String,
        /// Context to feed into the next Think.
        replan_context: Value,
    },
}

impl ActionResult {
    /// True for the `Error` variant.
    pub fn is_error(&self) -> bool {
        matches!(self, ActionResult::Error { .. })
    }
}

/// The outcome of a single tool call inside a multi-tool strategy's result
/// array; distinct from [`ActionResult`], which wraps the whole action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Name of the tool this outcome belongs to.
    pub tool_name: String,
    /// The call's outcome.
    #[serde(flatten)]
    pub outcome: ToolOutcomeKind,
}

/// How a single tool call inside a multi-tool strategy resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcomeKind {
    /// The tool returned successfully.
    Result {
        /// The tool's output.
        result: Value,
    },
    /// The tool call failed.
    Error {
        /// Human-readable error message.
        error: String,
    },
    /// A conditional strategy decided this tool should not run.
    Skipped,
}

/// A record of one tool call's timing, independent of its result payload.
///
/// Mirrors `layer0::turn::ToolCallRecord` in the lineage this runtime was
/// lifted from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Tool name.
    pub name: String,
    /// Wall-clock duration of the call.
    pub duration: DurationMs,
    /// Whether the call succeeded.
    pub success: bool,
}

/// Whether a recorded [`StepExecution`] completed, is still pending, or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step is still executing (only meaningful mid-iteration).
    Pending,
    /// The step completed without error.
    Completed,
    /// The step's action resolved to an `error` result.
    Failed,
}

/// The reasoning and chosen action produced by a Think call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thought {
    /// Free-form reasoning text, for logs and debugging.
    pub reasoning: String,
    /// The action to perform.
    pub action: AgentAction,
    /// Optional planner-reported confidence in `[0.0, 1.0]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// The planner's interpretation of an [`ActionResult`], produced by Observe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultAnalysis {
    /// The run is done; the loop should exit successfully on this boundary.
    pub is_complete: bool,
    /// Whether the loop should attempt another iteration.
    pub should_continue: bool,
    /// Planner-authored summary, used as final content when `is_complete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Context to feed into the next Think when a replan is needed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replan_context: Option<Value>,
}

/// One iteration's full record, appended once per iteration to the run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    /// Unique id for this step.
    pub step_id: String,
    /// 1-based iteration number.
    pub iteration: u32,
    /// The Think output for this iteration.
    pub thought: Thought,
    /// The action that was dispatched (duplicated from `thought.action` for
    /// convenience when scanning history without re-destructuring `thought`).
    pub action: AgentAction,
    /// Terminal status of this step.
    pub status: StepStatus,
    /// The Act output, if the step completed far enough to produce one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
    /// The Observe output, if the step completed far enough to produce one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<ResultAnalysis>,
    /// Wall-clock duration of the whole iteration.
    pub duration: DurationMs,
    /// Timing/success records for every tool call made during this step.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Metadata identifying a run, separate from its accumulating history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerMetadata {
    /// Name of the agent running this loop.
    pub agent_name: String,
    /// Correlation id for this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Tenant owning this run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Conversation/session thread id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    /// When the run started.
    pub start_time: DateTime<Utc>,
}

/// Agent-specific state threaded alongside the run, owned by the caller.
///
/// `available_tools` is derived fresh from the Tool Registry snapshot every
/// iteration; the Agent Core never mutates it out of band.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentContext {
    /// Tool names currently available to the planner.
    pub available_tools: Vec<String>,
    /// Opaque caller-owned state, forwarded to the planner unmodified.
    #[serde(default)]
    pub data: Value,
}

/// Everything the planner needs to produce the next [`Thought`].
///
/// Rebuilt from `history` at the top of every iteration; never shared
/// between concurrently running agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerExecutionContext {
    /// The original input that started this run.
    pub input: Value,
    /// Every step executed so far, oldest first.
    pub history: Vec<StepExecution>,
    /// Number of iterations completed so far.
    pub iterations: u32,
    /// Hard ceiling on iterations for this run.
    pub max_iterations: u32,
    /// Run identity and correlation metadata.
    pub planner_metadata: PlannerMetadata,
    /// Agent-owned context, including the current tool snapshot.
    pub agent_context: AgentContext,
    /// Set once a prior Observe call reported completion.
    pub is_complete: bool,
}

/// A durable persistence record: one entry in the append-only snapshot log.
///
/// Field names and shapes match the snapshot file layout bit-for-bit: `hash`
/// is a stable digest over an item's identity fields, not a content hash of
/// the full payload, and is at least 16 hex characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Execution/correlation id this snapshot belongs to.
    pub xc_id: String,
    /// Stable short digest, at least 16 lowercase hex characters.
    pub hash: String,
    /// Milliseconds since epoch.
    pub ts: i64,
    /// Events carried by this snapshot (usually exactly one).
    pub events: Vec<Event>,
    /// Opaque state payload; DLQ snapshots set `state.type = "dlq-item"`.
    pub state: Value,
}
