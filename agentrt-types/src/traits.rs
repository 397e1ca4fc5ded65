//! Narrow interfaces to the components this runtime treats as external
//! collaborators: the LLM-backed planner and the durable snapshot log.
//!
//! Concrete tool execution lives in `agentrt-tool`'s own `ToolDyn`/
//! `ToolRegistry`, since the Tool Pipeline needs it as a dyn-safe trait
//! object and pulling that shape in here would create a dependency cycle.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::data::{PlannerExecutionContext, ResultAnalysis, Snapshot, Thought};
use crate::error::PersistError;

/// Converts accumulated run context into the next [`Thought`], and
/// interprets an [`ActionResult`](crate::data::ActionResult) once it comes
/// back from the Tool Pipeline.
///
/// This is the one mandatory collaborator: the Agent Core refuses to start a
/// run without one (see [`AgentError::NoPlanner`](crate::error::AgentError)).
#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce the next thought/action from the accumulated context.
    async fn think(&self, ctx: &PlannerExecutionContext) -> Result<Thought, String>;

    /// Interpret an action's result and decide whether the run should continue.
    async fn analyze_result(
        &self,
        result: &crate::data::ActionResult,
        ctx: &PlannerExecutionContext,
    ) -> Result<ResultAnalysis, String>;

    /// Retrieve a previously produced plan for `execute_plan` actions.
    ///
    /// Most planners that never emit `execute_plan` can leave this
    /// unimplemented; the default rejects with a descriptive error.
    async fn get_plan_for_context(
        &self,
        _ctx: &PlannerExecutionContext,
        plan_id: &str,
    ) -> Result<serde_json::Value, String> {
        Err(format!("planner does not support plan retrieval (plan_id={plan_id})"))
    }

    /// Resolve a plan step's raw arguments, substituting references to prior
    /// step outputs. Returns the resolved args and any reference that could
    /// not be resolved; a non-empty `missing` forces a replan.
    ///
    /// The default treats every argument as already resolved, appropriate
    /// for planners whose plan steps carry literal arguments only.
    fn resolve_args(
        &self,
        raw_args: serde_json::Value,
        _history: &[crate::data::StepExecution],
        _ctx: &PlannerExecutionContext,
    ) -> (serde_json::Value, Vec<String>) {
        (raw_args, Vec::new())
    }
}

/// An append-only snapshot log, keyed by execution id, used by the DLQ and
/// by the Event Queue's critical-event persistence.
///
/// Implementations are expected to be cheap to clone (e.g. an `Arc` around
/// a file handle or connection pool) since the queue and the DLQ each hold
/// their own handle.
#[async_trait]
pub trait Persistor: Send + Sync {
    /// Append one snapshot record. Implementations must not reorder or drop
    /// records relative to the order `append` was called in.
    async fn append(&self, snapshot: Snapshot) -> Result<(), PersistError>;

    /// Load every snapshot previously appended under `xc_id`, in append order.
    async fn load(&self, xc_id: &str) -> Result<Vec<Snapshot>, PersistError>;
}

/// An append-only ordered log of [`Event`](crate::data::Event)s, indexed by
/// timestamp, supporting batched replay from a point in time.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events to the store. Ordering among the appended events is
    /// preserved; ordering relative to concurrent appends from other callers
    /// is not guaranteed beyond "each append is atomic".
    async fn append_events(&self, events: Vec<crate::data::Event>) -> Result<(), PersistError>;

    /// Replay events with `timestamp >= from`, optionally bounded above by
    /// `to`, as a finite, non-restartable stream of bounded batches.
    fn replay_from_timestamp(
        &self,
        from: chrono::DateTime<chrono::Utc>,
        to: Option<chrono::DateTime<chrono::Utc>>,
        batch_size: usize,
    ) -> BoxStream<'_, Result<Vec<crate::data::Event>, PersistError>>;
}
