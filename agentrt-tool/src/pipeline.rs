//! Strategy dispatcher: turns an [`AgentAction`] into an [`ActionResult`] by
//! routing through the single-tool, multi-tool, or plan-execution path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agentrt_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig};
use agentrt_sync::Semaphore;
use agentrt_types::{
    ActionResult, AgentAction, DurationMs, ErrorContext, Event, EventMetadata, MixedStrategy, Planner,
    PlannerExecutionContext, ToolCondition, ToolDependency, ToolInvocation, ToolOutcome, ToolOutcomeKind,
    ToolPipelineError,
};
use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Mutex;

use crate::emitter::{EventEmitter, NoopEmitter};
use crate::{ToolError, ToolRegistry};

/// Executes [`AgentAction`]s that dispatch to tools, fanning out across the
/// strategies the action names and guarding every call with a per-tool
/// circuit breaker.
pub struct ToolPipeline {
    registry: Arc<ToolRegistry>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    breaker_config: CircuitBreakerConfig,
    default_concurrency: Arc<Semaphore>,
    emitter: Arc<dyn EventEmitter>,
}

impl ToolPipeline {
    /// Construct a pipeline over `registry`, using the runtime's tool-tuned
    /// circuit breaker profile and a no-op emitter.
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            breakers: Mutex::new(HashMap::new()),
            breaker_config: CircuitBreakerConfig::for_tools(),
            default_concurrency: Arc::new(Semaphore::new(10)),
            emitter: Arc::new(NoopEmitter),
        }
    }

    /// Override the circuit breaker configuration applied to every tool.
    #[must_use]
    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    /// Override the default parallel concurrency bound used when an action
    /// does not specify its own.
    #[must_use]
    pub fn with_default_concurrency(mut self, permits: usize) -> Self {
        self.default_concurrency = Arc::new(Semaphore::new(permits));
        self
    }

    /// Attach an observability emitter.
    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Snapshot of every tool name currently registered. The Agent Core
    /// calls this once per iteration to build `agentContext.availableTools`
    /// without reaching into the registry itself.
    pub fn tool_names(&self) -> Vec<String> {
        self.registry.iter().map(|t| t.name().to_string()).collect()
    }

    /// Execute `action` and produce the [`ActionResult`] the Agent Core's
    /// Observe phase consumes.
    ///
    /// `action` must be one of the tool-dispatching variants (`tool_call`,
    /// `parallel_tools`, `sequential_tools`, `conditional_tools`,
    /// `mixed_tools`, `dependency_tools`, `execute_plan`); the control-flow
    /// variants (`final_answer`, `need_more_info`, `delegate_to_agent`) are
    /// handled directly by the Agent Core and never reach this method.
    pub async fn execute(
        &self,
        action: &AgentAction,
        ctx: &PlannerExecutionContext,
        planner: &dyn Planner,
        correlation_id: Option<&str>,
    ) -> ActionResult {
        match action {
            AgentAction::ToolCall { tool_name, input } => {
                match self.call_one(tool_name, input.clone(), None, correlation_id).await {
                    ToolOutcomeKind::Result { result } => ActionResult::ToolResult {
                        content: result,
                        metadata: None,
                    },
                    ToolOutcomeKind::Error { error } => tool_error_result(tool_name, error, correlation_id),
                    ToolOutcomeKind::Skipped => tool_error_result(tool_name, "tool call was skipped".to_string(), correlation_id),
                }
            }
            AgentAction::ParallelTools {
                tools,
                concurrency,
                timeout,
                fail_fast,
            } => {
                let outcomes = self
                    .call_parallel(tools, *concurrency, *timeout, *fail_fast, correlation_id)
                    .await;
                outcomes_result(outcomes)
            }
            AgentAction::SequentialTools { tools, stop_on_error } => {
                let outcomes = self.call_sequential(tools, *stop_on_error, correlation_id).await;
                outcomes_result(outcomes)
            }
            AgentAction::ConditionalTools { tools, conditions } => {
                let outcomes = self.call_conditional(tools, conditions, correlation_id).await;
                outcomes_result(outcomes)
            }
            AgentAction::MixedTools { tools, strategy, config } => {
                let outcomes = self.call_mixed(tools, *strategy, config, correlation_id).await;
                outcomes_result(outcomes)
            }
            AgentAction::DependencyTools {
                tools,
                dependencies,
                config,
            } => match self.call_dependency(tools, dependencies, config, correlation_id).await {
                Ok(outcomes) => outcomes_result(outcomes),
                Err(err) => plain_error_result(err.to_string(), correlation_id),
            },
            AgentAction::ExecutePlan { plan_id } => self.execute_plan(plan_id, ctx, planner, correlation_id).await,
            AgentAction::FinalAnswer { .. } | AgentAction::NeedMoreInfo { .. } | AgentAction::DelegateToAgent { .. } => {
                plain_error_result("action is not a tool-dispatching action".to_string(), correlation_id)
            }
        }
    }

    /// Retrieve the plan for `plan_id`, resolve each step's arguments against
    /// prior history, and dispatch each step through the single-tool path.
    /// Returns `needs_replan` (an `error` ActionResult carrying
    /// `replan_context`) the first time a step's arguments cannot be
    /// resolved, rather than executing with nulls.
    async fn execute_plan(
        &self,
        plan_id: &str,
        ctx: &PlannerExecutionContext,
        planner: &dyn Planner,
        correlation_id: Option<&str>,
    ) -> ActionResult {
        let plan = match planner.get_plan_for_context(ctx, plan_id).await {
            Ok(plan) => plan,
            Err(err) => {
                return plain_error_result(format!("could not retrieve plan {plan_id}: {err}"), correlation_id);
            }
        };
        let Some(steps) = plan.get("steps").and_then(|v| v.as_array()).cloned() else {
            return plain_error_result(format!("plan {plan_id} has no `steps` array"), correlation_id);
        };

        let mut results = Vec::with_capacity(steps.len());
        for step in &steps {
            let tool_name = step.get("toolName").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let raw_args = step.get("args").cloned().unwrap_or(serde_json::Value::Null);
            let (resolved_args, missing) = planner.resolve_args(raw_args, &ctx.history, ctx);
            if !missing.is_empty() {
                return ActionResult::NeedsReplan {
                    feedback: format!("unresolved references for plan {plan_id}: {missing:?}"),
                    replan_context: serde_json::json!({
                        "planId": plan_id,
                        "missing": missing,
                        "completedSteps": results,
                    }),
                };
            }
            let outcome = self.call_one(&tool_name, resolved_args, None, correlation_id).await;
            results.push(ToolOutcome {
                tool_name,
                outcome,
            });
        }
        outcomes_result(results)
    }

    async fn breaker_for(&self, tool_name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().await;
        breakers
            .entry(tool_name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(tool_name.to_string(), self.breaker_config)))
            .clone()
    }

    fn emit(&self, event_type: &str, tool_name: &str, correlation_id: Option<&str>, error: Option<&str>) {
        let mut data = serde_json::json!({ "toolName": tool_name });
        if let Some(error) = error {
            data["error"] = serde_json::Value::String(error.to_string());
        }
        self.emitter.emit(Event {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            data,
            metadata: EventMetadata {
                correlation_id: correlation_id.map(str::to_string),
                ..Default::default()
            },
        });
    }

    /// Emit the `agent.parallel.tools.start`/`agent.parallel.tools.completed`
    /// pair bracketing a `call_parallel` fan-out.
    fn emit_parallel(&self, event_type: &str, tool_count: usize, correlation_id: Option<&str>) {
        self.emitter.emit(Event {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            data: serde_json::json!({ "toolCount": tool_count }),
            metadata: EventMetadata {
                correlation_id: correlation_id.map(str::to_string),
                ..Default::default()
            },
        });
    }

    /// Route a single tool call through its breaker, emitting the
    /// `agent.action.start` → `agent.tool.completed`|`agent.tool.error` pair.
    /// `timeout` overrides the breaker's own `operation_timeout` when set.
    async fn call_one(
        &self,
        tool_name: &str,
        input: serde_json::Value,
        timeout: Option<Duration>,
        correlation_id: Option<&str>,
    ) -> ToolOutcomeKind {
        self.emit("agent.action.start", tool_name, correlation_id, None);

        let Some(tool) = self.registry.get(tool_name).cloned() else {
            let message = ToolPipelineError::ToolNotFound(tool_name.to_string()).to_string();
            self.emit("agent.tool.error", tool_name, correlation_id, Some(&message));
            return ToolOutcomeKind::Error { error: message };
        };

        let breaker = self.breaker_for(tool_name).await;
        let (result, meta) = breaker
            .execute(|| async move {
                match timeout {
                    Some(duration) => match tokio::time::timeout(duration, tool.call(input)).await {
                        Ok(inner) => inner,
                        Err(_) => Err(ToolError::ExecutionFailed(format!("exceeded {duration:?} deadline"))),
                    },
                    None => tool.call(input).await,
                }
            })
            .await;
        tracing::debug!(tool = tool_name, state = ?meta.state, executed = meta.executed, rejected = meta.rejected, elapsed = ?meta.duration, "circuit breaker call");

        match result {
            Ok(value) => {
                self.emit("agent.tool.completed", tool_name, correlation_id, None);
                ToolOutcomeKind::Result { result: value }
            }
            Err(err) => {
                let message = breaker_error_message(tool_name, err);
                self.emit("agent.tool.error", tool_name, correlation_id, Some(&message));
                ToolOutcomeKind::Error { error: message }
            }
        }
    }

    /// Bounded-concurrency fan-out preserving input order in the returned
    /// [`Vec`]. `fail_fast` drops any still-pending calls (via dropping the
    /// underlying [`FuturesUnordered`]) once the first error is observed.
    async fn call_parallel(
        &self,
        tools: &[ToolInvocation],
        concurrency: Option<usize>,
        timeout: Option<DurationMs>,
        fail_fast: bool,
        correlation_id: Option<&str>,
    ) -> Vec<ToolOutcome> {
        if tools.is_empty() {
            return Vec::new();
        }
        self.emit_parallel("agent.parallel.tools.start", tools.len(), correlation_id);
        let limit = concurrency.unwrap_or_else(|| tools.len().clamp(1, self.default_concurrency.capacity().max(1)));
        let local_sem = Arc::new(Semaphore::new(limit.max(1)));
        let timeout: Option<Duration> = timeout.map(Duration::from);

        let mut in_flight = FuturesUnordered::new();
        for (idx, invocation) in tools.iter().enumerate() {
            let sem = local_sem.clone();
            let name = invocation.tool_name.clone();
            let input = invocation.input.clone();
            in_flight.push(async move {
                let _permit = sem.acquire().await;
                let outcome = self.call_one(&name, input, timeout, correlation_id).await;
                (idx, outcome)
            });
        }

        let mut results: Vec<Option<ToolOutcomeKind>> = (0..tools.len()).map(|_| None).collect();
        while let Some((idx, outcome)) = in_flight.next().await {
            let is_error = matches!(outcome, ToolOutcomeKind::Error { .. });
            results[idx] = Some(outcome);
            if fail_fast && is_error {
                break;
            }
        }

        let outcomes: Vec<ToolOutcome> = tools
            .iter()
            .zip(results)
            .map(|(invocation, outcome)| ToolOutcome {
                tool_name: invocation.tool_name.clone(),
                outcome: outcome.unwrap_or(ToolOutcomeKind::Skipped),
            })
            .collect();
        self.emit_parallel("agent.parallel.tools.completed", outcomes.len(), correlation_id);
        outcomes
    }

    /// Execute in array order; `stop_on_error` short-circuits, leaving the
    /// remaining tools absent from the result.
    async fn call_sequential(&self, tools: &[ToolInvocation], stop_on_error: bool, correlation_id: Option<&str>) -> Vec<ToolOutcome> {
        let mut results = Vec::with_capacity(tools.len());
        for invocation in tools {
            let outcome = self.call_one(&invocation.tool_name, invocation.input.clone(), None, correlation_id).await;
            let is_error = matches!(outcome, ToolOutcomeKind::Error { .. });
            results.push(ToolOutcome {
                tool_name: invocation.tool_name.clone(),
                outcome,
            });
            if stop_on_error && is_error {
                break;
            }
        }
        results
    }

    /// Evaluate each tool's condition against the results accumulated so
    /// far; a tool whose condition says no appears with a skip marker.
    async fn call_conditional(
        &self,
        tools: &[ToolInvocation],
        conditions: &HashMap<String, ToolCondition>,
        correlation_id: Option<&str>,
    ) -> Vec<ToolOutcome> {
        let mut results: Vec<ToolOutcome> = Vec::with_capacity(tools.len());
        for invocation in tools {
            let condition = conditions.get(&invocation.tool_name).cloned().unwrap_or(ToolCondition::Always);
            let should_run = match &condition {
                ToolCondition::Always => true,
                ToolCondition::IfSucceeded { tool_name } => results
                    .iter()
                    .rev()
                    .find(|r| &r.tool_name == tool_name)
                    .is_some_and(|r| matches!(r.outcome, ToolOutcomeKind::Result { .. })),
                ToolCondition::IfFailed { tool_name } => results
                    .iter()
                    .rev()
                    .find(|r| &r.tool_name == tool_name)
                    .is_some_and(|r| matches!(r.outcome, ToolOutcomeKind::Error { .. })),
            };
            let outcome = if should_run {
                self.call_one(&invocation.tool_name, invocation.input.clone(), None, correlation_id).await
            } else {
                ToolOutcomeKind::Skipped
            };
            results.push(ToolOutcome {
                tool_name: invocation.tool_name.clone(),
                outcome,
            });
        }
        results
    }

    /// Resolve the `adaptive` strategy by tool count, or defer to an
    /// explicit strategy override.
    async fn call_mixed(
        &self,
        tools: &[ToolInvocation],
        strategy: MixedStrategy,
        config: &agentrt_types::MixedToolsConfig,
        correlation_id: Option<&str>,
    ) -> Vec<ToolOutcome> {
        let resolved = match strategy {
            MixedStrategy::Adaptive => match tools.len() {
                0 | 1 => MixedStrategy::Sequential,
                2 | 3 => MixedStrategy::Parallel,
                _ => MixedStrategy::Sequential,
            },
            other => other,
        };
        match resolved {
            MixedStrategy::Parallel => self.call_parallel(tools, config.concurrency, None, false, correlation_id).await,
            MixedStrategy::Sequential => self.call_sequential(tools, false, correlation_id).await,
            MixedStrategy::Conditional => {
                self.call_conditional(tools, config.conditions.as_ref().unwrap_or(&HashMap::new()), correlation_id)
                    .await
            }
            MixedStrategy::Adaptive => unreachable!("adaptive resolves to a concrete strategy above"),
        }
    }

    /// Topologically sort `tools` by `dependencies` into phases and execute
    /// each phase in parallel, up to `config.max_concurrency`.
    async fn call_dependency(
        &self,
        tools: &[ToolInvocation],
        dependencies: &[ToolDependency],
        config: &agentrt_types::DependencyToolsConfig,
        correlation_id: Option<&str>,
    ) -> Result<Vec<ToolOutcome>, ToolPipelineError> {
        let phases = topological_phases(tools, dependencies)?;
        let mut results: Vec<Option<ToolOutcome>> = (0..tools.len()).map(|_| None).collect();
        let mut aborted = false;

        for phase in phases {
            if aborted {
                break;
            }
            let phase_invocations: Vec<ToolInvocation> = phase.iter().map(|&i| tools[i].clone()).collect();
            let phase_results = self
                .call_parallel(&phase_invocations, config.max_concurrency, None, config.fail_fast, correlation_id)
                .await;
            for (&tool_index, outcome) in phase.iter().zip(phase_results) {
                if config.fail_fast && matches!(outcome.outcome, ToolOutcomeKind::Error { .. }) {
                    aborted = true;
                }
                results[tool_index] = Some(outcome);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }
}

fn tool_error_result(tool_name: &str, error: String, correlation_id: Option<&str>) -> ActionResult {
    ActionResult::Error {
        error: error.clone(),
        replan_context: None,
        metadata: ErrorContext {
            tool_name: Some(tool_name.to_string()),
            error_message: error,
            timestamp: Utc::now(),
            correlation_id: correlation_id.map(str::to_string),
        },
    }
}

fn plain_error_result(error: String, correlation_id: Option<&str>) -> ActionResult {
    ActionResult::Error {
        error: error.clone(),
        replan_context: None,
        metadata: ErrorContext {
            tool_name: None,
            error_message: error,
            timestamp: Utc::now(),
            correlation_id: correlation_id.map(str::to_string),
        },
    }
}

fn outcomes_result(outcomes: Vec<ToolOutcome>) -> ActionResult {
    ActionResult::ToolResult {
        content: serde_json::to_value(&outcomes).unwrap_or(serde_json::Value::Null),
        metadata: Some(serde_json::json!({ "toolCount": outcomes.len() })),
    }
}

fn breaker_error_message(tool_name: &str, err: BreakerError<ToolError>) -> String {
    match err {
        BreakerError::Open { .. } => ToolPipelineError::CircuitOpen {
            tool_name: tool_name.to_string(),
        }
        .to_string(),
        BreakerError::Timeout(timeout) => ToolPipelineError::Timeout {
            tool_name: tool_name.to_string(),
            timeout,
        }
        .to_string(),
        BreakerError::Operation(tool_err) => ToolPipelineError::ToolFailed(tool_err.to_string()).to_string(),
    }
}

/// Kahn's algorithm, layered: each returned phase is the set of tool indices
/// whose dependencies are all satisfied by earlier phases.
fn topological_phases(tools: &[ToolInvocation], dependencies: &[ToolDependency]) -> Result<Vec<Vec<usize>>, ToolPipelineError> {
    let index: HashMap<&str, usize> = tools.iter().enumerate().map(|(i, t)| (t.tool_name.as_str(), i)).collect();
    let n = tools.len();
    let mut indegree = vec![0usize; n];
    let mut adjacency: Vec<Vec<usize>> = (0..n).map(|_| Vec::new()).collect();

    for dep in dependencies {
        if let (Some(&from), Some(&to)) = (index.get(dep.from.as_str()), index.get(dep.to.as_str())) {
            adjacency[from].push(to);
            indegree[to] += 1;
        }
    }

    let mut remaining = indegree;
    let mut done = vec![false; n];
    let mut phases = Vec::new();
    let mut processed = 0;

    while processed < n {
        let phase: Vec<usize> = (0..n).filter(|&i| !done[i] && remaining[i] == 0).collect();
        if phase.is_empty() {
            return Err(ToolPipelineError::DependencyCycle);
        }
        for &i in &phase {
            done[i] = true;
            for &next in &adjacency[i] {
                remaining[next] -= 1;
            }
        }
        processed += phase.len();
        phases.push(phase);
    }
    Ok(phases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_types::{PlannerMetadata, ResultAnalysis, Thought};
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    impl crate::ToolDyn for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn call(
            &self,
            input: serde_json::Value,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
            Box::pin(async move { Ok(json!({"echoed": input})) })
        }
    }

    struct FailTool;

    impl crate::ToolDyn for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn call(
            &self,
            _input: serde_json::Value,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
            Box::pin(async { Err(ToolError::ExecutionFailed("boom".into())) })
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        reg.register(Arc::new(FailTool));
        Arc::new(reg)
    }

    struct StubPlanner;

    #[async_trait]
    impl Planner for StubPlanner {
        async fn think(&self, _ctx: &PlannerExecutionContext) -> Result<Thought, String> {
            unimplemented!("not exercised by pipeline tests")
        }
        async fn analyze_result(&self, _result: &ActionResult, _ctx: &PlannerExecutionContext) -> Result<ResultAnalysis, String> {
            unimplemented!("not exercised by pipeline tests")
        }
    }

    fn blank_ctx() -> PlannerExecutionContext {
        PlannerExecutionContext {
            input: json!({}),
            history: Vec::new(),
            iterations: 0,
            max_iterations: 10,
            planner_metadata: PlannerMetadata {
                agent_name: "test-agent".to_string(),
                correlation_id: None,
                tenant_id: None,
                thread: None,
                start_time: Utc::now(),
            },
            agent_context: agentrt_types::AgentContext {
                available_tools: vec!["echo".to_string(), "fail".to_string()],
                data: json!({}),
            },
            is_complete: false,
        }
    }

    #[tokio::test]
    async fn single_tool_call_returns_tool_result() {
        let pipeline = ToolPipeline::new(registry());
        let action = AgentAction::ToolCall {
            tool_name: "echo".to_string(),
            input: json!({"x": 1}),
        };
        let result = pipeline.execute(&action, &blank_ctx(), &StubPlanner, None).await;
        assert!(matches!(result, ActionResult::ToolResult { .. }));
    }

    #[tokio::test]
    async fn single_tool_not_found_surfaces_as_error_result() {
        let pipeline = ToolPipeline::new(registry());
        let action = AgentAction::ToolCall {
            tool_name: "missing".to_string(),
            input: json!({}),
        };
        let result = pipeline.execute(&action, &blank_ctx(), &StubPlanner, None).await;
        assert!(matches!(result, ActionResult::Error { .. }));
    }

    #[derive(Default)]
    struct RecordingEmitter {
        events: Mutex<Vec<String>>,
    }

    impl EventEmitter for RecordingEmitter {
        fn emit(&self, event: agentrt_types::Event) {
            self.events.try_lock().expect("uncontended in tests").push(event.event_type);
        }
    }

    #[tokio::test]
    async fn parallel_tools_emits_start_and_completed_once() {
        let emitter = Arc::new(RecordingEmitter::default());
        let pipeline = ToolPipeline::new(registry()).with_emitter(emitter.clone());
        let action = AgentAction::ParallelTools {
            tools: vec![
                ToolInvocation {
                    tool_name: "echo".to_string(),
                    input: json!({"n": 1}),
                },
                ToolInvocation {
                    tool_name: "echo".to_string(),
                    input: json!({"n": 2}),
                },
            ],
            concurrency: None,
            timeout: None,
            fail_fast: false,
        };
        pipeline.execute(&action, &blank_ctx(), &StubPlanner, None).await;
        let events = emitter.events.try_lock().expect("uncontended in tests");
        assert_eq!(events.iter().filter(|e| e.as_str() == "agent.parallel.tools.start").count(), 1);
        assert_eq!(events.iter().filter(|e| e.as_str() == "agent.parallel.tools.completed").count(), 1);
    }

    #[tokio::test]
    async fn parallel_tools_preserve_input_order() {
        let pipeline = ToolPipeline::new(registry());
        let action = AgentAction::ParallelTools {
            tools: vec![
                ToolInvocation {
                    tool_name: "echo".to_string(),
                    input: json!({"n": 1}),
                },
                ToolInvocation {
                    tool_name: "echo".to_string(),
                    input: json!({"n": 2}),
                },
            ],
            concurrency: None,
            timeout: None,
            fail_fast: false,
        };
        let result = pipeline.execute(&action, &blank_ctx(), &StubPlanner, None).await;
        let ActionResult::ToolResult { content, .. } = result else {
            panic!("expected tool result");
        };
        let outcomes: Vec<ToolOutcome> = serde_json::from_value(content).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].outcome, ToolOutcomeKind::Result { .. }));
        assert!(matches!(outcomes[1].outcome, ToolOutcomeKind::Result { .. }));
    }

    #[tokio::test]
    async fn sequential_stop_on_error_drops_remaining_tools() {
        let pipeline = ToolPipeline::new(registry());
        let action = AgentAction::SequentialTools {
            tools: vec![
                ToolInvocation {
                    tool_name: "fail".to_string(),
                    input: json!({}),
                },
                ToolInvocation {
                    tool_name: "echo".to_string(),
                    input: json!({}),
                },
            ],
            stop_on_error: true,
        };
        let result = pipeline.execute(&action, &blank_ctx(), &StubPlanner, None).await;
        let ActionResult::ToolResult { content, .. } = result else {
            panic!("expected tool result");
        };
        let outcomes: Vec<ToolOutcome> = serde_json::from_value(content).unwrap();
        assert_eq!(outcomes.len(), 1);
    }

    #[tokio::test]
    async fn conditional_tools_skips_when_predicate_is_false() {
        let pipeline = ToolPipeline::new(registry());
        let mut conditions = HashMap::new();
        conditions.insert(
            "echo".to_string(),
            ToolCondition::IfFailed {
                tool_name: "fail".to_string(),
            },
        );
        let action = AgentAction::ConditionalTools {
            tools: vec![
                ToolInvocation {
                    tool_name: "fail".to_string(),
                    input: json!({}),
                },
                ToolInvocation {
                    tool_name: "echo".to_string(),
                    input: json!({}),
                },
            ],
            conditions,
        };
        let result = pipeline.execute(&action, &blank_ctx(), &StubPlanner, None).await;
        let ActionResult::ToolResult { content, .. } = result else {
            panic!("expected tool result");
        };
        let outcomes: Vec<ToolOutcome> = serde_json::from_value(content).unwrap();
        assert!(matches!(outcomes[0].outcome, ToolOutcomeKind::Error { .. }));
        assert!(matches!(outcomes[1].outcome, ToolOutcomeKind::Result { .. }));
    }

    #[tokio::test]
    async fn adaptive_strategy_picks_sequential_for_a_single_tool() {
        let pipeline = ToolPipeline::new(registry());
        let action = AgentAction::MixedTools {
            tools: vec![ToolInvocation {
                tool_name: "echo".to_string(),
                input: json!({}),
            }],
            strategy: MixedStrategy::Adaptive,
            config: Default::default(),
        };
        let result = pipeline.execute(&action, &blank_ctx(), &StubPlanner, None).await;
        assert!(matches!(result, ActionResult::ToolResult { .. }));
    }

    #[test]
    fn topological_phases_detects_a_self_cycle() {
        let cyclic = vec![ToolDependency {
            from: "x".to_string(),
            to: "x".to_string(),
        }];
        let tools = vec![ToolInvocation {
            tool_name: "x".to_string(),
            input: json!({}),
        }];
        let err = topological_phases(&tools, &cyclic).unwrap_err();
        assert!(matches!(err, ToolPipelineError::DependencyCycle));
    }

    #[test]
    fn topological_phases_layers_independent_tools_together() {
        let tools = vec![
            ToolInvocation {
                tool_name: "fetch".to_string(),
                input: json!({}),
            },
            ToolInvocation {
                tool_name: "parse".to_string(),
                input: json!({}),
            },
            ToolInvocation {
                tool_name: "summarize".to_string(),
                input: json!({}),
            },
        ];
        let deps = vec![ToolDependency {
            from: "fetch".to_string(),
            to: "parse".to_string(),
        }];
        let phases = topological_phases(&tools, &deps).unwrap();
        assert_eq!(phases.len(), 2);
        assert!(phases[0].contains(&0) && phases[0].contains(&2));
        assert_eq!(phases[1], vec![1]);
    }

    #[tokio::test]
    async fn dependency_tools_executes_independent_phases() {
        let pipeline = ToolPipeline::new(registry());
        let action = AgentAction::DependencyTools {
            tools: vec![
                ToolInvocation {
                    tool_name: "fail".to_string(),
                    input: json!({}),
                },
                ToolInvocation {
                    tool_name: "echo".to_string(),
                    input: json!({}),
                },
            ],
            dependencies: Vec::new(),
            config: Default::default(),
        };
        let result = pipeline.execute(&action, &blank_ctx(), &StubPlanner, None).await;
        let ActionResult::ToolResult { content, .. } = result else {
            panic!("expected tool result");
        };
        let outcomes: Vec<ToolOutcome> = serde_json::from_value(content).unwrap();
        assert_eq!(outcomes.len(), 2);
    }
}
