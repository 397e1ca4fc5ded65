//! Integration tests for agentrt-agent.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use agentrt_agent::{AgentCore, HookAction, HookError, HookEvent, IterationResult, ObservabilityHook};
use agentrt_tool::{ToolDyn, ToolError, ToolPipeline, ToolRegistry};
use agentrt_types::{ActionResult, AgentAction, AgentError, PlannerExecutionContext, ResultAnalysis, Thought};
use async_trait::async_trait;
use serde_json::{json, Value};

/// A planner driven by a preconfigured sequence of thoughts and analyses: a
/// response queue a test drains in order.
struct ScriptedPlanner {
    thoughts: Mutex<Vec<Thought>>,
    analyses: Mutex<Vec<ResultAnalysis>>,
}

impl ScriptedPlanner {
    fn new(thoughts: Vec<Thought>, analyses: Vec<ResultAnalysis>) -> Self {
        Self {
            thoughts: Mutex::new(thoughts),
            analyses: Mutex::new(analyses),
        }
    }
}

#[async_trait]
impl agentrt_types::Planner for ScriptedPlanner {
    async fn think(&self, _ctx: &PlannerExecutionContext) -> Result<Thought, String> {
        let mut thoughts = self.thoughts.lock().expect("lock");
        if thoughts.is_empty() {
            return Err("ScriptedPlanner: no more thoughts configured".to_string());
        }
        Ok(thoughts.remove(0))
    }

    async fn analyze_result(&self, _result: &ActionResult, _ctx: &PlannerExecutionContext) -> Result<ResultAnalysis, String> {
        let mut analyses = self.analyses.lock().expect("lock");
        if analyses.is_empty() {
            return Err("ScriptedPlanner: no more analyses configured".to_string());
        }
        Ok(analyses.remove(0))
    }
}

fn thought(action: AgentAction) -> Thought {
    Thought {
        reasoning: "test reasoning".to_string(),
        action,
        confidence: None,
    }
}

fn analysis(is_complete: bool, should_continue: bool) -> ResultAnalysis {
    ResultAnalysis {
        is_complete,
        should_continue,
        feedback: None,
        replan_context: None,
    }
}

fn final_answer(content: &str) -> AgentAction {
    AgentAction::FinalAnswer { content: content.to_string() }
}

struct EchoTool;

impl ToolDyn for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echoes its input"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    fn call(&self, input: Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move { Ok(input) })
    }
}

fn tool_pipeline() -> Arc<ToolPipeline> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool));
    Arc::new(ToolPipeline::new(Arc::new(registry)))
}

/// A tool that bumps a shared counter by a fixed amount on every call,
/// standing in for the Tool Pipeline's own event emission during Act.
struct CounterBumpTool {
    counter: Arc<AtomicU64>,
    bump: u64,
}

impl ToolDyn for CounterBumpTool {
    fn name(&self) -> &str {
        "counter_bump"
    }
    fn description(&self) -> &str {
        "Bumps a shared counter"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    fn call(&self, _input: Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        self.counter.fetch_add(self.bump, std::sync::atomic::Ordering::Relaxed);
        Box::pin(async move { Ok(json!({"bumped": true})) })
    }
}

fn tool_pipeline_with_counter_bump(counter: Arc<AtomicU64>, bump: u64) -> Arc<ToolPipeline> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CounterBumpTool { counter, bump }));
    Arc::new(ToolPipeline::new(Arc::new(registry)))
}

#[tokio::test]
async fn run_completes_on_final_answer() {
    let planner = Arc::new(ScriptedPlanner::new(vec![thought(final_answer("all done"))], vec![analysis(true, true)]));
    let core = AgentCore::builder(planner, tool_pipeline()).build().expect("build");

    let result = core.run(json!({"goal": "say hi"}), "tester".to_string(), None).await.expect("run succeeds");

    assert_eq!(result.content, "all done");
    assert_eq!(result.iterations, 1);
    assert_eq!(result.history.len(), 1);
}

#[tokio::test]
async fn run_stops_when_planner_says_do_not_continue() {
    let planner = Arc::new(ScriptedPlanner::new(
        vec![thought(AgentAction::NeedMoreInfo {
            question: "what city?".to_string(),
        })],
        vec![analysis(false, false)],
    ));
    let core = AgentCore::builder(planner, tool_pipeline()).build().expect("build");

    let result = core.run(json!({}), "tester".to_string(), None).await.expect("run succeeds without completing");

    assert_eq!(result.content, "what city?");
    assert_eq!(result.iterations, 1);
}

#[tokio::test]
async fn run_detects_stagnation_from_repeated_action_type() {
    let need_info = || {
        thought(AgentAction::NeedMoreInfo {
            question: "still need more".to_string(),
        })
    };
    let planner = Arc::new(ScriptedPlanner::new(
        vec![need_info(), need_info(), need_info()],
        vec![analysis(false, true), analysis(false, true), analysis(false, true)],
    ));
    let core = AgentCore::builder(planner, tool_pipeline()).build().expect("build");

    let err = core.run(json!({}), "tester".to_string(), None).await.unwrap_err();

    assert!(matches!(err, AgentError::Stagnated(_)), "expected Stagnated, got: {err:?}");
}

#[tokio::test]
async fn run_detects_stagnation_from_repeated_failures() {
    let failing_call = || {
        thought(AgentAction::ToolCall {
            tool_name: "missing-tool".to_string(),
            input: json!({}),
        })
    };
    let planner = Arc::new(ScriptedPlanner::new(
        vec![failing_call(), failing_call(), thought(final_answer("recovered"))],
        vec![analysis(false, true), analysis(false, true), analysis(true, true)],
    ));
    let core = AgentCore::builder(planner, tool_pipeline()).build().expect("build");

    let err = core.run(json!({}), "tester".to_string(), None).await.unwrap_err();

    assert!(matches!(err, AgentError::Stagnated(_)), "expected Stagnated, got: {err:?}");
}

#[tokio::test]
async fn run_reaches_max_thinking_iterations() {
    let keep_going = || {
        thought(AgentAction::NeedMoreInfo {
            question: "keep going".to_string(),
        })
    };
    let planner = Arc::new(ScriptedPlanner::new(
        vec![keep_going(), keep_going()],
        vec![analysis(false, true), analysis(false, true)],
    ));
    let mut config = agentrt_agent::AgentCoreConfig::default();
    config.max_thinking_iterations = 2;
    let core = AgentCore::builder(planner, tool_pipeline()).config(config).build().expect("build");

    let err = core.run(json!({}), "tester".to_string(), None).await.unwrap_err();

    assert!(matches!(err, AgentError::MaxIterationsReached(2)), "expected MaxIterationsReached(2), got: {err:?}");
}

#[tokio::test]
async fn run_executes_a_tool_call_through_the_pipeline() {
    let planner = Arc::new(ScriptedPlanner::new(
        vec![
            thought(AgentAction::ToolCall {
                tool_name: "echo".to_string(),
                input: json!({"text": "hello"}),
            }),
            thought(final_answer("tool result received")),
        ],
        vec![analysis(false, true), analysis(true, true)],
    ));
    let core = AgentCore::builder(planner, tool_pipeline()).build().expect("build");

    let result = core.run(json!({}), "tester".to_string(), None).await.expect("run succeeds");

    assert_eq!(result.content, "tool result received");
    assert_eq!(result.iterations, 2);
    let first_step = &result.history[0];
    match &first_step.result {
        Some(ActionResult::ToolResult { content, .. }) => assert_eq!(content["text"], "hello"),
        other => panic!("expected ToolResult, got: {other:?}"),
    }
}

#[tokio::test]
async fn delegate_to_agent_is_refused_when_multi_agent_disabled() {
    let planner = Arc::new(ScriptedPlanner::new(
        vec![thought(AgentAction::DelegateToAgent {
            agent_name: "helper".to_string(),
            input: json!({}),
        })],
        vec![analysis(true, true)],
    ));
    let core = AgentCore::builder(planner, tool_pipeline()).build().expect("build");

    let result = core.run(json!({}), "tester".to_string(), None).await.expect("run succeeds, records an error step");

    match &result.history[0].result {
        Some(ActionResult::Error { error, .. }) => assert!(error.contains("multi-agent delegation is disabled")),
        other => panic!("expected Error result, got: {other:?}"),
    }
}

/// A hook that terminates the run as soon as it observes a `BeforeAct` event.
struct TerminatingHook;

impl ObservabilityHook for TerminatingHook {
    fn on_event(&self, event: HookEvent<'_>) -> impl Future<Output = Result<HookAction, HookError>> + Send {
        let action = match event {
            HookEvent::BeforeAct { .. } => HookAction::Terminate {
                reason: "policy violation".to_string(),
            },
            _ => HookAction::Continue,
        };
        std::future::ready(Ok(action))
    }
}

#[tokio::test]
async fn hook_terminate_aborts_the_run() {
    let planner = Arc::new(ScriptedPlanner::new(vec![thought(final_answer("should not get here"))], vec![analysis(true, true)]));
    let core = AgentCore::builder(planner, tool_pipeline()).hook(TerminatingHook).build().expect("build");

    let err = core.run(json!({}), "tester".to_string(), None).await.unwrap_err();

    match err {
        AgentError::Other(inner) => assert!(inner.to_string().contains("policy violation")),
        other => panic!("expected AgentError::Other wrapping the hook reason, got: {other:?}"),
    }
}

/// A hook that skips every tool call before it reaches the pipeline.
struct SkipToolHook;

impl ObservabilityHook for SkipToolHook {
    fn on_event(&self, event: HookEvent<'_>) -> impl Future<Output = Result<HookAction, HookError>> + Send {
        let action = match event {
            HookEvent::BeforeAct {
                action: AgentAction::ToolCall { .. },
            } => HookAction::Skip {
                reason: "tool blocked by policy".to_string(),
            },
            _ => HookAction::Continue,
        };
        std::future::ready(Ok(action))
    }
}

#[tokio::test]
async fn hook_skip_substitutes_an_error_result_without_calling_the_tool() {
    let planner = Arc::new(ScriptedPlanner::new(
        vec![
            thought(AgentAction::ToolCall {
                tool_name: "echo".to_string(),
                input: json!({"text": "hello"}),
            }),
            thought(final_answer("handled the skip")),
        ],
        vec![analysis(false, true), analysis(true, true)],
    ));
    let core = AgentCore::builder(planner, tool_pipeline()).hook(SkipToolHook).build().expect("build");

    let result = core.run(json!({}), "tester".to_string(), None).await.expect("run succeeds");

    match &result.history[0].result {
        Some(ActionResult::Error { error, .. }) => assert!(error.contains("tool blocked by policy")),
        other => panic!("expected Error result from the skip, got: {other:?}"),
    }
}

#[tokio::test]
async fn run_step_yields_one_iteration_at_a_time_then_completes() {
    let planner = Arc::new(ScriptedPlanner::new(
        vec![
            thought(AgentAction::ToolCall {
                tool_name: "echo".to_string(),
                input: json!({"text": "step one"}),
            }),
            thought(final_answer("finished in two steps")),
        ],
        vec![analysis(false, true), analysis(true, true)],
    ));
    let core = AgentCore::builder(planner, tool_pipeline()).build().expect("build");
    let mut iter = core.run_step(json!({}), "tester".to_string(), None);

    match iter.next().await.expect("first iteration") {
        IterationResult::Stepped { step } => assert_eq!(step.iteration, 1),
        other => panic!("expected Stepped, got: {other:?}"),
    }

    match iter.next().await.expect("second iteration") {
        IterationResult::Stepped { step } => assert_eq!(step.iteration, 2),
        other => panic!("expected Stepped, got: {other:?}"),
    }

    match iter.next().await.expect("completion") {
        IterationResult::Completed(result) => assert_eq!(result.content, "finished in two steps"),
        other => panic!("expected Completed, got: {other:?}"),
    }

    assert!(iter.next().await.is_none(), "iterator should be exhausted after completion");
}

#[tokio::test]
async fn run_step_reports_stop_without_completion() {
    let planner = Arc::new(ScriptedPlanner::new(
        vec![thought(AgentAction::NeedMoreInfo {
            question: "need more".to_string(),
        })],
        vec![analysis(false, false)],
    ));
    let core = AgentCore::builder(planner, tool_pipeline()).build().expect("build");
    let mut iter = core.run_step(json!({}), "tester".to_string(), None);

    match iter.next().await.expect("one iteration") {
        IterationResult::Stopped(result) => assert_eq!(result.content, "need more"),
        other => panic!("expected Stopped, got: {other:?}"),
    }

    assert!(iter.next().await.is_none());
}

#[tokio::test]
async fn wiring_an_event_counter_with_no_growth_does_not_trigger_emergency_stop() {
    let planner = Arc::new(ScriptedPlanner::new(vec![thought(final_answer("done"))], vec![analysis(true, true)]));
    let core = AgentCore::builder(planner, tool_pipeline())
        .event_counter(Arc::new(AtomicU64::new(0)))
        .build()
        .expect("build");

    let result = core.run(json!({}), "tester".to_string(), None).await.expect("run succeeds");
    assert_eq!(result.content, "done");
}

#[tokio::test]
async fn completing_on_the_same_iteration_that_trips_emergency_stop_still_succeeds() {
    let counter = Arc::new(AtomicU64::new(0));
    let planner = Arc::new(ScriptedPlanner::new(
        vec![thought(AgentAction::ToolCall {
            tool_name: "counter_bump".to_string(),
            input: json!({}),
        })],
        vec![analysis(true, true)],
    ));
    let core = AgentCore::builder(planner, tool_pipeline_with_counter_bump(counter.clone(), 150))
        .event_counter(counter)
        .build()
        .expect("build");

    let result = core
        .run(json!({}), "tester".to_string(), None)
        .await
        .expect("isComplete takes priority over emergency-stop on the same iteration");
    assert_eq!(result.iterations, 1);
}

#[tokio::test]
async fn emergency_stop_fires_when_the_run_is_not_also_completing() {
    let counter = Arc::new(AtomicU64::new(0));
    let planner = Arc::new(ScriptedPlanner::new(
        vec![thought(AgentAction::ToolCall {
            tool_name: "counter_bump".to_string(),
            input: json!({}),
        })],
        vec![analysis(false, true)],
    ));
    let core = AgentCore::builder(planner, tool_pipeline_with_counter_bump(counter.clone(), 150))
        .event_counter(counter)
        .build()
        .expect("build");

    let err = core.run(json!({}), "tester".to_string(), None).await.unwrap_err();
    assert!(matches!(err, AgentError::EmergencyStop(_)), "expected EmergencyStop, got: {err:?}");
}

#[tokio::test]
async fn think_failure_on_the_final_allowed_iteration_surfaces_as_planner_error() {
    let planner: Arc<dyn agentrt_types::Planner> = Arc::new(ScriptedPlanner::new(vec![], vec![]));
    let mut config = agentrt_agent::AgentCoreConfig::default();
    config.max_thinking_iterations = 1;
    let core = AgentCore::builder(planner, tool_pipeline()).config(config).build().expect("build");

    let err = core.run(json!({}), "tester".to_string(), None).await.unwrap_err();

    assert!(matches!(err, AgentError::Planner(_)), "expected Planner error when think() runs dry on the last iteration, got: {err:?}");
}
