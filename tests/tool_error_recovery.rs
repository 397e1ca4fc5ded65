//! End-to-end: a tool call fails, the planner observes the error and
//! recovers with a final answer on the next iteration.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use agentrt_agent::AgentCore;
use agentrt_tool::{EventEmitter, ToolDyn, ToolError, ToolPipeline, ToolRegistry};
use agentrt_types::{ActionResult, AgentAction, Event, PlannerExecutionContext, ResultAnalysis, Thought};
use async_trait::async_trait;
use serde_json::{json, Value};

struct FetchApiTool;

impl ToolDyn for FetchApiTool {
    fn name(&self) -> &str {
        "fetchApi"
    }
    fn description(&self) -> &str {
        "Calls a flaky downstream API"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    fn call(&self, _input: Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move { Err(ToolError::ExecutionFailed("network timeout".to_string())) })
    }
}

/// Calls `fetchApi` once, observes its failure, then gives a final answer.
struct RecoveringPlanner {
    called: Mutex<bool>,
}

#[async_trait]
impl agentrt_types::Planner for RecoveringPlanner {
    async fn think(&self, _ctx: &PlannerExecutionContext) -> Result<Thought, String> {
        let mut called = self.called.lock().expect("uncontended in tests");
        if !*called {
            *called = true;
            return Ok(Thought {
                reasoning: "try the API".to_string(),
                action: AgentAction::ToolCall {
                    tool_name: "fetchApi".to_string(),
                    input: json!({}),
                },
                confidence: None,
            });
        }
        Ok(Thought {
            reasoning: "give up on the API".to_string(),
            action: AgentAction::FinalAnswer {
                content: "Service temporarily unavailable".to_string(),
            },
            confidence: None,
        })
    }

    async fn analyze_result(&self, result: &ActionResult, _ctx: &PlannerExecutionContext) -> Result<ResultAnalysis, String> {
        match result {
            ActionResult::Error { error, .. } => {
                assert!(error.contains("network timeout"));
                Ok(ResultAnalysis {
                    is_complete: false,
                    should_continue: true,
                    feedback: None,
                    replan_context: None,
                })
            }
            ActionResult::FinalAnswer { content } => Ok(ResultAnalysis {
                is_complete: true,
                should_continue: true,
                feedback: Some(content.clone()),
                replan_context: None,
            }),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

#[derive(Default)]
struct RecordingEmitter {
    errors: Mutex<Vec<(String, String)>>,
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, event: Event) {
        if event.event_type == "agent.tool.error" {
            let message = event.data["error"].as_str().unwrap_or_default().to_string();
            self.errors.lock().expect("uncontended in tests").push((event.event_type, message));
        }
    }
}

#[tokio::test]
async fn tool_error_is_observed_and_recovered_on_the_next_iteration() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(FetchApiTool));
    let emitter = Arc::new(RecordingEmitter::default());
    let pipeline = Arc::new(ToolPipeline::new(Arc::new(registry)).with_emitter(emitter.clone()));
    let planner = Arc::new(RecoveringPlanner { called: Mutex::new(false) });

    let core = AgentCore::builder(planner, pipeline).build().expect("build");
    let result = core.run(json!({}), "tester".to_string(), None).await.expect("run succeeds");

    assert_eq!(result.iterations, 2);
    assert_eq!(result.content, "Service temporarily unavailable");

    let errors = emitter.errors.lock().expect("uncontended in tests");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].1.contains("network timeout"));
}
