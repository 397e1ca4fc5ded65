//! End-to-end: a parallel-tools action preserves input ordering in its
//! result array regardless of completion order, and fires the
//! `agent.parallel.tools.completed` lifecycle event exactly once.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentrt_tool::{EventEmitter, ToolDyn, ToolError, ToolPipeline, ToolRegistry};
use agentrt_types::{ActionResult, AgentAction, AgentContext, Event, PlannerExecutionContext, PlannerMetadata, ToolInvocation};
use chrono::Utc;
use serde_json::{json, Value};

/// A tool that sleeps `delay_ms` before returning its own name, so completion
/// order can be controlled independently of input order.
struct DelayedTool {
    name: String,
    delay: Duration,
}

impl ToolDyn for DelayedTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Completes after a fixed delay"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    fn call(&self, _input: Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        let delay = self.delay;
        let name = self.name.clone();
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(json!({"tool": name}))
        })
    }
}

#[derive(Default)]
struct RecordingEmitter {
    event_types: Mutex<Vec<String>>,
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, event: Event) {
        self.event_types.lock().expect("uncontended in tests").push(event.event_type);
    }
}

fn ctx() -> PlannerExecutionContext {
    PlannerExecutionContext {
        input: json!({}),
        history: Vec::new(),
        iterations: 0,
        max_iterations: 15,
        planner_metadata: PlannerMetadata {
            agent_name: "tester".to_string(),
            correlation_id: None,
            tenant_id: None,
            thread: None,
            start_time: Utc::now(),
        },
        agent_context: AgentContext::default(),
        is_complete: false,
    }
}

struct NullPlanner;

#[async_trait::async_trait]
impl agentrt_types::Planner for NullPlanner {
    async fn think(&self, _ctx: &PlannerExecutionContext) -> Result<agentrt_types::Thought, String> {
        unreachable!("this scenario drives the pipeline directly")
    }
    async fn analyze_result(&self, _result: &ActionResult, _ctx: &PlannerExecutionContext) -> Result<agentrt_types::ResultAnalysis, String> {
        unreachable!("this scenario drives the pipeline directly")
    }
}

#[tokio::test]
async fn parallel_result_order_matches_input_order_not_completion_order() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(DelayedTool {
        name: "A".to_string(),
        delay: Duration::from_millis(30),
    }));
    registry.register(Arc::new(DelayedTool {
        name: "B".to_string(),
        delay: Duration::from_millis(5),
    }));
    registry.register(Arc::new(DelayedTool {
        name: "C".to_string(),
        delay: Duration::from_millis(50),
    }));
    let emitter = Arc::new(RecordingEmitter::default());
    let pipeline = ToolPipeline::new(Arc::new(registry)).with_emitter(emitter.clone());

    let action = AgentAction::ParallelTools {
        tools: vec![
            ToolInvocation {
                tool_name: "A".to_string(),
                input: json!({}),
            },
            ToolInvocation {
                tool_name: "B".to_string(),
                input: json!({}),
            },
            ToolInvocation {
                tool_name: "C".to_string(),
                input: json!({}),
            },
        ],
        concurrency: Some(3),
        timeout: None,
        fail_fast: false,
    };

    let result = pipeline.execute(&action, &ctx(), &NullPlanner, None).await;
    let content = match result {
        ActionResult::ToolResult { content, .. } => content,
        other => panic!("expected ToolResult, got: {other:?}"),
    };
    let names: Vec<String> = content
        .as_array()
        .expect("content is an array of outcomes")
        .iter()
        .map(|outcome| outcome["tool_name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, vec!["A".to_string(), "B".to_string(), "C".to_string()]);

    let emitted = emitter.event_types.lock().expect("uncontended in tests");
    assert_eq!(emitted.iter().filter(|t| t.as_str() == "agent.parallel.tools.completed").count(), 1);
}
