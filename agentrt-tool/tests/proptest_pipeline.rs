//! Property test for the parallel-tool-execution invariant: whatever number
//! of tools go in, the same number of outcomes come back, in input order.

use std::sync::Arc;

use agentrt_tool::{ToolDyn, ToolError, ToolPipeline, ToolRegistry};
use agentrt_types::{
    AgentAction, AgentContext, ActionResult, PlannerExecutionContext, PlannerMetadata, ResultAnalysis, Thought, ToolInvocation,
};
use async_trait::async_trait;
use chrono::Utc;
use proptest::prelude::*;
use serde_json::json;

struct EchoTool;

impl ToolDyn for EchoTool {
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

struct FlakyTool;

impl ToolDyn for FlakyTool {
    fn name(&self) -> &str {
        "flaky"
    }
    fn description(&self) -> &str {
        "fails when input.fail is true"
    }
    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object"})
    }
    fn call(
        &self,
        input: serde_json::Value,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            if input.get("fail").and_then(|v| v.as_bool()).unwrap_or(false) {
                Err(ToolError::ExecutionFailed("flaky failure".into()))
            } else {
                Ok(json!({"ok": true}))
            }
        })
    }
}

struct StubPlanner;

#[async_trait]
impl agentrt_types::Planner for StubPlanner {
    async fn think(&self, _ctx: &PlannerExecutionContext) -> Result<Thought, String> {
        unimplemented!("not exercised by this test")
    }
    async fn analyze_result(&self, _result: &ActionResult, _ctx: &PlannerExecutionContext) -> Result<ResultAnalysis, String> {
        unimplemented!("not exercised by this test")
    }
}

fn blank_ctx() -> PlannerExecutionContext {
    PlannerExecutionContext {
        input: json!({}),
        history: Vec::new(),
        iterations: 0,
        max_iterations: 10,
        planner_metadata: PlannerMetadata {
            agent_name: "prop-test-agent".to_string(),
            correlation_id: None,
            tenant_id: None,
            thread: None,
            start_time: Utc::now(),
        },
        agent_context: AgentContext {
            available_tools: vec!["echo".to_string(), "flaky".to_string()],
            data: json!({}),
        },
        is_complete: false,
    }
}

fn arb_invocations(max: usize) -> impl Strategy<Value = Vec<ToolInvocation>> {
    prop::collection::vec(any::<bool>(), 1..=max).prop_map(|flags| {
        flags
            .into_iter()
            .map(|fail| ToolInvocation {
                tool_name: "flaky".to_string(),
                input: json!({ "fail": fail }),
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn parallel_outcomes_match_input_length_and_order(tools in arb_invocations(10)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut registry = ToolRegistry::new();
            registry.register(Arc::new(EchoTool));
            registry.register(Arc::new(FlakyTool));
            let pipeline = ToolPipeline::new(Arc::new(registry));

            let expected_len = tools.len();
            let action = AgentAction::ParallelTools {
                tools: tools.clone(),
                concurrency: None,
                timeout: None,
                fail_fast: false,
            };
            let result = pipeline.execute(&action, &blank_ctx(), &StubPlanner, None).await;

            let ActionResult::ToolResult { content, .. } = result else {
                return Err(TestCaseError::fail("expected ToolResult"));
            };
            let outcomes = content.as_array().expect("parallel result is a JSON array").clone();
            prop_assert_eq!(outcomes.len(), expected_len);

            for (invocation, outcome) in tools.iter().zip(outcomes.iter()) {
                let should_fail = invocation.input.get("fail").and_then(|v| v.as_bool()).unwrap_or(false);
                let status = outcome.get("status").and_then(|v| v.as_str()).unwrap();
                prop_assert_eq!(status, if should_fail { "error" } else { "result" });
            }
            Ok(())
        })?;
    }
}
