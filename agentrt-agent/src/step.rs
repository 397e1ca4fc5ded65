//! Step-by-step iteration over the Think-Act-Observe loop.
//!
//! Lets a caller drive the loop one iteration at a time, inspecting state
//! between iterations instead of running straight through to
//! [`crate::core::AgentCore::run`].

use agentrt_types::{AgentContext, AgentError, PlannerExecutionContext, PlannerMetadata, ResultAnalysis, StepExecution};
use chrono::Utc;
use serde_json::Value;
use tracing::Instrument;

use crate::core::{detect_stagnation_pub, extract_final_result_pub, AgentCore, AgentRunResult, HookTerminated, IterationError, IterationOutcome};

/// The outcome of a single iteration.
#[derive(Debug)]
pub enum IterationResult {
    /// The iteration ran to completion and appended to history.
    Stepped {
        /// The step just appended.
        step: Box<StepExecution>,
    },
    /// The planner reported completion; the run is over.
    Completed(AgentRunResult),
    /// The planner asked to stop without completing.
    Stopped(AgentRunResult),
    /// Stagnation, an emergency stop, or the iteration cap ended the run.
    Errored(AgentError),
}

/// Drives an [`AgentCore`] one iteration at a time.
///
/// Created via [`AgentCore::run_step`].
pub struct StepIterator<'a> {
    pub(crate) core: &'a AgentCore,
    pub(crate) input: Value,
    pub(crate) agent_name: String,
    pub(crate) correlation_id: Option<String>,
    pub(crate) start_time: chrono::DateTime<Utc>,
    pub(crate) history: Vec<StepExecution>,
    pub(crate) iterations: u32,
    pub(crate) is_complete: bool,
    pub(crate) finished: bool,
}

impl<'a> StepIterator<'a> {
    /// Advance the loop by one iteration.
    ///
    /// Returns `None` once the run has already finished (completed, was
    /// stopped, or errored on a prior call).
    pub async fn next(&mut self) -> Option<IterationResult> {
        if self.finished {
            return None;
        }
        if self.is_complete {
            self.finished = true;
            let content = extract_final_result_pub(&self.history, self.history.last().and_then(|s| s.observation.as_ref()));
            return Some(IterationResult::Completed(AgentRunResult {
                content,
                history: std::mem::take(&mut self.history),
                iterations: self.iterations,
            }));
        }
        if self.iterations >= self.core.config().max_thinking_iterations {
            self.finished = true;
            return Some(IterationResult::Errored(AgentError::MaxIterationsReached(self.core.config().max_thinking_iterations)));
        }

        let iteration = self.iterations + 1;
        let iter_started = std::time::Instant::now();
        let ctx = PlannerExecutionContext {
            input: self.input.clone(),
            history: self.history.clone(),
            iterations: self.iterations,
            max_iterations: self.core.config().max_thinking_iterations,
            planner_metadata: PlannerMetadata {
                agent_name: self.agent_name.clone(),
                correlation_id: self.correlation_id.clone(),
                tenant_id: None,
                thread: None,
                start_time: self.start_time,
            },
            agent_context: AgentContext {
                available_tools: self.core.tool_pipeline_ref().tool_names(),
                data: Value::Null,
            },
            is_complete: self.is_complete,
        };

        match fire_iteration(self.core, &ctx, iter_started, self.correlation_id.as_deref()).await {
            Ok(Some(IterationOutcome { step, emergency_stop })) => {
                self.iterations = iteration;
                self.is_complete = step.observation.as_ref().is_some_and(|o| o.is_complete);
                let should_continue = step.observation.as_ref().is_none_or(result_analysis_should_continue);
                let analysis = step.observation.clone();
                self.history.push(*step.clone());

                if self.is_complete {
                    return Some(IterationResult::Stepped { step });
                }
                if !should_continue {
                    self.finished = true;
                    let content = extract_final_result_pub(&self.history, analysis.as_ref());
                    return Some(IterationResult::Stopped(AgentRunResult {
                        content,
                        history: std::mem::take(&mut self.history),
                        iterations: self.iterations,
                    }));
                }
                if let Some(reason) = detect_stagnation_pub(&self.history) {
                    self.finished = true;
                    return Some(IterationResult::Errored(AgentError::Stagnated(reason)));
                }
                if let Some(reason) = emergency_stop {
                    self.finished = true;
                    return Some(IterationResult::Errored(AgentError::EmergencyStop(reason)));
                }
                Some(IterationResult::Stepped { step })
            }
            Ok(None) => {
                // Think/Observe failed but wasn't on the final allowed
                // iteration; retry by re-entering the loop next call.
                self.iterations = iteration;
                Some(IterationResult::Stepped {
                    step: Box::new(skipped_step(iteration)),
                })
            }
            Err(IterationError::Agent(e)) => {
                self.finished = true;
                Some(IterationResult::Errored(e))
            }
            Err(IterationError::Terminated(reason)) => {
                self.finished = true;
                Some(IterationResult::Errored(AgentError::Other(Box::new(HookTerminated(reason)))))
            }
        }
    }
}

fn result_analysis_should_continue(a: &ResultAnalysis) -> bool {
    a.should_continue
}

fn skipped_step(iteration: u32) -> StepExecution {
    StepExecution {
        step_id: uuid::Uuid::new_v4().to_string(),
        iteration,
        thought: agentrt_types::Thought {
            reasoning: "think or observe failed; retrying".to_string(),
            action: agentrt_types::AgentAction::NeedMoreInfo {
                question: String::new(),
            },
            confidence: None,
        },
        action: agentrt_types::AgentAction::NeedMoreInfo {
            question: String::new(),
        },
        status: agentrt_types::StepStatus::Pending,
        result: None,
        observation: None,
        duration: agentrt_types::DurationMs(0),
        tool_calls: Vec::new(),
    }
}

async fn fire_iteration(
    core: &AgentCore,
    ctx: &PlannerExecutionContext,
    iter_started: std::time::Instant,
    correlation_id: Option<&str>,
) -> Result<Option<IterationOutcome>, IterationError> {
    core.run_one_iteration(ctx, iter_started, correlation_id)
        .instrument(tracing::info_span!("iteration", iteration = ctx.iterations + 1))
        .await
}
