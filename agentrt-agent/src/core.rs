//! The Agent Core: a single agent's Think-Act-Observe loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agentrt_tool::ToolPipeline;
use agentrt_types::{
    ActionResult, AgentAction, AgentContext, AgentError, Planner, PlannerExecutionContext, PlannerMetadata, ResultAnalysis,
    StepExecution, StepStatus, ToolCallRecord, ToolOutcome, ToolOutcomeKind,
};
use chrono::Utc;
use serde_json::Value;
use tracing::Instrument;

use crate::config::AgentCoreConfig;
use crate::hooks::{fire_after_act, fire_after_observe, fire_after_think, fire_before_act, fire_before_think, BoxedHook, HookAction};

const EMERGENCY_STOP_ITERATION_GROWTH: u64 = 100;
const EMERGENCY_STOP_CUMULATIVE: u64 = 5000;
const STAGNATION_WINDOW: usize = 3;
const STAGNATION_ERROR_THRESHOLD: usize = 2;

/// Why a single iteration could not produce a `StepExecution`.
pub(crate) enum IterationError {
    /// Propagate as-is from `AgentCore::run`/`StepIterator::next`.
    Agent(AgentError),
    /// A hook returned `HookAction::Terminate`.
    Terminated(String),
}

/// A completed iteration, plus whether it also tripped the emergency-stop
/// threshold. The caller decides what that means: `isComplete` and
/// `!shouldContinue` both take priority over it, since this iteration's
/// `StepExecution` must still be appended to history and checked against
/// those first per the termination-condition ordering.
pub(crate) struct IterationOutcome {
    pub(crate) step: Box<StepExecution>,
    pub(crate) emergency_stop: Option<String>,
}

/// The result of a completed, stopped, or caller-deferred run.
#[derive(Debug)]
pub struct AgentRunResult {
    /// The final user-facing content.
    pub content: String,
    /// Every iteration's full record, oldest first.
    pub history: Vec<StepExecution>,
    /// Number of iterations completed.
    pub iterations: u32,
}

/// Drives a single agent's Think-Act-Observe loop.
///
/// Generic over nothing: the planner and tool pipeline are held as trait
/// objects so one `AgentCore` can be reused across runs with different
/// callers, type-erased rather than monomorphized, since the planner is
/// already behind `dyn Planner` at every other boundary in this runtime.
pub struct AgentCore {
    planner: Arc<dyn Planner>,
    tool_pipeline: Arc<ToolPipeline>,
    config: AgentCoreConfig,
    hooks: Vec<BoxedHook>,
    event_counter: Option<Arc<AtomicU64>>,
}

impl AgentCore {
    /// Returns a reference to the current configuration.
    #[must_use]
    pub fn config(&self) -> &AgentCoreConfig {
        &self.config
    }

    pub(crate) fn tool_pipeline_ref(&self) -> &ToolPipeline {
        &self.tool_pipeline
    }

    /// Create a builder with the required planner and tool pipeline.
    #[must_use]
    pub fn builder(planner: Arc<dyn Planner>, tool_pipeline: Arc<ToolPipeline>) -> AgentCoreBuilder {
        AgentCoreBuilder {
            planner: Some(planner),
            tool_pipeline,
            config: AgentCoreConfig::default(),
            hooks: Vec::new(),
            event_counter: None,
        }
    }

    /// Drive the loop one iteration at a time instead of to completion.
    ///
    /// See [`crate::step::StepIterator`].
    #[must_use]
    pub fn run_step(&self, input: Value, agent_name: String, correlation_id: Option<String>) -> crate::step::StepIterator<'_> {
        crate::step::StepIterator {
            core: self,
            input,
            agent_name,
            correlation_id,
            start_time: Utc::now(),
            history: Vec::new(),
            iterations: 0,
            is_complete: false,
            finished: false,
        }
    }

    /// Run the Think-Act-Observe loop to completion.
    ///
    /// Drives the loop until the planner reports completion, asks to stop,
    /// stagnation or emergency-stop fires, or `max_thinking_iterations` is
    /// reached. Fires [`crate::hooks::HookEvent`] at each boundary; a hook
    /// returning [`HookAction::Terminate`] ends the run immediately.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::MaxIterationsReached` if the iteration limit is
    /// hit without completing, `AgentError::Stagnated` or
    /// `AgentError::EmergencyStop` if those conditions fire, or
    /// `AgentError::Planner` if Think/Observe fails on the final allowed
    /// iteration.
    #[tracing::instrument(skip(self, input), fields(agent = %agent_name))]
    pub async fn run(&self, input: Value, agent_name: String, correlation_id: Option<String>) -> Result<AgentRunResult, AgentError> {
        let start_time = Utc::now();
        let mut history: Vec<StepExecution> = Vec::new();
        let mut is_complete = false;
        let mut iterations: u32 = 0;

        loop {
            if is_complete {
                let content = last_analysis(&history).map_or_else(|| extract_final_result(&history), |a| extract_final_result_from(&history, a));
                return Ok(AgentRunResult {
                    content,
                    history,
                    iterations,
                });
            }
            if iterations >= self.config.max_thinking_iterations {
                return Err(AgentError::MaxIterationsReached(self.config.max_thinking_iterations));
            }

            let iter_started = std::time::Instant::now();
            let ctx = PlannerExecutionContext {
                input: input.clone(),
                history: history.clone(),
                iterations,
                max_iterations: self.config.max_thinking_iterations,
                planner_metadata: PlannerMetadata {
                    agent_name: agent_name.clone(),
                    correlation_id: correlation_id.clone(),
                    tenant_id: None,
                    thread: None,
                    start_time,
                },
                agent_context: AgentContext {
                    available_tools: self.tool_pipeline.tool_names(),
                    data: Value::Null,
                },
                is_complete,
            };

            let outcome = match self
                .run_one_iteration(&ctx, iter_started, correlation_id.as_deref())
                .instrument(tracing::info_span!("iteration", iteration = iterations + 1))
                .await
            {
                Ok(Some(outcome)) => outcome,
                Ok(None) => {
                    iterations += 1;
                    continue;
                }
                Err(IterationError::Agent(e)) => return Err(e),
                Err(IterationError::Terminated(reason)) => return Err(AgentError::Other(Box::new(HookTerminated(reason)))),
            };

            let step = outcome.step;
            is_complete = step.observation.as_ref().is_some_and(|o| o.is_complete);
            let should_continue = step.observation.as_ref().is_none_or(|o| o.should_continue);
            let analysis = step.observation.clone();
            iterations += 1;
            history.push(*step);

            if is_complete {
                continue;
            }
            if !should_continue {
                let analysis = analysis.expect("run_one_iteration always attaches an observation on success");
                return Ok(AgentRunResult {
                    content: extract_final_result_from(&history, &analysis),
                    history,
                    iterations,
                });
            }
            if let Some(reason) = detect_stagnation(&history) {
                return Err(AgentError::Stagnated(reason));
            }
            if let Some(reason) = outcome.emergency_stop {
                return Err(AgentError::EmergencyStop(reason));
            }
        }
    }

    /// Run the Think-Act-Observe boundaries for a single iteration.
    ///
    /// Returns `Ok(None)` when Think or Observe failed but this wasn't the
    /// final allowed iteration — the caller should retry without consuming a
    /// history slot. Stagnation and the `is_complete`/`should_continue`
    /// branches are the caller's responsibility, since they need the full
    /// history rather than just this iteration's context.
    pub(crate) async fn run_one_iteration(
        &self,
        ctx: &PlannerExecutionContext,
        iter_started: std::time::Instant,
        correlation_id: Option<&str>,
    ) -> Result<Option<IterationOutcome>, IterationError> {
        let iteration = ctx.iterations + 1;
        let last_allowed = iteration >= self.config.max_thinking_iterations;

        if let Some(HookAction::Terminate { reason }) = fire_before_think(&self.hooks, iteration)
            .await
            .map_err(|e| IterationError::Agent(AgentError::Other(Box::new(e))))?
        {
            return Err(IterationError::Terminated(reason));
        }

        let thought = match tokio::time::timeout(self.config.thinking_timeout, self.planner.think(ctx).in_current_span()).await {
            Ok(Ok(thought)) => thought,
            Ok(Err(message)) if last_allowed => return Err(IterationError::Agent(AgentError::Planner(message))),
            Err(_elapsed) if last_allowed => return Err(IterationError::Agent(AgentError::Planner("think exceeded thinking_timeout".to_string()))),
            Ok(Err(_)) | Err(_) => return Ok(None),
        };

        if let Some(HookAction::Terminate { reason }) = fire_after_think(&self.hooks, iteration, &thought)
            .await
            .map_err(|e| IterationError::Agent(AgentError::Other(Box::new(e))))?
        {
            return Err(IterationError::Terminated(reason));
        }

        let before_act = fire_before_act(&self.hooks, &thought.action)
            .await
            .map_err(|e| IterationError::Agent(AgentError::Other(Box::new(e))))?;

        let events_before = self.event_counter.as_ref().map_or(0, |c| c.load(Ordering::Relaxed));
        let result = match before_act {
            Some(HookAction::Terminate { reason }) => return Err(IterationError::Terminated(reason)),
            Some(HookAction::Skip { reason }) => plain_error(format!("action skipped by hook: {reason}")),
            Some(HookAction::Continue) | None => self.act(&thought.action, ctx, correlation_id).await,
        };
        let events_after = self.event_counter.as_ref().map_or(0, |c| c.load(Ordering::Relaxed));

        if let Some(HookAction::Terminate { reason }) = fire_after_act(&self.hooks, &result)
            .await
            .map_err(|e| IterationError::Agent(AgentError::Other(Box::new(e))))?
        {
            return Err(IterationError::Terminated(reason));
        }

        let analysis = match tokio::time::timeout(self.config.thinking_timeout, self.planner.analyze_result(&result, ctx).in_current_span()).await {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(message)) if last_allowed => return Err(IterationError::Agent(AgentError::Planner(message))),
            Err(_elapsed) if last_allowed => {
                return Err(IterationError::Agent(AgentError::Planner("analyze_result exceeded thinking_timeout".to_string())))
            }
            Ok(Err(_)) | Err(_) => return Ok(None),
        };

        if let Some(HookAction::Terminate { reason }) = fire_after_observe(&self.hooks, &analysis)
            .await
            .map_err(|e| IterationError::Agent(AgentError::Other(Box::new(e))))?
        {
            return Err(IterationError::Terminated(reason));
        }

        let emergency_stop = if self.event_counter.is_some() {
            let delta = events_after.saturating_sub(events_before);
            if delta > EMERGENCY_STOP_ITERATION_GROWTH || events_after > EMERGENCY_STOP_CUMULATIVE {
                Some(format!("kernel event count grew by {delta} this iteration (cumulative {events_after})"))
            } else {
                None
            }
        } else {
            None
        };

        let duration = iter_started.elapsed().into();
        let status = if result.is_error() { StepStatus::Failed } else { StepStatus::Completed };
        Ok(Some(IterationOutcome {
            step: Box::new(StepExecution {
                step_id: uuid::Uuid::new_v4().to_string(),
                iteration,
                thought: thought.clone(),
                action: thought.action.clone(),
                status,
                tool_calls: extract_tool_calls(&thought.action, &result, duration),
                result: Some(result),
                observation: Some(analysis),
                duration,
            }),
            emergency_stop,
        }))
    }

    async fn act(&self, action: &AgentAction, ctx: &PlannerExecutionContext, correlation_id: Option<&str>) -> ActionResult {
        match action {
            AgentAction::FinalAnswer { content } => ActionResult::FinalAnswer { content: content.clone() },
            AgentAction::NeedMoreInfo { question } => ActionResult::FinalAnswer { content: question.clone() },
            AgentAction::DelegateToAgent { agent_name, .. } if !self.config.enable_multi_agent => plain_error(format!(
                "delegation to `{agent_name}` was requested but multi-agent delegation is disabled"
            )),
            AgentAction::DelegateToAgent { agent_name, input } => ActionResult::FinalAnswer {
                content: format!("delegated to `{agent_name}` with input {input}"),
            },
            _ if !self.config.enable_tools => plain_error("tool dispatch is disabled for this agent".to_string()),
            _ => {
                match tokio::time::timeout(self.config.tool_timeout, self.tool_pipeline.execute(action, ctx, self.planner.as_ref(), correlation_id)).await {
                    Ok(result) => result,
                    Err(_elapsed) => plain_error(format!("{} exceeded tool_timeout", action_type_name(action))),
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("hook terminated the run: {0}")]
pub(crate) struct HookTerminated(pub(crate) String);

/// Builder for constructing an [`AgentCore`]. Only `planner` and
/// `tool_pipeline` are required; everything else has sensible defaults.
pub struct AgentCoreBuilder {
    planner: Option<Arc<dyn Planner>>,
    tool_pipeline: Arc<ToolPipeline>,
    config: AgentCoreConfig,
    hooks: Vec<BoxedHook>,
    event_counter: Option<Arc<AtomicU64>>,
}

impl AgentCoreBuilder {
    /// Set the full loop configuration.
    #[must_use]
    pub fn config(mut self, config: AgentCoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an observability hook.
    #[must_use]
    pub fn hook<H: crate::hooks::ObservabilityHook + 'static>(mut self, hook: H) -> Self {
        self.hooks.push(BoxedHook::new(hook));
        self
    }

    /// Wire a shared event counter for the emergency-stop rule. The caller
    /// is responsible for incrementing the same counter from the
    /// [`agentrt_tool::EventEmitter`] given to `tool_pipeline`.
    #[must_use]
    pub fn event_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.event_counter = Some(counter);
        self
    }

    /// Build the [`AgentCore`].
    ///
    /// # Errors
    ///
    /// Returns `AgentError::NoPlanner` if no planner was configured.
    pub fn build(self) -> Result<AgentCore, AgentError> {
        let planner = self.planner.ok_or(AgentError::NoPlanner)?;
        Ok(AgentCore {
            planner,
            tool_pipeline: self.tool_pipeline,
            config: self.config,
            hooks: self.hooks,
            event_counter: self.event_counter,
        })
    }
}

fn plain_error(message: String) -> ActionResult {
    ActionResult::Error {
        error: message.clone(),
        replan_context: None,
        metadata: agentrt_types::ErrorContext {
            tool_name: None,
            error_message: message,
            timestamp: Utc::now(),
            correlation_id: None,
        },
    }
}

fn action_type_name(action: &AgentAction) -> &'static str {
    match action {
        AgentAction::ToolCall { .. } => "tool_call",
        AgentAction::FinalAnswer { .. } => "final_answer",
        AgentAction::NeedMoreInfo { .. } => "need_more_info",
        AgentAction::DelegateToAgent { .. } => "delegate_to_agent",
        AgentAction::ExecutePlan { .. } => "execute_plan",
        AgentAction::ParallelTools { .. } => "parallel_tools",
        AgentAction::SequentialTools { .. } => "sequential_tools",
        AgentAction::ConditionalTools { .. } => "conditional_tools",
        AgentAction::MixedTools { .. } => "mixed_tools",
        AgentAction::DependencyTools { .. } => "dependency_tools",
    }
}

/// Stagnation: over the last 3 iterations, either all three actions share a
/// non-`final_answer` type, or at least 2 of the 3 results are errors.
fn detect_stagnation(history: &[StepExecution]) -> Option<String> {
    if history.len() < STAGNATION_WINDOW {
        return None;
    }
    let window = &history[history.len() - STAGNATION_WINDOW..];

    let first_type = action_type_name(&window[0].action);
    if first_type != "final_answer" && window.iter().all(|step| action_type_name(&step.action) == first_type) {
        return Some(format!("the last {STAGNATION_WINDOW} iterations all dispatched `{first_type}`"));
    }

    let error_count = window.iter().filter(|step| matches!(step.status, StepStatus::Failed)).count();
    if error_count >= STAGNATION_ERROR_THRESHOLD {
        return Some(format!("{error_count} of the last {STAGNATION_WINDOW} iterations failed"));
    }
    None
}

fn last_analysis(history: &[StepExecution]) -> Option<&ResultAnalysis> {
    history.last().and_then(|step| step.observation.as_ref())
}

/// Resolve the user-facing content for a run that just ended, given an
/// optional analysis for the step that ended it (`None` for a bare
/// iteration cap or mid-retry state).
pub(crate) fn extract_final_result_pub(history: &[StepExecution], analysis: Option<&ResultAnalysis>) -> String {
    match analysis {
        Some(analysis) => extract_final_result_from(history, analysis),
        None => extract_final_result(history),
    }
}

/// See [`detect_stagnation`].
pub(crate) fn detect_stagnation_pub(history: &[StepExecution]) -> Option<String> {
    detect_stagnation(history)
}

fn extract_final_result(history: &[StepExecution]) -> String {
    walk_history_for_content(history).unwrap_or_else(default_apology)
}

fn extract_final_result_from(history: &[StepExecution], analysis: &ResultAnalysis) -> String {
    if analysis.is_complete {
        if let Some(feedback) = &analysis.feedback {
            return feedback.clone();
        }
    }
    walk_history_for_content(history).unwrap_or_else(default_apology)
}

fn walk_history_for_content(history: &[StepExecution]) -> Option<String> {
    history.iter().rev().find_map(|step| match &step.result {
        Some(ActionResult::FinalAnswer { content }) if !content.is_empty() => Some(content.clone()),
        Some(ActionResult::ToolResult { content, .. }) if !content.is_null() => Some(content.to_string()),
        _ => None,
    })
}

fn default_apology() -> String {
    "I wasn't able to reach a final answer for this run.".to_string()
}

fn extract_tool_calls(action: &AgentAction, result: &ActionResult, duration: agentrt_types::DurationMs) -> Vec<ToolCallRecord> {
    match action {
        AgentAction::ToolCall { tool_name, .. } => vec![ToolCallRecord {
            name: tool_name.clone(),
            duration,
            success: !result.is_error(),
        }],
        AgentAction::ParallelTools { .. }
        | AgentAction::SequentialTools { .. }
        | AgentAction::ConditionalTools { .. }
        | AgentAction::MixedTools { .. }
        | AgentAction::DependencyTools { .. } => {
            let ActionResult::ToolResult { content, .. } = result else {
                return Vec::new();
            };
            serde_json::from_value::<Vec<ToolOutcome>>(content.clone())
                .map(|outcomes| {
                    outcomes
                        .into_iter()
                        .filter(|o| !matches!(o.outcome, ToolOutcomeKind::Skipped))
                        .map(|o| ToolCallRecord {
                            name: o.tool_name,
                            duration,
                            success: matches!(o.outcome, ToolOutcomeKind::Result { .. }),
                        })
                        .collect()
                })
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}
