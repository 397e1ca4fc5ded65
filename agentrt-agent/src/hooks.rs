//! Observability hooks fired at each boundary of the Think-Act-Observe loop.
//!
//! `ObservabilityHook::on_event` returns an RPITIT future, which is not
//! dyn-compatible; [`BoxedHook`] erases it behind a boxed future so
//! [`crate::core::AgentCore`] can hold a `Vec` of heterogeneous hooks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use agentrt_types::{ActionResult, AgentAction, ResultAnalysis, Thought};
use thiserror::Error;

/// A hook's verdict after observing an event.
#[derive(Debug, Clone)]
pub enum HookAction {
    /// Proceed normally.
    Continue,
    /// Skip the step this event announces, substituting `reason` as context.
    Skip {
        /// Why the step was skipped.
        reason: String,
    },
    /// Abort the run immediately.
    Terminate {
        /// Why the run is being terminated.
        reason: String,
    },
}

/// A hook failed to process an event.
#[derive(Debug, Error)]
#[error("hook failed: {0}")]
pub struct HookError(pub String);

/// One boundary of a single iteration, carried by reference so hooks can
/// inspect but not mutate the value in flight.
pub enum HookEvent<'a> {
    /// About to call `planner.think`.
    BeforeThink {
        /// The iteration about to run.
        iteration: u32,
    },
    /// `planner.think` returned.
    AfterThink {
        /// The iteration that just ran.
        iteration: u32,
        /// The thought produced.
        thought: &'a Thought,
    },
    /// About to dispatch `action` to the Tool Pipeline or Plan Executor.
    BeforeAct {
        /// The action about to be dispatched.
        action: &'a AgentAction,
    },
    /// Act produced a result.
    AfterAct {
        /// The result produced.
        result: &'a ActionResult,
    },
    /// `planner.analyze_result` returned.
    AfterObserve {
        /// The analysis produced.
        analysis: &'a ResultAnalysis,
    },
}

type HookFuture<'a> = Pin<Box<dyn Future<Output = Result<HookAction, HookError>> + Send + 'a>>;

trait ErasedHook: Send + Sync {
    fn erased_on_event<'a>(&'a self, event: HookEvent<'a>) -> HookFuture<'a>;
}

/// Called at each boundary of the Think-Act-Observe loop; implement this
/// directly (the RPITIT signature) and wrap with [`BoxedHook::new`] to
/// register it on an `AgentCore`.
pub trait ObservabilityHook: Send + Sync {
    /// Handle one lifecycle event, returning the action the loop should take.
    fn on_event(
        &self,
        event: HookEvent<'_>,
    ) -> impl Future<Output = Result<HookAction, HookError>> + Send;
}

impl<H: ObservabilityHook> ErasedHook for H {
    fn erased_on_event<'a>(&'a self, event: HookEvent<'a>) -> HookFuture<'a> {
        Box::pin(self.on_event(event))
    }
}

/// A type-erased [`ObservabilityHook`], storable in a homogeneous `Vec`.
#[derive(Clone)]
pub struct BoxedHook(Arc<dyn ErasedHook>);

impl BoxedHook {
    /// Wrap any [`ObservabilityHook`] into a type-erased `BoxedHook`.
    #[must_use]
    pub fn new<H: ObservabilityHook + 'static>(hook: H) -> Self {
        BoxedHook(Arc::new(hook))
    }

    /// Fire this hook with an event.
    pub(crate) async fn fire(&self, event: HookEvent<'_>) -> Result<HookAction, HookError> {
        self.0.erased_on_event(event).await
    }
}

/// Fire all hooks for a `BeforeThink` event, returning the first non-Continue action.
pub(crate) async fn fire_before_think(hooks: &[BoxedHook], iteration: u32) -> Result<Option<HookAction>, HookError> {
    for hook in hooks {
        let action = hook.fire(HookEvent::BeforeThink { iteration }).await?;
        if !matches!(action, HookAction::Continue) {
            return Ok(Some(action));
        }
    }
    Ok(None)
}

/// Fire all hooks for an `AfterThink` event, returning the first non-Continue action.
pub(crate) async fn fire_after_think(hooks: &[BoxedHook], iteration: u32, thought: &Thought) -> Result<Option<HookAction>, HookError> {
    for hook in hooks {
        let action = hook.fire(HookEvent::AfterThink { iteration, thought }).await?;
        if !matches!(action, HookAction::Continue) {
            return Ok(Some(action));
        }
    }
    Ok(None)
}

/// Fire all hooks for a `BeforeAct` event, returning the first non-Continue action.
pub(crate) async fn fire_before_act(hooks: &[BoxedHook], action: &AgentAction) -> Result<Option<HookAction>, HookError> {
    for hook in hooks {
        let verdict = hook.fire(HookEvent::BeforeAct { action }).await?;
        if !matches!(verdict, HookAction::Continue) {
            return Ok(Some(verdict));
        }
    }
    Ok(None)
}

/// Fire all hooks for an `AfterAct` event, returning the first non-Continue action.
pub(crate) async fn fire_after_act(hooks: &[BoxedHook], result: &ActionResult) -> Result<Option<HookAction>, HookError> {
    for hook in hooks {
        let action = hook.fire(HookEvent::AfterAct { result }).await?;
        if !matches!(action, HookAction::Continue) {
            return Ok(Some(action));
        }
    }
    Ok(None)
}

/// Fire all hooks for an `AfterObserve` event, returning the first non-Continue action.
pub(crate) async fn fire_after_observe(hooks: &[BoxedHook], analysis: &ResultAnalysis) -> Result<Option<HookAction>, HookError> {
    for hook in hooks {
        let action = hook.fire(HookEvent::AfterObserve { analysis }).await?;
        if !matches!(action, HookAction::Continue) {
            return Ok(Some(action));
        }
    }
    Ok(None)
}
