//! Best-effort observability emission for tool lifecycle events.
//!
//! The Tool Pipeline never lets emission failures affect a tool call; an
//! [`EventEmitter`] has no `Result` in its signature for exactly that reason.
//! Wiring emitted events onto the Event Queue is the caller's job — gluing
//! this trait to `agentrt_queue::EventQueue::enqueue` would make this crate
//! depend on a sibling it otherwise has no need of.

use agentrt_types::Event;

/// Receives tool-lifecycle events (`agent.action.start`,
/// `agent.tool.completed`, `agent.tool.error`, `agent.parallel.tools.start`,
/// `agent.parallel.tools.completed`) as the pipeline produces them.
pub trait EventEmitter: Send + Sync {
    /// Handle one event. Must not block for long; the pipeline calls this
    /// inline on the hot path of every tool call.
    fn emit(&self, event: Event);
}

/// Discards every event. The default when no emitter is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn emit(&self, _event: Event) {}
}

/// Logs every event at debug level via `tracing`. A reasonable default for
/// development; production deployments typically wire an emitter backed by
/// `agentrt_queue::EventQueue`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEmitter;

impl EventEmitter for TracingEmitter {
    fn emit(&self, event: Event) {
        tracing::debug!(event_type = %event.event_type, event_id = %event.id, "tool pipeline event");
    }
}
