//! Configuration for the Agent Core's Think-Act-Observe loop.

use std::time::Duration;

/// Tunables for a single agent run.
#[derive(Debug, Clone)]
pub struct AgentCoreConfig {
    /// Hard ceiling on iterations for a single run.
    pub max_thinking_iterations: u32,
    /// Timeout applied to a single `planner.think` call.
    pub thinking_timeout: Duration,
    /// Overall per-run timeout; exceeding it ends the run with an error.
    pub timeout: Duration,
    /// Timeout applied to each tool invocation dispatched from Act.
    pub tool_timeout: Duration,
    /// Whether Act may dispatch tool-bearing actions at all.
    pub enable_tools: bool,
    /// Whether `delegate_to_agent` actions are honored.
    pub enable_multi_agent: bool,
    /// Whether delegation may itself delegate further (bounded by `max_chain_depth`).
    pub enable_delegation: bool,
    /// Maximum delegation chain depth before a hand-off is refused.
    pub max_chain_depth: u32,
    /// Whether inter-agent messaging hooks fire.
    pub enable_messaging: bool,
    /// Interval between message delivery retries.
    pub delivery_retry_interval: Duration,
    /// Default retry attempts for a message delivery.
    pub default_max_attempts: u32,
}

impl Default for AgentCoreConfig {
    fn default() -> Self {
        Self {
            max_thinking_iterations: 15,
            thinking_timeout: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(60),
            enable_tools: true,
            enable_multi_agent: false,
            enable_delegation: false,
            max_chain_depth: 5,
            enable_messaging: false,
            delivery_retry_interval: Duration::from_secs(1),
            default_max_attempts: 2,
        }
    }
}
