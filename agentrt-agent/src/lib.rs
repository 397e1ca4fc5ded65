//! The Agent Core: drives a single agent's Think-Act-Observe loop to
//! completion, or one iteration at a time, over a [`agentrt_types::Planner`]
//! and an [`agentrt_tool::ToolPipeline`].

pub mod config;
pub mod core;
pub mod hooks;
pub mod step;

pub use config::AgentCoreConfig;
pub use core::{AgentCore, AgentCoreBuilder, AgentRunResult};
pub use hooks::{BoxedHook, HookAction, HookError, HookEvent, ObservabilityHook};
pub use step::{IterationResult, StepIterator};
