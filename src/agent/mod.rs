/// Agent contract, shared core state, and the runtime loops
pub mod runtime;

/// Health monitoring agent
pub mod health;

/// Analysis and correlation agent
pub mod analysis;

pub use analysis::AnalysisAgent;
pub use health::HealthMonitorAgent;
pub use runtime::{spawn_agent, Agent, AgentCore, AgentTasks};
