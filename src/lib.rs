/// Error types for the agent system
pub mod error;

/// Core record types: metrics, alerts, analyses, agent status
pub mod records;

/// Static service directory and dependency graph
pub mod registry;

/// Message envelope and payload types
pub mod messages;

/// Communication hub: routing and audit history
pub mod bus;

/// Metric source interface and implementations
pub mod metrics;

/// Insight generator interface and implementations
pub mod insight;

/// Agent contract, runtime loops, and the concrete agents
pub mod agent;

/// Workflow executor and pipelines
pub mod workflow;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use agent::{spawn_agent, Agent, AnalysisAgent, HealthMonitorAgent};
pub use bus::CommunicationHub;
pub use config::Config;
pub use error::{AgentError, ConfigError, InsightError, MetricsError, WorkflowError};
pub use messages::{Envelope, MessageKind, Payload};
pub use records::{AnalysisResult, HealthAlert, HealthMetric, HealthStatus};
pub use workflow::{WorkflowExecutor, WorkflowRequest, WorkflowResult};
