//! Workflow request, result, and shared state types
//!
//! A workflow kind maps to a fixed, ordered node sequence. The request keeps
//! its workflow identifier as a string at the API seam so unknown kinds are
//! expressible and answered with a structured failure instead of a parse
//! error further out.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(0);

/// The workflow pipelines the executor knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    HealthCheck,
    AlertAnalysis,
    SystemAnalysis,
    CorrelationAnalysis,
    ProactiveMonitoring,
}

impl WorkflowKind {
    /// Consumer-facing identifier
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowKind::HealthCheck => "health_check",
            WorkflowKind::AlertAnalysis => "alert_analysis",
            WorkflowKind::SystemAnalysis => "system_analysis",
            WorkflowKind::CorrelationAnalysis => "correlation_analysis",
            WorkflowKind::ProactiveMonitoring => "proactive_monitoring",
        }
    }

    /// Parse a consumer-facing identifier
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "health_check" => Some(WorkflowKind::HealthCheck),
            "alert_analysis" => Some(WorkflowKind::AlertAnalysis),
            "system_analysis" => Some(WorkflowKind::SystemAnalysis),
            "correlation_analysis" => Some(WorkflowKind::CorrelationAnalysis),
            "proactive_monitoring" => Some(WorkflowKind::ProactiveMonitoring),
            _ => None,
        }
    }

    pub fn all() -> [WorkflowKind; 5] {
        [
            WorkflowKind::HealthCheck,
            WorkflowKind::AlertAnalysis,
            WorkflowKind::SystemAnalysis,
            WorkflowKind::CorrelationAnalysis,
            WorkflowKind::ProactiveMonitoring,
        ]
    }
}

/// Request for one workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub request_id: String,
    /// Workflow identifier; unknown values yield an immediate failure result
    pub workflow: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// 1 (low) to 4 (critical)
    pub priority: u8,
    /// Advisory; callers race it themselves if hard cancellation is needed
    pub timeout_seconds: u64,
}

impl WorkflowRequest {
    pub fn new(workflow: impl Into<String>, parameters: Map<String, Value>) -> Self {
        let seq = REQUEST_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            request_id: format!("req-{}-{}", Utc::now().timestamp_millis(), seq),
            workflow: workflow.into(),
            parameters,
            priority: 1,
            timeout_seconds: 300,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// Result of one workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub request_id: String,
    pub workflow_type: String,
    pub success: bool,
    pub result: Map<String, Value>,
    /// Wall-clock duration in seconds
    pub execution_time: f64,
    pub error_message: Option<String>,
}

/// Shared mutable state threaded through a workflow's nodes
///
/// Owned exclusively by one execution; a node failure lands in `error` and
/// the remaining nodes still run.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub request_id: String,
    pub workflow: String,
    pub current_step: String,
    pub results: Map<String, Value>,
    pub error: Option<String>,
    pub metadata: Map<String, Value>,
}

impl WorkflowState {
    pub fn new(request: &WorkflowRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            workflow: request.workflow.clone(),
            current_step: "started".to_string(),
            results: Map::new(),
            error: None,
            metadata: request.parameters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_name_round_trip() {
        for kind in WorkflowKind::all() {
            assert_eq!(WorkflowKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(WorkflowKind::from_name("does_not_exist"), None);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = WorkflowRequest::new("health_check", Map::new());
        let b = WorkflowRequest::new("health_check", Map::new());
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.priority, 1);
        assert_eq!(a.timeout_seconds, 300);
    }

    #[test]
    fn test_state_starts_from_request_parameters() {
        let mut parameters = Map::new();
        parameters.insert("service".to_string(), Value::from("api_gateway"));
        let request = WorkflowRequest::new("system_analysis", parameters).with_priority(3);
        let state = WorkflowState::new(&request);

        assert_eq!(state.request_id, request.request_id);
        assert_eq!(state.current_step, "started");
        assert!(state.error.is_none());
        assert!(state.results.is_empty());
        assert_eq!(state.metadata["service"], Value::from("api_gateway"));
        assert_eq!(request.priority, 3);
    }

    #[test]
    fn test_result_serialization_shape() {
        let result = WorkflowResult {
            request_id: "req-1".to_string(),
            workflow_type: "health_check".to_string(),
            success: true,
            result: Map::new(),
            execution_time: 0.25,
            error_message: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["workflow_type"], "health_check");
        assert_eq!(json["success"], true);
        assert!(json["error_message"].is_null());
    }
}
