//! Workflow executor
//!
//! Runs a named, fixed, linear node sequence against shared mutable state
//! and produces a timed success/failure result. Node faults are recorded
//! into the state's error field and never abort the remaining nodes; final
//! success means the error field stayed empty.

use crate::agent::{AnalysisAgent, HealthMonitorAgent};
use crate::messages::PRIORITY_HIGH;
use crate::records::{HealthAlert, HealthMetric};
use crate::registry::ServiceDirectory;
use crate::workflow::nodes::{
    alert_parameters, AnalyzeAlertNode, AssembleResponseNode, CorrelateServicesNode,
    DeriveInsightsNode, DeriveRecommendationsNode, FetchRecentAnalysesNode, IdentifyServicesNode,
    QuerySystemOverviewNode, ReceiveAlertNode, StaticNode, SummarizeHealthNode, WorkflowNode,
};
use crate::workflow::state::{WorkflowKind, WorkflowRequest, WorkflowResult, WorkflowState};
use log::{debug, info, warn};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Executor over the fixed workflow catalogue
pub struct WorkflowExecutor {
    directory: Arc<ServiceDirectory>,
    workflows: HashMap<WorkflowKind, Vec<Box<dyn WorkflowNode>>>,
    workflows_executed: AtomicU64,
}

impl WorkflowExecutor {
    pub fn new(
        health: Arc<HealthMonitorAgent>,
        analysis: Arc<AnalysisAgent>,
        directory: Arc<ServiceDirectory>,
    ) -> Self {
        let mut workflows: HashMap<WorkflowKind, Vec<Box<dyn WorkflowNode>>> = HashMap::new();

        workflows.insert(
            WorkflowKind::HealthCheck,
            vec![
                Box::new(QuerySystemOverviewNode {
                    health: health.clone(),
                    output_key: "health_data",
                    step: "health_check_completed",
                }),
                Box::new(SummarizeHealthNode),
            ],
        );

        workflows.insert(
            WorkflowKind::AlertAnalysis,
            vec![
                Box::new(ReceiveAlertNode),
                Box::new(AnalyzeAlertNode {
                    analysis: analysis.clone(),
                }),
                Box::new(CorrelateServicesNode {
                    analysis: analysis.clone(),
                }),
                Box::new(AssembleResponseNode),
            ],
        );

        workflows.insert(
            WorkflowKind::SystemAnalysis,
            vec![
                Box::new(QuerySystemOverviewNode {
                    health,
                    output_key: "metrics_data",
                    step: "metrics_gathered",
                }),
                Box::new(FetchRecentAnalysesNode { analysis }),
                Box::new(DeriveInsightsNode),
                Box::new(DeriveRecommendationsNode),
            ],
        );

        workflows.insert(
            WorkflowKind::CorrelationAnalysis,
            vec![
                Box::new(IdentifyServicesNode {
                    directory: directory.clone(),
                }),
                StaticNode::boxed(
                    "analyze_correlations",
                    "correlations",
                    json!({ "message": "Correlation analysis completed" }),
                    "correlations_analyzed",
                ),
                StaticNode::boxed(
                    "evaluate_impact",
                    "impact_assessment",
                    json!({ "impact": "low", "services_affected": 0 }),
                    "impact_evaluated",
                ),
            ],
        );

        workflows.insert(
            WorkflowKind::ProactiveMonitoring,
            vec![
                StaticNode::boxed(
                    "monitor_health",
                    "health_status",
                    json!({ "status": "monitoring_active" }),
                    "health_monitored",
                ),
                StaticNode::boxed(
                    "detect_anomalies",
                    "anomalies",
                    json!({ "detected": false, "count": 0 }),
                    "anomalies_detected",
                ),
                StaticNode::boxed(
                    "predict_issues",
                    "predictions",
                    json!({ "issues_predicted": false }),
                    "issues_predicted",
                ),
                StaticNode::boxed(
                    "generate_alerts",
                    "alerts_generated",
                    json!({ "count": 0 }),
                    "alerts_generated",
                ),
            ],
        );

        info!("Workflow executor initialized with {} workflows", workflows.len());

        Self {
            directory,
            workflows,
            workflows_executed: AtomicU64::new(0),
        }
    }

    /// Names of every registered workflow, sorted
    pub fn available_workflows(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> =
            self.workflows.keys().map(|kind| kind.name()).collect();
        names.sort();
        names
    }

    /// Total successful or failed executions performed
    pub fn workflows_executed(&self) -> u64 {
        self.workflows_executed.load(Ordering::SeqCst)
    }

    /// Executor status for the API layer
    pub fn status(&self) -> Map<String, Value> {
        let mut status = Map::new();
        status.insert(
            "workflows_executed".to_string(),
            json!(self.workflows_executed()),
        );
        status.insert(
            "available_workflows".to_string(),
            json!(self.available_workflows()),
        );
        status.insert("known_services".to_string(), json!(self.directory.len()));
        status
    }

    /// Execute one workflow request
    ///
    /// An unknown workflow name returns an immediate zero-duration failure
    /// without invoking any node.
    pub async fn execute(&self, request: WorkflowRequest) -> WorkflowResult {
        let nodes = WorkflowKind::from_name(&request.workflow)
            .and_then(|kind| self.workflows.get(&kind));

        let Some(nodes) = nodes else {
            warn!("Workflow {} not found", request.workflow);
            return WorkflowResult {
                request_id: request.request_id,
                workflow_type: request.workflow.clone(),
                success: false,
                result: Map::new(),
                execution_time: 0.0,
                error_message: Some(format!("Workflow {} not found", request.workflow)),
            };
        };

        let start = Instant::now();
        let mut state = WorkflowState::new(&request);
        self.run_nodes(nodes, &mut state).await;
        let execution_time = start.elapsed().as_secs_f64();

        self.workflows_executed.fetch_add(1, Ordering::SeqCst);
        info!(
            "Workflow {} completed in {:.2}s",
            request.workflow, execution_time
        );

        WorkflowResult {
            request_id: request.request_id,
            workflow_type: request.workflow,
            success: state.error.is_none(),
            result: state.results,
            execution_time,
            error_message: state.error,
        }
    }

    /// Run every node in order; faults land in the state's error field
    async fn run_nodes(&self, nodes: &[Box<dyn WorkflowNode>], state: &mut WorkflowState) {
        for node in nodes {
            debug!("[{}] running node {}", state.request_id, node.name());
            if let Err(e) = node.run(state).await {
                warn!(
                    "[{}] node {} failed: {}",
                    state.request_id,
                    node.name(),
                    e
                );
                state.error = Some(format!("{} failed: {}", node.name(), e));
            }
        }
    }

    /// Run the alert-analysis workflow for one alert
    pub async fn process_alert(
        &self,
        alert: &HealthAlert,
        metric: &HealthMetric,
    ) -> WorkflowResult {
        let parameters = match alert_parameters(alert, metric) {
            Ok(parameters) => parameters,
            Err(e) => {
                return WorkflowResult {
                    request_id: String::new(),
                    workflow_type: WorkflowKind::AlertAnalysis.name().to_string(),
                    success: false,
                    result: Map::new(),
                    execution_time: 0.0,
                    error_message: Some(e.to_string()),
                }
            }
        };
        let request = WorkflowRequest::new(WorkflowKind::AlertAnalysis.name(), parameters)
            .with_priority(PRIORITY_HIGH);
        self.execute(request).await
    }

    /// Run the health-check workflow
    pub async fn perform_health_check(&self) -> WorkflowResult {
        let request = WorkflowRequest::new(WorkflowKind::HealthCheck.name(), Map::new())
            .with_priority(2);
        self.execute(request).await
    }

    /// Run the system-analysis workflow
    pub async fn analyze_system(&self) -> WorkflowResult {
        let request = WorkflowRequest::new(WorkflowKind::SystemAnalysis.name(), Map::new());
        self.execute(request).await
    }
}
