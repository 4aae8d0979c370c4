//! Workflow node implementations
//!
//! Each node performs one unit of work against the shared workflow state:
//! usually a synthetic request to one of the agents with the response folded
//! into the results map, or a derived summary over earlier results. Nodes
//! report business failures by setting the state's error field; a returned
//! `Err` is caught by the executor and recorded the same way.

use crate::agent::runtime::Agent;
use crate::agent::{AnalysisAgent, HealthMonitorAgent};
use crate::error::WorkflowError;
use crate::messages::{
    AlertPayload, Envelope, Payload, QueryPayload, ResponsePayload, PRIORITY_LOW,
};
use crate::records::{HealthAlert, HealthMetric};
use crate::registry::ServiceDirectory;
use crate::workflow::state::WorkflowState;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Sender id used on synthetic envelopes built by workflow nodes
pub const EXECUTOR_ID: &str = "executor";

/// One step of a workflow pipeline
pub trait WorkflowNode: Send + Sync {
    /// Node name, used in logs and progress tracking
    fn name(&self) -> &str;

    /// Run against the shared state, possibly mutating it
    fn run<'a>(
        &'a self,
        state: &'a mut WorkflowState,
    ) -> Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send + 'a>>;
}

/// Query the health agent for the fleet overview
pub struct QuerySystemOverviewNode {
    pub health: Arc<HealthMonitorAgent>,
    /// Results key the overview lands under
    pub output_key: &'static str,
    pub step: &'static str,
}

impl WorkflowNode for QuerySystemOverviewNode {
    fn name(&self) -> &str {
        "query_system_overview"
    }

    fn run<'a>(
        &'a self,
        state: &'a mut WorkflowState,
    ) -> Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send + 'a>> {
        Box::pin(async move {
            let request = Envelope::query(
                EXECUTOR_ID,
                self.health.core().id(),
                QueryPayload::SystemOverview,
            );
            match self.health.process_message(request).await {
                Some(Envelope {
                    payload: Payload::Response(ResponsePayload::SystemOverview { overview }),
                    ..
                }) => {
                    state.results.insert(
                        self.output_key.to_string(),
                        json!({ "overview": overview }),
                    );
                    state.current_step = self.step.to_string();
                }
                _ => {
                    state.error = Some("Failed to get health data".to_string());
                }
            }
            Ok(())
        })
    }
}

/// Summarize the fleet overview into overall health and issue counts
pub struct SummarizeHealthNode;

impl WorkflowNode for SummarizeHealthNode {
    fn name(&self) -> &str {
        "process_results"
    }

    fn run<'a>(
        &'a self,
        state: &'a mut WorkflowState,
    ) -> Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send + 'a>> {
        Box::pin(async move {
            let overview = state
                .results
                .get("health_data")
                .and_then(|d| d.get("overview"))
                .cloned()
                .unwrap_or(Value::Null);

            let total = overview["total_services"].as_u64().unwrap_or(0);
            let healthy = overview["healthy_services"].as_u64().unwrap_or(0);
            let warning = overview["warning_services"].as_u64().unwrap_or(0);
            let critical = overview["critical_services"].as_u64().unwrap_or(0);

            let mut issues: Vec<String> = Vec::new();
            let overall = if critical > 0 {
                issues.push(format!("{} critical services", critical));
                "critical"
            } else if warning > 0 {
                issues.push(format!("{} services with warnings", warning));
                "warning"
            } else {
                "healthy"
            };

            state.results.insert(
                "health_summary".to_string(),
                json!({
                    "overall_health": overall,
                    "total_services": total,
                    "healthy_services": healthy,
                    "issues_detected": issues,
                }),
            );
            state.current_step = "results_processed".to_string();
            Ok(())
        })
    }
}

/// Lift the alert from the request parameters into the results map
pub struct ReceiveAlertNode;

impl WorkflowNode for ReceiveAlertNode {
    fn name(&self) -> &str {
        "receive_alert"
    }

    fn run<'a>(
        &'a self,
        state: &'a mut WorkflowState,
    ) -> Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send + 'a>> {
        Box::pin(async move {
            match state.metadata.get("alert") {
                Some(alert) => {
                    state
                        .results
                        .insert("alert_info".to_string(), alert.clone());
                    state.current_step = "alert_received".to_string();
                }
                None => {
                    state.error = Some("No alert data provided".to_string());
                }
            }
            Ok(())
        })
    }
}

/// Feed the alert to the analysis agent and capture the insight
pub struct AnalyzeAlertNode {
    pub analysis: Arc<AnalysisAgent>,
}

impl WorkflowNode for AnalyzeAlertNode {
    fn name(&self) -> &str {
        "analyze_alert"
    }

    fn run<'a>(
        &'a self,
        state: &'a mut WorkflowState,
    ) -> Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send + 'a>> {
        Box::pin(async move {
            let (Some(alert_value), Some(metric_value)) =
                (state.metadata.get("alert"), state.metadata.get("metric"))
            else {
                state.error = Some("Failed to analyze alert".to_string());
                return Ok(());
            };

            let alert: HealthAlert = serde_json::from_value(alert_value.clone())?;
            let metric: HealthMetric = serde_json::from_value(metric_value.clone())?;

            let request = Envelope::alert(
                EXECUTOR_ID,
                self.analysis.core().id(),
                AlertPayload { alert, metric },
                PRIORITY_LOW,
            );
            match self.analysis.process_message(request).await {
                Some(Envelope {
                    payload: Payload::Insight(insight),
                    ..
                }) => {
                    state.results.insert(
                        "analysis_result".to_string(),
                        json!({
                            "analysis_result": insight.analysis,
                            "response_message": insight.summary,
                        }),
                    );
                    state.current_step = "alert_analyzed".to_string();
                }
                _ => {
                    state.error = Some("Failed to analyze alert".to_string());
                }
            }
            Ok(())
        })
    }
}

/// Fetch cached correlations for the alerting service
pub struct CorrelateServicesNode {
    pub analysis: Arc<AnalysisAgent>,
}

impl WorkflowNode for CorrelateServicesNode {
    fn name(&self) -> &str {
        "correlate_services"
    }

    fn run<'a>(
        &'a self,
        state: &'a mut WorkflowState,
    ) -> Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send + 'a>> {
        Box::pin(async move {
            let service_name = state
                .results
                .get("alert_info")
                .and_then(|a| a.get("service_name"))
                .and_then(|s| s.as_str())
                .unwrap_or_default()
                .to_string();

            let request = Envelope::query(
                EXECUTOR_ID,
                self.analysis.core().id(),
                QueryPayload::Correlation { service_name },
            );
            let correlations = match self.analysis.process_message(request).await {
                Some(Envelope {
                    payload: Payload::Response(ResponsePayload::Correlations { correlations }),
                    ..
                }) => serde_json::to_value(correlations)?,
                _ => json!([]),
            };

            state.results.insert(
                "correlation_data".to_string(),
                json!({ "correlations": correlations }),
            );
            state.current_step = "services_correlated".to_string();
            Ok(())
        })
    }
}

/// Compile alert, analysis, and correlation results into a response bundle
pub struct AssembleResponseNode;

impl WorkflowNode for AssembleResponseNode {
    fn name(&self) -> &str {
        "generate_response"
    }

    fn run<'a>(
        &'a self,
        state: &'a mut WorkflowState,
    ) -> Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send + 'a>> {
        Box::pin(async move {
            let alert_info = state.results.get("alert_info").cloned().unwrap_or(Value::Null);
            let analysis = state
                .results
                .get("analysis_result")
                .and_then(|r| r.get("analysis_result"))
                .cloned()
                .unwrap_or(Value::Null);
            let response_message = state
                .results
                .get("analysis_result")
                .and_then(|r| r.get("response_message"))
                .and_then(|m| m.as_str())
                .unwrap_or("Analysis completed")
                .to_string();
            let correlations = state
                .results
                .get("correlation_data")
                .and_then(|c| c.get("correlations"))
                .cloned()
                .unwrap_or(json!([]));

            let service = alert_info["service_name"].as_str().unwrap_or("unknown");
            let message = alert_info["message"].as_str().unwrap_or("unknown alert");

            state.results.insert(
                "final_response".to_string(),
                json!({
                    "alert_summary": format!("Alert from {}: {}", service, message),
                    "analysis_findings": analysis["findings"].clone(),
                    "recommendations": analysis["recommendations"].clone(),
                    "affected_services": correlations,
                    "confidence": analysis.get("confidence").cloned().unwrap_or(json!(0.5)),
                    "response_message": response_message,
                }),
            );
            state.current_step = "response_generated".to_string();
            Ok(())
        })
    }
}

/// Fetch the most recent analyses from the analysis agent
pub struct FetchRecentAnalysesNode {
    pub analysis: Arc<AnalysisAgent>,
}

impl WorkflowNode for FetchRecentAnalysesNode {
    fn name(&self) -> &str {
        "analyze_patterns"
    }

    fn run<'a>(
        &'a self,
        state: &'a mut WorkflowState,
    ) -> Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send + 'a>> {
        Box::pin(async move {
            let request = Envelope::query(
                EXECUTOR_ID,
                self.analysis.core().id(),
                QueryPayload::RecentAnalyses,
            );
            let analyses = match self.analysis.process_message(request).await {
                Some(Envelope {
                    payload: Payload::Response(ResponsePayload::RecentAnalyses { analyses }),
                    ..
                }) => serde_json::to_value(analyses)?,
                _ => json!([]),
            };

            state.results.insert(
                "pattern_analysis".to_string(),
                json!({ "analyses": analyses }),
            );
            state.current_step = "patterns_analyzed".to_string();
            Ok(())
        })
    }
}

/// Derive high-level insights from the overview and pattern analysis
pub struct DeriveInsightsNode;

impl WorkflowNode for DeriveInsightsNode {
    fn name(&self) -> &str {
        "generate_insights"
    }

    fn run<'a>(
        &'a self,
        state: &'a mut WorkflowState,
    ) -> Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send + 'a>> {
        Box::pin(async move {
            let mut performance_insights: Vec<String> = Vec::new();
            let mut security_observations: Vec<String> = Vec::new();

            if let Some(overview) = state
                .results
                .get("metrics_data")
                .and_then(|d| d.get("overview"))
            {
                let health_percentage = overview["health_percentage"].as_f64().unwrap_or(0.0);
                if health_percentage < 80.0 {
                    performance_insights.push(format!(
                        "System health at {}% - investigate degraded services",
                        health_percentage
                    ));
                } else if health_percentage > 95.0 {
                    performance_insights.push("System performing optimally".to_string());
                }
            }

            let analysis_count = state
                .results
                .get("pattern_analysis")
                .and_then(|p| p.get("analyses"))
                .and_then(|a| a.as_array())
                .map(|a| a.len())
                .unwrap_or(0);
            if analysis_count > 3 {
                security_observations.push(format!(
                    "High analysis activity detected - {} analyses in recent period",
                    analysis_count
                ));
            }

            state.results.insert(
                "insights".to_string(),
                json!({
                    "system_health_trends": "System health is stable",
                    "performance_insights": performance_insights,
                    "capacity_recommendations": [],
                    "security_observations": security_observations,
                }),
            );
            state.current_step = "insights_generated".to_string();
            Ok(())
        })
    }
}

/// Turn insight text into recommendations via keyword heuristics
pub struct DeriveRecommendationsNode;

impl WorkflowNode for DeriveRecommendationsNode {
    fn name(&self) -> &str {
        "create_recommendations"
    }

    fn run<'a>(
        &'a self,
        state: &'a mut WorkflowState,
    ) -> Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send + 'a>> {
        Box::pin(async move {
            let mut recommendations: Vec<String> = Vec::new();

            if let Some(insights) = state.results.get("insights").and_then(|i| i.as_object()) {
                for items in insights.values() {
                    let Some(items) = items.as_array() else { continue };
                    for item in items.iter().filter_map(|i| i.as_str()) {
                        let lowered = item.to_lowercase();
                        if lowered.contains("investigate") {
                            recommendations.push(format!("Action needed: {}", item));
                        } else if lowered.contains("degraded") {
                            recommendations.push(format!("Monitor closely: {}", item));
                        } else if lowered.contains("optimal") {
                            recommendations.push(format!("Maintain current state: {}", item));
                        }
                    }
                }
            }

            if recommendations.is_empty() {
                recommendations.push("System appears stable - continue monitoring".to_string());
            }

            state
                .results
                .insert("recommendations".to_string(), json!(recommendations));
            state.current_step = "recommendations_created".to_string();
            Ok(())
        })
    }
}

/// List every service known to the directory
pub struct IdentifyServicesNode {
    pub directory: Arc<ServiceDirectory>,
}

impl WorkflowNode for IdentifyServicesNode {
    fn name(&self) -> &str {
        "identify_services"
    }

    fn run<'a>(
        &'a self,
        state: &'a mut WorkflowState,
    ) -> Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send + 'a>> {
        Box::pin(async move {
            state.results.insert(
                "identified_services".to_string(),
                json!(self.directory.names()),
            );
            state.current_step = "services_identified".to_string();
            Ok(())
        })
    }
}

/// Fixed-output step for the simplified pipeline tails
pub struct StaticNode {
    pub node_name: &'static str,
    pub output_key: &'static str,
    pub output: Value,
    pub step: &'static str,
}

impl StaticNode {
    pub fn boxed(
        node_name: &'static str,
        output_key: &'static str,
        output: Value,
        step: &'static str,
    ) -> Box<dyn WorkflowNode> {
        Box::new(Self {
            node_name,
            output_key,
            output,
            step,
        })
    }
}

impl WorkflowNode for StaticNode {
    fn name(&self) -> &str {
        self.node_name
    }

    fn run<'a>(
        &'a self,
        state: &'a mut WorkflowState,
    ) -> Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send + 'a>> {
        Box::pin(async move {
            state
                .results
                .insert(self.output_key.to_string(), self.output.clone());
            state.current_step = self.step.to_string();
            Ok(())
        })
    }
}

/// Build the request parameter map for an alert-analysis run
pub fn alert_parameters(
    alert: &HealthAlert,
    metric: &HealthMetric,
) -> Result<Map<String, Value>, WorkflowError> {
    let mut parameters = Map::new();
    parameters.insert("alert".to_string(), serde_json::to_value(alert)?);
    parameters.insert("metric".to_string(), serde_json::to_value(metric)?);
    Ok(parameters)
}
