//! Insight generator interface and implementations
//!
//! Turns an alert plus its analysis context into extra findings and
//! recommendations. The analysis agent treats this as best-effort: whatever
//! comes back is merged, failures are logged and ignored.

use crate::error::InsightError;
use crate::records::{AnalysisResult, HealthAlert, HealthMetric, HealthStatus};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// Context bundle handed to the generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightContext {
    pub alert: HealthAlert,
    pub metric: HealthMetric,
    /// Findings accumulated so far by the analysis agent
    pub current_findings: Vec<String>,
    /// Up to the five most recent analysis results
    pub recent_analyses: Vec<AnalysisResult>,
}

/// Findings and recommendations produced by a generator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InsightBundle {
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Best-effort "explain" interface over an alert context
pub trait InsightGenerator: Send + Sync {
    fn explain<'a>(
        &'a self,
        context: &'a InsightContext,
    ) -> Pin<Box<dyn Future<Output = Result<InsightBundle, InsightError>> + Send + 'a>>;
}

/// Deterministic generator built from fixed operational heuristics
///
/// Stands in where no language-model backend is wired up; produces the same
/// generic triage guidance for every alert plus one metric-specific hint.
#[derive(Debug, Default)]
pub struct HeuristicInsightGenerator;

impl HeuristicInsightGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl InsightGenerator for HeuristicInsightGenerator {
    fn explain<'a>(
        &'a self,
        context: &'a InsightContext,
    ) -> Pin<Box<dyn Future<Output = Result<InsightBundle, InsightError>> + Send + 'a>> {
        Box::pin(async move {
            let mut findings = vec![
                "Consider checking resource utilization patterns".to_string(),
                "Review recent deployment or configuration changes".to_string(),
            ];
            let mut recommendations = vec![
                "Monitor resource usage trends".to_string(),
                "Review application logs for error patterns".to_string(),
                "Consider scaling if resource-related issue".to_string(),
            ];

            match context.metric.metric_name.as_str() {
                "cache_hit_ratio" => {
                    recommendations
                        .push("Inspect cache key distribution and eviction rates".to_string());
                }
                "database_connections" => {
                    recommendations
                        .push("Check for connection leaks in pooled clients".to_string());
                }
                "unprocessed_messages" => {
                    recommendations.push("Verify consumer lag and queue throughput".to_string());
                }
                _ => {}
            }

            if context.alert.severity == HealthStatus::Critical {
                findings.push("Impact window is ongoing; prioritize mitigation over diagnosis"
                    .to_string());
            }

            Ok(InsightBundle {
                findings,
                recommendations,
            })
        })
    }
}

/// Generator with a fixed canned response, for tests
pub struct StaticInsightGenerator {
    bundle: Mutex<Result<InsightBundle, String>>,
}

impl StaticInsightGenerator {
    /// Always returns the given bundle
    pub fn with_bundle(bundle: InsightBundle) -> Self {
        Self {
            bundle: Mutex::new(Ok(bundle)),
        }
    }

    /// Always fails with the given message
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            bundle: Mutex::new(Err(message.into())),
        }
    }

    /// Returns an empty bundle
    pub fn silent() -> Self {
        Self::with_bundle(InsightBundle::default())
    }
}

impl InsightGenerator for StaticInsightGenerator {
    fn explain<'a>(
        &'a self,
        _context: &'a InsightContext,
    ) -> Pin<Box<dyn Future<Output = Result<InsightBundle, InsightError>> + Send + 'a>> {
        Box::pin(async move {
            match &*self.bundle.lock().unwrap() {
                Ok(bundle) => Ok(bundle.clone()),
                Err(message) => Err(InsightError::Unavailable(message.clone())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{AlertDetails, Trend};
    use chrono::Utc;

    fn context_for(metric_name: &str, severity: HealthStatus) -> InsightContext {
        let metric = HealthMetric {
            service_name: "system".to_string(),
            metric_name: metric_name.to_string(),
            current_value: 55.0,
            threshold_warning: Some(80.0),
            threshold_critical: Some(60.0),
            status: severity,
            timestamp: Utc::now(),
            trend: Trend::Degrading,
        };
        InsightContext {
            alert: HealthAlert {
                alert_id: "system_cache_hit_ratio_1700000000".to_string(),
                service_name: "system".to_string(),
                category: "unknown".to_string(),
                severity,
                message: "cache hit ratio dropped".to_string(),
                details: AlertDetails {
                    metric_name: metric_name.to_string(),
                    current_value: 55.0,
                    threshold_warning: Some(80.0),
                    threshold_critical: Some(60.0),
                    trend: Trend::Degrading,
                },
                timestamp: Utc::now(),
                resolved: false,
            },
            metric,
            current_findings: vec![],
            recent_analyses: vec![],
        }
    }

    #[tokio::test]
    async fn test_heuristic_generator_always_produces_guidance() {
        let generator = HeuristicInsightGenerator::new();
        let bundle = generator
            .explain(&context_for("service_health", HealthStatus::Warning))
            .await
            .unwrap();
        assert!(!bundle.findings.is_empty());
        assert!(!bundle.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_heuristic_generator_metric_specific_hint() {
        let generator = HeuristicInsightGenerator::new();
        let bundle = generator
            .explain(&context_for("cache_hit_ratio", HealthStatus::Critical))
            .await
            .unwrap();
        assert!(bundle
            .recommendations
            .iter()
            .any(|r| r.contains("cache key distribution")));
        // Critical alerts carry the mitigation-first finding
        assert!(bundle.findings.iter().any(|f| f.contains("mitigation")));
    }

    #[tokio::test]
    async fn test_static_generator_failure() {
        let generator = StaticInsightGenerator::failing("backend offline");
        let result = generator
            .explain(&context_for("service_health", HealthStatus::Critical))
            .await;
        assert!(result.is_err());
    }
}
