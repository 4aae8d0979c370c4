//! Analysis and correlation agent
//!
//! Turns alerts into diagnoses: dependency-aware root-cause reasoning,
//! impact correlation over the static dependency graph, recurrence detection
//! against past analyses, and best-effort insight generation. In the
//! background it maintains pairwise metric correlations and pattern memory.

use crate::agent::runtime::{Agent, AgentCore};
use crate::config::AnalysisConfig;
use crate::error::AgentError;
use crate::insight::{InsightContext, InsightGenerator};
use crate::messages::{
    AlertPayload, Envelope, InsightPayload, Payload, QueryPayload, ResponsePayload, StatusPayload,
    BROADCAST,
};
use crate::metrics::{queries, MetricSource};
use crate::records::{
    AgentKind, AnalysisDetails, AnalysisResult, AnalysisType, CorrelatedMetric,
    CorrelationAssessment, HealthAlert, HealthMetric, RuntimeStatusReport, Timestamp,
};
use crate::registry::{ImpactLevel, ServiceDependency, ServiceDirectory};
use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default agent id for the analysis agent
pub const ANALYSIS_AGENT_ID: &str = "analysis_agent";

/// Metrics sampled for the background correlation pass
const CORRELATION_METRICS: [(&str, &str); 4] = [
    ("cache_hit_ratio", queries::CACHE_HIT_RATIO),
    ("db_connections", queries::DATABASE_CONNECTIONS),
    ("response_time_p95", queries::RESPONSE_TIME_P95),
    ("error_rate", queries::ERROR_RATE),
];

/// Retained samples per correlation series
const SERIES_CAP: usize = 50;

/// Lookback window for recurrence detection
const RECURRENCE_WINDOW_DAYS: i64 = 7;

/// A recurring finding recorded in pattern memory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternRecord {
    pub pattern: String,
    pub occurrences: usize,
    pub last_seen: Timestamp,
}

/// Mutable state owned exclusively by the analysis agent
struct AnalysisState {
    history: Vec<AnalysisResult>,
    correlation_cache: HashMap<String, Vec<CorrelatedMetric>>,
    /// Rolling sample series per correlation metric
    series: HashMap<String, VecDeque<f64>>,
    pattern_memory: HashMap<String, Vec<PatternRecord>>,
    last_correlation_run: Option<Timestamp>,
}

impl AnalysisState {
    fn new() -> Self {
        Self {
            history: Vec::new(),
            correlation_cache: HashMap::new(),
            series: HashMap::new(),
            pattern_memory: HashMap::new(),
            last_correlation_run: None,
        }
    }

    /// Rebuild the correlation cache from the current series
    fn recompute_correlations(&mut self, threshold: f64) -> usize {
        let mut names: Vec<String> = self.series.keys().cloned().collect();
        names.sort();

        let mut cache: HashMap<String, Vec<CorrelatedMetric>> = HashMap::new();
        let mut strong_pairs = 0;

        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                let x: Vec<f64> = self.series[&names[i]].iter().copied().collect();
                let y: Vec<f64> = self.series[&names[j]].iter().copied().collect();

                let coefficient = pearson_correlation(&x, &y);
                if coefficient.abs() > threshold {
                    strong_pairs += 1;
                    cache
                        .entry(names[i].clone())
                        .or_default()
                        .push(CorrelatedMetric {
                            metric: names[j].clone(),
                            coefficient,
                        });
                    cache
                        .entry(names[j].clone())
                        .or_default()
                        .push(CorrelatedMetric {
                            metric: names[i].clone(),
                            coefficient,
                        });
                }
            }
        }

        self.correlation_cache = cache;
        strong_pairs
    }
}

/// Accumulated root-cause evidence for one alert
struct RootCause {
    findings: Vec<String>,
    recommendations: Vec<String>,
    confidence: f64,
}

/// Intelligent analysis and correlation agent
pub struct AnalysisAgent {
    core: AgentCore,
    metrics: Arc<dyn MetricSource>,
    insight: Arc<dyn InsightGenerator>,
    directory: Arc<ServiceDirectory>,
    dependency_map: HashMap<String, ServiceDependency>,
    correlation_threshold: f64,
    correlation_interval: ChronoDuration,
    analysis_seq: AtomicU64,
    state: Mutex<AnalysisState>,
}

impl AnalysisAgent {
    pub fn new(
        metrics: Arc<dyn MetricSource>,
        insight: Arc<dyn InsightGenerator>,
        directory: Arc<ServiceDirectory>,
        config: &AnalysisConfig,
    ) -> Self {
        let dependency_map = directory.dependencies();
        info!(
            "Analysis agent initialized with {} service dependencies",
            dependency_map.len()
        );
        Self {
            core: AgentCore::new(ANALYSIS_AGENT_ID, AgentKind::Analysis),
            metrics,
            insight,
            directory,
            dependency_map,
            correlation_threshold: config.correlation_threshold,
            correlation_interval: ChronoDuration::seconds(
                config.correlation_interval_seconds as i64,
            ),
            analysis_seq: AtomicU64::new(0),
            state: Mutex::new(AnalysisState::new()),
        }
    }

    /// The most recent `limit` analysis results, newest last
    pub fn recent_analyses(&self, limit: usize) -> Vec<AnalysisResult> {
        let state = self.state.lock().unwrap();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Cached correlations for a metric or service name
    pub fn correlations_for(&self, name: &str) -> Vec<CorrelatedMetric> {
        self.state
            .lock()
            .unwrap()
            .correlation_cache
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Full analysis pass over an incoming alert
    async fn analyze_alert(&self, payload: AlertPayload, priority: u8) -> Option<Envelope> {
        let AlertPayload { alert, metric } = payload;
        let now = Utc::now();

        let root_cause = self.root_cause(&alert, &metric).await;
        let correlation = self.correlate(&alert);

        let seq = self.analysis_seq.fetch_add(1, Ordering::Relaxed);
        let result = AnalysisResult {
            analysis_id: format!("analysis_{}_{}", now.timestamp(), seq),
            analysis_type: AnalysisType::RootCause,
            trigger_event: format!("Alert: {}", alert.message),
            findings: root_cause.findings,
            recommendations: root_cause.recommendations,
            confidence: root_cause.confidence,
            affected_services: correlation.affected_services.clone(),
            timestamp: now,
            details: AnalysisDetails {
                alert: Some(alert.clone()),
                metric: Some(metric),
                correlation: Some(correlation),
                resolved: false,
            },
        };

        self.state.lock().unwrap().history.push(result.clone());

        let summary = format_analysis_summary(&result);
        info!(
            "[{}] Completed analysis for alert: {}",
            self.core.id(),
            alert.message
        );

        Some(Envelope::insight(
            self.core.id(),
            BROADCAST,
            InsightPayload {
                analysis: result,
                summary,
            },
            priority,
        ))
    }

    /// Root-cause pass: dependencies, metric heuristics, history, insights
    async fn root_cause(&self, alert: &HealthAlert, metric: &HealthMetric) -> RootCause {
        let mut findings = Vec::new();
        let mut recommendations = Vec::new();
        let mut confidence: f64 = 0.5;

        if let Some(dependency) = self.dependency_map.get(&alert.service_name) {
            let unhealthy = self.check_dependency_health(&dependency.depends_on).await;
            if !unhealthy.is_empty() {
                findings.push(format!(
                    "Dependency issues detected: {}",
                    unhealthy.join(", ")
                ));
                recommendations.push(format!("Investigate {} services", unhealthy.join(", ")));
                confidence += 0.3;
            }
        }

        if metric.metric_name == "service_health" && metric.current_value == 0.0 {
            findings.push("Service is completely down".to_string());
            recommendations.push("Check service logs and restart if necessary".to_string());
            confidence += 0.4;
        } else if metric.metric_name == "cache_hit_ratio" && metric.current_value < 60.0 {
            findings.push("Cache performance degraded significantly".to_string());
            recommendations.push("Investigate cache configuration and data patterns".to_string());
            confidence += 0.3;
        }

        let recent_analyses;
        {
            let state = self.state.lock().unwrap();
            if let Some(historical) =
                historical_patterns(&state.history, &alert.service_name, Utc::now())
            {
                findings.extend(historical.findings);
                recommendations.extend(historical.recommendations);
                confidence += historical.confidence_boost;
            }
            let skip = state.history.len().saturating_sub(5);
            recent_analyses = state.history.iter().skip(skip).cloned().collect();
        }

        let context = InsightContext {
            alert: alert.clone(),
            metric: metric.clone(),
            current_findings: findings.clone(),
            recent_analyses,
        };
        match self.insight.explain(&context).await {
            Ok(bundle) => {
                findings.extend(bundle.findings);
                recommendations.extend(bundle.recommendations);
            }
            Err(e) => warn!("[{}] insight generation failed: {}", self.core.id(), e),
        }

        RootCause {
            findings,
            recommendations,
            confidence: confidence.min(1.0),
        }
    }

    /// Dependencies reporting anything other than a healthy liveness value
    async fn check_dependency_health(&self, dependencies: &[String]) -> Vec<String> {
        let mut unhealthy = Vec::new();
        for dependency in dependencies {
            let outcome = self.metrics.query(&queries::service_up(dependency)).await;
            let healthy =
                outcome.is_success() && outcome.first_value().map(|v| v >= 1.0).unwrap_or(false);
            if !healthy {
                unhealthy.push(dependency.clone());
            }
        }
        unhealthy
    }

    /// Correlation pass: affected-service set and impact level
    fn correlate(&self, alert: &HealthAlert) -> CorrelationAssessment {
        let mut affected = vec![alert.service_name.clone()];

        for (service, dependency) in &self.dependency_map {
            if dependency.depends_on.contains(&alert.service_name) {
                affected.push(service.clone());
            }
        }

        for service in self.directory.services_in_category(&alert.category) {
            affected.push(service.name.clone());
        }

        affected.sort();
        affected.dedup();

        let correlation_score = if affected.len() > 1 { 0.8 } else { 0.3 };

        CorrelationAssessment {
            impact: self.impact_level(&alert.service_name),
            correlation_score,
            affected_services: affected,
        }
    }

    /// Impact from the dependency map, or inferred from dependent count
    fn impact_level(&self, service: &str) -> ImpactLevel {
        if let Some(dependency) = self.dependency_map.get(service) {
            return dependency.impact_level;
        }

        let dependents = self.directory.dependents_of(service).len();
        if dependents > 3 {
            ImpactLevel::Critical
        } else if dependents > 1 {
            ImpactLevel::High
        } else if dependents > 0 {
            ImpactLevel::Medium
        } else {
            ImpactLevel::Low
        }
    }

    /// Mark past analyses of the resolved alert so their recommendations can
    /// be harvested as common solutions later
    fn record_resolution(&self, alert: &HealthAlert) {
        let mut state = self.state.lock().unwrap();
        let mut marked = 0;
        for result in state.history.iter_mut() {
            let same_alert = result
                .details
                .alert
                .as_ref()
                .map(|a| a.alert_id == alert.alert_id)
                .unwrap_or(false);
            let same_source = result.affected_services.contains(&alert.service_name)
                && result
                    .details
                    .metric
                    .as_ref()
                    .map(|m| m.metric_name == alert.details.metric_name)
                    .unwrap_or(false);
            if same_alert || same_source {
                result.details.resolved = true;
                marked += 1;
            }
        }
        if marked > 0 {
            debug!(
                "[{}] Marked {} analyses resolved for alert {}",
                self.core.id(),
                marked,
                alert.alert_id
            );
        }
    }

    /// Background correlation pass, gated to the configured interval
    async fn run_correlation_analysis(&self) -> Result<(), AgentError> {
        let now = Utc::now();
        {
            let mut state = self.state.lock().unwrap();
            if let Some(last) = state.last_correlation_run {
                if now - last < self.correlation_interval {
                    return Ok(());
                }
            }
            state.last_correlation_run = Some(now);
        }

        let mut observed = Vec::new();
        for (name, expression) in CORRELATION_METRICS {
            let outcome = self.metrics.query(expression).await;
            if outcome.is_success() {
                if let Some(value) = outcome.first_value() {
                    observed.push((name, value));
                }
            }
        }

        let mut state = self.state.lock().unwrap();
        for (name, value) in observed {
            let series = state.series.entry(name.to_string()).or_default();
            series.push_back(value);
            while series.len() > SERIES_CAP {
                series.pop_front();
            }
        }

        let strong_pairs = state.recompute_correlations(self.correlation_threshold);
        info!(
            "[{}] Correlation analysis completed. {} strong pairs cached.",
            self.core.id(),
            strong_pairs
        );
        Ok(())
    }

    /// Record findings recurring across the last 24 hours as patterns
    fn analyze_patterns(&self) {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();

        let cutoff = now - ChronoDuration::hours(24);
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut recent_total = 0;
        for analysis in state.history.iter().filter(|a| a.timestamp > cutoff) {
            recent_total += 1;
            for finding in &analysis.findings {
                *counts.entry(finding.clone()).or_insert(0) += 1;
            }
        }

        if recent_total < 3 {
            return;
        }

        let mut frequent: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, count)| *count > 2)
            .collect();
        frequent.sort();

        if frequent.is_empty() {
            return;
        }

        info!(
            "[{}] Detected {} recurring patterns",
            self.core.id(),
            frequent.len()
        );
        let records = state
            .pattern_memory
            .entry("frequent_issues".to_string())
            .or_default();
        for (pattern, occurrences) in frequent {
            records.push(PatternRecord {
                pattern,
                occurrences,
                last_seen: now,
            });
        }
    }

    /// Derive proactive insights from the last five analyses
    fn generate_insights(&self) {
        let insights = {
            let state = self.state.lock().unwrap();
            if state.history.len() <= 5 {
                return;
            }

            let latest = &state.history[state.history.len() - 5..];
            let mut insights = Vec::new();

            if latest.len() > 3 {
                insights.push(
                    "Alert frequency has increased - consider proactive maintenance".to_string(),
                );
            }

            let mut service_counts: HashMap<&str, usize> = HashMap::new();
            for analysis in latest {
                for service in &analysis.affected_services {
                    *service_counts.entry(service.as_str()).or_insert(0) += 1;
                }
            }
            let mut frequently_affected: Vec<&str> = service_counts
                .into_iter()
                .filter(|(_, count)| *count > 2)
                .map(|(service, _)| service)
                .collect();
            frequently_affected.sort();

            if !frequently_affected.is_empty() {
                insights.push(format!(
                    "Services frequently affected: {}",
                    frequently_affected.join(", ")
                ));
            }

            insights
        };

        if !insights.is_empty() {
            info!(
                "[{}] Generated {} system insights",
                self.core.id(),
                insights.len()
            );
            self.core.update_context("recent_insights", json!(insights));
        }
    }

    fn handle_query(&self, sender: &str, query: QueryPayload) -> Envelope {
        let response = match query {
            QueryPayload::Correlation { service_name } => ResponsePayload::Correlations {
                correlations: self.correlations_for(&service_name),
            },
            QueryPayload::Dependencies { service_name } => ResponsePayload::Dependencies {
                dependency: self.dependency_map.get(&service_name).cloned(),
            },
            QueryPayload::RecentAnalyses => ResponsePayload::RecentAnalyses {
                analyses: self.recent_analyses(10),
            },
            QueryPayload::RuntimeStatus => ResponsePayload::RuntimeStatus {
                report: self.runtime_status(),
            },
            other => {
                warn!(
                    "[{}] Unsupported analysis query: {:?}",
                    self.core.id(),
                    other
                );
                ResponsePayload::Error {
                    message: "Unable to process analysis query".to_string(),
                }
            }
        };

        Envelope::response(self.core.id(), sender, response)
    }

    fn runtime_status(&self) -> RuntimeStatusReport {
        let state = self.state.lock().unwrap();
        let mut extras = Map::new();
        extras.insert("analyses_completed".to_string(), json!(state.history.len()));
        extras.insert(
            "correlations_tracked".to_string(),
            json!(state.correlation_cache.len()),
        );
        extras.insert(
            "dependencies_mapped".to_string(),
            json!(self.dependency_map.len()),
        );
        extras.insert(
            "patterns_detected".to_string(),
            json!(state.pattern_memory.len()),
        );
        drop(state);

        RuntimeStatusReport {
            status: self.core.status(),
            extras,
        }
    }
}

impl Agent for AnalysisAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn process_message<'a>(
        &'a self,
        envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Option<Envelope>> + Send + 'a>> {
        Box::pin(async move {
            match envelope.payload {
                Payload::Alert(payload) => self.analyze_alert(payload, envelope.priority).await,
                Payload::Query(query) => Some(self.handle_query(&envelope.sender, query)),
                Payload::Status(StatusPayload::AlertResolved { alert, .. }) => {
                    self.record_resolution(&alert);
                    None
                }
                other => {
                    warn!(
                        "[{}] Unhandled message kind: {:?}",
                        self.core.id(),
                        other.kind()
                    );
                    None
                }
            }
        })
    }

    fn background_task<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), AgentError>> + Send + 'a>> {
        Box::pin(async move {
            self.run_correlation_analysis().await?;
            self.analyze_patterns();
            self.generate_insights();
            // Pattern and insight scans re-run every minute; the correlation
            // pass self-gates to its own interval
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
    }
}

/// Evidence harvested from past analyses of the same service
struct HistoricalInsight {
    findings: Vec<String>,
    recommendations: Vec<String>,
    confidence_boost: f64,
}

/// Scan the last seven days of analyses touching a service
fn historical_patterns(
    history: &[AnalysisResult],
    service: &str,
    now: Timestamp,
) -> Option<HistoricalInsight> {
    let cutoff = now - ChronoDuration::days(RECURRENCE_WINDOW_DAYS);
    let similar: Vec<&AnalysisResult> = history
        .iter()
        .filter(|analysis| {
            (analysis.affected_services.iter().any(|s| s == service)
                || analysis.trigger_event.contains(service))
                && analysis.timestamp > cutoff
        })
        .collect();

    if similar.is_empty() {
        return None;
    }

    let mut findings = Vec::new();
    let mut recommendations = Vec::new();
    let mut confidence_boost = 0.0;

    if similar.len() > 2 {
        findings.push(format!(
            "Recurring issue: {} similar incidents in last 7 days",
            similar.len()
        ));
        recommendations.push("Implement preventive measures for recurring issue".to_string());
        confidence_boost += 0.2;
    }

    let resolved: Vec<&&AnalysisResult> =
        similar.iter().filter(|a| a.details.resolved).collect();
    if !resolved.is_empty() {
        let common = common_solutions(&resolved);
        if !common.is_empty() {
            recommendations.extend(common);
            confidence_boost += 0.1;
        }
    }

    Some(HistoricalInsight {
        findings,
        recommendations,
        confidence_boost,
    })
}

/// Recommendations appearing in more than one resolved analysis
fn common_solutions(resolved: &[&&AnalysisResult]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for analysis in resolved {
        for recommendation in &analysis.recommendations {
            *counts.entry(recommendation.as_str()).or_insert(0) += 1;
        }
    }

    let mut common: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(recommendation, _)| recommendation.to_string())
        .collect();
    common.sort();
    common
}

/// Pearson correlation coefficient over the trailing aligned samples
///
/// Sequences of different length are compared over their common tail. Fewer
/// than two pairs, or zero variance in either sequence, yields exactly 0.
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }

    let x = &x[x.len() - n..];
    let y = &y[y.len() - n..];

    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let mut numerator = 0.0;
    let mut sum_sq_x = 0.0;
    let mut sum_sq_y = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        numerator += dx * dy;
        sum_sq_x += dx * dx;
        sum_sq_y += dy * dy;
    }

    let denominator = (sum_sq_x * sum_sq_y).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    (numerator / denominator).clamp(-1.0, 1.0)
}

/// Human-readable summary of an analysis result
fn format_analysis_summary(result: &AnalysisResult) -> String {
    let confidence_desc = if result.confidence > 0.7 {
        "high"
    } else if result.confidence > 0.4 {
        "medium"
    } else {
        "low"
    };

    let mut response = format!("🔍 **Analysis Complete** (Confidence: {})\n\n", confidence_desc);
    response.push_str(&format!("**Trigger**: {}\n\n", result.trigger_event));

    if !result.findings.is_empty() {
        response.push_str("**🔎 Key Findings:**\n");
        for finding in &result.findings {
            response.push_str(&format!("• {}\n", finding));
        }
        response.push('\n');
    }

    if !result.recommendations.is_empty() {
        response.push_str("**💡 Recommendations:**\n");
        for recommendation in &result.recommendations {
            response.push_str(&format!("• {}\n", recommendation));
        }
        response.push('\n');
    }

    if !result.affected_services.is_empty() {
        response.push_str(&format!(
            "**🔗 Affected Services:** {}\n\n",
            result.affected_services.join(", ")
        ));
    }

    response.push_str(&format!("**📊 Analysis ID:** {}", result.analysis_id));
    response
}
