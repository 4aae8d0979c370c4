//! Health monitoring agent
//!
//! Continuously assesses the health of every known service and metric and
//! manages the alert lifecycle: creation with cooldown-based deduplication,
//! periodic auto-resolution, and rolling baseline learning. One monitoring
//! pass runs per background cycle, self-paced to the configured interval.

use crate::agent::runtime::{Agent, AgentCore};
use crate::config::MonitoringConfig;
use crate::error::AgentError;
use crate::messages::{
    AlertPayload, Envelope, Payload, QueryPayload, ResponsePayload, StatusPayload, PRIORITY_HIGH,
    PRIORITY_MEDIUM,
};
use crate::metrics::{queries, MetricSource};
use crate::records::{
    AgentKind, AlertDetails, HealthAlert, HealthMetric, HealthStatus, ServiceHealthSummary,
    SystemHealthOverview, Timestamp, Trend,
};
use crate::registry::ServiceDirectory;
use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use serde_json::{json, Map};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default agent id for the health monitor
pub const HEALTH_AGENT_ID: &str = "health_agent";

/// Metric families included in the rolling per-service baselines
const TRACKED_BASELINE_METRICS: [&str; 3] =
    ["service_health", "cache_hit_ratio", "database_connections"];

/// Fleet-wide metrics checked on every monitoring pass
const CRITICAL_METRICS: [(&str, &str); 4] = [
    ("cache_hit_ratio", queries::CACHE_HIT_RATIO),
    ("database_connections", queries::DATABASE_CONNECTIONS),
    ("unprocessed_messages", queries::UNPROCESSED_MESSAGES),
    ("pod_count", queries::POD_COUNT),
];

/// Rolling baseline for one service
#[derive(Debug, Clone)]
pub struct ServiceBaseline {
    /// Mean over the last hour, per tracked metric
    pub averages: HashMap<String, f64>,
    pub last_updated: Timestamp,
}

/// Mutable state owned exclusively by the health agent
struct HealthState {
    health_history: HashMap<String, VecDeque<HealthMetric>>,
    active_alerts: HashMap<String, HealthAlert>,
    baselines: HashMap<String, ServiceBaseline>,
}

impl HealthState {
    fn new(directory: &ServiceDirectory) -> Self {
        let now = Utc::now();
        let mut health_history = HashMap::new();
        let mut baselines = HashMap::new();
        for name in directory.names() {
            health_history.insert(name.clone(), VecDeque::new());
            baselines.insert(
                name,
                ServiceBaseline {
                    averages: HashMap::new(),
                    last_updated: now,
                },
            );
        }
        Self {
            health_history,
            active_alerts: HashMap::new(),
            baselines,
        }
    }

    /// Trend of a metric against its samples from the last 15 minutes
    ///
    /// Fewer than 3 samples is always stable; otherwise the mean of the
    /// second half of the window is compared against the first half with a
    /// 10% band.
    fn trend_for(&self, service: &str, metric: &str, now: Timestamp) -> Trend {
        let Some(samples) = self.health_history.get(service) else {
            return Trend::Stable;
        };

        let cutoff = now - ChronoDuration::minutes(15);
        let values: Vec<f64> = samples
            .iter()
            .filter(|m| m.metric_name == metric && m.timestamp > cutoff)
            .map(|m| m.current_value)
            .collect();

        if values.len() < 3 {
            return Trend::Stable;
        }

        let mid = values.len() / 2;
        let first_half = values[..mid].iter().sum::<f64>() / mid as f64;
        let second_half = values[mid..].iter().sum::<f64>() / (values.len() - mid) as f64;

        if second_half > first_half * 1.1 {
            Trend::Improving
        } else if second_half < first_half * 0.9 {
            Trend::Degrading
        } else {
            Trend::Stable
        }
    }

    /// Append a metric to its service history, evicting beyond the cap
    fn store_metric(&mut self, metric: HealthMetric, cap: usize) {
        let samples = self
            .health_history
            .entry(metric.service_name.clone())
            .or_default();
        samples.push_back(metric);
        while samples.len() > cap {
            samples.pop_front();
        }
    }

    /// True when an active alert for the same (service, metric) pair was
    /// created within the cooldown window
    fn has_similar_alert(
        &self,
        metric: &HealthMetric,
        cooldown: ChronoDuration,
        now: Timestamp,
    ) -> bool {
        let cooldown_start = now - cooldown;
        self.active_alerts.values().any(|alert| {
            alert.service_name == metric.service_name
                && alert.details.metric_name == metric.metric_name
                && alert.timestamp > cooldown_start
        })
    }

    /// Resolution rule: age beyond 30 minutes, or a healthy same-metric
    /// sample within the last 5 minutes
    fn should_resolve(&self, alert: &HealthAlert, now: Timestamp) -> bool {
        if now - alert.timestamp > ChronoDuration::minutes(30) {
            return true;
        }

        if let Some(samples) = self.health_history.get(&alert.service_name) {
            let cutoff = now - ChronoDuration::minutes(5);
            let latest_recent = samples
                .iter()
                .filter(|m| m.metric_name == alert.details.metric_name && m.timestamp > cutoff)
                .next_back();
            if let Some(latest) = latest_recent {
                return latest.status == HealthStatus::Healthy;
            }
        }

        false
    }

    /// Recompute rolling baselines from the last hour of samples
    fn update_baselines(&mut self, now: Timestamp) {
        let history = &self.health_history;
        let baselines = &mut self.baselines;
        let cutoff = now - ChronoDuration::hours(1);

        for (service, samples) in history {
            let recent: Vec<&HealthMetric> =
                samples.iter().filter(|m| m.timestamp > cutoff).collect();
            if recent.is_empty() {
                continue;
            }

            let baseline = baselines
                .entry(service.clone())
                .or_insert_with(|| ServiceBaseline {
                    averages: HashMap::new(),
                    last_updated: now,
                });

            for metric_name in TRACKED_BASELINE_METRICS {
                let values: Vec<f64> = recent
                    .iter()
                    .filter(|m| m.metric_name == metric_name)
                    .map(|m| m.current_value)
                    .collect();
                if !values.is_empty() {
                    let avg = values.iter().sum::<f64>() / values.len() as f64;
                    baseline.averages.insert(metric_name.to_string(), avg);
                }
            }
            baseline.last_updated = now;
        }
    }

    /// Fleet counts from each service's latest sample
    fn system_overview(&self, now: Timestamp) -> SystemHealthOverview {
        let total_services = self.health_history.len();
        let mut healthy = 0;
        let mut warning = 0;
        let mut critical = 0;

        for samples in self.health_history.values() {
            match samples.back().map(|m| m.status) {
                Some(HealthStatus::Healthy) => healthy += 1,
                Some(HealthStatus::Warning) => warning += 1,
                Some(HealthStatus::Critical) => critical += 1,
                _ => {}
            }
        }

        SystemHealthOverview {
            total_services,
            healthy_services: healthy,
            warning_services: warning,
            critical_services: critical,
            health_percentage: if total_services > 0 {
                healthy as f64 / total_services as f64 * 100.0
            } else {
                0.0
            },
            active_alerts: self.active_alerts.len(),
            last_updated: now,
        }
    }
}

/// Proactive health monitoring agent
pub struct HealthMonitorAgent {
    core: AgentCore,
    metrics: Arc<dyn MetricSource>,
    directory: Arc<ServiceDirectory>,
    monitoring_interval: Duration,
    alert_cooldown: ChronoDuration,
    history_limit: usize,
    /// Agent id alerts and resolution notices are addressed to
    alert_recipient: String,
    state: Mutex<HealthState>,
}

impl HealthMonitorAgent {
    pub fn new(
        metrics: Arc<dyn MetricSource>,
        directory: Arc<ServiceDirectory>,
        config: &MonitoringConfig,
    ) -> Self {
        info!(
            "Health agent initialized, monitoring {} services every {}s",
            directory.len(),
            config.interval_seconds
        );
        let state = HealthState::new(&directory);
        Self {
            core: AgentCore::new(HEALTH_AGENT_ID, AgentKind::Health),
            metrics,
            directory,
            monitoring_interval: Duration::from_secs(config.interval_seconds),
            alert_cooldown: ChronoDuration::seconds(config.alert_cooldown_seconds as i64),
            history_limit: config.history_limit,
            alert_recipient: config.alert_recipient.clone(),
            state: Mutex::new(state),
        }
    }

    /// Currently active (unresolved) alerts, newest first
    pub fn active_alerts(&self) -> Vec<HealthAlert> {
        let state = self.state.lock().unwrap();
        let mut alerts: Vec<HealthAlert> = state.active_alerts.values().cloned().collect();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        alerts
    }

    /// Rolling baseline average for one service/metric, if learned
    pub fn baseline_average(&self, service: &str, metric: &str) -> Option<f64> {
        self.state
            .lock()
            .unwrap()
            .baselines
            .get(service)
            .and_then(|b| b.averages.get(metric).copied())
    }

    /// One full monitoring pass: snapshot, critical metrics, alert
    /// evaluation, baselines
    pub(crate) async fn run_monitoring_cycle(&self) -> Result<(), AgentError> {
        self.monitor_all_services().await;
        self.monitor_critical_metrics().await;
        self.evaluate_alerts();
        self.state.lock().unwrap().update_baselines(Utc::now());
        Ok(())
    }

    /// Derive a service_health metric per service from the fleet snapshot
    async fn monitor_all_services(&self) {
        let snapshot = self.metrics.system_snapshot().await;
        let now = Utc::now();
        let mut alerts = Vec::new();

        {
            let mut state = self.state.lock().unwrap();
            for (category, category_snapshot) in &snapshot.categories {
                if let Some(error) = &category_snapshot.error {
                    debug!("Skipping category {}: {}", category, error);
                    continue;
                }

                for (service, service_snapshot) in &category_snapshot.services {
                    let status = HealthStatus::parse(&service_snapshot.status);
                    let value = if status == HealthStatus::Healthy { 1.0 } else { 0.0 };
                    let metric = HealthMetric {
                        service_name: service.clone(),
                        metric_name: "service_health".to_string(),
                        current_value: value,
                        threshold_warning: Some(1.0),
                        threshold_critical: Some(0.0),
                        status,
                        timestamp: now,
                        trend: state.trend_for(service, "service_health", now),
                    };

                    state.store_metric(metric.clone(), self.history_limit);

                    if matches!(status, HealthStatus::Warning | HealthStatus::Critical) {
                        if let Some(envelope) = self.raise_alert(&mut state, &metric, now) {
                            alerts.push(envelope);
                        }
                    }
                }
            }
        }

        self.send_envelopes(alerts);
    }

    /// Query and evaluate the fixed set of fleet-wide critical metrics
    async fn monitor_critical_metrics(&self) {
        let mut observed = Vec::new();
        for (name, expression) in CRITICAL_METRICS {
            let outcome = self.metrics.query(expression).await;
            if !outcome.is_success() {
                debug!(
                    "Critical metric {} unavailable: {}",
                    name,
                    outcome.error.as_deref().unwrap_or("no data")
                );
                continue;
            }
            if let Some(value) = outcome.first_value() {
                observed.push((name, value));
            }
        }

        let now = Utc::now();
        let mut alerts = Vec::new();

        {
            let mut state = self.state.lock().unwrap();
            for (name, value) in observed {
                let status = evaluate_metric_health(name, value);
                let thresholds = metric_thresholds(name);
                let metric = HealthMetric {
                    service_name: "system".to_string(),
                    metric_name: name.to_string(),
                    current_value: value,
                    threshold_warning: thresholds.map(|t| t.0),
                    threshold_critical: thresholds.map(|t| t.1),
                    status,
                    timestamp: now,
                    trend: state.trend_for("system", name, now),
                };

                state.store_metric(metric.clone(), self.history_limit);

                if matches!(status, HealthStatus::Warning | HealthStatus::Critical) {
                    if let Some(envelope) = self.raise_alert(&mut state, &metric, now) {
                        alerts.push(envelope);
                    }
                }
            }
        }

        self.send_envelopes(alerts);
    }

    /// Create and store an alert unless an equivalent one is in cooldown
    fn raise_alert(
        &self,
        state: &mut HealthState,
        metric: &HealthMetric,
        now: Timestamp,
    ) -> Option<Envelope> {
        if state.has_similar_alert(metric, self.alert_cooldown, now) {
            debug!(
                "Suppressing duplicate alert for {}/{} within cooldown",
                metric.service_name, metric.metric_name
            );
            return None;
        }

        let alert_id = format!(
            "{}_{}_{}",
            metric.service_name,
            metric.metric_name,
            metric.timestamp.timestamp()
        );
        let alert = HealthAlert {
            alert_id: alert_id.clone(),
            service_name: metric.service_name.clone(),
            category: self.directory.category_of(&metric.service_name).to_string(),
            severity: metric.status,
            message: alert_message(metric),
            details: AlertDetails {
                metric_name: metric.metric_name.clone(),
                current_value: metric.current_value,
                threshold_warning: metric.threshold_warning,
                threshold_critical: metric.threshold_critical,
                trend: metric.trend,
            },
            timestamp: metric.timestamp,
            resolved: false,
        };

        state.active_alerts.insert(alert_id, alert.clone());
        info!("[{}] Created alert: {}", self.core.id(), alert.message);

        let priority = if metric.status == HealthStatus::Critical {
            PRIORITY_HIGH
        } else {
            PRIORITY_MEDIUM
        };

        Some(Envelope::alert(
            self.core.id(),
            &self.alert_recipient,
            AlertPayload {
                alert,
                metric: metric.clone(),
            },
            priority,
        ))
    }

    /// Resolve aged-out or recovered alerts and notify the analysis agent
    fn evaluate_alerts(&self) {
        let now = Utc::now();
        let mut resolved = Vec::new();

        {
            let mut state = self.state.lock().unwrap();
            let to_resolve: Vec<String> = state
                .active_alerts
                .iter()
                .filter(|&(_, alert)| state.should_resolve(alert, now))
                .map(|(id, _)| id.clone())
                .collect();

            for alert_id in to_resolve {
                if let Some(mut alert) = state.active_alerts.remove(&alert_id) {
                    alert.resolved = true;
                    resolved.push(alert);
                }
            }
        }

        let mut notices = Vec::new();
        for alert in resolved {
            info!("[{}] Resolved alert: {}", self.core.id(), alert.message);
            notices.push(Envelope::status(
                self.core.id(),
                &self.alert_recipient,
                StatusPayload::AlertResolved {
                    alert,
                    resolved_at: now,
                },
            ));
        }
        self.send_envelopes(notices);
    }

    fn send_envelopes(&self, envelopes: Vec<Envelope>) {
        for envelope in envelopes {
            if let Err(e) = self.core.emit(envelope) {
                warn!("[{}] failed to emit envelope: {}", self.core.id(), e);
            }
        }
    }

    fn handle_query(&self, sender: &str, query: QueryPayload) -> Envelope {
        let response = match query {
            QueryPayload::ServiceHealth { service_name } => self.service_health(&service_name),
            QueryPayload::SystemOverview => ResponsePayload::SystemOverview {
                overview: self.state.lock().unwrap().system_overview(Utc::now()),
            },
            QueryPayload::ActiveAlerts => ResponsePayload::ActiveAlerts {
                alerts: self.active_alerts(),
            },
            QueryPayload::RuntimeStatus => ResponsePayload::RuntimeStatus {
                report: self.runtime_status(),
            },
            other => {
                warn!("[{}] Unsupported health query: {:?}", self.core.id(), other);
                ResponsePayload::Error {
                    message: "Unable to process health query".to_string(),
                }
            }
        };

        Envelope::response(self.core.id(), sender, response)
    }

    fn service_health(&self, service: &str) -> ResponsePayload {
        let now = Utc::now();
        let state = self.state.lock().unwrap();

        let Some(samples) = state.health_history.get(service) else {
            return ResponsePayload::Error {
                message: "Service not found".to_string(),
            };
        };

        let cutoff = now - ChronoDuration::hours(1);
        let recent: Vec<&HealthMetric> =
            samples.iter().filter(|m| m.timestamp > cutoff).collect();

        match recent.last() {
            Some(latest) => ResponsePayload::ServiceHealth {
                health: ServiceHealthSummary {
                    service_name: service.to_string(),
                    current_status: latest.status,
                    last_updated: latest.timestamp,
                    trend: latest.trend,
                    metrics_count: recent.len(),
                },
            },
            None => ResponsePayload::Error {
                message: "No recent health data".to_string(),
            },
        }
    }

    fn runtime_status(&self) -> crate::records::RuntimeStatusReport {
        let state = self.state.lock().unwrap();
        let mut extras = Map::new();
        extras.insert("active_alerts".to_string(), json!(state.active_alerts.len()));
        extras.insert(
            "monitored_services".to_string(),
            json!(state.health_history.len()),
        );
        drop(state);

        crate::records::RuntimeStatusReport {
            status: self.core.status(),
            extras,
        }
    }
}

impl Agent for HealthMonitorAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn process_message<'a>(
        &'a self,
        envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Option<Envelope>> + Send + 'a>> {
        Box::pin(async move {
            match envelope.payload {
                Payload::Query(query) => Some(self.handle_query(&envelope.sender, query)),
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
            self.run_monitoring_cycle().await?;
            // Self-pace to the configured monitoring interval
            tokio::time::sleep(self.monitoring_interval).await;
            Ok(())
        })
    }
}

/// Warning/critical thresholds for the fleet-wide metrics
fn metric_thresholds(metric_name: &str) -> Option<(f64, f64)> {
    match metric_name {
        "cache_hit_ratio" => Some((80.0, 60.0)),
        "database_connections" => Some((80.0, 95.0)),
        "unprocessed_messages" => Some((100.0, 500.0)),
        "pod_count" => Some((50.0, 100.0)),
        _ => None,
    }
}

/// Evaluate a fleet-wide metric against its static thresholds
///
/// Higher is better only for the cache hit ratio; for everything else a
/// larger value is worse.
fn evaluate_metric_health(metric_name: &str, value: f64) -> HealthStatus {
    let Some((warning, critical)) = metric_thresholds(metric_name) else {
        return HealthStatus::Healthy;
    };

    if metric_name == "cache_hit_ratio" {
        if value < critical {
            HealthStatus::Critical
        } else if value < warning {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    } else if value > critical {
        HealthStatus::Critical
    } else if value > warning {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

/// Human-readable alert text per metric family
fn alert_message(metric: &HealthMetric) -> String {
    let emoji = metric.status.emoji();
    let threshold = |t: Option<f64>| {
        t.map(|v| v.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    };

    match metric.metric_name.as_str() {
        "service_health" => format!(
            "{} {} service is {}",
            emoji,
            metric.service_name,
            metric.status.label()
        ),
        "cache_hit_ratio" => format!(
            "{} Cache hit ratio dropped to {:.1}% (threshold: {}%)",
            emoji,
            metric.current_value,
            threshold(metric.threshold_warning)
        ),
        "database_connections" => format!(
            "{} Database connections at {} (threshold: {})",
            emoji,
            metric.current_value,
            threshold(metric.threshold_warning)
        ),
        "unprocessed_messages" => format!(
            "{} Unprocessed messages: {} (threshold: {})",
            emoji,
            metric.current_value,
            threshold(metric.threshold_warning)
        ),
        _ => format!(
            "{} {} {}: {} (trend: {})",
            emoji,
            metric.service_name,
            metric.metric_name,
            metric.current_value,
            metric.trend.label()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitoringConfig;
    use crate::metrics::StaticMetricSource;

    fn test_agent() -> (HealthMonitorAgent, Arc<StaticMetricSource>) {
        let directory = Arc::new(ServiceDirectory::default());
        let source = Arc::new(StaticMetricSource::healthy(&directory));
        let agent = HealthMonitorAgent::new(
            source.clone(),
            directory,
            &MonitoringConfig::default(),
        );
        (agent, source)
    }

    fn metric_at(
        service: &str,
        metric: &str,
        value: f64,
        status: HealthStatus,
        timestamp: Timestamp,
    ) -> HealthMetric {
        HealthMetric {
            service_name: service.to_string(),
            metric_name: metric.to_string(),
            current_value: value,
            threshold_warning: Some(1.0),
            threshold_critical: Some(0.0),
            status,
            timestamp,
            trend: Trend::Stable,
        }
    }

    #[test]
    fn test_trend_requires_three_samples() {
        let (agent, _) = test_agent();
        let now = Utc::now();
        {
            let mut state = agent.state.lock().unwrap();
            for offset in [10, 5] {
                state.store_metric(
                    metric_at(
                        "api_gateway",
                        "service_health",
                        1.0,
                        HealthStatus::Healthy,
                        now - ChronoDuration::minutes(offset),
                    ),
                    100,
                );
            }
        }
        let state = agent.state.lock().unwrap();
        assert_eq!(
            state.trend_for("api_gateway", "service_health", now),
            Trend::Stable
        );
    }

    #[test]
    fn test_trend_improving_degrading_stable() {
        let (agent, _) = test_agent();
        let now = Utc::now();
        let fill = |agent: &HealthMonitorAgent, values: &[f64]| {
            let mut state = agent.state.lock().unwrap();
            state.health_history.get_mut("api_gateway").unwrap().clear();
            for (i, v) in values.iter().enumerate() {
                state.store_metric(
                    metric_at(
                        "api_gateway",
                        "latency",
                        *v,
                        HealthStatus::Healthy,
                        now - ChronoDuration::minutes(14) + ChronoDuration::minutes(i as i64),
                    ),
                    100,
                );
            }
        };

        // Second half mean (4.0) > first half mean (1.0) * 1.1
        fill(&agent, &[1.0, 1.0, 4.0, 4.0]);
        assert_eq!(
            agent
                .state
                .lock()
                .unwrap()
                .trend_for("api_gateway", "latency", now),
            Trend::Improving
        );

        // Second half mean (1.0) < first half mean (4.0) * 0.9
        fill(&agent, &[4.0, 4.0, 1.0, 1.0]);
        assert_eq!(
            agent
                .state
                .lock()
                .unwrap()
                .trend_for("api_gateway", "latency", now),
            Trend::Degrading
        );

        // Within the 10% band either way
        fill(&agent, &[10.0, 10.0, 10.5, 10.5]);
        assert_eq!(
            agent
                .state
                .lock()
                .unwrap()
                .trend_for("api_gateway", "latency", now),
            Trend::Stable
        );
    }

    #[test]
    fn test_trend_ignores_samples_outside_window() {
        let (agent, _) = test_agent();
        let now = Utc::now();
        {
            let mut state = agent.state.lock().unwrap();
            // Old degraded samples outside the 15-minute window
            for offset in [60, 50, 40] {
                state.store_metric(
                    metric_at(
                        "api_gateway",
                        "latency",
                        100.0,
                        HealthStatus::Healthy,
                        now - ChronoDuration::minutes(offset),
                    ),
                    100,
                );
            }
            state.store_metric(
                metric_at(
                    "api_gateway",
                    "latency",
                    1.0,
                    HealthStatus::Healthy,
                    now - ChronoDuration::minutes(1),
                ),
                100,
            );
        }
        // Only one in-window sample: stable
        assert_eq!(
            agent
                .state
                .lock()
                .unwrap()
                .trend_for("api_gateway", "latency", now),
            Trend::Stable
        );
    }

    #[test]
    fn test_history_cap_evicts_oldest() {
        let (agent, _) = test_agent();
        let now = Utc::now();
        {
            let mut state = agent.state.lock().unwrap();
            for i in 0..150 {
                state.store_metric(
                    metric_at(
                        "api_gateway",
                        "service_health",
                        i as f64,
                        HealthStatus::Healthy,
                        now,
                    ),
                    100,
                );
            }
        }
        let state = agent.state.lock().unwrap();
        let samples = state.health_history.get("api_gateway").unwrap();
        assert_eq!(samples.len(), 100);
        // The 50 oldest values were evicted
        assert_eq!(samples.front().unwrap().current_value, 50.0);
        assert_eq!(samples.back().unwrap().current_value, 149.0);
    }

    #[tokio::test]
    async fn test_critical_service_raises_alert_with_service_name() {
        let (agent, source) = test_agent();
        source.set_service_status("core", "payment_service", "critical");

        agent.run_monitoring_cycle().await.unwrap();

        let alerts = agent.active_alerts();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.service_name, "payment_service");
        assert_eq!(alert.severity, HealthStatus::Critical);
        assert!(alert.message.contains("payment_service"));
        assert!(alert.message.contains("critical"));
        assert_eq!(alert.details.metric_name, "service_health");
        assert_eq!(alert.details.current_value, 0.0);
    }

    #[tokio::test]
    async fn test_duplicate_alert_suppressed_within_cooldown() {
        let (agent, source) = test_agent();
        source.set_service_status("core", "payment_service", "critical");

        agent.run_monitoring_cycle().await.unwrap();
        agent.run_monitoring_cycle().await.unwrap();
        agent.run_monitoring_cycle().await.unwrap();

        assert_eq!(agent.active_alerts().len(), 1);
    }

    #[tokio::test]
    async fn test_alert_created_again_after_cooldown() {
        let (agent, source) = test_agent();
        source.set_service_status("core", "payment_service", "critical");
        agent.run_monitoring_cycle().await.unwrap();

        // Age the stored alert beyond the cooldown window
        {
            let mut state = agent.state.lock().unwrap();
            for alert in state.active_alerts.values_mut() {
                alert.timestamp = Utc::now() - ChronoDuration::seconds(301);
            }
        }

        let metric = metric_at(
            "payment_service",
            "service_health",
            0.0,
            HealthStatus::Critical,
            Utc::now(),
        );
        let mut state = agent.state.lock().unwrap();
        assert!(agent.raise_alert(&mut state, &metric, Utc::now()).is_some());
        assert_eq!(state.active_alerts.len(), 2);
    }

    #[tokio::test]
    async fn test_alert_resolved_after_thirty_minutes() {
        let (agent, _) = test_agent();
        let stale = Utc::now() - ChronoDuration::minutes(31);
        let metric = metric_at(
            "payment_service",
            "service_health",
            0.0,
            HealthStatus::Critical,
            stale,
        );
        {
            let mut state = agent.state.lock().unwrap();
            agent.raise_alert(&mut state, &metric, stale);
            assert_eq!(state.active_alerts.len(), 1);
        }

        agent.evaluate_alerts();
        assert!(agent.active_alerts().is_empty());
    }

    #[tokio::test]
    async fn test_alert_resolved_by_recent_healthy_sample() {
        let (agent, _) = test_agent();
        let now = Utc::now();
        let alert_time = now - ChronoDuration::minutes(10);
        let metric = metric_at(
            "payment_service",
            "service_health",
            0.0,
            HealthStatus::Critical,
            alert_time,
        );
        {
            let mut state = agent.state.lock().unwrap();
            agent.raise_alert(&mut state, &metric, alert_time);
            state.store_metric(
                metric_at(
                    "payment_service",
                    "service_health",
                    1.0,
                    HealthStatus::Healthy,
                    now - ChronoDuration::minutes(1),
                ),
                100,
            );
        }

        agent.evaluate_alerts();
        assert!(agent.active_alerts().is_empty());
    }

    #[tokio::test]
    async fn test_alert_not_resolved_by_stale_healthy_sample() {
        let (agent, _) = test_agent();
        let now = Utc::now();
        let alert_time = now - ChronoDuration::minutes(10);
        let metric = metric_at(
            "payment_service",
            "service_health",
            0.0,
            HealthStatus::Critical,
            alert_time,
        );
        {
            let mut state = agent.state.lock().unwrap();
            agent.raise_alert(&mut state, &metric, alert_time);
            // Healthy sample outside the 5-minute recovery window
            state.store_metric(
                metric_at(
                    "payment_service",
                    "service_health",
                    1.0,
                    HealthStatus::Healthy,
                    now - ChronoDuration::minutes(8),
                ),
                100,
            );
        }

        agent.evaluate_alerts();
        assert_eq!(agent.active_alerts().len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_emits_status_notice() {
        let (agent, _) = test_agent();
        let mut outgoing = agent.core().take_outgoing().unwrap();
        let stale = Utc::now() - ChronoDuration::minutes(31);
        let metric = metric_at(
            "payment_service",
            "service_health",
            0.0,
            HealthStatus::Critical,
            stale,
        );
        {
            let mut state = agent.state.lock().unwrap();
            agent.raise_alert(&mut state, &metric, stale);
        }

        agent.evaluate_alerts();

        let notice = outgoing.try_recv().expect("resolution notice emitted");
        match notice.payload {
            Payload::Status(StatusPayload::AlertResolved { alert, .. }) => {
                assert!(alert.resolved);
                assert_eq!(alert.service_name, "payment_service");
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_critical_metric_thresholds() {
        assert_eq!(
            evaluate_metric_health("cache_hit_ratio", 55.0),
            HealthStatus::Critical
        );
        assert_eq!(
            evaluate_metric_health("cache_hit_ratio", 70.0),
            HealthStatus::Warning
        );
        assert_eq!(
            evaluate_metric_health("cache_hit_ratio", 95.0),
            HealthStatus::Healthy
        );
        assert_eq!(
            evaluate_metric_health("unprocessed_messages", 600.0),
            HealthStatus::Critical
        );
        assert_eq!(
            evaluate_metric_health("unprocessed_messages", 150.0),
            HealthStatus::Warning
        );
        assert_eq!(
            evaluate_metric_health("unprocessed_messages", 50.0),
            HealthStatus::Healthy
        );
        assert_eq!(
            evaluate_metric_health("made_up", 1e9),
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_degraded_cache_metric_raises_system_alert() {
        let (agent, source) = test_agent();
        source.set_value(queries::CACHE_HIT_RATIO, 55.0);

        agent.run_monitoring_cycle().await.unwrap();

        let alerts = agent.active_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].service_name, "system");
        assert!(alerts[0].message.contains("Cache hit ratio"));
        assert_eq!(alerts[0].severity, HealthStatus::Critical);
    }

    #[tokio::test]
    async fn test_failed_metric_query_is_skipped() {
        let (agent, source) = test_agent();
        source.fail_expression(queries::POD_COUNT);

        agent.run_monitoring_cycle().await.unwrap();
        assert!(agent.active_alerts().is_empty());

        let state = agent.state.lock().unwrap();
        let system = state.health_history.get("system").unwrap();
        assert!(system.iter().all(|m| m.metric_name != "pod_count"));
    }

    #[tokio::test]
    async fn test_baselines_learn_hourly_means() {
        let (agent, _) = test_agent();
        let now = Utc::now();
        {
            let mut state = agent.state.lock().unwrap();
            for value in [80.0, 90.0, 100.0] {
                state.store_metric(
                    metric_at(
                        "system",
                        "cache_hit_ratio",
                        value,
                        HealthStatus::Healthy,
                        now - ChronoDuration::minutes(10),
                    ),
                    100,
                );
            }
            state.update_baselines(now);
        }
        assert_eq!(agent.baseline_average("system", "cache_hit_ratio"), Some(90.0));
        assert_eq!(agent.baseline_average("system", "pod_count"), None);
    }

    #[tokio::test]
    async fn test_system_overview_counts() {
        let (agent, source) = test_agent();
        source.set_service_status("core", "payment_service", "critical");
        source.set_service_status("core", "auth_service", "warning");
        agent.run_monitoring_cycle().await.unwrap();

        let overview = agent.state.lock().unwrap().system_overview(Utc::now());
        assert_eq!(overview.critical_services, 1);
        assert_eq!(overview.warning_services, 1);
        // 9 directory services + the synthetic "system" service
        assert_eq!(overview.total_services, 10);
        assert!(overview.health_percentage > 0.0);
        assert_eq!(overview.active_alerts, 2);
    }

    #[tokio::test]
    async fn test_health_queries() {
        let (agent, _) = test_agent();
        agent.run_monitoring_cycle().await.unwrap();

        let envelope = Envelope::query(
            "executor",
            HEALTH_AGENT_ID,
            QueryPayload::ServiceHealth {
                service_name: "api_gateway".to_string(),
            },
        );
        let response = agent.process_message(envelope).await.unwrap();
        match response.payload {
            Payload::Response(ResponsePayload::ServiceHealth { health }) => {
                assert_eq!(health.service_name, "api_gateway");
                assert_eq!(health.current_status, HealthStatus::Healthy);
                assert_eq!(health.metrics_count, 1);
            }
            other => panic!("unexpected payload: {:?}", other),
        }

        let envelope = Envelope::query(
            "executor",
            HEALTH_AGENT_ID,
            QueryPayload::ServiceHealth {
                service_name: "no_such_service".to_string(),
            },
        );
        let response = agent.process_message(envelope).await.unwrap();
        match response.payload {
            Payload::Response(ResponsePayload::Error { message }) => {
                assert_eq!(message, "Service not found");
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_runtime_status_query_reports_extras() {
        let (agent, _) = test_agent();
        let envelope = Envelope::query("executor", HEALTH_AGENT_ID, QueryPayload::RuntimeStatus);
        let response = agent.process_message(envelope).await.unwrap();
        match response.payload {
            Payload::Response(ResponsePayload::RuntimeStatus { report }) => {
                assert_eq!(report.status.agent_id, HEALTH_AGENT_ID);
                assert_eq!(report.extras["active_alerts"], json!(0));
                assert_eq!(report.extras["monitored_services"], json!(9));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_alert_message_formats() {
        let now = Utc::now();
        let mut metric = metric_at(
            "payment_service",
            "service_health",
            0.0,
            HealthStatus::Critical,
            now,
        );
        assert_eq!(
            alert_message(&metric),
            "🚨 payment_service service is critical"
        );

        metric.metric_name = "cache_hit_ratio".to_string();
        metric.current_value = 55.0;
        metric.threshold_warning = Some(80.0);
        metric.status = HealthStatus::Warning;
        assert_eq!(
            alert_message(&metric),
            "⚠️ Cache hit ratio dropped to 55.0% (threshold: 80%)"
        );

        metric.metric_name = "queue_depth".to_string();
        assert!(alert_message(&metric).contains("trend: stable"));
    }
}
