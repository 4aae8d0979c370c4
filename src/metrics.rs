//! Metric source interface and implementations
//!
//! The agents consume metrics through the [`MetricSource`] trait: a PromQL
//! query interface plus a fleet-wide status snapshot. Query failures are a
//! normal outcome carried in the [`QueryOutcome`] status field, never an
//! error the caller has to catch; transport problems are translated at the
//! trait boundary.

use crate::error::MetricsError;
use crate::records::Timestamp;
use crate::registry::ServiceDirectory;
use chrono::Utc;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Well-known query expressions used by the monitoring and analysis agents
pub mod queries {
    /// Cache hit percentage; the one tracked metric where higher is better
    pub const CACHE_HIT_RATIO: &str =
        "app_cache_hits_total / (app_cache_hits_total + app_cache_misses_total) * 100";
    pub const DATABASE_CONNECTIONS: &str = "db_pool_connections_active";
    pub const UNPROCESSED_MESSAGES: &str = "queue_unprocessed_messages";
    pub const POD_COUNT: &str = "k8s_pod_count_total";
    pub const RESPONSE_TIME_P95: &str =
        "histogram_quantile(0.95, rate(http_request_duration_seconds_bucket[5m]))";
    pub const ERROR_RATE: &str = "rate(http_requests_total{status=~\"5..\"}[5m])";

    /// Liveness query for one service's scrape jobs
    pub fn service_up(service: &str) -> String {
        format!("up{{job=~\".*{}.*\"}}", service)
    }
}

/// Whether a query produced usable data
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Success,
    Failure,
}

/// One labelled sample from a query result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub labels: HashMap<String, String>,
    pub timestamp: f64,
    /// Sample value as returned by the source; parsed on demand
    pub value: String,
}

/// Result of a metric query; callers check `status`, not an error type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryOutcome {
    pub status: QueryStatus,
    pub samples: Vec<MetricSample>,
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn success(samples: Vec<MetricSample>) -> Self {
        Self {
            status: QueryStatus::Success,
            samples,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: QueryStatus::Failure,
            samples: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    /// Numeric value of the first sample, if present and parseable
    pub fn first_value(&self) -> Option<f64> {
        self.samples
            .first()
            .and_then(|sample| sample.value.parse::<f64>().ok())
    }
}

/// Point-in-time status of one service as reported by the metric source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSnapshot {
    pub status: String,
}

/// Status of every service in one category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CategorySnapshot {
    pub services: HashMap<String, ServiceSnapshot>,
    /// Set when the whole category could not be queried
    pub error: Option<String>,
}

/// Full fleet status snapshot, grouped by service category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemSnapshot {
    pub categories: HashMap<String, CategorySnapshot>,
    pub timestamp: Timestamp,
}

impl SystemSnapshot {
    pub fn empty() -> Self {
        Self {
            categories: HashMap::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Async query interface over an external metric store
pub trait MetricSource: Send + Sync {
    /// Evaluate a query expression
    fn query<'a>(
        &'a self,
        expression: &'a str,
    ) -> Pin<Box<dyn Future<Output = QueryOutcome> + Send + 'a>>;

    /// Full fleet status snapshot
    fn system_snapshot<'a>(&'a self) -> Pin<Box<dyn Future<Output = SystemSnapshot> + Send + 'a>>;
}

/// Prometheus HTTP API response envelope
#[derive(Debug, Deserialize)]
struct PrometheusEnvelope {
    status: String,
    #[serde(default)]
    data: Option<PrometheusData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrometheusData {
    #[serde(default)]
    result: Vec<PrometheusResult>,
}

#[derive(Debug, Deserialize)]
struct PrometheusResult {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: (f64, String),
}

/// Metric source backed by a Prometheus-compatible HTTP endpoint
pub struct PrometheusSource {
    client: Client,
    endpoint: String,
    directory: Arc<ServiceDirectory>,
}

impl PrometheusSource {
    /// Create a source against the given base URL, e.g. "http://localhost:9090"
    pub fn new(endpoint: String, timeout: Duration, directory: Arc<ServiceDirectory>) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoint,
            directory,
        }
    }

    fn api_url(&self) -> String {
        format!("{}/api/v1/query", self.endpoint.trim_end_matches('/'))
    }

    async fn run_query(&self, expression: &str) -> Result<QueryOutcome, MetricsError> {
        let response = self
            .client
            .get(self.api_url())
            .query(&[("query", expression)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MetricsError::QueryStatus(response.status().to_string()));
        }

        let envelope: PrometheusEnvelope = response
            .json()
            .await
            .map_err(|e| MetricsError::ParseError(e.to_string()))?;

        if envelope.status != "success" {
            let message = envelope
                .error
                .unwrap_or_else(|| format!("status {}", envelope.status));
            return Ok(QueryOutcome::failure(message));
        }

        let samples = envelope
            .data
            .map(|data| {
                data.result
                    .into_iter()
                    .map(|entry| MetricSample {
                        labels: entry.metric,
                        timestamp: entry.value.0,
                        value: entry.value.1,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(QueryOutcome::success(samples))
    }
}

impl MetricSource for PrometheusSource {
    fn query<'a>(
        &'a self,
        expression: &'a str,
    ) -> Pin<Box<dyn Future<Output = QueryOutcome> + Send + 'a>> {
        Box::pin(async move {
            debug!("Running metric query: {}", expression);
            match self.run_query(expression).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Metric query '{}' failed: {}", expression, e);
                    QueryOutcome::failure(e.to_string())
                }
            }
        })
    }

    fn system_snapshot<'a>(&'a self) -> Pin<Box<dyn Future<Output = SystemSnapshot> + Send + 'a>> {
        Box::pin(async move {
            let mut categories: HashMap<String, CategorySnapshot> = HashMap::new();

            for name in self.directory.names() {
                let category = self.directory.category_of(&name).to_string();
                let outcome = self.query(&queries::service_up(&name)).await;

                let status = if outcome.is_success() {
                    match outcome.first_value() {
                        Some(value) if value >= 1.0 => "healthy",
                        Some(_) => "critical",
                        None => "unknown",
                    }
                } else {
                    "unknown"
                };

                categories
                    .entry(category)
                    .or_default()
                    .services
                    .insert(name, ServiceSnapshot {
                        status: status.to_string(),
                    });
            }

            SystemSnapshot {
                categories,
                timestamp: Utc::now(),
            }
        })
    }
}

/// In-memory metric source with canned values
///
/// Used by tests and by the `static` metrics backend for offline runs.
/// Values and the snapshot can be mutated behind shared references so test
/// scenarios can evolve mid-run.
pub struct StaticMetricSource {
    values: Mutex<HashMap<String, f64>>,
    failing: Mutex<HashSet<String>>,
    snapshot: Mutex<SystemSnapshot>,
}

impl StaticMetricSource {
    /// Source reporting every directory service healthy with nominal metrics
    pub fn healthy(directory: &ServiceDirectory) -> Self {
        let mut values = HashMap::new();
        values.insert(queries::CACHE_HIT_RATIO.to_string(), 92.5);
        values.insert(queries::DATABASE_CONNECTIONS.to_string(), 42.0);
        values.insert(queries::UNPROCESSED_MESSAGES.to_string(), 12.0);
        values.insert(queries::POD_COUNT.to_string(), 18.0);
        values.insert(queries::RESPONSE_TIME_P95.to_string(), 0.25);
        values.insert(queries::ERROR_RATE.to_string(), 0.01);

        let mut categories: HashMap<String, CategorySnapshot> = HashMap::new();
        for name in directory.names() {
            values.insert(queries::service_up(&name), 1.0);
            categories
                .entry(directory.category_of(&name).to_string())
                .or_default()
                .services
                .insert(name, ServiceSnapshot {
                    status: "healthy".to_string(),
                });
        }

        Self {
            values: Mutex::new(values),
            failing: Mutex::new(HashSet::new()),
            snapshot: Mutex::new(SystemSnapshot {
                categories,
                timestamp: Utc::now(),
            }),
        }
    }

    /// Source that knows nothing; every query fails
    pub fn empty() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            snapshot: Mutex::new(SystemSnapshot::empty()),
        }
    }

    /// Set or replace the value returned for an expression
    pub fn set_value(&self, expression: &str, value: f64) {
        self.values
            .lock()
            .unwrap()
            .insert(expression.to_string(), value);
        self.failing.lock().unwrap().remove(expression);
    }

    /// Force an expression to return a failed outcome
    pub fn fail_expression(&self, expression: &str) {
        self.failing.lock().unwrap().insert(expression.to_string());
    }

    /// Override one service's status in the snapshot
    pub fn set_service_status(&self, category: &str, service: &str, status: &str) {
        let mut snapshot = self.snapshot.lock().unwrap();
        snapshot
            .categories
            .entry(category.to_string())
            .or_default()
            .services
            .insert(service.to_string(), ServiceSnapshot {
                status: status.to_string(),
            });
        snapshot.timestamp = Utc::now();
    }
}

impl MetricSource for StaticMetricSource {
    fn query<'a>(
        &'a self,
        expression: &'a str,
    ) -> Pin<Box<dyn Future<Output = QueryOutcome> + Send + 'a>> {
        Box::pin(async move {
            if self.failing.lock().unwrap().contains(expression) {
                return QueryOutcome::failure("forced failure");
            }

            match self.values.lock().unwrap().get(expression) {
                Some(value) => QueryOutcome::success(vec![MetricSample {
                    labels: HashMap::new(),
                    timestamp: Utc::now().timestamp() as f64,
                    value: value.to_string(),
                }]),
                None => QueryOutcome::failure(format!("no data for expression: {}", expression)),
            }
        })
    }

    fn system_snapshot<'a>(&'a self) -> Pin<Box<dyn Future<Output = SystemSnapshot> + Send + 'a>> {
        Box::pin(async move { self.snapshot.lock().unwrap().clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_value_parses_first_sample() {
        let outcome = QueryOutcome::success(vec![
            MetricSample {
                labels: HashMap::new(),
                timestamp: 1700000000.0,
                value: "42.5".to_string(),
            },
            MetricSample {
                labels: HashMap::new(),
                timestamp: 1700000000.0,
                value: "7".to_string(),
            },
        ]);
        assert_eq!(outcome.first_value(), Some(42.5));
    }

    #[test]
    fn test_first_value_handles_garbage() {
        let outcome = QueryOutcome::success(vec![MetricSample {
            labels: HashMap::new(),
            timestamp: 1700000000.0,
            value: "NaN-ish".to_string(),
        }]);
        assert_eq!(outcome.first_value(), None);
        assert_eq!(QueryOutcome::failure("boom").first_value(), None);
    }

    #[test]
    fn test_prometheus_response_parsing() {
        let body = r#"{
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {"job": "payment_service"}, "value": [1700000000.123, "1"]}
                ]
            }
        }"#;

        let envelope: PrometheusEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.status, "success");
        let data = envelope.data.unwrap();
        assert_eq!(data.result.len(), 1);
        assert_eq!(data.result[0].value.1, "1");
        assert_eq!(data.result[0].metric.get("job").unwrap(), "payment_service");
    }

    #[test]
    fn test_prometheus_error_response_parsing() {
        let body = r#"{"status": "error", "error": "query timed out"}"#;
        let envelope: PrometheusEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.status, "error");
        assert_eq!(envelope.error.unwrap(), "query timed out");
    }

    #[tokio::test]
    async fn test_static_source_returns_canned_values() {
        let directory = ServiceDirectory::default();
        let source = StaticMetricSource::healthy(&directory);

        let outcome = source.query(queries::CACHE_HIT_RATIO).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.first_value(), Some(92.5));

        let up = source.query(&queries::service_up("api_gateway")).await;
        assert_eq!(up.first_value(), Some(1.0));
    }

    #[tokio::test]
    async fn test_static_source_unknown_expression_fails() {
        let source = StaticMetricSource::empty();
        let outcome = source.query("made_up_metric").await;
        assert!(!outcome.is_success());
        assert!(outcome.error.unwrap().contains("made_up_metric"));
    }

    #[tokio::test]
    async fn test_static_source_forced_failure() {
        let directory = ServiceDirectory::default();
        let source = StaticMetricSource::healthy(&directory);
        source.fail_expression(queries::POD_COUNT);

        let outcome = source.query(queries::POD_COUNT).await;
        assert!(!outcome.is_success());

        // Setting a value again clears the failure
        source.set_value(queries::POD_COUNT, 3.0);
        let outcome = source.query(queries::POD_COUNT).await;
        assert_eq!(outcome.first_value(), Some(3.0));
    }

    #[tokio::test]
    async fn test_static_snapshot_status_override() {
        let directory = ServiceDirectory::default();
        let source = StaticMetricSource::healthy(&directory);
        source.set_service_status("core", "payment_service", "critical");

        let snapshot = source.system_snapshot().await;
        let core = snapshot.categories.get("core").unwrap();
        assert_eq!(core.services.get("payment_service").unwrap().status, "critical");
        assert_eq!(core.services.get("auth_service").unwrap().status, "healthy");
    }

    #[test]
    fn test_service_up_expression() {
        assert_eq!(
            queries::service_up("redis_cache"),
            "up{job=~\".*redis_cache.*\"}"
        );
    }
}
