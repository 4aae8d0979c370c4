//! Message envelope and payload types for agent communication
//!
//! Every exchange between agents travels as an [`Envelope`] routed by the
//! communication hub. Payloads are a closed tagged union per message kind, so
//! consumers pattern-match on a known set instead of probing string keys in
//! an untyped map. Envelopes are immutable once created.

use crate::records::{
    AnalysisResult, CorrelatedMetric, HealthAlert, HealthMetric, RuntimeStatusReport,
    ServiceHealthSummary, SystemHealthOverview, Timestamp,
};
use crate::registry::ServiceDependency;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Recipient sentinel: deliver to every registered agent except the sender
pub const BROADCAST: &str = "broadcast";

/// Lowest priority; routine queries and responses
pub const PRIORITY_LOW: u8 = 1;
/// Elevated priority; warning-level alerts
pub const PRIORITY_MEDIUM: u8 = 2;
/// High priority; critical alerts
pub const PRIORITY_HIGH: u8 = 3;
/// Highest priority
pub const PRIORITY_CRITICAL: u8 = 4;

static ENVELOPE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Kind of a message, derived from its payload variant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Query,
    Response,
    Alert,
    Insight,
    Action,
    Status,
}

/// Query payloads answered by the health or analysis agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryPayload {
    /// Latest health picture for one service
    ServiceHealth { service_name: String },
    /// Fleet-wide health counts
    SystemOverview,
    /// Currently active alerts
    ActiveAlerts,
    /// Runtime status of the answering agent
    RuntimeStatus,
    /// Cached metric correlations for a service or metric name
    Correlation { service_name: String },
    /// Dependency-graph entry for a service
    Dependencies { service_name: String },
    /// Most recent analysis results
    RecentAnalyses,
}

/// Response payloads, one variant per query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    ServiceHealth { health: ServiceHealthSummary },
    SystemOverview { overview: SystemHealthOverview },
    ActiveAlerts { alerts: Vec<HealthAlert> },
    RuntimeStatus { report: RuntimeStatusReport },
    Correlations { correlations: Vec<CorrelatedMetric> },
    Dependencies { dependency: Option<ServiceDependency> },
    RecentAnalyses { analyses: Vec<AnalysisResult> },
    /// The query could not be answered
    Error { message: String },
}

/// A health alert together with the metric that raised it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertPayload {
    pub alert: HealthAlert,
    pub metric: HealthMetric,
}

/// A completed analysis broadcast to any interested consumer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightPayload {
    pub analysis: AnalysisResult,
    /// Human-readable summary of the analysis
    pub summary: String,
}

/// Status notices between agents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusPayload {
    AlertResolved {
        alert: HealthAlert,
        resolved_at: Timestamp,
    },
}

/// An action request; reserved in the wire contract
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionPayload {
    pub command: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Message payload, tagged by kind
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    Query(QueryPayload),
    Response(ResponsePayload),
    Alert(AlertPayload),
    Insight(InsightPayload),
    Status(StatusPayload),
    Action(ActionPayload),
}

impl Payload {
    /// Message kind of this payload
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Query(_) => MessageKind::Query,
            Payload::Response(_) => MessageKind::Response,
            Payload::Alert(_) => MessageKind::Alert,
            Payload::Insight(_) => MessageKind::Insight,
            Payload::Status(_) => MessageKind::Status,
            Payload::Action(_) => MessageKind::Action,
        }
    }
}

/// The message unit exchanged between agents via the bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Unique envelope identity
    pub id: String,
    /// Agent id of the sender
    pub sender: String,
    /// Agent id of the recipient, or [`BROADCAST`]
    pub recipient: String,
    pub payload: Payload,
    pub timestamp: Timestamp,
    /// 1 (low) to 4 (critical), clamped on construction
    pub priority: u8,
    /// Optional free-form context for the consumer
    pub context: Option<Map<String, Value>>,
}

impl Envelope {
    /// Create an envelope with an explicit priority
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        payload: Payload,
        priority: u8,
    ) -> Self {
        let sender = sender.into();
        let timestamp = Utc::now();
        let seq = ENVELOPE_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("{}-{}-{}", sender, timestamp.timestamp_millis(), seq),
            sender,
            recipient: recipient.into(),
            payload,
            timestamp,
            priority: priority.clamp(PRIORITY_LOW, PRIORITY_CRITICAL),
            context: None,
        }
    }

    /// Low-priority query envelope
    pub fn query(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        query: QueryPayload,
    ) -> Self {
        Self::new(sender, recipient, Payload::Query(query), PRIORITY_LOW)
    }

    /// Low-priority response envelope
    pub fn response(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        response: ResponsePayload,
    ) -> Self {
        Self::new(sender, recipient, Payload::Response(response), PRIORITY_LOW)
    }

    /// Alert envelope at the given priority
    pub fn alert(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        alert: AlertPayload,
        priority: u8,
    ) -> Self {
        Self::new(sender, recipient, Payload::Alert(alert), priority)
    }

    /// Insight envelope at the given priority
    pub fn insight(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        insight: InsightPayload,
        priority: u8,
    ) -> Self {
        Self::new(sender, recipient, Payload::Insight(insight), priority)
    }

    /// Low-priority status envelope
    pub fn status(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        status: StatusPayload,
    ) -> Self {
        Self::new(sender, recipient, Payload::Status(status), PRIORITY_LOW)
    }

    /// Attach free-form context
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    /// Message kind, derived from the payload
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// True when the envelope is addressed to every agent
    pub fn is_broadcast(&self) -> bool {
        self.recipient == BROADCAST
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{AlertDetails, HealthStatus, Trend};

    fn sample_alert() -> HealthAlert {
        HealthAlert {
            alert_id: "payment_service_service_health_1700000000".to_string(),
            service_name: "payment_service".to_string(),
            category: "core".to_string(),
            severity: HealthStatus::Critical,
            message: "🚨 payment_service service is critical".to_string(),
            details: AlertDetails {
                metric_name: "service_health".to_string(),
                current_value: 0.0,
                threshold_warning: Some(1.0),
                threshold_critical: Some(0.0),
                trend: Trend::Degrading,
            },
            timestamp: Utc::now(),
            resolved: false,
        }
    }

    fn sample_metric() -> HealthMetric {
        HealthMetric {
            service_name: "payment_service".to_string(),
            metric_name: "service_health".to_string(),
            current_value: 0.0,
            threshold_warning: Some(1.0),
            threshold_critical: Some(0.0),
            status: HealthStatus::Critical,
            timestamp: Utc::now(),
            trend: Trend::Degrading,
        }
    }

    #[test]
    fn test_envelope_ids_are_unique() {
        let a = Envelope::query("executor", "health_agent", QueryPayload::SystemOverview);
        let b = Envelope::query("executor", "health_agent", QueryPayload::SystemOverview);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_priority_is_clamped() {
        let envelope = Envelope::new(
            "a",
            "b",
            Payload::Query(QueryPayload::ActiveAlerts),
            9,
        );
        assert_eq!(envelope.priority, PRIORITY_CRITICAL);

        let envelope = Envelope::new(
            "a",
            "b",
            Payload::Query(QueryPayload::ActiveAlerts),
            0,
        );
        assert_eq!(envelope.priority, PRIORITY_LOW);
    }

    #[test]
    fn test_kind_follows_payload() {
        let envelope = Envelope::alert(
            "health_agent",
            "analysis_agent",
            AlertPayload {
                alert: sample_alert(),
                metric: sample_metric(),
            },
            PRIORITY_HIGH,
        );
        assert_eq!(envelope.kind(), MessageKind::Alert);
        assert!(!envelope.is_broadcast());
    }

    #[test]
    fn test_broadcast_detection() {
        let envelope = Envelope::status(
            "health_agent",
            BROADCAST,
            StatusPayload::AlertResolved {
                alert: sample_alert(),
                resolved_at: Utc::now(),
            },
        );
        assert!(envelope.is_broadcast());
    }

    #[test]
    fn test_payload_serialization_carries_kind_tag() {
        let envelope = Envelope::query("executor", "health_agent", QueryPayload::SystemOverview);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["payload"]["kind"], "query");
        assert_eq!(json["payload"]["type"], "system_overview");

        let restored: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(restored, envelope);
    }

    #[test]
    fn test_alert_payload_round_trip() {
        let envelope = Envelope::alert(
            "health_agent",
            "analysis_agent",
            AlertPayload {
                alert: sample_alert(),
                metric: sample_metric(),
            },
            PRIORITY_MEDIUM,
        );
        let json = serde_json::to_string(&envelope).unwrap();
        let restored: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, envelope);
    }

    #[test]
    fn test_response_error_serialization() {
        let payload = Payload::Response(ResponsePayload::Error {
            message: "Unable to process health query".to_string(),
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "response");
        assert_eq!(json["type"], "error");
    }

    #[test]
    fn test_action_payload_round_trip() {
        let mut arguments = Map::new();
        arguments.insert("target".to_string(), Value::from("payment_service"));
        let envelope = Envelope::new(
            "executor",
            "health_agent",
            Payload::Action(ActionPayload {
                command: "refresh".to_string(),
                arguments,
            }),
            PRIORITY_LOW,
        );
        let json = serde_json::to_string(&envelope).unwrap();
        let restored: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.kind(), MessageKind::Action);
        assert_eq!(restored, envelope);
    }
}
