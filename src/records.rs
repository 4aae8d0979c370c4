//! Core record types shared across the agent system
//!
//! This module defines the fundamental data structures exchanged between the
//! health monitoring agent, the analysis agent, and the API layer: health
//! metrics, alerts, analysis results, and agent status snapshots.

use crate::registry::ImpactLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Health status levels for a service or metric
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Service is operating normally
    Healthy,
    /// Service shows degradation that may require attention
    Warning,
    /// Service requires immediate attention
    Critical,
    /// Health could not be determined
    Unknown,
}

impl HealthStatus {
    /// Parse a status string from an external snapshot; anything outside the
    /// known set maps to `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value {
            "healthy" => HealthStatus::Healthy,
            "warning" => HealthStatus::Warning,
            "critical" => HealthStatus::Critical,
            _ => HealthStatus::Unknown,
        }
    }

    /// Lowercase label used in human-readable messages
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        }
    }

    /// Emoji prefix used in alert and insight messages
    pub fn emoji(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "✅",
            HealthStatus::Warning => "⚠️",
            HealthStatus::Critical => "🚨",
            HealthStatus::Unknown => "❓",
        }
    }
}

/// Qualitative direction of a metric over recent samples
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

impl Trend {
    /// Lowercase label used in human-readable messages
    pub fn label(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Degrading => "degrading",
        }
    }
}

/// A single health observation for one service/metric pair
///
/// Produced by the health monitoring agent on every monitoring pass and
/// retained in a bounded per-service history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthMetric {
    /// Service the observation belongs to ("system" for fleet-wide metrics)
    pub service_name: String,
    /// Metric family, e.g. `service_health` or `cache_hit_ratio`
    pub metric_name: String,
    /// Observed value
    pub current_value: f64,
    /// Warning threshold, if the metric has one
    pub threshold_warning: Option<f64>,
    /// Critical threshold, if the metric has one
    pub threshold_critical: Option<f64>,
    /// Status derived from value and thresholds
    pub status: HealthStatus,
    /// When the observation was taken
    pub timestamp: Timestamp,
    /// Direction relative to recent same-metric samples
    pub trend: Trend,
}

/// Threshold and trend context attached to an alert
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertDetails {
    pub metric_name: String,
    pub current_value: f64,
    pub threshold_warning: Option<f64>,
    pub threshold_critical: Option<f64>,
    pub trend: Trend,
}

/// An active or resolved health alert
///
/// Created by the health monitoring agent when a metric crosses into warning
/// or critical and no equivalent alert exists within the cooldown window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthAlert {
    pub alert_id: String,
    pub service_name: String,
    pub category: String,
    pub severity: HealthStatus,
    pub message: String,
    pub details: AlertDetails,
    pub timestamp: Timestamp,
    pub resolved: bool,
}

/// Kinds of analysis the analysis agent performs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    RootCause,
    Correlation,
    Trend,
    Prediction,
    Dependency,
}

/// Impact assessment from the correlation pass of an analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrelationAssessment {
    /// Alerting service plus dependents and same-category services
    pub affected_services: Vec<String>,
    pub impact: ImpactLevel,
    pub correlation_score: f64,
}

/// Structured context attached to an analysis result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AnalysisDetails {
    pub alert: Option<HealthAlert>,
    pub metric: Option<HealthMetric>,
    pub correlation: Option<CorrelationAssessment>,
    /// Set once the triggering alert has been resolved; feeds the
    /// common-solution harvest over past incidents.
    pub resolved: bool,
}

/// Outcome of one analysis pass over an alert or scheduled scan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub analysis_id: String,
    pub analysis_type: AnalysisType,
    /// Description of what triggered the analysis
    pub trigger_event: String,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    /// Accumulated confidence, capped at 1.0
    pub confidence: f64,
    pub affected_services: Vec<String>,
    pub timestamp: Timestamp,
    pub details: AnalysisDetails,
}

/// A metric correlated with another, with its Pearson coefficient
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrelatedMetric {
    pub metric: String,
    pub coefficient: f64,
}

/// Latest health picture for one service, answered to health queries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceHealthSummary {
    pub service_name: String,
    pub current_status: HealthStatus,
    pub last_updated: Timestamp,
    pub trend: Trend,
    /// Samples observed for the service within the last hour
    pub metrics_count: usize,
}

/// Fleet-wide health counts, answered to overview queries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemHealthOverview {
    pub total_services: usize,
    pub healthy_services: usize,
    pub warning_services: usize,
    pub critical_services: usize,
    pub health_percentage: f64,
    pub active_alerts: usize,
    pub last_updated: Timestamp,
}

/// Types of agents in the system
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Health,
    Analysis,
    Query,
    Dashboard,
    Orchestrator,
}

/// Runtime snapshot of a single agent, consumable by the API layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentStatus {
    pub agent_id: String,
    pub agent_type: AgentKind,
    pub is_running: bool,
    pub messages_processed: u64,
    pub uptime_seconds: f64,
    pub last_activity: Timestamp,
    pub queue_size: usize,
    pub subscribers: usize,
    pub context_items: usize,
}

/// Agent status plus agent-specific counters, answered to status queries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeStatusReport {
    pub status: AgentStatus,
    /// Per-agent extras, e.g. active alert or tracked correlation counts
    pub extras: Map<String, Value>,
}
