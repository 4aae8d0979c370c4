//! Application configuration
//!
//! TOML-backed configuration with defaults for every section, so a missing
//! or partial file still yields a runnable setup. Validation rejects values
//! the runtime cannot operate with.

use crate::error::ConfigError;
use crate::registry::ServiceSpec;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub monitoring: MonitoringConfig,
    pub analysis: AnalysisConfig,
    pub bus: BusConfig,
    pub metrics: MetricsConfig,
    /// Optional fleet declaration; empty falls back to the built-in fleet
    pub services: Vec<ServiceSpec>,
}

/// Health monitoring agent settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Seconds between monitoring passes
    pub interval_seconds: u64,
    /// Minimum seconds between alerts for the same (service, metric) pair
    pub alert_cooldown_seconds: u64,
    /// Retained samples per service
    pub history_limit: usize,
    /// Agent id alerts are addressed to
    pub alert_recipient: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
            alert_cooldown_seconds: 300,
            history_limit: 100,
            alert_recipient: "analysis_agent".to_string(),
        }
    }
}

/// Analysis agent settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum absolute Pearson coefficient worth caching
    pub correlation_threshold: f64,
    /// Seconds between background correlation passes
    pub correlation_interval_seconds: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            correlation_threshold: 0.7,
            correlation_interval_seconds: 300,
        }
    }
}

/// Communication hub settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Delivered-envelope ring capacity
    pub history_limit: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_limit: 1000,
        }
    }
}

/// Metric source selection
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsBackend {
    /// Prometheus-compatible HTTP endpoint
    Prometheus,
    /// Canned in-memory values, for offline runs
    Static,
}

/// Metric source settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub backend: MetricsBackend,
    pub endpoint: String,
    pub timeout_seconds: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            backend: MetricsBackend::Prometheus,
            endpoint: "http://localhost:9090".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` when the file cannot be read,
    /// `ConfigError::TomlError` on malformed TOML, and
    /// `ConfigError::ValidationError` when a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section for values the runtime cannot operate with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitoring.interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "monitoring.interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.monitoring.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "monitoring.history_limit must be greater than zero".to_string(),
            ));
        }
        if self.monitoring.alert_recipient.is_empty() {
            return Err(ConfigError::ValidationError(
                "monitoring.alert_recipient must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.analysis.correlation_threshold)
            || self.analysis.correlation_threshold == 0.0
        {
            return Err(ConfigError::ValidationError(
                "analysis.correlation_threshold must be in (0, 1]".to_string(),
            ));
        }
        if self.bus.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "bus.history_limit must be greater than zero".to_string(),
            ));
        }
        if self.metrics.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "metrics.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.monitoring.interval_seconds, 30);
        assert_eq!(config.monitoring.alert_cooldown_seconds, 300);
        assert_eq!(config.monitoring.history_limit, 100);
        assert_eq!(config.monitoring.alert_recipient, "analysis_agent");
        assert_eq!(config.analysis.correlation_threshold, 0.7);
        assert_eq!(config.bus.history_limit, 1000);
        assert_eq!(config.metrics.backend, MetricsBackend::Prometheus);
        assert!(config.services.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[monitoring]
interval_seconds = 10

[metrics]
backend = "static"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.monitoring.interval_seconds, 10);
        // Unspecified fields fall back to defaults
        assert_eq!(config.monitoring.alert_cooldown_seconds, 300);
        assert_eq!(config.metrics.backend, MetricsBackend::Static);
        assert_eq!(config.metrics.endpoint, "http://localhost:9090");
    }

    #[test]
    fn test_services_section() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[services]]
name = "search_service"
category = "core"
depends_on = ["postgres_primary"]
dependency_types = ["database"]
impact = "high"

[[services]]
name = "postgres_primary"
category = "infrastructure"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[0].name, "search_service");
        assert_eq!(config.services[0].depends_on, vec!["postgres_primary"]);
        assert_eq!(
            config.services[1].impact,
            crate::registry::ImpactLevel::Medium
        );
    }

    #[test]
    fn test_validation_rejects_zero_interval() {
        let mut config = Config::default();
        config.monitoring.interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_threshold() {
        let mut config = Config::default();
        config.analysis.correlation_threshold = 0.0;
        assert!(config.validate().is_err());
        config.analysis.correlation_threshold = 1.5;
        assert!(config.validate().is_err());
        config.analysis.correlation_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = Config::from_file(Path::new("/nonexistent/fleetwatch.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml [").unwrap();
        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }
}
