use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Errors raised inside an agent's loops
///
/// These never escape the runtime: the background loop logs them and backs
/// off, the message loop logs them and moves on to the next envelope.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Metric source unavailable: {0}")]
    MetricSource(String),

    #[error("Outgoing channel closed: {0}")]
    Delivery(String),

    #[error("Insight generation failed: {0}")]
    Insight(#[from] InsightError),
}

/// Errors inside the Prometheus-style metric source implementation
///
/// Translated to a failed `QueryOutcome` at the trait boundary; callers of
/// `MetricSource` only ever see the status field.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Query returned status {0}")]
    QueryStatus(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Errors from the insight generator
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Insight backend unavailable: {0}")]
    Unavailable(String),

    #[error("Insight generation failed: {0}")]
    Generation(String),
}

/// Errors raised by a workflow node
///
/// Caught by the executor, recorded into the shared state's error field;
/// the remaining nodes still run.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Missing workflow parameter: {0}")]
    MissingParameter(String),

    #[error("Node failed: {0}")]
    NodeFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
