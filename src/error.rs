use thiserror::Error;

/// Main error type for the KPI engine
#[derive(Error, Debug)]
pub enum KpiError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Metric source errors
    #[error("Metric source {source_name} failed: {reason}")]
    Source { source_name: String, reason: String },

    #[error("Query not resolved before execution: {0}")]
    UnresolvedQuery(String),

    // Aggregation cycle errors
    #[error("Aggregation cycle failed: {0}")]
    CycleFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Dashboard service stopped")]
    ServiceStopped,

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl KpiError {
    pub fn source_failed(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        KpiError::Source {
            source_name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures of the orchestration itself rather than of one source
    pub fn is_cycle_failure(&self) -> bool {
        matches!(
            self,
            KpiError::CycleFailed(_) | KpiError::Cancelled | KpiError::ServiceStopped
        )
    }
}

/// Result type alias for KpiError
pub type Result<T> = std::result::Result<T, KpiError>;
