//! Error types for the analyst pipeline.
//!
//! Defines the main error enum used throughout the application. Validator
//! and availability failures are recovered into fallback paths where one
//! exists; only true dead-ends reach the caller.

use thiserror::Error;

/// Main error type for analyst operations.
#[derive(Error, Debug)]
pub enum AnalystError {
    /// A required credential or connection setting is absent. Handled by a
    /// mode downgrade, never surfaced as a hard failure.
    #[error("Configuration incomplete: {0}")]
    ConfigurationIncomplete(String),

    /// Malformed configuration (bad TOML, invalid connection string, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The language model or the warehouse could not be reached.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The language model rejected the request for quota/rate reasons.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The candidate SQL is not a single read-only statement.
    #[error("Unsafe statement: {0}")]
    UnsafeStatement(String),

    /// The candidate SQL references a table outside the catalog.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// A business rule references a table absent from the catalog.
    /// Raised at startup, before any request is served.
    #[error("Schema missing: {0}")]
    SchemaMissing(String),

    /// The warehouse rejected the validated SQL.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalystError {
    /// Creates a configuration-incomplete error with the given message.
    pub fn incomplete(msg: impl Into<String>) -> Self {
        Self::ConfigurationIncomplete(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a service-unavailable error with the given message.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Creates an unsafe-statement error with the given message.
    pub fn unsafe_statement(msg: impl Into<String>) -> Self {
        Self::UnsafeStatement(msg.into())
    }

    /// Creates an unknown-table error for the given table name.
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable(table.into())
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigurationIncomplete(_) => "Configuration Incomplete",
            Self::Config(_) => "Configuration Error",
            Self::ServiceUnavailable(_) => "Service Unavailable",
            Self::QuotaExceeded(_) => "Quota Exceeded",
            Self::UnsafeStatement(_) => "Unsafe Statement",
            Self::UnknownTable(_) => "Unknown Table",
            Self::SchemaMissing(_) => "Schema Missing",
            Self::Execution(_) => "Execution Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns true if the error should trigger a mode downgrade instead of
    /// failing the request.
    pub fn is_downgrade(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationIncomplete(_) | Self::ServiceUnavailable(_) | Self::QuotaExceeded(_)
        )
    }

    /// A message suitable for a non-technical user. Validator rejections and
    /// warehouse errors keep their detail server-side (in the logs).
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsafeStatement(_) | Self::UnknownTable(_) => {
                "Could not generate a safe query for that question.".to_string()
            }
            Self::Execution(_) => "The query failed to run. Please try again.".to_string(),
            Self::ServiceUnavailable(_) | Self::QuotaExceeded(_) => {
                "A backing service is unavailable. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias using AnalystError.
pub type Result<T> = std::result::Result<T, AnalystError>;
