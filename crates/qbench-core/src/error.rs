//! Error types for qbench
//!
//! Errors below the query level (a failed probe) never show up here: they are
//! recorded as failed samples. Everything in this module is either fatal for
//! the run (configuration, catalog) or fatal for one query.

use thiserror::Error;

use crate::models::Phase;

/// Result type alias for qbench operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for qbench
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Configuration Errors (fatal, raised before any work starts)
    // ==========================================================================
    #[error("Invalid configuration for {field}: {message}")]
    Config {
        field: &'static str,
        message: String,
    },

    #[error("Failed to read config file {path}: {message}")]
    ConfigFile { path: String, message: String },

    #[error("Invalid query catalog: {0}")]
    Catalog(String),

    // ==========================================================================
    // Statistics
    // ==========================================================================
    #[error("statistics require at least one sample")]
    EmptySamples,

    #[error("invalid sample duration: {0} (expected a finite, non-negative value)")]
    InvalidSample(f64),

    // ==========================================================================
    // Query-level Errors
    // ==========================================================================
    #[error("query {query_number} failed during {phase}: {message}")]
    Query {
        query_number: u32,
        phase: Phase,
        message: String,
    },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Create a configuration error for one field.
    pub fn config(field: &'static str, message: impl Into<String>) -> Self {
        Self::Config {
            field,
            message: message.into(),
        }
    }

    /// Create a query-level error carrying the query number and phase.
    pub fn query(query_number: u32, phase: Phase, message: impl Into<String>) -> Self {
        Self::Query {
            query_number,
            phase,
            message: message.into(),
        }
    }

    /// Whether this error must stop the process before any benchmark work.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::ConfigFile { .. } | Self::Catalog(_)
        )
    }
}
