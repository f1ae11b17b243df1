//! Error types for the data-store seam

use thiserror::Error;

/// Errors raised by a connection provider or an open connection.
///
/// These never escape a runner directly: connection failures become
/// query-level errors or degraded throughput, execution failures become
/// failed samples.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not hand out a connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A statement failed to prepare, execute or step.
    #[error("execution failed: {0}")]
    Execute(String),

    /// `SQLite` error from the underlying driver
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect(message.into())
    }

    pub fn execute(message: impl Into<String>) -> Self {
        Self::Execute(message.into())
    }

    /// Whether the error is a `SQLITE_BUSY`/`SQLITE_LOCKED` condition.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Self::Connect(msg) | Self::Execute(msg) => {
                let lower = msg.to_ascii_lowercase();
                lower.contains("database is locked") || lower.contains("busy")
            }
            Self::Sqlite(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_detection_from_message() {
        assert!(StoreError::execute("database is locked").is_busy());
        assert!(!StoreError::execute("no such table: orders").is_busy());
    }

    #[test]
    fn display_names_the_stage() {
        assert_eq!(
            StoreError::connect("refused").to_string(),
            "connect failed: refused"
        );
    }
}
