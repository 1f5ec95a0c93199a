//! Error types for MultiDB
//!
//! This module defines all error types used by the catalog, the session
//! manager and the query broadcaster.

use thiserror::Error;

/// The main error type for MultiDB
#[derive(Error, Debug)]
pub enum Error {
    // ========== Catalog Load Errors ==========
    #[error("Load error: malformed connection file - {0}")]
    MalformedCatalog(String),

    #[error("Load error: duplicate connection name '{0}'")]
    DuplicateConnection(String),

    #[error("Load error: entry {index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("Load error: invalid locator for connection '{name}': {reason}")]
    InvalidLocator { name: String, reason: String },

    // ========== Connect Errors ==========
    #[error("Connect error: no connection named '{0}' found")]
    UnknownConnection(String),

    #[error("Connect error: unsupported database type '{kind}' for connection '{name}'")]
    UnsupportedKind { name: String, kind: String },

    #[error("Connect error: failed to connect to {name}: {source}")]
    DriverError {
        name: String,
        #[source]
        source: sqlx::Error,
    },

    // ========== Execution Errors ==========
    #[error("Execution error: no database is selected")]
    NoActiveConnection,

    #[error("Execution error: batch cancelled")]
    Cancelled,

    #[error("Execution error: connection '{0}' is closed")]
    ConnectionClosed(String),

    #[error("{0}")]
    Driver(#[from] sqlx::Error),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedCatalog(e.to_string())
    }
}

/// Result type alias for MultiDB operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownConnection("reporting".to_string());
        assert_eq!(
            err.to_string(),
            "Connect error: no connection named 'reporting' found"
        );

        let err = Error::MissingField {
            index: 2,
            field: "type",
        };
        assert_eq!(
            err.to_string(),
            "Load error: entry 2 is missing required field 'type'"
        );
    }

    #[test]
    fn test_driver_message_passes_through() {
        let err = Error::from(sqlx::Error::Protocol("no such table: t".to_string()));
        assert!(err.to_string().contains("no such table: t"));
    }
}
