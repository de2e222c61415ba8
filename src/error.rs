//! Error types for the collector pipeline.
//!
//! Duplicate primary keys are not errors here: the store counts them in
//! [`InsertReport`](crate::store::InsertReport). An empty watermark query is
//! `Ok(None)` rather than an error.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, CollectorError>;

#[derive(Error, Debug)]
pub enum CollectorError {
    /// HTTP source unreachable, timed out, or answered with a non-success status.
    #[error("Connectivity error ({source_name}): {message}")]
    Connectivity {
        source_name: String,
        message: String,
    },

    /// Response body was not the JSON shape the adapter expects.
    #[error("Decode error ({source_name}): {message}")]
    Decode {
        source_name: String,
        message: String,
    },

    /// A single field could not be converted to its canonical type.
    #[error("Conversion error ({source_name}): field '{field}' has unusable value '{value}'")]
    Conversion {
        source_name: String,
        field: &'static str,
        value: String,
    },

    /// Database error other than a duplicate natural key.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Invalid configuration value or unknown source name.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CollectorError {
    pub fn connectivity(source_name: &str, err: impl std::fmt::Display) -> Self {
        CollectorError::Connectivity {
            source_name: source_name.to_string(),
            message: err.to_string(),
        }
    }

    pub fn decode(source_name: &str, err: impl std::fmt::Display) -> Self {
        CollectorError::Decode {
            source_name: source_name.to_string(),
            message: err.to_string(),
        }
    }

    pub fn conversion(source_name: &str, field: &'static str, value: impl Into<String>) -> Self {
        CollectorError::Conversion {
            source_name: source_name.to_string(),
            field,
            value: value.into(),
        }
    }
}
