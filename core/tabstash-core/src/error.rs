//! Error types for tabstash-core operations.
//!
//! Expected absences (no identity mapped, no snapshot stored, liveness probe
//! negative) are `Option`/`bool` results, not errors. These variants cover
//! the failures that terminate an operation.

/// All errors that can occur in tabstash-core operations.
#[derive(Debug, thiserror::Error)]
pub enum StashError {
    // ─────────────────────────────────────────────────────────────────────
    // Host API Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Host API call failed: {context}: {message}")]
    Host { context: String, message: String },

    // ─────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Data Shape Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Persisted value for {key} has an invalid shape: {details}")]
    InvalidShape { key: String, details: String },

    #[error("Import rejected: {0}")]
    ImportRejected(String),
}

impl StashError {
    /// Builds a host-API error with a call-site context label.
    pub fn host(context: impl Into<String>, message: impl Into<String>) -> Self {
        StashError::Host {
            context: context.into(),
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results using StashError.
pub type Result<T> = std::result::Result<T, StashError>;
