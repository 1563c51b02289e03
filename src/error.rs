//! Error types for loading profiles and configuration
//!
//! The attribution and aggregation passes never fail; malformed geometry shows
//! up as staled records in [`crate::diagnostics::AttributionDiagnostics`].
//! Only the surfaces that touch files, documents and user configuration can
//! return an [`OpmemError`].

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, OpmemError>;

/// Errors that can occur while loading inputs or configuration
#[derive(Error, Debug)]
pub enum OpmemError {
    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid profile document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid call tree for thread {tid}: {reason}")]
    InvalidTree { tid: u64, reason: String },

    #[error("Attribution worker panicked: {0}")]
    WorkerPanicked(String),
}
