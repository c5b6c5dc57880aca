//! Error type shared by the registry, the profile loader and the resolver.
//!
//! Public `HostCache` operations never surface these to their caller: they log
//! and return a sentinel (`false`, `None`, `0`). The `Result`-returning helpers
//! (file loaders, neighbor table scans, profile parsing) use this type.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Device profile rejected: {0}")]
    MissingProfileUuid(String),

    #[error("Unknown evidence field: {0}")]
    UnknownField(String),

    #[error("Invalid confidence level for {field}: {value}")]
    InvalidConfidence { field: String, value: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Document is not a JSON array")]
    NotAnArray,

    #[error("Transport failed with status {status}")]
    Transport { status: u16 },
}
