//! Error types for popup-core operations.
//!
//! Every variant is non-fatal to the host page. The engine logs and absorbs
//! them; the enum exists so callers and tests can see *why* a feature stayed
//! quiet.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ─────────────────────────────────────────────────────────────────────
    // Startup Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Popup configuration unavailable: {reason}")]
    ConfigUnavailable { reason: String },

    #[error("Popup container not found on host page")]
    ContainerMissing,

    #[error("No purchase action anchor found for counter badge")]
    AnchorNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // Runtime Conditions
    // ─────────────────────────────────────────────────────────────────────
    #[error("Stored dismissal count is not a non-negative integer: {raw:?}")]
    StorageCorrupt { raw: String },

    #[error("Activity feed is empty")]
    FeedExhausted,

    // ─────────────────────────────────────────────────────────────────────
    // Storage Backend Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Storage I/O error: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage file malformed: {path}: {source}")]
    StorageMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl EngineError {
    pub fn config(reason: impl Into<String>) -> Self {
        EngineError::ConfigUnavailable {
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<EngineError> for String {
    fn from(err: EngineError) -> String {
        err.to_string()
    }
}
