//! Error types for xtiming-store

use thiserror::Error;

use crate::digest::BlockDigest;

/// Errors raised by the artifact persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No block stored under this digest
    #[error("block not found: {0}")]
    NotFound(BlockDigest),

    /// Digest string is not 64 hex characters
    #[error("invalid digest hex: {0}")]
    InvalidDigest(String),

    /// A persisted entry exists but cannot be trusted
    #[error("corrupt entry at {location}: {reason}")]
    Corrupt { location: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn corrupt(location: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that mean "the entry is unusable", as opposed to
    /// environment failures such as a read-only disk.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::Corrupt { .. }
                | StoreError::NotFound(_)
                | StoreError::InvalidDigest(_)
                | StoreError::Serialization(_)
        )
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
