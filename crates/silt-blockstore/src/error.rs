//! Error types for the silt-blockstore crate

use crate::Ref;
use thiserror::Error;

/// Result type alias using `BlockStoreError`
pub type Result<T> = std::result::Result<T, BlockStoreError>;

/// Errors that can occur during block storage operations
#[derive(Error, Debug)]
pub enum BlockStoreError {
    /// Block not found
    #[error("block not found: {0}")]
    NotFound(Ref),

    /// Invalid ref bytes or string
    #[error("invalid ref: {0}")]
    InvalidCid(String),

    /// Block too large
    #[error("block too large: {size} bytes exceeds maximum {max} bytes")]
    BlockTooLarge { size: usize, max: usize },

    /// Stored bytes do not hash to the requested ref
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<cid::Error> for BlockStoreError {
    fn from(err: cid::Error) -> Self {
        BlockStoreError::InvalidCid(err.to_string())
    }
}
