//! Error types for the silt-core crate

use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while encoding, building or reading trees
#[derive(Error, Debug)]
pub enum CoreError {
    /// Node bytes ended inside a record
    #[error("truncated record: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// Varint longer than 64 bits
    #[error("varint overflows u64")]
    VarintOverflow,

    /// Backspace reaches past the start of the previous key
    #[error("backspace {backspace} exceeds previous key length {prev_len}")]
    BackspaceOverflow { backspace: u64, prev_len: usize },

    /// Key exceeds the maximum key size
    #[error("key of {len} bytes exceeds maximum {max} bytes")]
    KeyTooLarge { len: usize, max: usize },

    /// Encoded entry cannot fit in a single node
    #[error("encoded entry of {len} bytes exceeds node maximum {max} bytes")]
    EntryTooLarge { len: usize, max: usize },

    /// Index value is not a valid ref
    #[error("invalid child ref: {0}")]
    InvalidRef(String),

    /// Structurally inconsistent node or root
    #[error("corrupt tree: {0}")]
    Corrupt(String),

    /// Tree grew past the supported depth
    #[error("tree depth exceeds maximum {max}")]
    DepthExceeded { max: usize },

    /// Invalid configuration loaded from outside the program
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Block store error
    #[error("block store error: {0}")]
    BlockStore(#[from] silt_blockstore::BlockStoreError),

    /// IO error while reading a byte stream
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
