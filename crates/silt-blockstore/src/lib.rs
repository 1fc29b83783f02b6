//! # Silt Blockstore
//!
//! Content-addressed block storage consumed by the silt tree engine.
//!
//! This crate provides:
//! - **BlockStore trait**: Post, get and existence checks for opaque blobs
//! - **Refs**: Content identifiers derived from BLAKE3
//! - **Memory store**: A `DashMap`-backed store for tests and scratch trees
//! - **Caching**: In-memory LRU cache for hot nodes
//! - **Verification**: A wrapper that re-derives the ref of every blob it reads
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Tree engine (silt-core)          │
//! ├─────────────────────────────────────────┤
//! │           BlockStore Trait              │
//! ├─────────────┬─────────────┬─────────────┤
//! │  Verifying  │   Cached    │ MemoryStore │
//! └─────────────┴─────────────┴─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use silt_blockstore::{BlockStore, MemoryBlockStore};
//!
//! let store = MemoryBlockStore::new();
//! let r = store.put_block(&data).await?;
//! let retrieved = store.get_block(&r).await?;
//! ```

pub mod error;
pub mod memory;
pub mod refs;
pub mod verify;

pub use error::{BlockStoreError, Result};
pub use memory::{CachedBlockStore, MemoryBlockStore};
pub use refs::{create_ref, parse_ref, read_ref, verify_ref, Ref, REF_SIZE};
pub use verify::VerifyingBlockStore;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Maximum block size accepted by the default stores (1 MB)
pub const MAX_BLOCK_SIZE: usize = 1024 * 1024;

/// Trait for content-addressed block storage backends.
///
/// Implementations must allow concurrent `get_block` / `put_block` calls from
/// several tasks. A ref returned by `put_block` must be the content address of
/// exactly the bytes later returned by `get_block`.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Store a block and return its ref
    async fn put_block(&self, data: &[u8]) -> Result<Ref>;

    /// Retrieve a block by ref
    async fn get_block(&self, r: &Ref) -> Result<Bytes>;

    /// Check if a block exists
    async fn has_block(&self, r: &Ref) -> Result<bool>;

    /// Get block size without retrieving content
    async fn block_size(&self, r: &Ref) -> Result<u64>;

    /// Largest blob this store accepts
    fn max_block_size(&self) -> usize;
}

#[async_trait]
impl<S: BlockStore + ?Sized> BlockStore for Arc<S> {
    async fn put_block(&self, data: &[u8]) -> Result<Ref> {
        (**self).put_block(data).await
    }

    async fn get_block(&self, r: &Ref) -> Result<Bytes> {
        (**self).get_block(r).await
    }

    async fn has_block(&self, r: &Ref) -> Result<bool> {
        (**self).has_block(r).await
    }

    async fn block_size(&self, r: &Ref) -> Result<u64> {
        (**self).block_size(r).await
    }

    fn max_block_size(&self) -> usize {
        (**self).max_block_size()
    }
}
