//! In-memory block store for testing and caching

use crate::{create_ref, BlockStore, BlockStoreError, Ref, Result, MAX_BLOCK_SIZE};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::trace;

/// An in-memory block store
#[derive(Clone)]
pub struct MemoryBlockStore {
    blocks: Arc<DashMap<Ref, Bytes>>,
    max_block_size: usize,
}

impl MemoryBlockStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::with_max_block_size(MAX_BLOCK_SIZE)
    }

    /// Create a store that rejects blocks larger than `max_block_size`
    pub fn with_max_block_size(max_block_size: usize) -> Self {
        Self {
            blocks: Arc::new(DashMap::new()),
            max_block_size,
        }
    }

    /// Get the number of blocks stored
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// List all refs
    pub fn list_refs(&self) -> Vec<Ref> {
        self.blocks.iter().map(|entry| *entry.key()).collect()
    }

    /// Drop every block for which `keep` returns false.
    ///
    /// Retention is the caller's decision; this is the hook a collector uses
    /// after marking the refs reachable from its live roots.
    pub fn retain(&self, mut keep: impl FnMut(&Ref) -> bool) -> usize {
        let before = self.blocks.len();
        self.blocks.retain(|r, _| keep(r));
        before - self.blocks.len()
    }

    /// Overwrite the bytes stored under `r` without re-deriving the ref
    #[cfg(any(test, feature = "test-utils"))]
    pub fn corrupt(&self, r: &Ref, data: Bytes) {
        self.blocks.insert(*r, data);
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn put_block(&self, data: &[u8]) -> Result<Ref> {
        if data.len() > self.max_block_size {
            return Err(BlockStoreError::BlockTooLarge {
                size: data.len(),
                max: self.max_block_size,
            });
        }
        let r = create_ref(data);
        self.blocks
            .entry(r)
            .or_insert_with(|| Bytes::copy_from_slice(data));
        trace!(%r, size = data.len(), "stored block");
        Ok(r)
    }

    async fn get_block(&self, r: &Ref) -> Result<Bytes> {
        self.blocks
            .get(r)
            .map(|entry| entry.value().clone())
            .ok_or(BlockStoreError::NotFound(*r))
    }

    async fn has_block(&self, r: &Ref) -> Result<bool> {
        Ok(self.blocks.contains_key(r))
    }

    async fn block_size(&self, r: &Ref) -> Result<u64> {
        self.blocks
            .get(r)
            .map(|entry| entry.value().len() as u64)
            .ok_or(BlockStoreError::NotFound(*r))
    }

    fn max_block_size(&self) -> usize {
        self.max_block_size
    }
}

/// LRU-cached wrapper around any block store.
///
/// Nodes are immutable, so a cached blob never goes stale.
pub struct CachedBlockStore<S: BlockStore> {
    inner: S,
    cache: Arc<parking_lot::Mutex<lru::LruCache<Ref, Bytes>>>,
}

impl<S: BlockStore> CachedBlockStore<S> {
    /// Create a new cached store with the given capacity
    pub fn new(inner: S, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Arc::new(parking_lot::Mutex::new(lru::LruCache::new(capacity))),
        }
    }

    /// Clear the cache
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Get cache statistics
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Access the wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: BlockStore> BlockStore for CachedBlockStore<S> {
    async fn put_block(&self, data: &[u8]) -> Result<Ref> {
        let r = self.inner.put_block(data).await?;
        self.cache.lock().put(r, Bytes::copy_from_slice(data));
        Ok(r)
    }

    async fn get_block(&self, r: &Ref) -> Result<Bytes> {
        if let Some(data) = self.cache.lock().get(r) {
            return Ok(data.clone());
        }

        let data = self.inner.get_block(r).await?;
        self.cache.lock().put(*r, data.clone());
        Ok(data)
    }

    async fn has_block(&self, r: &Ref) -> Result<bool> {
        if self.cache.lock().contains(r) {
            return Ok(true);
        }
        self.inner.has_block(r).await
    }

    async fn block_size(&self, r: &Ref) -> Result<u64> {
        if let Some(data) = self.cache.lock().get(r) {
            return Ok(data.len() as u64);
        }
        self.inner.block_size(r).await
    }

    fn max_block_size(&self) -> usize {
        self.inner.max_block_size()
    }
}
