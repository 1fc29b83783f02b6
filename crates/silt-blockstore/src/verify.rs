//! Integrity-checking store wrapper

use crate::{create_ref, BlockStore, BlockStoreError, Ref, Result};
use async_trait::async_trait;
use bytes::Bytes;

/// Re-derives the ref of every block read through it.
///
/// The tree engine trusts whatever its store returns; wrap an untrusted
/// backend in this to turn silent corruption into `HashMismatch`.
pub struct VerifyingBlockStore<S> {
    inner: S,
}

impl<S: BlockStore> VerifyingBlockStore<S> {
    /// Wrap `inner`
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Unwrap the inner store
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: BlockStore> BlockStore for VerifyingBlockStore<S> {
    async fn put_block(&self, data: &[u8]) -> Result<Ref> {
        let r = self.inner.put_block(data).await?;
        let expected = create_ref(data);
        if r != expected {
            return Err(BlockStoreError::HashMismatch {
                expected: expected.to_string(),
                actual: r.to_string(),
            });
        }
        Ok(r)
    }

    async fn get_block(&self, r: &Ref) -> Result<Bytes> {
        let data = self.inner.get_block(r).await?;
        let actual = create_ref(&data);
        if actual != *r {
            return Err(BlockStoreError::HashMismatch {
                expected: r.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(data)
    }

    async fn has_block(&self, r: &Ref) -> Result<bool> {
        self.inner.has_block(r).await
    }

    async fn block_size(&self, r: &Ref) -> Result<u64> {
        self.inner.block_size(r).await
    }

    fn max_block_size(&self) -> usize {
        self.inner.max_block_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBlockStore;

    #[tokio::test]
    async fn test_verified_roundtrip() {
        let store = VerifyingBlockStore::new(MemoryBlockStore::new());

        let r = store.put_block(b"intact").await.unwrap();
        assert_eq!(store.get_block(&r).await.unwrap().as_ref(), b"intact");
        assert!(store.into_inner().has_block(&r).await.unwrap());
    }

    #[tokio::test]
    async fn test_detects_tampering() {
        let memory = MemoryBlockStore::new();
        let store = VerifyingBlockStore::new(memory.clone());

        let r = store.put_block(b"original").await.unwrap();
        memory.corrupt(&r, Bytes::from_static(b"tampered"));

        let result = store.get_block(&r).await;
        assert!(matches!(result, Err(BlockStoreError::HashMismatch { .. })));
    }
}
