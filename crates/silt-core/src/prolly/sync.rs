//! Transfers that exploit structural sharing: copy between builders, sync
//! between stores, and reachability for garbage collection.

use super::builder::{Builder, MAX_DEPTH};
use super::codec::Layout;
use super::iter::TreeIter;
use super::node::{Index, Root};
use super::reader::{NodeReader, Record};
use super::walk::{WalkVisitor, Walker};
use crate::{CoreError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use silt_blockstore::{BlockStore, BlockStoreError, Ref};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Counters from one [`copy`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Entries decoded and re-appended
    pub entries: u64,
    /// Subtrees handed over by ref
    pub subtrees: u64,
}

/// Append everything `it` yields to `dst`.
///
/// Whenever the iterator sits at the start of a naturally bounded subtree
/// inside its span and the builder has nothing open below that level, the
/// subtree's ref is appended as-is instead of its entries.
pub async fn copy<L, S, D>(dst: &mut Builder<L, D>, it: &mut TreeIter<L, S>) -> Result<CopyStats>
where
    L: Layout,
    S: BlockStore,
    D: BlockStore,
{
    let mut stats = CopyStats::default();
    loop {
        let limit = (0..=MAX_DEPTH)
            .find(|level| !dst.is_synced_below(level + 1))
            .unwrap_or(MAX_DEPTH);
        let level = it.synced_level_within(limit).await?;
        if level > 0 {
            if let Some(index) = it.next_index(level)? {
                trace!(level, r = %index.r, span = ?index.span, "copying subtree");
                dst.append_index(level, index).await?;
                stats.subtrees += 1;
                continue;
            }
        }
        match it.next().await? {
            Some((_, entry)) => {
                dst.append(entry).await?;
                stats.entries += 1;
            }
            None => return Ok(stats),
        }
    }
}

/// Counters from one [`sync`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Nodes written to the destination
    pub copied: u64,
    /// Subtrees found already present and not descended into
    pub skipped: u64,
}

enum Pending<B> {
    Enter { index: Index<B>, depth: u8 },
    Post { r: Ref, data: Bytes },
}

/// Make every node reachable from `root` present in `dst`.
///
/// A node already in `dst` is taken to have its whole subtree there too.
/// Children are written before their parents, so an interrupted sync never
/// leaves a node whose children are missing.
#[instrument(skip(src, dst, root), fields(root = %root.r, depth = root.depth))]
pub async fn sync<L, S, D>(src: &S, dst: &D, root: &Root<L::Bound>) -> Result<SyncStats>
where
    L: Layout,
    S: BlockStore + ?Sized,
    D: BlockStore + ?Sized,
{
    if root.depth as usize > MAX_DEPTH {
        return Err(CoreError::DepthExceeded { max: MAX_DEPTH });
    }
    let mut stats = SyncStats::default();
    let mut stack = vec![Pending::Enter {
        index: root.as_index(),
        depth: root.depth,
    }];

    while let Some(pending) = stack.pop() {
        match pending {
            Pending::Post { r, data } => {
                post(dst, r, &data).await?;
                stats.copied += 1;
            }
            Pending::Enter { index, depth } => {
                if dst.has_block(&index.r).await? {
                    stats.skipped += 1;
                    continue;
                }
                let data = src.get_block(&index.r).await?;
                if depth == 0 {
                    post(dst, index.r, &data).await?;
                    stats.copied += 1;
                    continue;
                }

                let r = index.r;
                let mut reader = NodeReader::<L>::new(index, data.clone(), false);
                stack.push(Pending::Post { r, data });
                let mut children = Vec::new();
                while let Some(record) = reader.next()? {
                    if let Record::Index(child) = record {
                        children.push(Pending::Enter {
                            index: child,
                            depth: depth - 1,
                        });
                    }
                }
                stack.extend(children.into_iter().rev());
            }
        }
    }

    debug!(copied = stats.copied, skipped = stats.skipped, "sync complete");
    Ok(stats)
}

async fn post<D: BlockStore + ?Sized>(dst: &D, expected: Ref, data: &[u8]) -> Result<()> {
    let actual = dst.put_block(data).await?;
    if actual != expected {
        return Err(BlockStoreError::HashMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
        .into());
    }
    Ok(())
}

struct Reachable<'a> {
    refs: &'a mut HashSet<Ref>,
}

#[async_trait]
impl<L: Layout> WalkVisitor<L> for Reachable<'_> {
    async fn before(&mut self, r: &Ref, depth: u8) -> Result<bool> {
        // leaves hold no refs; an already known node has its subtree known
        Ok(self.refs.insert(*r) && depth > 0)
    }
}

/// Add the ref of every node reachable from `root` to `refs`.
///
/// Subtrees whose root is already in `refs` are not visited, so one set can
/// accumulate several versions cheaply. Leaves are recorded without being
/// fetched.
#[instrument(skip(store, root, refs), fields(root = %root.r))]
pub async fn populate<L, S>(store: Arc<S>, root: &Root<L::Bound>, refs: &mut HashSet<Ref>) -> Result<()>
where
    L: Layout,
    S: BlockStore,
{
    let before = refs.len();
    Walker::<L, S>::new(store)
        .walk(root, &mut Reachable { refs })
        .await?;
    debug!(added = refs.len() - before, "populated reachable refs");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, TreeConfig};
    use crate::prolly::codec::{Keyed, KeyedEntry};
    use bytes::Bytes;
    use silt_blockstore::MemoryBlockStore;

    fn config() -> TreeConfig {
        TreeConfig::with_chunking(ChunkingConfig::content_defined(64, 256, 1024, [5; 32]))
    }

    async fn build(store: &Arc<MemoryBlockStore>, keys: impl Iterator<Item = usize>) -> Root<Bytes> {
        let mut builder: Builder<Keyed, _> = Builder::new(Arc::clone(store), config());
        for i in keys {
            builder
                .append(KeyedEntry::new(format!("key/{i:06}"), format!("value {i}")))
                .await
                .unwrap();
        }
        builder.finish().await.unwrap()
    }

    #[tokio::test]
    async fn test_full_copy_reuses_subtrees() {
        let store = Arc::new(MemoryBlockStore::new());
        let root = build(&store, 0..3000).await;

        let mut dst: Builder<Keyed, _> = Builder::new(Arc::clone(&store), config());
        let mut it = TreeIter::all(Arc::clone(&store), root.clone()).unwrap();
        let stats = copy(&mut dst, &mut it).await.unwrap();

        assert_eq!(dst.finish().await.unwrap(), root);
        assert!(stats.subtrees > 0);
        assert!(stats.entries < 3000);
    }

    #[tokio::test]
    async fn test_sync_copies_then_skips() {
        let src = Arc::new(MemoryBlockStore::new());
        let root = build(&src, 0..2000).await;
        let dst = MemoryBlockStore::new();

        let first = sync::<Keyed, _, _>(src.as_ref(), &dst, &root).await.unwrap();
        assert_eq!(first.copied as usize, src.len());
        assert_eq!(first.skipped, 0);

        let second = sync::<Keyed, _, _>(src.as_ref(), &dst, &root).await.unwrap();
        assert_eq!(second, SyncStats { copied: 0, skipped: 1 });
    }

    #[tokio::test]
    async fn test_sync_reports_missing_block() {
        let src = MemoryBlockStore::new();
        let dst = MemoryBlockStore::new();
        let root = Root {
            r: silt_blockstore::create_ref(b"never stored"),
            span: crate::prolly::Span::all(),
            depth: 0,
        };
        let result = sync::<Keyed, _, _>(&src, &dst, &root).await;
        assert!(matches!(
            result,
            Err(CoreError::BlockStore(BlockStoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_populate_matches_store() {
        let store = Arc::new(MemoryBlockStore::new());
        let root = build(&store, 0..2000).await;

        let mut refs = HashSet::new();
        populate::<Keyed, _>(Arc::clone(&store), &root, &mut refs).await.unwrap();

        let stored: HashSet<_> = store.list_refs().into_iter().collect();
        assert_eq!(refs, stored);
    }
}
