//! Depth-first traversal over every node of a tree

use super::builder::MAX_DEPTH;
use super::codec::Layout;
use super::node::{Index, Root};
use super::reader::{NodeReader, Record};
use crate::{CoreError, Result};
use async_trait::async_trait;
use silt_blockstore::{BlockStore, Ref};
use std::marker::PhantomData;
use std::sync::Arc;

/// Callbacks for [`Walker::walk`]
#[async_trait]
pub trait WalkVisitor<L: Layout>: Send {
    /// Called on entering a node; return `false` to leave it undecoded.
    ///
    /// Leaves are offered too.
    async fn before(&mut self, _r: &Ref, _depth: u8) -> Result<bool> {
        Ok(true)
    }

    /// Called for every leaf entry, with its position in the whole tree
    async fn for_each(&mut self, _position: &L::Bound, _entry: &L::Entry) -> Result<()> {
        Ok(())
    }

    /// Called on leaving a node, skipped or not
    async fn after(&mut self, _r: &Ref, _depth: u8) -> Result<()> {
        Ok(())
    }
}

enum Frame<B> {
    Enter { index: Index<B>, depth: u8 },
    Exit { r: Ref, depth: u8 },
}

/// Visits the nodes of a tree in depth-first order.
pub struct Walker<L: Layout, S: BlockStore> {
    store: Arc<S>,
    _layout: PhantomData<fn() -> L>,
}

impl<L: Layout, S: BlockStore> Walker<L, S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _layout: PhantomData,
        }
    }

    /// Walk every node reachable from `root`, children left to right
    pub async fn walk<V: WalkVisitor<L>>(&self, root: &Root<L::Bound>, visitor: &mut V) -> Result<()> {
        if root.depth as usize > MAX_DEPTH {
            return Err(CoreError::DepthExceeded { max: MAX_DEPTH });
        }
        let mut stack = vec![Frame::Enter {
            index: root.as_index(),
            depth: root.depth,
        }];

        while let Some(frame) = stack.pop() {
            let (index, depth) = match frame {
                Frame::Exit { r, depth } => {
                    visitor.after(&r, depth).await?;
                    continue;
                }
                Frame::Enter { index, depth } => (index, depth),
            };

            stack.push(Frame::Exit { r: index.r, depth });
            if !visitor.before(&index.r, depth).await? {
                continue;
            }

            let data = self.store.get_block(&index.r).await?;
            let mut reader = NodeReader::<L>::new(index, data, depth == 0);
            let mut children = Vec::new();
            while let Some(record) = reader.next()? {
                match record {
                    Record::Entry { start, entry, .. } => visitor.for_each(&start, &entry).await?,
                    Record::Index(child) => children.push(Frame::Enter {
                        index: child,
                        depth: depth - 1,
                    }),
                }
            }
            stack.extend(children.into_iter().rev());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, TreeConfig};
    use crate::prolly::builder::Builder;
    use crate::prolly::codec::{Keyed, KeyedEntry, Weighted, WeightedEntry};
    use crate::prolly::weight::Weight;
    use bytes::Bytes;
    use silt_blockstore::MemoryBlockStore;

    #[derive(Default)]
    struct Recorder {
        entered: Vec<(Ref, u8)>,
        left: Vec<(Ref, u8)>,
        positions: Vec<u64>,
        skip_leaves: bool,
    }

    #[async_trait]
    impl WalkVisitor<Weighted> for Recorder {
        async fn before(&mut self, r: &Ref, depth: u8) -> Result<bool> {
            self.entered.push((*r, depth));
            Ok(!(self.skip_leaves && depth == 0))
        }

        async fn for_each(&mut self, position: &Weight, _entry: &WeightedEntry) -> Result<()> {
            self.positions.push(position.as_u64());
            Ok(())
        }

        async fn after(&mut self, r: &Ref, depth: u8) -> Result<()> {
            self.left.push((*r, depth));
            Ok(())
        }
    }

    fn config() -> TreeConfig {
        TreeConfig::with_chunking(ChunkingConfig::content_defined(64, 128, 512, [1; 32]))
    }

    async fn weighted_tree(store: &Arc<MemoryBlockStore>, n: u64) -> Root<Weight> {
        let mut builder: Builder<Weighted, _> = Builder::new(Arc::clone(store), config());
        for i in 0..n {
            builder.append(WeightedEntry::new(i.to_be_bytes().to_vec(), 2u64)).await.unwrap();
        }
        builder.finish().await.unwrap()
    }

    #[tokio::test]
    async fn test_walk_visits_every_node_once() {
        let store = Arc::new(MemoryBlockStore::new());
        let root = weighted_tree(&store, 400).await;
        let mut recorder = Recorder::default();

        Walker::new(Arc::clone(&store)).walk(&root, &mut recorder).await.unwrap();

        assert_eq!(recorder.entered.len(), recorder.left.len());
        assert_eq!(recorder.entered.first(), Some(&(root.r, root.depth)));
        assert_eq!(recorder.left.last(), Some(&(root.r, root.depth)));
        assert_eq!(recorder.positions, (0..400).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_skipped_nodes_still_exit() {
        let store = Arc::new(MemoryBlockStore::new());
        let root = weighted_tree(&store, 400).await;
        let mut recorder = Recorder {
            skip_leaves: true,
            ..Default::default()
        };

        Walker::new(Arc::clone(&store)).walk(&root, &mut recorder).await.unwrap();

        assert!(recorder.positions.is_empty());
        let leaves = recorder.left.iter().filter(|(_, depth)| *depth == 0).count();
        assert!(leaves > 1);
        assert_eq!(recorder.entered.len(), recorder.left.len());
    }

    #[tokio::test]
    async fn test_keyed_positions_are_keys() {
        struct Keys(Vec<Bytes>);

        #[async_trait]
        impl WalkVisitor<Keyed> for Keys {
            async fn for_each(&mut self, position: &Bytes, entry: &KeyedEntry) -> Result<()> {
                assert_eq!(position, &entry.key);
                self.0.push(position.clone());
                Ok(())
            }
        }

        let store = Arc::new(MemoryBlockStore::new());
        let mut builder: Builder<Keyed, _> = Builder::new(Arc::clone(&store), config());
        for i in 0..300 {
            builder.append(KeyedEntry::new(format!("{i:05}"), "x")).await.unwrap();
        }
        let root = builder.finish().await.unwrap();

        let mut keys = Keys(Vec::new());
        Walker::new(store).walk(&root, &mut keys).await.unwrap();
        assert_eq!(keys.0.len(), 300);
        assert!(keys.0.windows(2).all(|w| w[0] < w[1]));
    }
}
