//! Streaming, level-by-level tree construction

use super::chunker::Chunker;
use super::codec::Layout;
use super::node::{Index, Root, Span};
use crate::config::TreeConfig;
use crate::{CoreError, Result};
use bytes::{Bytes, BytesMut};
use silt_blockstore::BlockStore;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Deepest tree a builder produces or an iterator accepts
pub const MAX_DEPTH: usize = 32;

/// A record written at some level: an entry at level 0, an index above.
enum Item<L: Layout> {
    Entry(L::Entry),
    Index(Index<L::Bound>),
}

/// The open node of one level.
struct LevelWriter<L: Layout> {
    chunker: Box<dyn Chunker>,
    encoder: L::Encoder,
    /// Start of the open node, set by its first record
    first: Option<L::Bound>,
    /// Position after the last record written at this level
    cursor: L::Bound,
    /// Records in the open node
    records: usize,
    /// Most recent index written here
    last_index: Option<Index<L::Bound>>,
}

impl<L: Layout> LevelWriter<L> {
    fn new(chunker: Box<dyn Chunker>, cursor: L::Bound) -> Self {
        Self {
            chunker,
            encoder: L::Encoder::default(),
            first: None,
            cursor,
            records: 0,
            last_index: None,
        }
    }
}

/// Builds a tree from entries appended in order.
///
/// Holds at most one open node per level. Every closed node is posted to the
/// store as soon as its boundary is known and its index moves up one level.
/// After any error the builder must be discarded; a dropped `append` or
/// `finish` future likewise leaves it unusable.
pub struct Builder<L: Layout, S: BlockStore> {
    store: Arc<S>,
    config: TreeConfig,
    levels: Vec<LevelWriter<L>>,
    /// Lowest position the next entry may take, and whether it may equal it
    floor: Option<(L::Bound, bool)>,
    done: bool,
    root: Option<Root<L::Bound>>,
    scratch: BytesMut,
}

impl<L: Layout, S: BlockStore> Builder<L, S> {
    /// Create a builder writing nodes to `store`.
    ///
    /// # Panics
    ///
    /// If the configured chunking is invalid or its maximum node size exceeds
    /// the store's block limit.
    pub fn new(store: Arc<S>, config: TreeConfig) -> Self {
        let max = config.chunking.max_size();
        assert!(
            max <= store.max_block_size(),
            "max node size {max} exceeds store block limit {}",
            store.max_block_size()
        );
        if let Err(e) = config.chunking.validate() {
            panic!("invalid chunking: {e}");
        }
        Self {
            store,
            config,
            levels: Vec::new(),
            floor: None,
            done: false,
            root: None,
            scratch: BytesMut::new(),
        }
    }

    /// The store nodes are posted to
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Append the next entry.
    ///
    /// Fails with [`CoreError::EntryTooLarge`], leaving the builder usable,
    /// when two index records pointing at the entry's node would not fit in
    /// one node.
    ///
    /// # Panics
    ///
    /// If the entry is not after the previous one, or after `finish`.
    pub async fn append(&mut self, entry: L::Entry) -> Result<()> {
        assert!(!self.done, "append after finish");
        let max = self.config.chunking.max_size();
        let index_len = L::index_len_bound(&entry);
        if 2 * index_len > max {
            return Err(CoreError::EntryTooLarge {
                len: index_len,
                max: max / 2,
            });
        }
        self.ensure_level(0)?;
        let (start, _) = L::place(&entry, &self.levels[0].cursor);
        self.check_order(&start);
        self.floor = Some((start, L::ALLOW_EQUAL));
        self.write(0, Item::Entry(entry)).await
    }

    /// Append a whole subtree by reference.
    ///
    /// `index` points at a node of tree level `level - 1`, whose content is
    /// taken as-is without decoding. Its span must end at a true boundary.
    ///
    /// # Panics
    ///
    /// If `level` is 0, a level below `level` holds an open node, the index
    /// has no end, or it is out of order.
    pub async fn append_index(&mut self, level: usize, index: Index<L::Bound>) -> Result<()> {
        assert!(!self.done, "append after finish");
        assert!(level > 0, "subtrees are appended above the leaves");
        self.ensure_level(level)?;
        let span = L::rebase(&index.span, &self.levels[level].cursor);
        let end = span.end.clone().expect("appended subtree has no end bound");
        self.check_order(&span.start);

        for lw in &mut self.levels[..level] {
            lw.cursor = end.clone();
        }
        self.floor = Some((end, true));
        self.write(
            level,
            Item::Index(Index {
                r: index.r,
                span,
                natural: index.natural,
            }),
        )
        .await
    }

    /// Check that no level below `level` holds an open node
    pub fn is_synced_below(&self, level: usize) -> bool {
        self.levels
            .iter()
            .take(level)
            .all(|lw| lw.chunker.buffered() == 0)
    }

    /// Close every open node and return the root.
    ///
    /// An empty builder yields a depth-0 root over an empty leaf.
    #[instrument(skip(self), level = "debug")]
    pub async fn finish(&mut self) -> Result<Root<L::Bound>> {
        if let Some(root) = &self.root {
            return Ok(root.clone());
        }
        self.ensure_level(0)?;
        self.done = true;

        let mut level = 0;
        let root = loop {
            let top = level + 1 == self.levels.len();
            if !top {
                if self.levels[level].chunker.buffered() > 0 {
                    let index = self.close(level).await?;
                    self.write(level + 1, Item::Index(index)).await?;
                }
                level += 1;
                continue;
            }

            let lw = &self.levels[level];
            if level > 0 && lw.records == 1 {
                // a lone index: its child is the root
                let index = lw
                    .last_index
                    .clone()
                    .ok_or_else(|| CoreError::Corrupt(format!("level {level} lost its index")))?;
                break Root {
                    r: index.r,
                    span: index.span,
                    depth: (level - 1) as u8,
                };
            }
            let index = self.close(level).await?;
            break Root {
                r: index.r,
                span: index.span,
                depth: level as u8,
            };
        };

        debug!(depth = root.depth, r = %root.r, span = ?root.span, "finished tree");
        self.root = Some(root.clone());
        Ok(root)
    }

    fn check_order(&self, start: &L::Bound) {
        if let Some((floor, allow_equal)) = &self.floor {
            let ordered = if *allow_equal { start >= floor } else { start > floor };
            assert!(ordered, "out of order append: {start:?} after {floor:?}");
        }
    }

    fn ensure_level(&mut self, level: usize) -> Result<()> {
        if level > MAX_DEPTH {
            return Err(CoreError::DepthExceeded { max: MAX_DEPTH });
        }
        while self.levels.len() <= level {
            let cursor = self
                .levels
                .first()
                .map(|lw| lw.cursor.clone())
                .unwrap_or_default();
            let chunker = self.config.chunking.build();
            self.levels.push(LevelWriter::new(chunker, cursor));
        }
        Ok(())
    }

    /// Write `item` at `level` and carry every node it closes upward.
    async fn write(&mut self, level: usize, item: Item<L>) -> Result<()> {
        let mut pending = vec![(level, item)];
        while let Some((level, item)) = pending.pop() {
            self.ensure_level(level)?;
            if let Some(open) = (0..level).find(|l| self.levels[*l].chunker.buffered() > 0) {
                panic!("write at level {level} while level {open} holds an open node");
            }

            let lw = &mut self.levels[level];
            self.scratch.clear();
            match &item {
                Item::Entry(entry) => L::encode_entry(&mut lw.encoder, entry, &mut self.scratch)?,
                Item::Index(index) => L::encode_index(&mut lw.encoder, index, &mut self.scratch)?,
            }

            let max = lw.chunker.max_size();
            let buffered = lw.chunker.buffered();
            if buffered > 0 && buffered + self.scratch.len() > max {
                // the open node closes first; its index goes up before this item
                let index = self.close(level).await?;
                pending.push((level, item));
                pending.push((level + 1, Item::Index(index)));
                continue;
            }
            if self.scratch.len() > max {
                lw.encoder = L::Encoder::default();
                return Err(CoreError::EntryTooLarge {
                    len: self.scratch.len(),
                    max,
                });
            }

            let (start, next) = match &item {
                Item::Entry(entry) => L::place(entry, &lw.cursor),
                Item::Index(index) => (
                    index.span.start.clone(),
                    index.span.end.clone().unwrap_or_else(|| index.span.start.clone()),
                ),
            };
            if lw.first.is_none() {
                lw.first = Some(start);
            }
            lw.cursor = next;
            let opens_index_node = level > 0 && lw.records == 0;
            lw.records += 1;
            if let Item::Index(index) = item {
                lw.last_index = Some(index);
            }

            let mut emitted = None;
            let on_chunk = &mut |chunk: Bytes| emitted = Some(chunk);
            if opens_index_node {
                lw.chunker.hold_record(&self.scratch, on_chunk);
            } else {
                lw.chunker.write_record(&self.scratch, on_chunk);
            }
            if let Some(chunk) = emitted {
                let index = self.post(level, chunk).await?;
                pending.push((level + 1, Item::Index(index)));
            }
        }
        Ok(())
    }

    /// Force the open node at `level` closed.
    async fn close(&mut self, level: usize) -> Result<Index<L::Bound>> {
        let mut emitted = None;
        self.levels[level]
            .chunker
            .flush(&mut |chunk| emitted = Some(chunk));
        self.post(level, emitted.unwrap_or_default()).await
    }

    /// Store a closed node and describe it for its parent.
    async fn post(&mut self, level: usize, data: Bytes) -> Result<Index<L::Bound>> {
        let r = self.store.put_block(&data).await?;
        let lw = &mut self.levels[level];
        let start = lw.first.take().unwrap_or_else(|| lw.cursor.clone());
        let span = Span::new(start, L::closed_end(&lw.cursor));
        lw.encoder = L::Encoder::default();
        lw.records = 0;
        trace!(level, size = data.len(), %r, "posted node");
        Ok(Index {
            r,
            span,
            natural: true,
        })
    }
}
