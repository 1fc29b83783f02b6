//! Whole-tree iteration with seek

use super::builder::MAX_DEPTH;
use super::codec::Layout;
use super::node::{Index, Root, Span};
use super::reader::{index_before, NodeReader, Record};
use crate::{CoreError, Result};
use silt_blockstore::BlockStore;
use std::sync::Arc;
use tracing::trace;

/// State of the next record at one level
enum Head {
    Ready,
    PastEnd,
    Empty,
}

/// Iterates the entries of a tree that fall inside a span.
///
/// One [`NodeReader`] per level, loaded only when a lower level needs its
/// next child. Positioning is lazy: records before the current floor are
/// skipped as they are reached, so seeking never fetches a node by itself.
pub struct TreeIter<L: Layout, S: BlockStore> {
    store: Arc<S>,
    root: Root<L::Bound>,
    span: Span<L::Bound>,
    levels: Vec<Option<NodeReader<L>>>,
    root_pending: bool,
    /// Nothing before this position is returned
    floor: L::Bound,
}

impl<L: Layout, S: BlockStore> TreeIter<L, S> {
    /// Iterate the entries of `root` inside `span`
    pub fn new(store: Arc<S>, root: Root<L::Bound>, span: Span<L::Bound>) -> Result<Self> {
        let depth = root.depth as usize;
        if depth > MAX_DEPTH {
            return Err(CoreError::DepthExceeded { max: MAX_DEPTH });
        }
        let mut levels = Vec::with_capacity(depth + 1);
        levels.resize_with(depth + 1, || None);
        Ok(Self {
            store,
            floor: span.start.clone(),
            root,
            span,
            levels,
            root_pending: true,
        })
    }

    /// Iterate every entry of `root`
    pub fn all(store: Arc<S>, root: Root<L::Bound>) -> Result<Self> {
        Self::new(store, root, Span::all())
    }

    pub fn root(&self) -> &Root<L::Bound> {
        &self.root
    }

    pub fn span(&self) -> &Span<L::Bound> {
        &self.span
    }

    /// Next entry and its position, without consuming it
    pub async fn peek(&mut self) -> Result<Option<(L::Bound, L::Entry)>> {
        if !self.fill(0).await? {
            return Ok(None);
        }
        match self.levels[0].as_mut().map(|reader| reader.peek()).transpose()? {
            Some(Some(Record::Entry { start, entry, .. })) => Ok(Some((start.clone(), entry.clone()))),
            _ => Ok(None),
        }
    }

    /// Consume the next entry and its position
    pub async fn next(&mut self) -> Result<Option<(L::Bound, L::Entry)>> {
        if !self.fill(0).await? {
            return Ok(None);
        }
        match self.levels[0].as_mut().map(|reader| reader.next()).transpose()? {
            Some(Some(Record::Entry { start, entry, .. })) => {
                self.floor = start.clone();
                Ok(Some((start, entry)))
            }
            _ => Ok(None),
        }
    }

    /// Skip to the first entry at or after `target`.
    ///
    /// Nodes wholly before `target` are dropped now; the rest of the skip
    /// happens on the next read, top-down from the lowest node still open.
    ///
    /// # Panics
    ///
    /// If `target` is before an entry already returned or a previous seek.
    pub fn seek(&mut self, target: L::Bound) {
        assert!(
            target >= self.floor,
            "backward seek to {target:?} from {:?}",
            self.floor
        );
        self.floor = target;

        let passed = self.levels.iter().rposition(|slot| {
            slot.as_ref()
                .is_some_and(|reader| index_before::<L>(&reader.index().span, &self.floor))
        });
        if let Some(top) = passed {
            for slot in &mut self.levels[..=top] {
                *slot = None;
            }
        }
    }

    /// Check whether the node open at `level` has records left
    pub fn buffered(&self, level: usize) -> bool {
        self.levels
            .get(level)
            .and_then(Option::as_ref)
            .is_some_and(NodeReader::buffered)
    }

    /// Highest level `k >= 1` whose next index can be taken whole: nothing
    /// is buffered below it and the index is natural and inside the span.
    ///
    /// Returns 0 when only single entries can be taken.
    pub async fn synced_level(&mut self) -> Result<usize> {
        self.synced_level_within(usize::MAX).await
    }

    /// [`synced_level`](Self::synced_level) capped at `limit`
    pub async fn synced_level_within(&mut self, limit: usize) -> Result<usize> {
        loop {
            let lowest = (0..self.levels.len()).find(|level| self.buffered(*level));
            let level = match lowest {
                Some(level) => level,
                None if self.root_pending => {
                    self.load_root().await?;
                    continue;
                }
                None => return Ok(0),
            };
            if level == 0 {
                return Ok(0);
            }
            match self.peek_at(level)? {
                Head::Empty => continue,
                Head::PastEnd => return Ok(0),
                Head::Ready => {
                    if level <= limit && self.head_index_copyable(level)? {
                        return Ok(level);
                    }
                    self.descend(level).await?;
                }
            }
        }
    }

    /// Take the index at `level` that [`synced_level`](Self::synced_level)
    /// reported, skipping everything beneath it
    pub fn next_index(&mut self, level: usize) -> Result<Option<Index<L::Bound>>> {
        let record = match self.levels.get_mut(level).and_then(Option::as_mut) {
            Some(reader) => reader.next()?,
            None => None,
        };
        match record {
            Some(Record::Index(index)) => {
                if let Some(end) = &index.span.end {
                    self.floor = end.clone();
                }
                Ok(Some(index))
            }
            Some(Record::Entry { .. }) => Err(CoreError::Corrupt(format!(
                "entry found at index level {level}"
            ))),
            None => Ok(None),
        }
    }

    fn head_index_copyable(&mut self, level: usize) -> Result<bool> {
        let head = match self.levels[level].as_mut() {
            Some(reader) => reader.peek()?,
            None => None,
        };
        let Some(Record::Index(index)) = head else {
            return Ok(false);
        };
        let inside = index.span.start >= self.floor
            && self.span.covers(&index.span)
            && match (&self.span.end, &index.span.end) {
                // zero-weight entries at the span end are excluded, so a
                // child ending exactly there may hold some
                (Some(limit), Some(end)) if L::ALLOW_EQUAL => end < limit,
                _ => true,
            };
        Ok(index.natural && inside)
    }

    /// Ensure `level` has a record to hand out, loading nodes as needed.
    ///
    /// Returns false at the end of the tree or of the span.
    async fn fill(&mut self, level: usize) -> Result<bool> {
        let top = self.levels.len() - 1;
        let mut current = level;
        loop {
            match self.peek_at(current)? {
                Head::PastEnd => return Ok(false),
                Head::Ready if current == level => return Ok(true),
                Head::Ready => {
                    self.descend(current).await?;
                    current -= 1;
                }
                Head::Empty if current < top => current += 1,
                Head::Empty if self.root_pending => self.load_root().await?,
                Head::Empty => return Ok(false),
            }
        }
    }

    /// Classify the next record at `level`, dropping records before the floor
    fn peek_at(&mut self, level: usize) -> Result<Head> {
        let Some(reader) = self.levels[level].as_mut() else {
            return Ok(Head::Empty);
        };
        reader.seek(&self.floor)?;
        let past = match reader.peek()? {
            None => None,
            Some(record) => Some(past_end::<L>(&self.span, record.start())),
        };
        match past {
            None => {
                self.levels[level] = None;
                Ok(Head::Empty)
            }
            Some(true) => Ok(Head::PastEnd),
            Some(false) => Ok(Head::Ready),
        }
    }

    /// Open the child that the next index at `level` points at
    async fn descend(&mut self, level: usize) -> Result<()> {
        let index = match self.next_record(level)? {
            Some(Record::Index(index)) => index,
            _ => {
                return Err(CoreError::Corrupt(format!(
                    "expected an index at level {level}"
                )))
            }
        };
        let data = self.store.get_block(&index.r).await?;
        trace!(level = level - 1, r = %index.r, size = data.len(), "opened node");
        self.levels[level - 1] = Some(NodeReader::new(index, data, level == 1));
        Ok(())
    }

    fn next_record(&mut self, level: usize) -> Result<Option<Record<L>>> {
        match self.levels[level].as_mut() {
            Some(reader) => reader.next(),
            None => Ok(None),
        }
    }

    async fn load_root(&mut self) -> Result<()> {
        self.root_pending = false;
        let data = self.store.get_block(&self.root.r).await?;
        let depth = self.root.depth as usize;
        trace!(depth, r = %self.root.r, size = data.len(), "opened root");
        self.levels[depth] = Some(NodeReader::new(self.root.as_index(), data, depth == 0));
        Ok(())
    }
}

/// Whether a record starting at `start` lies at or beyond the span end
fn past_end<L: Layout>(span: &Span<L::Bound>, start: &L::Bound) -> bool {
    matches!(&span.end, Some(end) if start >= end)
}
