//! Large objects stored as a weighted tree of content-defined chunks.
//!
//! Each leaf entry is `(chunk ref bytes, chunk length)`, so the tree's weight
//! is the object's length and an offset seek lands on the chunk holding it.

use super::builder::{Builder, MAX_DEPTH};
use super::codec::{Weighted, WeightedEntry};
use super::iter::TreeIter;
use super::node::{Index, Root, Span};
use super::reader::{NodeReader, Record};
use super::walk::{WalkVisitor, Walker};
use super::weight::Weight;
use crate::config::TreeConfig;
use crate::{CoreError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use silt_blockstore::{parse_ref, BlockStore, Ref, MAX_BLOCK_SIZE};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Most `read_rope` reserves up front; a root's length is not trusted further
const MAX_PREALLOCATION: usize = 16 * MAX_BLOCK_SIZE;

/// Chunk `reader` to the end and store it as a rope
#[instrument(skip(store, config, reader))]
pub async fn write_rope<S, R>(store: Arc<S>, config: &TreeConfig, mut reader: R) -> Result<Root<Weight>>
where
    S: BlockStore,
    R: AsyncRead + Unpin + Send,
{
    let mut chunker = config.chunking.build();
    let mut builder = Builder::<Weighted, S>::new(Arc::clone(&store), config.clone());
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut chunks = Vec::new();

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            chunker.flush(&mut |chunk| chunks.push(chunk));
        } else {
            chunker.write(&buf[..n], &mut |chunk| chunks.push(chunk));
        }
        for chunk in chunks.drain(..) {
            let r = store.put_block(&chunk).await?;
            builder
                .append(WeightedEntry::new(r.to_bytes(), chunk.len() as u64))
                .await?;
        }
        if n == 0 {
            break;
        }
    }

    let root = builder.finish().await?;
    debug!(len = root_len(&root), depth = root.depth, "wrote rope");
    Ok(root)
}

/// Total length of the object under `root`
pub fn root_len(root: &Root<Weight>) -> u64 {
    root.span.end.as_ref().map(Weight::as_u64).unwrap_or(0)
}

/// The chunk holding byte `offset`, with the offset it starts at.
///
/// Returns `None` at or past the end of the object.
pub async fn read_rope_at<S: BlockStore>(
    store: Arc<S>,
    root: &Root<Weight>,
    offset: u64,
) -> Result<Option<(u64, Bytes)>> {
    if root.depth as usize > MAX_DEPTH {
        return Err(CoreError::DepthExceeded { max: MAX_DEPTH });
    }
    let target = Weight::from_u64(offset);
    let mut index = root.as_index();
    let mut depth = root.depth;

    loop {
        let data = store.get_block(&index.r).await?;
        let mut reader = NodeReader::<Weighted>::new(index, data, depth == 0);
        let step = loop {
            match reader.next()? {
                None => return Ok(None),
                Some(Record::Entry { start, next, entry }) => {
                    if next > target {
                        break Step::Chunk(start.as_u64(), entry);
                    }
                }
                Some(Record::Index(child)) => {
                    if child.span.end.as_ref().map_or(true, |end| *end > target) {
                        break Step::Descend(child);
                    }
                }
            }
        };
        match step {
            Step::Descend(child) => {
                index = child;
                depth -= 1;
            }
            Step::Chunk(start, entry) => {
                let chunk = store.get_block(&chunk_ref(&entry.value)?).await?;
                return Ok(Some((start, chunk)));
            }
        }
    }
}

enum Step {
    Descend(Index<Weight>),
    Chunk(u64, WeightedEntry),
}

/// Read the whole object
pub async fn read_rope<S: BlockStore>(store: Arc<S>, root: &Root<Weight>) -> Result<Vec<u8>> {
    let capacity = usize::try_from(root_len(root)).unwrap_or(usize::MAX);
    let mut out = Vec::with_capacity(capacity.min(MAX_PREALLOCATION));
    let mut it = TreeIter::<Weighted, S>::new(Arc::clone(&store), root.clone(), Span::all())?;
    while let Some((_, entry)) = it.next().await? {
        let chunk = store.get_block(&chunk_ref(&entry.value)?).await?;
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

struct RopeRefs<'a> {
    refs: &'a mut HashSet<Ref>,
}

#[async_trait]
impl WalkVisitor<Weighted> for RopeRefs<'_> {
    async fn before(&mut self, r: &Ref, _depth: u8) -> Result<bool> {
        Ok(self.refs.insert(*r))
    }

    async fn for_each(&mut self, _position: &Weight, entry: &WeightedEntry) -> Result<()> {
        self.refs.insert(chunk_ref(&entry.value)?);
        Ok(())
    }
}

/// Like [`populate`](super::sync::populate), but also collects the chunk
/// blobs the leaves point at
pub async fn populate_rope<S: BlockStore>(
    store: Arc<S>,
    root: &Root<Weight>,
    refs: &mut HashSet<Ref>,
) -> Result<()> {
    Walker::<Weighted, S>::new(store)
        .walk(root, &mut RopeRefs { refs })
        .await
}

fn chunk_ref(value: &[u8]) -> Result<Ref> {
    parse_ref(value).map_err(|e| CoreError::InvalidRef(e.to_string()))
}
