//! Point reads and batched edits on keyed trees

use super::builder::Builder;
use super::codec::{display_key, Keyed, KeyedEntry};
use super::iter::TreeIter;
use super::node::{Root, Span};
use super::sync::copy;
use crate::config::TreeConfig;
use crate::Result;
use bytes::Bytes;
use silt_blockstore::BlockStore;
use std::sync::Arc;
use tracing::{debug, instrument};

/// A change to one key
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Edit {
    Put(Bytes, Bytes),
    Delete(Bytes),
}

impl Edit {
    /// Insert or overwrite `key`
    pub fn put(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Edit::Put(key.into(), value.into())
    }

    /// Remove `key` if present
    pub fn delete(key: impl Into<Bytes>) -> Self {
        Edit::Delete(key.into())
    }

    pub fn key(&self) -> &Bytes {
        match self {
            Edit::Put(key, _) | Edit::Delete(key) => key,
        }
    }
}

/// Build the empty keyed tree
pub async fn empty<S: BlockStore>(store: Arc<S>, config: &TreeConfig) -> Result<Root<Bytes>> {
    Builder::<Keyed, S>::new(store, config.clone()).finish().await
}

/// Value stored under `key`
pub async fn get<S: BlockStore>(store: Arc<S>, root: &Root<Bytes>, key: &[u8]) -> Result<Option<Bytes>> {
    let mut it = TreeIter::<Keyed, S>::new(store, root.clone(), Span::starting_at(Bytes::copy_from_slice(key)))?;
    match it.next().await? {
        Some((found, entry)) if found == key => Ok(Some(entry.value)),
        _ => Ok(None),
    }
}

/// Apply `edits` to the tree at `root` and return the new root.
///
/// Edits may come in any order; when a key is edited more than once the
/// last edit wins. Ranges between edited keys are copied from the old tree,
/// so subtrees they cover keep their refs.
#[instrument(skip(store, config, root, edits), fields(root = %root.r))]
pub async fn mutate<S, I>(store: Arc<S>, config: &TreeConfig, root: &Root<Bytes>, edits: I) -> Result<Root<Bytes>>
where
    S: BlockStore,
    I: IntoIterator<Item = Edit>,
{
    let mut edits: Vec<Edit> = edits.into_iter().collect();
    edits.sort_by(|a, b| a.key().cmp(b.key()));
    let mut batch: Vec<Edit> = Vec::with_capacity(edits.len());
    for edit in edits {
        match batch.last_mut() {
            Some(last) if last.key() == edit.key() => *last = edit,
            _ => batch.push(edit),
        }
    }
    debug!(
        edits = batch.len(),
        first = ?batch.first().map(|e| display_key(e.key())),
        last = ?batch.last().map(|e| display_key(e.key())),
        "applying edits"
    );

    let mut builder = Builder::<Keyed, S>::new(Arc::clone(&store), config.clone());
    let mut copied = 0;
    let mut from = Bytes::new();
    for edit in batch {
        let span = Span::new(from, Some(edit.key().clone()));
        let mut it = TreeIter::<Keyed, S>::new(Arc::clone(&store), root.clone(), span)?;
        copied += copy(&mut builder, &mut it).await?.subtrees;

        from = successor(edit.key());
        if let Edit::Put(key, value) = edit {
            builder.append(KeyedEntry { key, value }).await?;
        }
    }
    let mut it = TreeIter::<Keyed, S>::new(Arc::clone(&store), root.clone(), Span::starting_at(from))?;
    copied += copy(&mut builder, &mut it).await?.subtrees;

    let new_root = builder.finish().await?;
    debug!(subtrees_reused = copied, new_root = %new_root.r, "applied edits");
    Ok(new_root)
}

/// Smallest key after `key`
fn successor(key: &[u8]) -> Bytes {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0);
    Bytes::from(next)
}
