//! Shared helpers for the tree integration tests

#![allow(dead_code)]

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use silt_blockstore::MemoryBlockStore;
use silt_core::prolly::Span;
use silt_core::{
    Builder, ChunkingConfig, Keyed, KeyedEntry, Root, TreeConfig, TreeIter, Weight, Weighted,
    WeightedEntry,
};
use std::sync::Arc;

/// Small nodes so modest inputs grow several levels
pub fn small_config() -> TreeConfig {
    TreeConfig::with_chunking(ChunkingConfig::content_defined(64, 256, 1024, [42; 32]))
}

pub fn key(i: usize) -> Bytes {
    Bytes::from(format!("entry/{i:08}"))
}

pub fn keyed_entries(range: impl Iterator<Item = usize>) -> Vec<KeyedEntry> {
    range
        .map(|i| KeyedEntry::new(key(i), format!("value of {i}")))
        .collect()
}

pub fn random_values(seed: u64, n: usize) -> Vec<WeightedEntry> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let len = rng.gen_range(4..24);
            let value: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            WeightedEntry::new(value, 1u64)
        })
        .collect()
}

pub async fn build_keyed(
    store: &Arc<MemoryBlockStore>,
    config: &TreeConfig,
    entries: impl IntoIterator<Item = KeyedEntry>,
) -> Root<Bytes> {
    let mut builder: Builder<Keyed, _> = Builder::new(Arc::clone(store), config.clone());
    for entry in entries {
        builder.append(entry).await.unwrap();
    }
    builder.finish().await.unwrap()
}

pub async fn build_weighted(
    store: &Arc<MemoryBlockStore>,
    config: &TreeConfig,
    entries: impl IntoIterator<Item = WeightedEntry>,
) -> Root<Weight> {
    let mut builder: Builder<Weighted, _> = Builder::new(Arc::clone(store), config.clone());
    for entry in entries {
        builder.append(entry).await.unwrap();
    }
    builder.finish().await.unwrap()
}

pub async fn collect_keyed(
    store: &Arc<MemoryBlockStore>,
    root: &Root<Bytes>,
    span: Span<Bytes>,
) -> Vec<KeyedEntry> {
    let mut it = TreeIter::<Keyed, _>::new(Arc::clone(store), root.clone(), span).unwrap();
    let mut out = Vec::new();
    while let Some((_, entry)) = it.next().await.unwrap() {
        out.push(entry);
    }
    out
}

pub async fn collect_weighted(
    store: &Arc<MemoryBlockStore>,
    root: &Root<Weight>,
    span: Span<Weight>,
) -> Vec<(u64, WeightedEntry)> {
    let mut it = TreeIter::<Weighted, _>::new(Arc::clone(store), root.clone(), span).unwrap();
    let mut out = Vec::new();
    while let Some((pos, entry)) = it.next().await.unwrap() {
        out.push((pos.as_u64(), entry));
    }
    out
}
