//! # Silt Core
//!
//! Tree engine for the silt version-control store.
//!
//! This crate provides:
//! - **Chunking**: Keyed content-defined boundaries shared by every level
//! - **Prolly Trees**: Streaming builders and lazy iterators over keyed or
//!   weighted trees
//! - **Transfer**: Copy, sync and reachability that skip shared subtrees
//! - **Key-value and rope helpers**: Batched edits and large objects
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   kv (get / mutate)   │  rope (objects) │
//! ├─────────────────────────────────────────┤
//! │  Builder  │  TreeIter  │ Walker │ sync  │
//! ├─────────────────────────────────────────┤
//! │   Chunker    │   Record codec (Layout)  │
//! ├─────────────────────────────────────────┤
//! │        BlockStore (silt-blockstore)     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use silt_core::{Builder, Keyed, KeyedEntry, TreeConfig, TreeIter};
//!
//! let mut builder: Builder<Keyed, _> = Builder::new(store.clone(), TreeConfig::default());
//! builder.append(KeyedEntry::new("a", "1")).await?;
//! let root = builder.finish().await?;
//!
//! let mut it = TreeIter::<Keyed, _>::all(store, root)?;
//! while let Some((key, entry)) = it.next().await? { /* ... */ }
//! ```

pub mod config;
pub mod error;
pub mod prolly;

pub use config::{ChunkingConfig, TreeConfig};
pub use error::{CoreError, Result};
pub use prolly::{
    Builder, Edit, Index, Keyed, KeyedEntry, Layout, Root, Span, TreeIter, Walker, WalkVisitor,
    Weight, Weighted, WeightedEntry,
};
