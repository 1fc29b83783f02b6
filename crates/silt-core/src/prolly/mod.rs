//! Content-defined Merkle search trees ("prolly trees")
//!
//! Node boundaries are chosen by a keyed rolling hash over the encoded
//! records, so the shape of a tree depends only on its content:
//! - Equal entry sequences build byte-identical trees
//! - Similar sequences share most of their nodes
//! - Unchanged subtrees can be copied or synced by ref without decoding
//!
//! Two layouts share the machinery: [`Keyed`] trees ordered by key and
//! [`Weighted`] trees ordered by accumulated weight.

mod builder;
mod chunker;
mod codec;
mod iter;
mod kv;
mod node;
mod reader;
mod rope;
mod sync;
mod varint;
mod walk;
mod weight;

pub use builder::{Builder, MAX_DEPTH};
pub use chunker::{Chunker, ContentDefined, Exponential, WINDOW_SIZE};
pub use codec::{
    root_from_bytes, root_to_bytes, KeyState, Keyed, KeyedEntry, Layout, Weighted, WeightedEntry,
    MAX_KEY_SIZE,
};
pub use iter::TreeIter;
pub use kv::{empty, get, mutate, Edit};
pub use node::{Index, RawIndex, Root, Span};
pub use reader::{NodeReader, Record};
pub use rope::{populate_rope, read_rope, read_rope_at, root_len, write_rope};
pub use sync::{copy, populate, sync, CopyStats, SyncStats};
pub use varint::{get_uvarint, put_uvarint, uvarint_len};
pub use walk::{WalkVisitor, Walker};
pub use weight::Weight;
