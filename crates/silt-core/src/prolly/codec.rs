//! Node record encodings.
//!
//! Two layouts share the tree machinery:
//!
//! ```text
//! keyed record     := [varint innerLen] inner
//! inner            := [varint backspace] [LP keySuffix] [LP value]
//!
//! weighted record  := [varint outerLen] outer
//! outer            := [LP weight] [LP value]
//! ```
//!
//! Keyed records delta-encode keys against the previous record in the same
//! node; the first record's previous key is the node's lower bound, which
//! the parent index carries. Index records reuse the entry format with the
//! child ref as value. Nodes have no header.

use super::node::{Index, RawIndex, Span};
use super::varint::{get_lp, get_uvarint, lp_len, put_lp, put_uvarint, take, uvarint_len};
use super::weight::Weight;
use crate::{CoreError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use silt_blockstore::{parse_ref, read_ref, Ref, REF_SIZE};
use std::fmt;

/// Largest key a keyed tree accepts
pub const MAX_KEY_SIZE: usize = 4096;

/// How a family of trees positions, encodes and decodes its records.
pub trait Layout: Send + Sync + 'static {
    /// Leaf payload
    type Entry: Clone + fmt::Debug + PartialEq + Send + Sync;
    /// Position of an entry; keys for keyed trees, offsets for weighted ones
    type Bound: Clone + Ord + Default + fmt::Debug + Send + Sync;
    /// Per-node encoder state
    type Encoder: Default + Send;
    /// Per-node decoder state
    type Decoder: Send;

    /// Whether consecutive entries may share a position
    const ALLOW_EQUAL: bool;

    /// Start of `entry` and the cursor after it, given the cursor after the
    /// previous entry.
    fn place(entry: &Self::Entry, cursor: &Self::Bound) -> (Self::Bound, Self::Bound);

    /// End of a node closed with `cursor` after its last record, when the
    /// layout can tell it without the node's follower.
    fn closed_end(cursor: &Self::Bound) -> Option<Self::Bound>;

    /// `span` as it lands when the subtree it belongs to is written at `cursor`
    fn rebase(span: &Span<Self::Bound>, cursor: &Self::Bound) -> Span<Self::Bound>;

    /// Largest index record that can ever point at a child holding `entry`
    fn index_len_bound(entry: &Self::Entry) -> usize;

    /// Fresh decoder for a node whose span starts at `start`
    fn decoder(start: &Self::Bound) -> Self::Decoder;

    fn encode_entry(enc: &mut Self::Encoder, entry: &Self::Entry, out: &mut BytesMut) -> Result<()>;

    fn decode_entry(dec: &mut Self::Decoder, buf: &mut Bytes) -> Result<Self::Entry>;

    fn encode_index(enc: &mut Self::Encoder, index: &Index<Self::Bound>, out: &mut BytesMut) -> Result<()>;

    fn decode_index(
        dec: &mut Self::Decoder,
        buf: &mut Bytes,
        cursor: &Self::Bound,
    ) -> Result<RawIndex<Self::Bound>>;

    /// Root fields persisted after `ref || depth`
    fn encode_root_span(span: &Span<Self::Bound>, out: &mut Vec<u8>);

    fn decode_root_span(body: &[u8]) -> Result<Span<Self::Bound>>;
}

/// A key-value pair of a keyed tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyedEntry {
    pub key: Bytes,
    pub value: Bytes,
}

impl KeyedEntry {
    /// Create a new entry
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Trees of key-value pairs ordered by key bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Keyed;

/// Previous key of the record being written or read
#[derive(Default)]
pub struct KeyState {
    prev: Option<Bytes>,
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn check_key(key: &[u8]) -> Result<()> {
    if key.len() > MAX_KEY_SIZE {
        return Err(CoreError::KeyTooLarge {
            len: key.len(),
            max: MAX_KEY_SIZE,
        });
    }
    Ok(())
}

impl Keyed {
    fn encode_record(state: &mut KeyState, key: &Bytes, value: &[u8], out: &mut BytesMut) -> Result<()> {
        check_key(key)?;
        let prev = state.prev.as_ref().unwrap_or(key);
        let common = common_prefix(prev, key);
        let backspace = (prev.len() - common) as u64;
        let suffix = &key[common..];

        let inner_len = uvarint_len(backspace) + lp_len(suffix) + lp_len(value);
        out.reserve(uvarint_len(inner_len as u64) + inner_len);
        put_uvarint(out, inner_len as u64);
        put_uvarint(out, backspace);
        put_lp(out, suffix);
        put_lp(out, value);

        state.prev = Some(key.clone());
        Ok(())
    }

    fn decode_record(state: &mut KeyState, buf: &mut Bytes) -> Result<(Bytes, Bytes)> {
        let inner_len = get_uvarint(buf)?;
        let mut inner = take(buf, inner_len)?;
        let backspace = get_uvarint(&mut inner)?;
        let suffix = get_lp(&mut inner)?;
        let value = get_lp(&mut inner)?;
        if !inner.is_empty() {
            return Err(CoreError::Corrupt(format!(
                "{} unread bytes inside keyed record",
                inner.len()
            )));
        }

        let prev = state.prev.take().unwrap_or_default();
        if backspace > prev.len() as u64 {
            return Err(CoreError::BackspaceOverflow {
                backspace,
                prev_len: prev.len(),
            });
        }
        let keep = prev.len() - backspace as usize;
        let key = if suffix.is_empty() {
            prev.slice(..keep)
        } else {
            let mut key = BytesMut::with_capacity(keep + suffix.len());
            key.put_slice(&prev[..keep]);
            key.put_slice(&suffix);
            key.freeze()
        };
        check_key(&key)?;

        state.prev = Some(key.clone());
        Ok((key, value))
    }
}

impl Layout for Keyed {
    type Entry = KeyedEntry;
    type Bound = Bytes;
    type Encoder = KeyState;
    type Decoder = KeyState;

    const ALLOW_EQUAL: bool = false;

    fn place(entry: &KeyedEntry, _cursor: &Bytes) -> (Bytes, Bytes) {
        (entry.key.clone(), entry.key.clone())
    }

    fn closed_end(_cursor: &Bytes) -> Option<Bytes> {
        None
    }

    fn rebase(span: &Span<Bytes>, _cursor: &Bytes) -> Span<Bytes> {
        span.clone()
    }

    fn index_len_bound(entry: &KeyedEntry) -> usize {
        // the child's lower bound is at most this long and, after the first
        // record of a node, may backspace over a whole maximal key
        let inner = uvarint_len(MAX_KEY_SIZE as u64)
            + uvarint_len(entry.key.len() as u64)
            + entry.key.len()
            + uvarint_len(REF_SIZE as u64)
            + REF_SIZE;
        uvarint_len(inner as u64) + inner
    }

    fn decoder(start: &Bytes) -> KeyState {
        KeyState {
            prev: Some(start.clone()),
        }
    }

    fn encode_entry(enc: &mut KeyState, entry: &KeyedEntry, out: &mut BytesMut) -> Result<()> {
        Self::encode_record(enc, &entry.key, &entry.value, out)
    }

    fn decode_entry(dec: &mut KeyState, buf: &mut Bytes) -> Result<KeyedEntry> {
        let (key, value) = Self::decode_record(dec, buf)?;
        Ok(KeyedEntry { key, value })
    }

    fn encode_index(enc: &mut KeyState, index: &Index<Bytes>, out: &mut BytesMut) -> Result<()> {
        Self::encode_record(enc, &index.span.start, &index.r.to_bytes(), out)
    }

    fn decode_index(dec: &mut KeyState, buf: &mut Bytes, _cursor: &Bytes) -> Result<RawIndex<Bytes>> {
        let (start, value) = Self::decode_record(dec, buf)?;
        Ok(RawIndex {
            r: child_ref(&value)?,
            start,
            end: None,
        })
    }

    fn encode_root_span(span: &Span<Bytes>, out: &mut Vec<u8>) {
        out.extend_from_slice(&span.start);
    }

    fn decode_root_span(body: &[u8]) -> Result<Span<Bytes>> {
        check_key(body)?;
        Ok(Span::starting_at(Bytes::copy_from_slice(body)))
    }
}

/// A piece of a weighted tree; its position is the sum of the weights
/// before it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightedEntry {
    pub value: Bytes,
    pub weight: Weight,
}

impl WeightedEntry {
    /// Create a new entry
    pub fn new(value: impl Into<Bytes>, weight: impl Into<Weight>) -> Self {
        Self {
            value: value.into(),
            weight: weight.into(),
        }
    }
}

/// Trees ordered by accumulated weight (ropes).
#[derive(Clone, Copy, Debug, Default)]
pub struct Weighted;

impl Weighted {
    fn encode_record(weight: &Weight, value: &[u8], out: &mut BytesMut) {
        let weight_len = weight.encoded_len();
        let outer_len = uvarint_len(weight_len as u64) + weight_len + lp_len(value);
        out.reserve(uvarint_len(outer_len as u64) + outer_len);
        put_uvarint(out, outer_len as u64);
        put_uvarint(out, weight_len as u64);
        weight.encode(out);
        put_lp(out, value);
    }

    fn decode_record(buf: &mut Bytes) -> Result<(Weight, Bytes)> {
        let outer_len = get_uvarint(buf)?;
        let mut outer = take(buf, outer_len)?;
        let weight = Weight::decode(get_lp(&mut outer)?)?;
        let value = get_lp(&mut outer)?;
        if !outer.is_empty() {
            return Err(CoreError::Corrupt(format!(
                "{} unread bytes inside weighted record",
                outer.len()
            )));
        }
        Ok((weight, value))
    }
}

impl Layout for Weighted {
    type Entry = WeightedEntry;
    type Bound = Weight;
    type Encoder = ();
    type Decoder = ();

    const ALLOW_EQUAL: bool = true;

    fn place(entry: &WeightedEntry, cursor: &Weight) -> (Weight, Weight) {
        (cursor.clone(), cursor.add(&entry.weight))
    }

    fn closed_end(cursor: &Weight) -> Option<Weight> {
        Some(cursor.clone())
    }

    fn rebase(span: &Span<Weight>, cursor: &Weight) -> Span<Weight> {
        let weight = span
            .end
            .as_ref()
            .and_then(|end| end.checked_sub(&span.start))
            .unwrap_or_default();
        Span::new(cursor.clone(), Some(cursor.add(&weight)))
    }

    fn index_len_bound(entry: &WeightedEntry) -> usize {
        // a subtree total may need the full ten bytes per dimension
        let weight_len = entry.weight.dims() * uvarint_len(u64::MAX);
        let outer = uvarint_len(weight_len as u64)
            + weight_len
            + uvarint_len(REF_SIZE as u64)
            + REF_SIZE;
        uvarint_len(outer as u64) + outer
    }

    fn decoder(_start: &Weight) {}

    fn encode_entry(_enc: &mut (), entry: &WeightedEntry, out: &mut BytesMut) -> Result<()> {
        Self::encode_record(&entry.weight, &entry.value, out);
        Ok(())
    }

    fn decode_entry(_dec: &mut (), buf: &mut Bytes) -> Result<WeightedEntry> {
        let (weight, value) = Self::decode_record(buf)?;
        Ok(WeightedEntry { value, weight })
    }

    fn encode_index(_enc: &mut (), index: &Index<Weight>, out: &mut BytesMut) -> Result<()> {
        let weight = index
            .span
            .end
            .as_ref()
            .and_then(|end| end.checked_sub(&index.span.start))
            .ok_or_else(|| CoreError::Corrupt(format!("index span {:?} has no weight", index.span)))?;
        Self::encode_record(&weight, &index.r.to_bytes(), out);
        Ok(())
    }

    fn decode_index(_dec: &mut (), buf: &mut Bytes, cursor: &Weight) -> Result<RawIndex<Weight>> {
        let (weight, value) = Self::decode_record(buf)?;
        Ok(RawIndex {
            r: child_ref(&value)?,
            start: cursor.clone(),
            end: Some(cursor.add(&weight)),
        })
    }

    fn encode_root_span(span: &Span<Weight>, out: &mut Vec<u8>) {
        if let Some(end) = &span.end {
            end.encode(out);
        }
    }

    fn decode_root_span(body: &[u8]) -> Result<Span<Weight>> {
        let total = Weight::decode(Bytes::copy_from_slice(body))?;
        Ok(Span::new(Weight::zero(), Some(total)))
    }
}

fn child_ref(value: &[u8]) -> Result<Ref> {
    parse_ref(value).map_err(|e| CoreError::InvalidRef(e.to_string()))
}

/// Persist a root as `ref || depth || layout fields`.
///
/// Keyed roots carry their first key; weighted roots carry their total
/// weight as varints.
pub fn root_to_bytes<L: Layout>(root: &super::Root<L::Bound>) -> Vec<u8> {
    let mut out = root.r.to_bytes();
    out.push(root.depth);
    L::encode_root_span(&root.span, &mut out);
    out
}

/// Parse a root written by [`root_to_bytes`]
pub fn root_from_bytes<L: Layout>(bytes: &[u8]) -> Result<super::Root<L::Bound>> {
    let (r, used) = read_ref(bytes).map_err(|e| CoreError::InvalidRef(e.to_string()))?;
    let depth = *bytes.get(used).ok_or(CoreError::Truncated {
        needed: used + 1,
        available: bytes.len(),
    })?;
    let span = L::decode_root_span(&bytes[used + 1..])?;
    Ok(super::Root { r, span, depth })
}

/// Hex rendering of a bound for logs
pub(crate) fn display_key(key: &[u8]) -> String {
    hex::encode(&key[..key.len().min(16)])
}
