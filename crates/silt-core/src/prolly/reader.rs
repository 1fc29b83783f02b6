//! Lazy, forward-only decoding of a single node

use super::codec::Layout;
use super::node::{Index, RawIndex, Span};
use crate::{CoreError, Result};
use bytes::Bytes;

/// One decoded record of a node.
#[derive(Clone, Debug)]
pub enum Record<L: Layout> {
    /// A leaf entry with its start position and the position after it
    Entry {
        start: L::Bound,
        next: L::Bound,
        entry: L::Entry,
    },
    /// An internal record with its bounds resolved
    Index(Index<L::Bound>),
}

impl<L: Layout> Record<L> {
    /// Position the record starts at
    pub fn start(&self) -> &L::Bound {
        match self {
            Record::Entry { start, .. } => start,
            Record::Index(index) => &index.span.start,
        }
    }
}

/// Decodes the records of one node on demand.
///
/// Index records are resolved in pairs: each record's upper bound is its
/// follower's lower bound. The trailing record of the node has no follower;
/// it takes the node's own upper bound and is not natural.
pub struct NodeReader<L: Layout> {
    index: Index<L::Bound>,
    leaf: bool,
    data: Bytes,
    decoder: L::Decoder,
    cursor: L::Bound,
    lookahead: Option<RawIndex<L::Bound>>,
    head: Option<Record<L>>,
}

impl<L: Layout> NodeReader<L> {
    /// Reader over `data`, the node that `index` points at
    pub fn new(index: Index<L::Bound>, data: Bytes, leaf: bool) -> Self {
        Self {
            decoder: L::decoder(&index.span.start),
            cursor: index.span.start.clone(),
            index,
            leaf,
            data,
            lookahead: None,
            head: None,
        }
    }

    /// Index this node was reached through
    pub fn index(&self) -> &Index<L::Bound> {
        &self.index
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf
    }

    /// Check whether records remain to be read
    pub fn buffered(&self) -> bool {
        self.head.is_some() || self.lookahead.is_some() || !self.data.is_empty()
    }

    /// Drop the records that hold nothing at or after `target`.
    ///
    /// Leaf entries starting before `target` are skipped, as are children
    /// ending before it. The next record is the first that may hold `target`.
    pub fn seek(&mut self, target: &L::Bound) -> Result<()> {
        loop {
            let before = match self.peek()? {
                None => return Ok(()),
                Some(Record::Entry { start, .. }) => start < target,
                Some(Record::Index(index)) => index_before::<L>(&index.span, target),
            };
            if !before {
                return Ok(());
            }
            self.head = None;
        }
    }

    /// Next record without consuming it
    pub fn peek(&mut self) -> Result<Option<&Record<L>>> {
        if self.head.is_none() {
            self.head = self.decode()?;
        }
        Ok(self.head.as_ref())
    }

    /// Consume the next record
    pub fn next(&mut self) -> Result<Option<Record<L>>> {
        match self.head.take() {
            Some(record) => Ok(Some(record)),
            None => self.decode(),
        }
    }

    fn decode(&mut self) -> Result<Option<Record<L>>> {
        if self.leaf {
            if self.data.is_empty() {
                return Ok(None);
            }
            let entry = L::decode_entry(&mut self.decoder, &mut self.data)?;
            let (start, next) = L::place(&entry, &self.cursor);
            self.cursor = next.clone();
            return Ok(Some(Record::Entry { start, next, entry }));
        }

        let raw = match self.lookahead.take() {
            Some(raw) => raw,
            None if self.data.is_empty() => return Ok(None),
            None => self.decode_raw()?,
        };
        let follower = if self.data.is_empty() {
            None
        } else {
            Some(self.decode_raw()?)
        };

        if let Some(follower) = &follower {
            let ordered = if L::ALLOW_EQUAL {
                follower.start >= raw.start
            } else {
                follower.start > raw.start
            };
            if !ordered {
                return Err(CoreError::Corrupt(format!(
                    "index records out of order: {:?} then {:?}",
                    raw.start, follower.start
                )));
            }
        }

        let end = match (raw.end, &follower) {
            (Some(end), _) => Some(end),
            (None, Some(follower)) => Some(follower.start.clone()),
            (None, None) => self.index.span.end.clone(),
        };
        let natural = follower.is_some();
        self.lookahead = follower;
        Ok(Some(Record::Index(Index {
            r: raw.r,
            span: Span::new(raw.start, end),
            natural,
        })))
    }

    fn decode_raw(&mut self) -> Result<RawIndex<L::Bound>> {
        let raw = L::decode_index(&mut self.decoder, &mut self.data, &self.cursor)?;
        self.cursor = raw.end.clone().unwrap_or_else(|| raw.start.clone());
        Ok(raw)
    }
}

/// Whether a child spanning `span` holds nothing at or after `pos`
pub(crate) fn index_before<L: Layout>(span: &Span<L::Bound>, pos: &L::Bound) -> bool {
    match &span.end {
        None => false,
        // zero-weight entries may sit exactly at the end of a weighted child
        Some(end) if L::ALLOW_EQUAL => end < pos,
        Some(end) => end <= pos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prolly::codec::{KeyState, Keyed, KeyedEntry, Weighted, WeightedEntry};
    use crate::prolly::weight::Weight;
    use bytes::BytesMut;
    use silt_blockstore::create_ref;

    fn keyed_index_node(starts: &[&'static str]) -> Bytes {
        let mut enc = KeyState::default();
        let mut out = BytesMut::new();
        for start in starts {
            let index = Index {
                r: create_ref(start.as_bytes()),
                span: Span::starting_at(Bytes::from_static(start.as_bytes())),
                natural: true,
            };
            Keyed::encode_index(&mut enc, &index, &mut out).unwrap();
        }
        out.freeze()
    }

    #[test]
    fn test_index_pairing() {
        let data = keyed_index_node(&["a", "f", "m"]);
        let parent = Index {
            r: create_ref(b"parent"),
            span: Span::new(Bytes::from_static(b"a"), Some(Bytes::from_static(b"q"))),
            natural: true,
        };
        let mut reader = NodeReader::<Keyed>::new(parent, data, false);
        assert!(!reader.is_leaf());

        let mut spans = Vec::new();
        while let Some(Record::Index(index)) = reader.next().unwrap() {
            spans.push((index.span, index.natural));
        }
        assert_eq!(
            spans,
            vec![
                (Span::new(Bytes::from("a"), Some(Bytes::from("f"))), true),
                (Span::new(Bytes::from("f"), Some(Bytes::from("m"))), true),
                (Span::new(Bytes::from("m"), Some(Bytes::from("q"))), false),
            ]
        );
        assert!(!reader.buffered());
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut out = BytesMut::new();
        for i in 1..=3u64 {
            Weighted::encode_entry(&mut (), &WeightedEntry::new(vec![i as u8], i), &mut out).unwrap();
        }
        let root = Index {
            r: create_ref(b"leaf"),
            span: Span::new(Weight::zero(), Some(Weight::from_u64(6))),
            natural: false,
        };
        let mut reader = NodeReader::<Weighted>::new(root, out.freeze(), true);

        assert_eq!(reader.peek().unwrap().map(|r| r.start().clone()), Some(Weight::zero()));
        assert_eq!(reader.peek().unwrap().map(|r| r.start().clone()), Some(Weight::zero()));
        let mut starts = Vec::new();
        while let Some(record) = reader.next().unwrap() {
            starts.push(record.start().as_u64());
        }
        assert_eq!(starts, vec![0, 1, 3]);
    }

    #[test]
    fn test_seek_within_index_node() {
        let data = keyed_index_node(&["a", "f", "m"]);
        let parent = Index {
            r: create_ref(b"parent"),
            span: Span::new(Bytes::from_static(b"a"), Some(Bytes::from_static(b"q"))),
            natural: true,
        };
        let mut reader = NodeReader::<Keyed>::new(parent, data, false);

        // "g" lies in the child [f, m)
        reader.seek(&Bytes::from_static(b"g")).unwrap();
        assert_eq!(reader.peek().unwrap().map(|r| r.start().clone()), Some(Bytes::from("f")));
        // a child ending exactly at the target holds nothing at it
        reader.seek(&Bytes::from_static(b"m")).unwrap();
        assert_eq!(reader.peek().unwrap().map(|r| r.start().clone()), Some(Bytes::from("m")));
        reader.seek(&Bytes::from_static(b"z")).unwrap();
        assert!(reader.peek().unwrap().is_none());
        assert!(!reader.buffered());
    }

    #[test]
    fn test_seek_within_leaf_keeps_zero_weight_entries() {
        let mut out = BytesMut::new();
        for weight in [2u64, 0, 3] {
            Weighted::encode_entry(&mut (), &WeightedEntry::new("x", weight), &mut out).unwrap();
        }
        let leaf = Index {
            r: create_ref(b"leaf"),
            span: Span::new(Weight::zero(), Some(Weight::from_u64(5))),
            natural: false,
        };
        let mut reader = NodeReader::<Weighted>::new(leaf, out.freeze(), true);
        assert!(reader.buffered());

        reader.seek(&Weight::from_u64(2)).unwrap();
        let weights: Vec<u64> = std::iter::from_fn(|| reader.next().unwrap())
            .map(|record| match record {
                Record::Entry { entry, .. } => entry.weight.as_u64(),
                Record::Index(_) => unreachable!(),
            })
            .collect();
        assert_eq!(weights, vec![0, 3]);
    }

    #[test]
    fn test_out_of_order_index_is_corrupt() {
        let mut enc = KeyState::default();
        let mut out = BytesMut::new();
        for key in ["m", "c"] {
            Keyed::encode_entry(
                &mut enc,
                &KeyedEntry::new(key, create_ref(key.as_bytes()).to_bytes()),
                &mut out,
            )
            .unwrap();
        }
        let parent = Index {
            r: create_ref(b"parent"),
            span: Span::starting_at(Bytes::from_static(b"m")),
            natural: false,
        };
        let mut reader = NodeReader::<Keyed>::new(parent, out.freeze(), false);
        assert!(matches!(reader.next(), Err(CoreError::Corrupt(_))));
    }

    #[test]
    fn test_truncated_node() {
        let data = keyed_index_node(&["a", "b"]);
        let parent = Index {
            r: create_ref(b"parent"),
            span: Span::starting_at(Bytes::from_static(b"a")),
            natural: false,
        };
        let mut reader = NodeReader::<Keyed>::new(parent, data.slice(..data.len() - 3), false);
        assert!(reader.next().is_err());
    }
}
