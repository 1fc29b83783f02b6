//! Tree node types: spans, indexes and roots

use silt_blockstore::Ref;
use std::fmt;

/// A half-open range `[start, end)` over keys or positions.
///
/// An `end` of `None` is unbounded.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Span<B> {
    /// Inclusive lower bound
    pub start: B,
    /// Exclusive upper bound
    pub end: Option<B>,
}

impl<B: Ord> Span<B> {
    /// Create a span
    pub fn new(start: B, end: Option<B>) -> Self {
        Self { start, end }
    }

    /// Check whether `pos` lies inside the span
    pub fn contains(&self, pos: &B) -> bool {
        *pos >= self.start && !self.ends_at_or_before(pos)
    }

    /// Check whether the span ends at or before `pos`
    pub fn ends_at_or_before(&self, pos: &B) -> bool {
        matches!(&self.end, Some(end) if end <= pos)
    }

    /// Check whether `inner` lies wholly inside this span
    pub fn covers(&self, inner: &Span<B>) -> bool {
        if inner.start < self.start {
            return false;
        }
        match (&self.end, &inner.end) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(outer), Some(inner)) => inner <= outer,
        }
    }
}

impl<B: Default + Ord> Span<B> {
    /// The span covering everything
    pub fn all() -> Self {
        Self::new(B::default(), None)
    }

    /// Everything at or after `start`
    pub fn starting_at(start: B) -> Self {
        Self::new(start, None)
    }

    /// Everything before `end`
    pub fn until(end: B) -> Self {
        Self::new(B::default(), Some(end))
    }
}

impl<B: fmt::Debug> fmt::Debug for Span<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.end {
            Some(end) => write!(f, "[{:?}, {:?})", self.start, end),
            None => write!(f, "[{:?}, ..)", self.start),
        }
    }
}

/// An internal-node record pointing at one child node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Index<B> {
    /// The child's ref
    pub r: Ref,
    /// Everything the child covers
    pub span: Span<B>,
    /// Whether `span.end` is a true chunk boundary.
    ///
    /// The last index in a node has no follower to read its end from; it
    /// inherits the enclosing node's end and is never natural.
    pub natural: bool,
}

/// The top of a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Root<B> {
    /// Ref of the top node
    pub r: Ref,
    /// Everything the tree covers
    pub span: Span<B>,
    /// Internal levels above the leaves; 0 means the root node is a leaf
    pub depth: u8,
}

impl<B: Clone> Root<B> {
    /// The root seen as the single index of a virtual parent node
    pub fn as_index(&self) -> Index<B> {
        Index {
            r: self.r,
            span: self.span.clone(),
            natural: false,
        }
    }
}

/// A record before its upper bound is resolved against its follower.
#[derive(Clone, Debug)]
pub struct RawIndex<B> {
    pub r: Ref,
    pub start: B,
    /// Set when the record itself determines where the child ends
    pub end: Option<B>,
}
