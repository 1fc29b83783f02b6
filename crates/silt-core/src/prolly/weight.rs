//! Aggregable subtree weights

use super::varint::{get_uvarint, put_uvarint, uvarint_len};
use crate::Result;
use bytes::{BufMut, Bytes};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A vector of unsigned quantities attached to an entry or subtree.
///
/// Trees built today populate one dimension (an entry count or a byte
/// length). Trailing zero dimensions are trimmed so that equal quantities
/// compare equal however they were produced; the zero weight has no
/// dimensions at all.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Weight(Vec<u64>);

impl Weight {
    /// The zero weight
    pub fn zero() -> Self {
        Self(Vec::new())
    }

    /// Single-dimension weight
    pub fn from_u64(n: u64) -> Self {
        Self::new(vec![n])
    }

    /// Weight from explicit dimensions
    pub fn new(mut dims: Vec<u64>) -> Self {
        while dims.last() == Some(&0) {
            dims.pop();
        }
        Self(dims)
    }

    /// Check for the zero weight
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of dimension `i`, zero when absent
    pub fn get(&self, i: usize) -> u64 {
        self.0.get(i).copied().unwrap_or(0)
    }

    /// Value of the first dimension
    pub fn as_u64(&self) -> u64 {
        self.get(0)
    }

    /// Number of significant dimensions
    pub fn dims(&self) -> usize {
        self.0.len()
    }

    /// `self` followed by `other`; element-wise, saturating.
    pub fn add(&self, other: &Weight) -> Weight {
        let len = self.0.len().max(other.0.len());
        Weight::new(
            (0..len)
                .map(|i| self.get(i).saturating_add(other.get(i)))
                .collect(),
        )
    }

    /// The weight that, appended to `base`, yields `self`
    pub fn checked_sub(&self, base: &Weight) -> Option<Weight> {
        let len = self.0.len().max(base.0.len());
        let dims = (0..len)
            .map(|i| self.get(i).checked_sub(base.get(i)))
            .collect::<Option<Vec<_>>>()?;
        Some(Weight::new(dims))
    }

    /// Append one varint per dimension
    pub fn encode(&self, buf: &mut impl BufMut) {
        for d in &self.0 {
            put_uvarint(buf, *d);
        }
    }

    /// Size of `encode`'s output
    pub fn encoded_len(&self) -> usize {
        self.0.iter().map(|d| uvarint_len(*d)).sum()
    }

    /// Parse a weight that occupies all of `buf`
    pub fn decode(mut buf: Bytes) -> Result<Weight> {
        let mut dims = Vec::new();
        while !buf.is_empty() {
            dims.push(get_uvarint(&mut buf)?);
        }
        Ok(Weight::new(dims))
    }
}

impl Ord for Weight {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.get(i).cmp(&other.get(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Weight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<u64> for Weight {
    fn from(n: u64) -> Self {
        Weight::from_u64(n)
    }
}

impl fmt::Debug for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Weight{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_trailing_zeros_trimmed() {
        assert_eq!(Weight::new(vec![3, 0, 0]), Weight::from_u64(3));
        assert_eq!(Weight::new(vec![0]), Weight::zero());
        assert!(Weight::from_u64(0).is_zero());
    }

    #[test]
    fn test_add_and_sub() {
        let a = Weight::from_u64(5);
        let b = Weight::new(vec![2, 7]);
        let sum = a.add(&b);

        assert_eq!(sum, Weight::new(vec![7, 7]));
        assert_eq!(sum.checked_sub(&a), Some(b.clone()));
        assert_eq!(a.checked_sub(&b), None);
    }

    #[test]
    fn test_ordering() {
        assert!(Weight::from_u64(2) < Weight::from_u64(10));
        assert!(Weight::zero() < Weight::from_u64(1));
        assert!(Weight::new(vec![1, 5]) > Weight::from_u64(1));
        assert_eq!(Weight::new(vec![4, 0]).cmp(&Weight::from_u64(4)), Ordering::Equal);
    }

    #[test]
    fn test_encode_decode() {
        let w = Weight::new(vec![300, 1]);
        let mut buf = BytesMut::new();
        w.encode(&mut buf);
        assert_eq!(buf.len(), w.encoded_len());
        assert_eq!(Weight::decode(buf.freeze()).unwrap(), w);
        assert_eq!(Weight::decode(Bytes::new()).unwrap(), Weight::zero());
    }
}
