//! LEB128 variable-length integers and length-prefixed byte strings.

use crate::{CoreError, Result};
use bytes::{Buf, BufMut, Bytes};

/// Encode an unsigned 64-bit integer as LEB128 into `buf`.
#[inline]
pub fn put_uvarint(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Number of bytes `put_uvarint` writes for `value`.
#[inline]
pub fn uvarint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Decode a LEB128 unsigned 64-bit integer, advancing `buf` past it.
#[inline]
pub fn get_uvarint(buf: &mut impl Buf) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        if !buf.has_remaining() {
            return Err(CoreError::Truncated {
                needed: 1,
                available: 0,
            });
        }
        let byte = buf.get_u8();

        let payload = (byte & 0x7F) as u64;
        if shift > 63 || (shift == 63 && payload > 1) {
            return Err(CoreError::VarintOverflow);
        }
        result |= payload << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Write `data` prefixed by its length.
#[inline]
pub fn put_lp(buf: &mut impl BufMut, data: &[u8]) {
    put_uvarint(buf, data.len() as u64);
    buf.put_slice(data);
}

/// Encoded size of `put_lp(data)`.
#[inline]
pub fn lp_len(data: &[u8]) -> usize {
    uvarint_len(data.len() as u64) + data.len()
}

/// Read a length-prefixed byte string without copying.
pub fn get_lp(buf: &mut Bytes) -> Result<Bytes> {
    let len = get_uvarint(buf)?;
    take(buf, len)
}

/// Split `len` bytes off the front of `buf`.
pub fn take(buf: &mut Bytes, len: u64) -> Result<Bytes> {
    if len > buf.len() as u64 {
        return Err(CoreError::Truncated {
            needed: usize::try_from(len).unwrap_or(usize::MAX),
            available: buf.len(),
        });
    }
    Ok(buf.split_to(len as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_round_trip_various() {
        for val in [0, 1, 127, 128, 255, 256, 65535, 65536, u32::MAX as u64, u64::MAX] {
            let mut buf = BytesMut::new();
            put_uvarint(&mut buf, val);
            assert_eq!(buf.len(), uvarint_len(val));
            let mut bytes = buf.freeze();
            assert_eq!(get_uvarint(&mut bytes).unwrap(), val);
            assert!(bytes.is_empty());
        }
    }

    #[test]
    fn test_encoding_sizes() {
        assert_eq!(uvarint_len(0), 1);
        assert_eq!(uvarint_len(127), 1);
        assert_eq!(uvarint_len(128), 2);
        assert_eq!(uvarint_len(u64::MAX), 10);
    }

    #[test]
    fn test_eof_error() {
        let mut empty = Bytes::new();
        assert!(matches!(get_uvarint(&mut empty), Err(CoreError::Truncated { .. })));

        let mut dangling = Bytes::from_static(&[0x80]);
        assert!(matches!(get_uvarint(&mut dangling), Err(CoreError::Truncated { .. })));
    }

    #[test]
    fn test_overflow_error() {
        let mut too_long = Bytes::from_static(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02]);
        assert!(matches!(get_uvarint(&mut too_long), Err(CoreError::VarintOverflow)));
    }

    #[test]
    fn test_lp_truncated() {
        let mut buf = BytesMut::new();
        put_lp(&mut buf, b"hello");
        assert_eq!(buf.len(), lp_len(b"hello"));
        let mut short = buf.freeze().slice(..4);
        assert!(matches!(get_lp(&mut short), Err(CoreError::Truncated { needed: 5, available: 3 })));
    }
}
