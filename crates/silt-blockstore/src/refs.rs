//! Content addresses (refs)
//!
//! A ref is a CIDv1 with the raw codec and a BLAKE3-256 multihash of the
//! blob bytes. The tree engine only compares refs for byte equality.

use crate::{BlockStoreError, Result};
use cid::{Cid, Version};
use multihash_codetable::{Code, MultihashDigest};

/// Opaque content address of a stored blob
pub type Ref = Cid;

/// Multicodec code for raw binary blocks
const RAW_CODEC: u64 = 0x55;

/// Byte length of every ref: version, codec, hash code, digest length and
/// a 32-byte digest
pub const REF_SIZE: usize = 36;

/// Create the ref addressing `data`
pub fn create_ref(data: &[u8]) -> Ref {
    let multihash = Code::Blake3_256.digest(data);
    Cid::new_v1(RAW_CODEC, multihash)
}

/// Verify that data matches a ref
pub fn verify_ref(data: &[u8], r: &Ref) -> bool {
    r.version() == Version::V1 && r.codec() == RAW_CODEC && create_ref(data) == *r
}

/// Parse a ref from its exact byte form
pub fn parse_ref(bytes: &[u8]) -> Result<Ref> {
    let (r, consumed) = read_ref(bytes)?;
    if consumed != bytes.len() {
        return Err(BlockStoreError::InvalidCid(format!(
            "{} trailing bytes after ref",
            bytes.len() - consumed
        )));
    }
    Ok(r)
}

/// Read a ref from the front of `bytes`, returning it and the bytes consumed.
///
/// Ref bytes are self-delimiting, which lets persisted roots append fields
/// after the ref without a length prefix.
pub fn read_ref(bytes: &[u8]) -> Result<(Ref, usize)> {
    let mut cursor = std::io::Cursor::new(bytes);
    let r = Cid::read_bytes(&mut cursor)?;
    Ok((r, cursor.position() as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ref() {
        let r = create_ref(b"Hello, World!");

        assert_eq!(r.version(), Version::V1);
        assert_eq!(r.codec(), RAW_CODEC);
        assert_eq!(r.to_bytes().len(), REF_SIZE);
        assert_eq!(create_ref(&[0u8; 4096]).to_bytes().len(), REF_SIZE);
    }

    #[test]
    fn test_ref_consistency() {
        assert_eq!(create_ref(b"test data"), create_ref(b"test data"));
        assert_ne!(create_ref(b"data1"), create_ref(b"data2"));
    }

    #[test]
    fn test_verify_ref() {
        let r = create_ref(b"verify me");

        assert!(verify_ref(b"verify me", &r));
        assert!(!verify_ref(b"wrong data", &r));
    }

    #[test]
    fn test_parse_ref_bytes() {
        let r = create_ref(b"test");
        let bytes = r.to_bytes();

        assert_eq!(parse_ref(&bytes).unwrap(), r);
        assert!(parse_ref(&bytes[..bytes.len() - 1]).is_err());

        let mut padded = bytes.clone();
        padded.push(7);
        assert!(parse_ref(&padded).is_err());
    }

    #[test]
    fn test_read_ref_prefix() {
        let r = create_ref(b"prefix");
        let mut bytes = r.to_bytes();
        let ref_len = bytes.len();
        bytes.extend_from_slice(&[3, b'k', b'e', b'y']);

        let (parsed, consumed) = read_ref(&bytes).unwrap();
        assert_eq!(parsed, r);
        assert_eq!(consumed, ref_len);
    }
}
