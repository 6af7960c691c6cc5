//! Index Key Codec
//!
//! Composite keys for the three index families. Every fact is written
//! once per family; the family byte keeps the key spaces disjoint inside
//! a single partition:
//!
//! ```text
//! SPO  0x01 ‖ be64(subject) ‖ be64(predicate) ‖ be64(object) ‖ be64(graph)
//! OPS  0x02 ‖ be64(object)  ‖ be64(predicate) ‖ be64(subject) ‖ be64(graph)
//! PSO  0x03 ‖ be64(predicate) ‖ be64(subject) ‖ be64(object) ‖ be64(graph)
//! ```
//!
//! The graph id trails every key: facts are identified by the full
//! `(s, p, o, g)` tuple, so the same triple asserted in two graphs is
//! two distinct entries in every family. Prefix scans bind the leading
//! slots only and filter the graph in-stream.
//!
//! All ids are big-endian so lexicographic byte order equals numeric order
//! and a prefix seek returns every match consecutively.

use crate::error::{Result, StoreError};
use crate::value::Id;

/// Full composite key length: family byte plus four 8-byte ids
pub const KEY_LEN: usize = 33;

/// Index family, the leading key byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexFamily {
    /// Subject-major
    Spo = 0x01,
    /// Object-major
    Ops = 0x02,
    /// Predicate-major
    Pso = 0x03,
}

impl IndexFamily {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(IndexFamily::Spo),
            0x02 => Some(IndexFamily::Ops),
            0x03 => Some(IndexFamily::Pso),
            _ => None,
        }
    }
}

/// Encode a full key for `family` with ids in family order plus the graph
pub fn encode_key(family: IndexFamily, id1: Id, id2: Id, id3: Id, graph: Id) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    key[0] = family as u8;
    key[1..9].copy_from_slice(&id1.to_be_bytes());
    key[9..17].copy_from_slice(&id2.to_be_bytes());
    key[17..25].copy_from_slice(&id3.to_be_bytes());
    key[25..33].copy_from_slice(&graph.to_be_bytes());
    key
}

/// Encode a scan prefix: the leading fixed bytes up to the first unbound
/// slot. `id1 = 0` yields the 1-byte family prefix, `id2 = 0` the 9-byte
/// one, otherwise 17 bytes.
pub fn encode_prefix(family: IndexFamily, id1: Id, id2: Id) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(17);
    prefix.push(family as u8);
    if id1 == 0 {
        return prefix;
    }
    prefix.extend_from_slice(&id1.to_be_bytes());
    if id2 == 0 {
        return prefix;
    }
    prefix.extend_from_slice(&id2.to_be_bytes());
    prefix
}

/// Decode a composite key back into `(family, id1, id2, id3, graph)`
pub fn decode_key(bytes: &[u8]) -> Result<(IndexFamily, Id, Id, Id, Id)> {
    if bytes.len() != KEY_LEN {
        return Err(StoreError::corruption(
            "codec",
            format!("index key has length {}, expected {KEY_LEN}", bytes.len()),
        ));
    }
    let family = IndexFamily::from_byte(bytes[0]).ok_or_else(|| {
        StoreError::corruption("codec", format!("unknown index family 0x{:02x}", bytes[0]))
    })?;
    let id1 = Id::from_be_bytes(bytes[1..9].try_into().expect("slice length checked"));
    let id2 = Id::from_be_bytes(bytes[9..17].try_into().expect("slice length checked"));
    let id3 = Id::from_be_bytes(bytes[17..25].try_into().expect("slice length checked"));
    let graph = Id::from_be_bytes(bytes[25..33].try_into().expect("slice length checked"));
    Ok((family, id1, id2, id3, graph))
}

/// Decode a key of any family into `(subject, predicate, object, graph)`
pub fn decode_spo_order(bytes: &[u8]) -> Result<(Id, Id, Id, Id)> {
    let (family, id1, id2, id3, graph) = decode_key(bytes)?;
    Ok(match family {
        IndexFamily::Spo => (id1, id2, id3, graph),
        IndexFamily::Ops => (id3, id2, id1, graph),
        IndexFamily::Pso => (id2, id1, id3, graph),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_round_trip() {
        for family in [IndexFamily::Spo, IndexFamily::Ops, IndexFamily::Pso] {
            let key = encode_key(family, 1, 2, 3, 4);
            assert_eq!(decode_key(&key).unwrap(), (family, 1, 2, 3, 4));
        }
    }

    #[test]
    fn spo_order_recovery() {
        // Same logical fact (s=10, p=20, o=30, g=40) through each family
        let spo = encode_key(IndexFamily::Spo, 10, 20, 30, 40);
        let ops = encode_key(IndexFamily::Ops, 30, 20, 10, 40);
        let pso = encode_key(IndexFamily::Pso, 20, 10, 30, 40);
        for key in [spo, ops, pso] {
            assert_eq!(decode_spo_order(&key).unwrap(), (10, 20, 30, 40));
        }
    }

    #[test]
    fn graph_distinguishes_keys() {
        let g1 = encode_key(IndexFamily::Spo, 1, 2, 3, 7);
        let g2 = encode_key(IndexFamily::Spo, 1, 2, 3, 8);
        assert_ne!(g1, g2, "same triple in two graphs must not collide");
        assert_eq!(&g1[..25], &g2[..25], "only the graph tail differs");
    }

    #[test]
    fn prefix_lengths() {
        assert_eq!(encode_prefix(IndexFamily::Spo, 0, 0).len(), 1);
        assert_eq!(encode_prefix(IndexFamily::Spo, 5, 0).len(), 9);
        assert_eq!(encode_prefix(IndexFamily::Spo, 5, 6).len(), 17);
    }

    #[test]
    fn prefix_matches_full_key() {
        let key = encode_key(IndexFamily::Ops, 5, 6, 7, 8);
        let prefix = encode_prefix(IndexFamily::Ops, 5, 6);
        assert!(key.starts_with(&prefix));
    }

    #[test]
    fn byte_order_follows_numeric_order() {
        let small = encode_key(IndexFamily::Spo, 1, 0xffff_ffff, 0, 0);
        let large = encode_key(IndexFamily::Spo, 2, 0, 0, 0);
        assert!(small < large, "big-endian keys must sort numerically");
    }

    #[test]
    fn bad_length_rejected() {
        assert!(decode_key(&[0x01; 25]).is_err());
        assert!(decode_key(&[0x01; 32]).is_err());
        assert!(decode_key(&[0x01; 34]).is_err());
    }

    #[test]
    fn unknown_family_rejected() {
        let mut key = encode_key(IndexFamily::Spo, 1, 2, 3, 4);
        key[0] = 0x7f;
        let err = decode_key(&key).unwrap_err();
        assert!(err.to_string().contains("unknown index family"));
    }
}
