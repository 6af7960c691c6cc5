//! Fact Data Model
//!
//! Core types for the fact graph: interned identifiers, object values,
//! per-fact metadata, and the on-disk value payload codec.
//!
//! ## Payload Layout
//!
//! Every index entry (SPO, OPS, PSO) stores the same value payload:
//!
//! ```text
//! [0]      object tag
//! [..]     object bytes (8-byte id / i64 / f64, 1-byte bool, framed bytes)
//! [+8]     graph id, big-endian
//! [+4]     weight, f32 big-endian
//! [+1]     source tag
//! [+8]     created_at, seconds since epoch, big-endian
//! ```
//!
//! Non-string objects are encoded inline and never consume dictionary ids.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interned identifier assigned by the dictionary. `0` means unbound.
pub type Id = u64;

/// Reserved id for "unknown/unbound"
pub const UNBOUND: Id = 0;

/// Graph name substituted when a fact is written with an empty graph
pub const DEFAULT_GRAPH: &str = "default";

/// Largest accepted `Value::Bytes` object
pub const MAX_BYTES_OBJECT: usize = 1024;

// Object tags, byte 0 of the value payload
const TAG_STR: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_BOOL: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;

/// An object value as seen by callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Interned string (subjects of other facts, symbol names, …)
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Small opaque payload, capped at [`MAX_BYTES_OBJECT`]
    Bytes(Vec<u8>),
}

impl Value {
    /// The string content, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value for binding comparison and display
    pub fn render(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Bytes(b) => format!("bytes[{}]", b.len()),
        }
    }

    /// Human-readable type name for validation errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

/// Where a fact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactSource {
    /// Extracted from a syntax tree during ingestion
    Ast,
    /// Synthesized edge (portals, lifts)
    Virtual,
    /// Derived by a downstream reasoner
    Inference,
    /// Imported from outside the ingestion pipeline
    External,
}

impl FactSource {
    fn to_tag(self) -> u8 {
        match self {
            FactSource::Ast => 0,
            FactSource::Virtual => 1,
            FactSource::Inference => 2,
            FactSource::External => 3,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FactSource::Ast),
            1 => Some(FactSource::Virtual),
            2 => Some(FactSource::Inference),
            3 => Some(FactSource::External),
            _ => None,
        }
    }

    /// Canonical lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            FactSource::Ast => "ast",
            FactSource::Virtual => "virtual",
            FactSource::Inference => "inference",
            FactSource::External => "external",
        }
    }
}

impl Default for FactSource {
    fn default() -> Self {
        FactSource::Ast
    }
}

/// Optional per-fact metadata stored in the value payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactMeta {
    /// Edge weight used by the pathfinder (lower is better)
    pub weight: f32,
    /// Provenance of the fact
    pub source: FactSource,
    /// Seconds since epoch; `0` means "stamp at write time"
    pub created_at: u64,
}

impl Default for FactMeta {
    fn default() -> Self {
        FactMeta {
            weight: 1.0,
            source: FactSource::Ast,
            created_at: 0,
        }
    }
}

/// One logical edge in the graph: `(subject, predicate, object, graph)`
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub subject: String,
    pub predicate: String,
    pub object: Value,
    /// Graph partition; empty means [`DEFAULT_GRAPH`]
    pub graph: String,
    pub meta: FactMeta,
}

impl Fact {
    /// A fact with default metadata
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<Value>,
        graph: impl Into<String>,
    ) -> Self {
        Fact {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            graph: graph.into(),
            meta: FactMeta::default(),
        }
    }

    /// Override the pathfinder weight
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.meta.weight = weight;
        self
    }

    /// Override the provenance
    pub fn with_source(mut self, source: FactSource) -> Self {
        self.meta.source = source;
        self
    }
}

/// Object with strings replaced by their interned ids
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedObject {
    Str(Id),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl EncodedObject {
    /// The id slot stored in the composite key. Non-string objects hash
    /// their inline bytes into the slot so the key stays total; the
    /// authoritative object lives in the payload.
    pub fn key_id(&self) -> Id {
        match self {
            EncodedObject::Str(id) => *id,
            EncodedObject::Int(i) => splitmix64(*i as u64 ^ (u64::from(TAG_INT) << 56)),
            EncodedObject::Float(f) => splitmix64(f.to_bits() ^ (u64::from(TAG_FLOAT) << 56)),
            EncodedObject::Bool(b) => splitmix64(u64::from(*b) ^ (u64::from(TAG_BOOL) << 56)),
            EncodedObject::Bytes(b) => {
                let mut h = 0xcbf2_9ce4_8422_2325u64;
                for &byte in b {
                    h ^= u64::from(byte);
                    h = h.wrapping_mul(0x0000_0100_0000_01b3);
                }
                splitmix64(h ^ (u64::from(TAG_BYTES) << 56))
            }
        }
    }
}

// Finalizer from the splitmix64 generator; spreads inline objects over the
// key space so object-major prefixes stay selective.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Fully encoded fact: key ids plus the payload fields
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFact {
    pub subject: Id,
    pub predicate: Id,
    pub object: EncodedObject,
    pub graph: Id,
    pub weight: f32,
    pub source: FactSource,
    pub created_at: u64,
}

impl EncodedFact {
    /// Serialize the value payload (everything except the key ids)
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        match &self.object {
            EncodedObject::Str(id) => {
                buf.push(TAG_STR);
                buf.extend_from_slice(&id.to_be_bytes());
            }
            EncodedObject::Int(i) => {
                buf.push(TAG_INT);
                buf.extend_from_slice(&i.to_be_bytes());
            }
            EncodedObject::Float(f) => {
                buf.push(TAG_FLOAT);
                buf.extend_from_slice(&f.to_be_bytes());
            }
            EncodedObject::Bool(b) => {
                buf.push(TAG_BOOL);
                buf.push(u8::from(*b));
            }
            EncodedObject::Bytes(b) => {
                buf.push(TAG_BYTES);
                buf.extend_from_slice(&(b.len() as u16).to_be_bytes());
                buf.extend_from_slice(b);
            }
        }
        buf.extend_from_slice(&self.graph.to_be_bytes());
        buf.extend_from_slice(&self.weight.to_be_bytes());
        buf.push(self.source.to_tag());
        buf.extend_from_slice(&self.created_at.to_be_bytes());
        buf
    }

    /// Decode a value payload produced by [`EncodedFact::encode_payload`].
    ///
    /// The key ids are supplied by the caller from the decoded index key.
    pub fn decode_payload(subject: Id, predicate: Id, bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { bytes, pos: 0 };
        let tag = cursor.u8()?;
        let object = match tag {
            TAG_STR => EncodedObject::Str(cursor.u64()?),
            TAG_INT => EncodedObject::Int(cursor.u64()? as i64),
            TAG_FLOAT => EncodedObject::Float(f64::from_bits(cursor.u64()?)),
            TAG_BOOL => EncodedObject::Bool(cursor.u8()? != 0),
            TAG_BYTES => {
                let len = cursor.u16()? as usize;
                EncodedObject::Bytes(cursor.take(len)?.to_vec())
            }
            other => {
                return Err(StoreError::corruption(
                    "codec",
                    format!("unknown object tag 0x{other:02x}"),
                ));
            }
        };
        let graph = cursor.u64()?;
        let weight = f32::from_be_bytes(cursor.array::<4>()?);
        let source = FactSource::from_tag(cursor.u8()?).ok_or_else(|| {
            StoreError::corruption("codec", "unknown fact source tag".to_string())
        })?;
        let created_at = cursor.u64()?;
        cursor.finish()?;
        Ok(EncodedFact {
            subject,
            predicate,
            object,
            graph,
            weight,
            source,
            created_at,
        })
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(StoreError::corruption("codec", "truncated value payload"));
        }
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array::<2>()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array::<8>()?))
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.bytes.len() {
            return Err(StoreError::corruption(
                "codec",
                "trailing bytes in value payload",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(object: EncodedObject) -> EncodedFact {
        EncodedFact {
            subject: 7,
            predicate: 9,
            object,
            graph: 3,
            weight: 2.5,
            source: FactSource::Virtual,
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn payload_round_trip_all_tags() {
        let objects = vec![
            EncodedObject::Str(42),
            EncodedObject::Int(-5),
            EncodedObject::Float(3.25),
            EncodedObject::Bool(true),
            EncodedObject::Bytes(vec![1, 2, 3]),
        ];
        for object in objects {
            let fact = sample(object);
            let bytes = fact.encode_payload();
            let back = EncodedFact::decode_payload(7, 9, &bytes).unwrap();
            assert_eq!(back, fact);
        }
    }

    #[test]
    fn unknown_tag_is_corruption() {
        let err = EncodedFact::decode_payload(1, 1, &[0xff, 0, 0]).unwrap_err();
        assert!(err.to_string().contains("unknown object tag"));
    }

    #[test]
    fn truncated_payload_is_corruption() {
        let fact = sample(EncodedObject::Int(1));
        let bytes = fact.encode_payload();
        assert!(EncodedFact::decode_payload(7, 9, &bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn inline_objects_get_distinct_key_ids() {
        let a = EncodedObject::Int(1).key_id();
        let b = EncodedObject::Int(2).key_id();
        let c = EncodedObject::Bool(true).key_id();
        assert_ne!(a, b);
        assert_ne!(a, c);
        // Stable across calls
        assert_eq!(a, EncodedObject::Int(1).key_id());
    }
}
