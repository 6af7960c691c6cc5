//! Streaming Scan Iterator
//!
//! Lazy, single-use iterator over one index-family prefix. The iterator
//! owns its backend cursor (which pins a consistent view of the tree),
//! decodes keys and payloads as it advances, applies the residual
//! filters the prefix could not cover, and resolves interned ids back to
//! strings through the dictionary.
//!
//! Yielded facts are fully owned; nothing borrowed from the iterator
//! escapes a `next` call.

use crate::cancel::CancelToken;
use crate::codec::decode_spo_order;
use crate::dict::Dictionary;
use crate::error::{Result, StoreError};
use crate::kv::KvEntry;
use crate::value::{EncodedFact, EncodedObject, Fact, FactMeta, Id, Value};
use std::sync::Arc;

/// Residual match conditions applied in-stream; `0` / `None` means any
pub(crate) struct ScanFilter {
    pub subject: Id,
    pub predicate: Id,
    pub object: Option<EncodedObject>,
    pub graph: Id,
}

impl ScanFilter {
    fn matches(&self, fact: &EncodedFact) -> bool {
        (self.subject == 0 || fact.subject == self.subject)
            && (self.predicate == 0 || fact.predicate == self.predicate)
            && (self.graph == 0 || fact.graph == self.graph)
            && self
                .object
                .as_ref()
                .map_or(true, |object| fact.object == *object)
    }
}

/// Single-use streaming scan over matching facts
pub struct ScanIter {
    inner: Option<Box<dyn Iterator<Item = std::result::Result<KvEntry, fjall::Error>>>>,
    dict: Arc<Dictionary>,
    filter: ScanFilter,
    token: CancelToken,
    failed: bool,
}

impl std::fmt::Debug for ScanIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanIter")
            .field("exhausted", &self.inner.is_none())
            .field("failed", &self.failed)
            .finish()
    }
}

impl ScanIter {
    pub(crate) fn new(
        inner: Box<dyn Iterator<Item = std::result::Result<KvEntry, fjall::Error>>>,
        dict: Arc<Dictionary>,
        filter: ScanFilter,
        token: CancelToken,
    ) -> Self {
        ScanIter {
            inner: Some(inner),
            dict,
            filter,
            token,
            failed: false,
        }
    }

    /// An iterator that yields nothing (e.g. a bound term was never
    /// interned, so no fact can match)
    pub(crate) fn empty(dict: Arc<Dictionary>, token: CancelToken) -> Self {
        ScanIter {
            inner: None,
            dict,
            filter: ScanFilter {
                subject: 0,
                predicate: 0,
                object: None,
                graph: 0,
            },
            token,
            failed: false,
        }
    }

    fn materialize(&self, encoded: &EncodedFact) -> Result<Fact> {
        let resolve = |id: Id, slot: &'static str| -> Result<String> {
            self.dict.get_string(id)?.ok_or_else(|| {
                StoreError::corruption("store", format!("dangling {slot} id {id} in index"))
            })
        };
        let object = match &encoded.object {
            EncodedObject::Str(id) => Value::Str(resolve(*id, "object")?),
            EncodedObject::Int(i) => Value::Int(*i),
            EncodedObject::Float(f) => Value::Float(*f),
            EncodedObject::Bool(b) => Value::Bool(*b),
            EncodedObject::Bytes(b) => Value::Bytes(b.clone()),
        };
        Ok(Fact {
            subject: resolve(encoded.subject, "subject")?,
            predicate: resolve(encoded.predicate, "predicate")?,
            object,
            graph: resolve(encoded.graph, "graph")?,
            meta: FactMeta {
                weight: encoded.weight,
                source: encoded.source,
                created_at: encoded.created_at,
            },
        })
    }
}

impl Iterator for ScanIter {
    type Item = Result<Fact>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Err(e) = self.token.check() {
                self.failed = true;
                return Some(Err(e));
            }
            let entry = match self.inner.as_mut()?.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            };
            let decoded = decode_entry(&entry);
            match decoded {
                Ok(encoded) => {
                    if !self.filter.matches(&encoded) {
                        continue;
                    }
                    match self.materialize(&encoded) {
                        Ok(fact) => return Some(Ok(fact)),
                        Err(e) => {
                            self.failed = true;
                            return Some(Err(e));
                        }
                    }
                }
                Err(e) => {
                    // Corruption is never skipped in a scan; the caller
                    // decides what to do with a broken index.
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Decode one index entry into an [`EncodedFact`]
pub(crate) fn decode_entry(entry: &KvEntry) -> Result<EncodedFact> {
    let (key, value) = entry;
    let (subject, predicate, _object_slot, graph) = decode_spo_order(key.as_ref())?;
    let fact = EncodedFact::decode_payload(subject, predicate, value.as_ref())?;
    if fact.graph != graph {
        return Err(StoreError::corruption(
            "store",
            format!("key graph {graph} disagrees with payload graph {}", fact.graph),
        ));
    }
    Ok(fact)
}
