//! Quad Store
//!
//! The persistent fact graph. Every logical fact `(s, p, o, g)` is
//! dictionary-encoded and written as three parallel index entries (SPO,
//! OPS, PSO) in one atomic batch, so any binding pattern can be answered
//! with a single prefix scan.
//!
//! ## Write path
//!
//! `add_batch` interns every string once, encodes each fact's payload
//! (object, graph, weight, source, timestamp), and commits all index
//! entries plus the fact counter in a single batch. Writers serialize
//! through one lane; readers stream from pinned views and never block.
//!
//! ## Index strategy
//!
//! | bound            | family | prefix                |
//! |------------------|--------|-----------------------|
//! | subject          | SPO    | `s` or `s,p`          |
//! | object (no s)    | OPS    | `o` or `o,p`          |
//! | predicate only   | PSO    | `p`                   |
//! | graph only       | SPO    | family sweep + filter |
//!
//! A scan with nothing bound at all is rejected with
//! [`StoreError::FullTableScan`].

pub mod metadata;
pub mod scan;

pub use metadata::StoreMetadata;
pub use scan::ScanIter;

use crate::cancel::CancelToken;
use crate::codec::{encode_key, encode_prefix, IndexFamily, KEY_LEN};
use crate::config::Config;
use crate::dict::Dictionary;
use crate::docs::Documents;
use crate::error::{Result, StoreError};
use crate::kv::{Backend, META_FACT_COUNT};
use crate::path::portals::Portals;
use crate::path::{Path, PathFinder, PathOptions};
use crate::query::{self, Binding};
use crate::value::{
    EncodedFact, EncodedObject, Fact, Id, Value, DEFAULT_GRAPH, MAX_BYTES_OBJECT,
};
use parking_lot::Mutex;
use scan::ScanFilter;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Facts deleted per commit during bulk deletes (three keys each, keeping
/// every commit under one thousand keys)
const DELETE_CHUNK_FACTS: usize = 333;

/// The embedded knowledge store
pub struct Store {
    backend: Arc<Backend>,
    dict: Arc<Dictionary>,
    documents: Documents,
    portals: Portals,
    num_facts: AtomicU64,
    /// Serializes every mutating operation; readers never take it
    write_lane: Mutex<()>,
    config: Config,
    metadata: StoreMetadata,
}

impl Store {
    /// Open (or create) a store under `config.storage.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        let metadata = StoreMetadata::load_or_create(&config.storage.data_dir)?;
        let backend = Arc::new(Backend::open(&config.storage)?);
        let dict = Arc::new(Dictionary::open(
            Arc::clone(&backend),
            config.storage.dict_shards,
            config.storage.dict_cache_per_shard,
        )?);
        if !config.storage.read_only {
            // The default graph id must exist before the first write
            dict.get_id(DEFAULT_GRAPH)?;
        }
        let num_facts = backend.meta_u64(META_FACT_COUNT)?.unwrap_or(0);
        let documents = Documents::new(
            Arc::clone(&backend),
            Arc::clone(&dict),
            config.storage.read_only,
        );
        info!(
            data_dir = %config.storage.data_dir.display(),
            facts = num_facts,
            read_only = config.storage.read_only,
            "store opened"
        );
        Ok(Store {
            backend,
            dict,
            documents,
            portals: Portals::new(),
            num_facts: AtomicU64::new(num_facts),
            write_lane: Mutex::new(()),
            config,
            metadata,
        })
    }

    /// Number of logical facts
    pub fn count(&self) -> u64 {
        self.num_facts.load(Ordering::Relaxed)
    }

    /// The document store sharing this store's backend and dictionary
    pub fn documents(&self) -> &Documents {
        &self.documents
    }

    /// A pathfinder over this store's fact graph
    pub fn pathfinder(&self) -> PathFinder<'_> {
        PathFinder::new(self)
    }

    /// Shortest structural path between two node identifiers
    pub fn find_path(
        &self,
        start: &str,
        end: &str,
        options: &PathOptions,
        token: &CancelToken,
    ) -> Result<Path> {
        self.pathfinder().find(start, end, options, token)
    }

    /// Evaluate a Datalog-style query into a list of bindings
    pub fn query(&self, token: &CancelToken, query: &str) -> Result<Vec<Binding>> {
        query::evaluate(self, query, token)
    }

    /// Force all committed batches to durable storage
    pub fn flush(&self) -> Result<()> {
        self.backend.persist()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert a batch of facts atomically
    ///
    /// The whole batch is validated up front and rejected on the first
    /// bad fact. Re-inserting an existing fact overwrites the same index
    /// keys and does not change the count.
    pub fn add_batch(&self, facts: &[Fact], token: &CancelToken) -> Result<()> {
        if self.config.storage.read_only {
            return Err(StoreError::ReadOnly);
        }
        if facts.is_empty() {
            return Ok(());
        }
        for fact in facts {
            validate_fact(fact)?;
        }

        // Intern every distinct string with one dictionary call
        let mut uniq: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        {
            let mut collect = |s: &str| {
                if !index.contains_key(s) {
                    index.insert(s.to_string(), uniq.len());
                    uniq.push(s.to_string());
                }
            };
            for fact in facts {
                collect(&fact.subject);
                collect(&fact.predicate);
                collect(graph_or_default(&fact.graph));
                if let Value::Str(s) = &fact.object {
                    collect(s);
                }
            }
        }
        let ids = self.dict.get_ids(&uniq)?;
        let id_of = |s: &str| ids[index[s]];
        token.check()?;

        let now = unix_now();
        let portal_predicate = &self.config.pathfinder.portal_predicate;
        let mut touched_portals = false;

        let _lane = self.write_lane.lock();
        let mut batch = self.backend.batch();
        let mut batch_keys: HashSet<[u8; KEY_LEN]> = HashSet::with_capacity(facts.len());
        let mut fresh = 0u64;
        for fact in facts {
            token.check()?;
            let object = match &fact.object {
                Value::Str(s) => EncodedObject::Str(id_of(s)),
                Value::Int(i) => EncodedObject::Int(*i),
                Value::Float(f) => EncodedObject::Float(*f),
                Value::Bool(b) => EncodedObject::Bool(*b),
                Value::Bytes(b) => EncodedObject::Bytes(b.clone()),
            };
            let encoded = EncodedFact {
                subject: id_of(&fact.subject),
                predicate: id_of(&fact.predicate),
                graph: id_of(graph_or_default(&fact.graph)),
                object,
                weight: fact.meta.weight,
                source: fact.meta.source,
                created_at: if fact.meta.created_at == 0 {
                    now
                } else {
                    fact.meta.created_at
                },
            };
            let o_key = encoded.object.key_id();
            let spo = encode_key(
                IndexFamily::Spo,
                encoded.subject,
                encoded.predicate,
                o_key,
                encoded.graph,
            );
            let ops = encode_key(
                IndexFamily::Ops,
                o_key,
                encoded.predicate,
                encoded.subject,
                encoded.graph,
            );
            let pso = encode_key(
                IndexFamily::Pso,
                encoded.predicate,
                encoded.subject,
                o_key,
                encoded.graph,
            );

            if batch_keys.insert(spo) && self.backend.get(&self.backend.facts, &spo)?.is_none() {
                fresh += 1;
            }
            let payload = encoded.encode_payload();
            batch.set(&self.backend.facts, spo.to_vec(), payload.clone());
            batch.set(&self.backend.facts, ops.to_vec(), payload.clone());
            batch.set(&self.backend.facts, pso.to_vec(), payload);

            if fact.predicate == *portal_predicate {
                touched_portals = true;
            }
        }

        let new_count = self.num_facts.load(Ordering::Relaxed) + fresh;
        batch.set(
            &self.backend.meta,
            META_FACT_COUNT.to_vec(),
            new_count.to_be_bytes().to_vec(),
        );
        batch.commit()?;
        self.num_facts.store(new_count, Ordering::Relaxed);
        if touched_portals {
            self.portals.invalidate();
        }
        debug!(facts = facts.len(), fresh, "batch committed");
        Ok(())
    }

    /// Insert a single fact (a one-item [`Store::add_batch`])
    pub fn add_fact(&self, fact: Fact, token: &CancelToken) -> Result<()> {
        self.add_batch(std::slice::from_ref(&fact), token)
    }

    /// Delete every fact in `graph`
    ///
    /// An unknown graph is a no-op. Keys are collected first, the
    /// collection iterator is closed, and deletion proceeds in bounded
    /// commits, so a crashed delete converges when re-invoked.
    pub fn delete_graph(&self, graph: &str, token: &CancelToken) -> Result<()> {
        if self.config.storage.read_only {
            return Err(StoreError::ReadOnly);
        }
        if graph.is_empty() {
            return Err(StoreError::InvalidInput(
                "delete_graph requires a graph name".to_string(),
            ));
        }
        let Some(graph_id) = self.dict.lookup_id(graph)? else {
            return Ok(());
        };

        let _lane = self.write_lane.lock();
        let mut doomed: Vec<(Id, Id, Id, Id)> = Vec::new();
        {
            let sweep = self
                .backend
                .prefix(&self.backend.facts, &[IndexFamily::Spo as u8]);
            for entry in sweep {
                token.check()?;
                let entry = entry?;
                match scan::decode_entry(&entry) {
                    Ok(fact) if fact.graph == graph_id => {
                        doomed.push((
                            fact.subject,
                            fact.predicate,
                            fact.object.key_id(),
                            fact.graph,
                        ));
                    }
                    Ok(_) => {}
                    // Collection tolerates individual bad entries; the
                    // remaining graph is still deleted.
                    Err(e) => warn!(error = %e, "skipping undecodable entry in graph delete"),
                }
            }
        }

        let removed = doomed.len();
        self.delete_encoded(doomed, token)?;
        self.portals.invalidate();
        info!(graph, removed, "graph deleted");
        Ok(())
    }

    /// Delete every fact whose subject is `subject` (incremental re-ingest)
    pub fn delete_by_subject(&self, subject: &str, token: &CancelToken) -> Result<()> {
        if self.config.storage.read_only {
            return Err(StoreError::ReadOnly);
        }
        let Some(subject_id) = self.dict.lookup_id(subject)? else {
            return Ok(());
        };

        let _lane = self.write_lane.lock();
        let mut doomed: Vec<(Id, Id, Id, Id)> = Vec::new();
        {
            let prefix = encode_prefix(IndexFamily::Spo, subject_id, 0);
            for entry in self.backend.prefix(&self.backend.facts, &prefix) {
                token.check()?;
                let fact = scan::decode_entry(&entry?)?;
                doomed.push((
                    fact.subject,
                    fact.predicate,
                    fact.object.key_id(),
                    fact.graph,
                ));
            }
        }

        let removed = doomed.len();
        self.delete_encoded(doomed, token)?;
        self.portals.invalidate();
        debug!(subject, removed, "subject deleted");
        Ok(())
    }

    /// Delete fact triplets in bounded commits, keeping the counter in step
    fn delete_encoded(&self, doomed: Vec<(Id, Id, Id, Id)>, token: &CancelToken) -> Result<()> {
        for chunk in doomed.chunks(DELETE_CHUNK_FACTS) {
            token.check()?;
            let mut batch = self.backend.batch();
            for &(s, p, o, g) in chunk {
                batch.delete(
                    &self.backend.facts,
                    encode_key(IndexFamily::Spo, s, p, o, g).to_vec(),
                );
                batch.delete(
                    &self.backend.facts,
                    encode_key(IndexFamily::Ops, o, p, s, g).to_vec(),
                );
                batch.delete(
                    &self.backend.facts,
                    encode_key(IndexFamily::Pso, p, s, o, g).to_vec(),
                );
            }
            let new_count = self
                .num_facts
                .load(Ordering::Relaxed)
                .saturating_sub(chunk.len() as u64);
            batch.set(
                &self.backend.meta,
                META_FACT_COUNT.to_vec(),
                new_count.to_be_bytes().to_vec(),
            );
            batch.commit()?;
            self.num_facts.store(new_count, Ordering::Relaxed);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Stream facts matching the given bindings
    ///
    /// `None` or an empty string means "any". At least one argument must
    /// be bound. The iterator is lazy and single-use; it yields facts in
    /// index prefix order.
    pub fn scan(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
        graph: Option<&str>,
        token: &CancelToken,
    ) -> Result<ScanIter> {
        let object = nonempty(object).map(|s| Value::Str(s.to_string()));
        self.scan_values(
            nonempty(subject),
            nonempty(predicate),
            object,
            nonempty(graph),
            token,
        )
    }

    /// Scan with a typed object binding (evaluator entry point)
    pub(crate) fn scan_values(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<Value>,
        graph: Option<&str>,
        token: &CancelToken,
    ) -> Result<ScanIter> {
        if subject.is_none() && predicate.is_none() && object.is_none() && graph.is_none() {
            return Err(StoreError::FullTableScan);
        }

        // A bound term that was never interned cannot match any fact
        let mut unknown_binding = false;
        let mut resolve = |s: Option<&str>| -> Result<Id> {
            match s {
                None => Ok(0),
                Some(s) => match self.dict.lookup_id(s)? {
                    Some(id) => Ok(id),
                    None => {
                        unknown_binding = true;
                        Ok(0)
                    }
                },
            }
        };
        let subject_id = resolve(subject)?;
        let predicate_id = resolve(predicate)?;
        let graph_id = resolve(graph)?;
        let object = match object {
            None => None,
            Some(Value::Str(s)) => match self.dict.lookup_id(&s)? {
                Some(id) => Some(EncodedObject::Str(id)),
                None => {
                    unknown_binding = true;
                    None
                }
            },
            Some(Value::Int(i)) => Some(EncodedObject::Int(i)),
            Some(Value::Float(f)) => Some(EncodedObject::Float(f)),
            Some(Value::Bool(b)) => Some(EncodedObject::Bool(b)),
            Some(Value::Bytes(b)) => Some(EncodedObject::Bytes(b)),
        };
        if unknown_binding {
            return Ok(ScanIter::empty(Arc::clone(&self.dict), token.clone()));
        }

        let (family, prefix) = if subject_id != 0 {
            (
                IndexFamily::Spo,
                encode_prefix(IndexFamily::Spo, subject_id, predicate_id),
            )
        } else if let Some(o) = &object {
            (
                IndexFamily::Ops,
                encode_prefix(IndexFamily::Ops, o.key_id(), predicate_id),
            )
        } else if predicate_id != 0 {
            (
                IndexFamily::Pso,
                encode_prefix(IndexFamily::Pso, predicate_id, 0),
            )
        } else {
            // Graph-only: sweep the subject-major family, filter in-stream
            (IndexFamily::Spo, encode_prefix(IndexFamily::Spo, 0, 0))
        };
        debug!(?family, prefix_len = prefix.len(), "scan strategy");

        let filter = ScanFilter {
            subject: subject_id,
            predicate: predicate_id,
            object,
            graph: graph_id,
        };
        Ok(ScanIter::new(
            Box::new(self.backend.prefix(&self.backend.facts, &prefix)),
            Arc::clone(&self.dict),
            filter,
            token.clone(),
        ))
    }

    /// Distinct predicates present in the store, in id order
    pub fn list_predicates(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut last: Id = 0;
        let prefix = [IndexFamily::Pso as u8];
        for entry in self.backend.prefix(&self.backend.facts, &prefix) {
            let (key, _) = entry?;
            let (_, predicate, _, _, _) = crate::codec::decode_key(key.as_ref())?;
            if predicate != last {
                last = predicate;
                if let Some(name) = self.dict.get_string(predicate)? {
                    out.push(name);
                }
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Internal accessors
    // ------------------------------------------------------------------

    pub(crate) fn query_config(&self) -> &crate::config::QueryConfig {
        &self.config.query
    }

    pub(crate) fn pathfinder_config(&self) -> &crate::config::PathfinderConfig {
        &self.config.pathfinder
    }

    pub(crate) fn portals(&self) -> &Portals {
        &self.portals
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Best-effort refresh of the advisory count in the sidecar file
        if !self.config.storage.read_only {
            let mut meta = self.metadata.clone();
            meta.fact_count_hint = self.count();
            if let Err(e) = meta.save(&self.config.storage.data_dir) {
                warn!(error = %e, "failed to save store metadata on close");
            }
        }
    }
}

fn graph_or_default(graph: &str) -> &str {
    if graph.is_empty() {
        DEFAULT_GRAPH
    } else {
        graph
    }
}

fn nonempty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn validate_fact(fact: &Fact) -> Result<()> {
    if fact.subject.is_empty() {
        return Err(StoreError::InvalidInput("empty subject".to_string()));
    }
    if fact.predicate.is_empty() {
        return Err(StoreError::InvalidInput("empty predicate".to_string()));
    }
    for (slot, text) in [
        ("subject", fact.subject.as_str()),
        ("predicate", fact.predicate.as_str()),
        ("graph", fact.graph.as_str()),
    ] {
        if text.chars().any(char::is_control) {
            return Err(StoreError::InvalidInput(format!(
                "control character in {slot} {text:?}"
            )));
        }
    }
    if let Value::Bytes(bytes) = &fact.object {
        if bytes.len() > MAX_BYTES_OBJECT {
            return Err(StoreError::InvalidInput(format!(
                "bytes object of {} exceeds the {MAX_BYTES_OBJECT}-byte cap",
                bytes.len()
            )));
        }
    }
    Ok(())
}
