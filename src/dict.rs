//! Interning Dictionary
//!
//! Bijective string ↔ id mapping with persistence. Ids are allocated once
//! and never change; the dictionary grows monotonically and nothing is
//! garbage collected.
//!
//! ## Design
//!
//! - Sharded by `hash(s) % N`; each shard owns a bounded LRU of resident
//!   strings in front of the persistent `dict_fwd` partition
//! - One global allocation lock taken at most once per [`Dictionary::get_ids`]
//!   call, covering every genuinely new string in the batch
//! - Reverse lookups go through a hot map in front of `dict_rev`
//!
//! Allocation is all-or-nothing: new ids are published to the caches only
//! after the backing batch has committed, so a backend failure never
//! exposes partial ids.

use crate::error::Result;
use crate::kv::{Backend, META_DICT_NEXT_ID};
use crate::value::Id;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Upper bound on the reverse hot map before it is dropped and refilled
const REVERSE_HOT_CAP: usize = 65_536;

/// Sharded, persistent string interner
pub struct Dictionary {
    backend: Arc<Backend>,
    shards: Vec<Mutex<Shard>>,
    reverse_hot: DashMap<Id, String>,
    next_id: AtomicU64,
    alloc_lock: Mutex<()>,
}

struct Shard {
    cache: LruCache<String, Id>,
}

impl Dictionary {
    /// Open the dictionary over an existing backend
    pub fn open(backend: Arc<Backend>, shard_count: usize, cache_per_shard: usize) -> Result<Self> {
        let shard_count = shard_count.max(1);
        let capacity = NonZeroUsize::new(cache_per_shard.max(16)).expect("capacity is non-zero");
        let shards = (0..shard_count)
            .map(|_| {
                Mutex::new(Shard {
                    cache: LruCache::new(capacity),
                })
            })
            .collect();
        // Ids start at 1; 0 is reserved for "unbound"
        let next_id = backend.meta_u64(META_DICT_NEXT_ID)?.unwrap_or(1);
        Ok(Dictionary {
            backend,
            shards,
            reverse_hot: DashMap::new(),
            next_id: AtomicU64::new(next_id),
            alloc_lock: Mutex::new(()),
        })
    }

    fn shard(&self, s: &str) -> &Mutex<Shard> {
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Resolve or allocate the id for one string
    pub fn get_id(&self, s: &str) -> Result<Id> {
        let mut ids = self.get_ids(std::slice::from_ref(&s.to_string()))?;
        Ok(ids.pop().expect("one id per input string"))
    }

    /// Resolve or allocate ids for a batch of strings
    ///
    /// The hot path of `add_batch`: cache hits resolve without touching
    /// the allocation lock, which is taken at most once for all
    /// genuinely new strings.
    pub fn get_ids(&self, strings: &[String]) -> Result<Vec<Id>> {
        let mut out = vec![0; strings.len()];
        let mut missing = Vec::new();
        for (i, s) in strings.iter().enumerate() {
            match self.resolve(s)? {
                Some(id) => out[i] = id,
                None => missing.push(i),
            }
        }
        if missing.is_empty() {
            return Ok(out);
        }

        let _guard = self.alloc_lock.lock();
        let mut batch = self.backend.batch();
        let mut pending: HashMap<&str, Id> = HashMap::new();
        for &i in &missing {
            let s = strings[i].as_str();
            // Re-check under the lock: another caller may have interned it
            if let Some(id) = self.stored_id(s)? {
                out[i] = id;
                continue;
            }
            if let Some(&id) = pending.get(s) {
                out[i] = id;
                continue;
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            batch.set(&self.backend.dict_fwd, s.as_bytes().to_vec(), id.to_be_bytes().to_vec());
            batch.set(&self.backend.dict_rev, id.to_be_bytes().to_vec(), s.as_bytes().to_vec());
            pending.insert(s, id);
            out[i] = id;
        }

        if !pending.is_empty() {
            let watermark = self.next_id.load(Ordering::SeqCst);
            batch.set(
                &self.backend.meta,
                META_DICT_NEXT_ID.to_vec(),
                watermark.to_be_bytes().to_vec(),
            );
            batch.commit()?;
            // Publish only after the batch is durable
            for (s, id) in pending {
                self.shard(s).lock().cache.put(s.to_string(), id);
                self.cache_reverse(id, s.to_string());
            }
        }
        Ok(out)
    }

    /// Resolve an id without allocating; `None` if the string was never
    /// interned
    pub fn lookup_id(&self, s: &str) -> Result<Option<Id>> {
        self.resolve(s)
    }

    /// Reverse lookup; `None` for the reserved id 0 and unknown ids
    pub fn get_string(&self, id: Id) -> Result<Option<String>> {
        if id == 0 {
            return Ok(None);
        }
        if let Some(hit) = self.reverse_hot.get(&id) {
            return Ok(Some(hit.clone()));
        }
        let Some(raw) = self.backend.get(&self.backend.dict_rev, &id.to_be_bytes())? else {
            return Ok(None);
        };
        let s = String::from_utf8_lossy(raw.as_ref()).into_owned();
        self.cache_reverse(id, s.clone());
        Ok(Some(s))
    }

    fn resolve(&self, s: &str) -> Result<Option<Id>> {
        {
            let mut shard = self.shard(s).lock();
            if let Some(&id) = shard.cache.get(s) {
                return Ok(Some(id));
            }
        }
        let stored = self.stored_id(s)?;
        if let Some(id) = stored {
            self.shard(s).lock().cache.put(s.to_string(), id);
        }
        Ok(stored)
    }

    fn stored_id(&self, s: &str) -> Result<Option<Id>> {
        let Some(raw) = self.backend.get(&self.backend.dict_fwd, s.as_bytes())? else {
            return Ok(None);
        };
        let bytes: [u8; 8] = raw.as_ref().try_into().map_err(|_| {
            crate::error::StoreError::corruption("dict", format!("bad id width for {s:?}"))
        })?;
        Ok(Some(Id::from_be_bytes(bytes)))
    }

    fn cache_reverse(&self, id: Id, s: String) {
        if self.reverse_hot.len() >= REVERSE_HOT_CAP {
            self.reverse_hot.clear();
        }
        self.reverse_hot.insert(id, s);
    }
}
