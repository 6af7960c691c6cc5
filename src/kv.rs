//! KV Backend
//!
//! Thin wrapper over the embedded fjall keyspace. All durable state lives
//! in five partitions:
//!
//! - `facts`: the three index families, distinguished by key prefix byte
//! - `dict_fwd`: string → id
//! - `dict_rev`: id → string
//! - `docs`: compressed documents
//! - `meta`: counters (next dictionary id, fact count)
//!
//! A write batch spans partitions and commits atomically through the
//! shared journal; prefix iterators pin a consistent view of the tree for
//! their lifetime, so a scan never observes a torn multi-index write.

use crate::config::{Profile, StorageConfig};
use crate::error::{Result, StoreError};
use fjall::{Keyspace, Partition, PartitionCreateOptions, PersistMode, Slice};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Meta partition key holding the dictionary id watermark
pub const META_DICT_NEXT_ID: &[u8] = b"dict_next_id";
/// Meta partition key holding the logical fact count
pub const META_FACT_COUNT: &[u8] = b"fact_count";

/// Key/value pair yielded by prefix iteration
pub type KvEntry = (Slice, Slice);

/// Embedded keyspace plus its named partitions
pub struct Backend {
    keyspace: Keyspace,
    pub facts: Partition,
    pub dict_fwd: Partition,
    pub dict_rev: Partition,
    pub docs: Partition,
    pub meta: Partition,
    sync_writes: bool,
    _lock: Option<LockGuard>,
}

impl Backend {
    /// Open (or create) the keyspace under `config.data_dir`
    pub fn open(config: &StorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.storage_path())?;

        let lock = if config.read_only || config.bypass_lock_guard {
            None
        } else {
            Some(LockGuard::acquire(&config.data_dir)?)
        };

        let cache_bytes = (config.cache.block_mb + config.cache.index_mb) * 1024 * 1024;
        let mut fj = fjall::Config::new(config.storage_path()).cache_size(cache_bytes);
        match config.profile {
            Profile::Default => {}
            Profile::BulkLoad => {
                fj = fj
                    .max_write_buffer_size(256 * 1024 * 1024)
                    .manual_journal_persist(true);
            }
            Profile::LowMemory => {
                fj = fj.max_write_buffer_size(16 * 1024 * 1024);
            }
        }
        let keyspace = fj.open()?;

        let open_partition = |name: &str| -> Result<Partition> {
            keyspace
                .open_partition(name, PartitionCreateOptions::default())
                .map_err(StoreError::from)
        };

        let backend = Backend {
            facts: open_partition("facts")?,
            dict_fwd: open_partition("dict_fwd")?,
            dict_rev: open_partition("dict_rev")?,
            docs: open_partition("docs")?,
            meta: open_partition("meta")?,
            keyspace,
            sync_writes: config.sync_writes,
            _lock: lock,
        };
        debug!(data_dir = %config.data_dir.display(), "keyspace opened");
        Ok(backend)
    }

    /// Start an atomic cross-partition write batch
    pub fn batch(&self) -> WriteBatch<'_> {
        WriteBatch {
            inner: self.keyspace.batch(),
            ops: 0,
            backend: self,
        }
    }

    /// Point lookup in a partition
    pub fn get(&self, partition: &Partition, key: &[u8]) -> Result<Option<Slice>> {
        Ok(partition.get(key)?)
    }

    /// Lazy prefix iterator over a partition, in key order
    ///
    /// The iterator pins a consistent view at creation; callers copy what
    /// they need out of the yielded slices before advancing.
    pub fn prefix(
        &self,
        partition: &Partition,
        prefix: &[u8],
    ) -> impl Iterator<Item = std::result::Result<KvEntry, fjall::Error>> + 'static {
        partition.prefix(prefix.to_vec())
    }

    /// Read a big-endian u64 from the meta partition
    pub fn meta_u64(&self, key: &[u8]) -> Result<Option<u64>> {
        let Some(raw) = self.meta.get(key)? else {
            return Ok(None);
        };
        let bytes: [u8; 8] = raw.as_ref().try_into().map_err(|_| {
            StoreError::corruption("kv", format!("meta key {} has bad width", String::from_utf8_lossy(key)))
        })?;
        Ok(Some(u64::from_be_bytes(bytes)))
    }

    /// Force the journal to durable storage
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

/// Atomic write batch across partitions
pub struct WriteBatch<'a> {
    inner: fjall::Batch,
    ops: usize,
    backend: &'a Backend,
}

impl WriteBatch<'_> {
    /// Queue an insert
    pub fn set(&mut self, partition: &Partition, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.inner.insert(partition, key.into(), value.into());
        self.ops += 1;
    }

    /// Queue a delete
    pub fn delete(&mut self, partition: &Partition, key: impl Into<Vec<u8>>) {
        self.inner.remove(partition, key.into());
        self.ops += 1;
    }

    /// Number of queued operations
    pub fn len(&self) -> usize {
        self.ops
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.ops == 0
    }

    /// Commit atomically; with `sync_writes` the journal is fsynced
    /// before returning
    pub fn commit(self) -> Result<()> {
        let sync = self.backend.sync_writes;
        self.inner.commit()?;
        if sync {
            self.backend.keyspace.persist(PersistMode::SyncAll)?;
        }
        Ok(())
    }
}

impl StorageConfig {
    /// Keyspace directory inside `data_dir`
    pub(crate) fn storage_path(&self) -> PathBuf {
        self.data_dir.join("keyspace")
    }
}

/// Advisory single-writer lock file in `data_dir`
///
/// Not a correctness mechanism inside one process (the store serializes
/// its own writers); it guards against a second process opening the same
/// directory for writing.
struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn acquire(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join("factgraph.lock");
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(LockGuard { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(StoreError::backend(
                "kv",
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!(
                        "{} exists; another writer owns this store (set bypass_lock_guard to override)",
                        path.display()
                    ),
                ),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
