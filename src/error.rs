//! Error Types
//!
//! One error enum for the whole store, split by failure class rather than
//! by layer. The layer that produced an error is carried in the message
//! context (`codec`, `dict`, `kv`, `evaluator`, `pathfinder`) so callers
//! can log a meaningful chain without matching on internals.

use thiserror::Error;

/// Store-wide error type
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed query, invalid key material, or unsupported input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced entity (document, dictionary id) does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A scan was requested with no bound subject, predicate, object or graph
    #[error("refusing full table scan: bind at least one of subject, predicate, object or graph")]
    FullTableScan,

    /// A mutating operation was called on a read-only store
    #[error("store is opened read-only")]
    ReadOnly,

    /// Backend I/O failure or on-disk corruption
    #[error("backend error in {context}: {source}")]
    Backend {
        /// Which layer hit the failure (codec, dict, kv, store, docs)
        context: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Cancellation token fired before the operation completed
    #[error("operation cancelled after {elapsed_ms}ms")]
    Cancelled {
        /// How long the operation ran before cancellation was observed
        elapsed_ms: u64,
    },

    /// A pathfinder cap (depth, visited, branching) was exhausted
    ///
    /// Never surfaced from the public pathfinder API (which reports an
    /// empty path instead); kept for diagnostics and internal signalling.
    #[error("capacity exhausted: {0}")]
    Capacity(String),
}

impl StoreError {
    /// Wrap a backend failure with layer context
    pub fn backend<E>(context: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend {
            context,
            source: Box::new(source),
        }
    }

    /// Corruption found while decoding on-disk bytes
    pub fn corruption(context: &'static str, detail: impl Into<String>) -> Self {
        StoreError::Backend {
            context,
            source: Box::new(CorruptionError(detail.into())),
        }
    }
}

/// Decode-level corruption detail, wrapped into [`StoreError::Backend`]
#[derive(Error, Debug)]
#[error("corrupted data: {0}")]
pub struct CorruptionError(pub String);

impl From<fjall::Error> for StoreError {
    fn from(err: fjall::Error) -> Self {
        StoreError::backend("kv", err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::backend("io", err)
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
