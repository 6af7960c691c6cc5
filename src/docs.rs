//! Document Store
//!
//! Compressed source documents keyed by the same interned ids the fact
//! graph uses, stored separately from the quad indexes. Documents are
//! referenced by id from facts but are not facts themselves.
//!
//! ## Record Layout
//!
//! ```text
//! [0..4]   crc32 of the uncompressed content, big-endian
//! [4..8]   metadata JSON length, big-endian
//! [..]     metadata JSON
//! [..]     zstd-compressed content
//! ```
//!
//! The checksum is verified on every read; a mismatch surfaces as a
//! backend corruption error rather than silently returning bad bytes.

use crate::dict::Dictionary;
use crate::error::{Result, StoreError};
use crate::kv::Backend;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Compression level for document content
const ZSTD_LEVEL: i32 = 3;

/// Free-form document metadata
pub type DocMetadata = HashMap<String, serde_json::Value>;

/// Document store handle, obtained via `Store::documents`
pub struct Documents {
    backend: Arc<Backend>,
    dict: Arc<Dictionary>,
    read_only: bool,
}

impl Documents {
    pub(crate) fn new(backend: Arc<Backend>, dict: Arc<Dictionary>, read_only: bool) -> Self {
        Documents {
            backend,
            dict,
            read_only,
        }
    }

    /// Store (or replace) a document
    pub fn put(&self, id: &str, content: &[u8], metadata: DocMetadata) -> Result<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        if id.is_empty() {
            return Err(StoreError::InvalidInput("empty document id".to_string()));
        }

        let doc_id = self.dict.get_id(id)?;
        let crc = crc32fast::hash(content);
        let meta_json = serde_json::to_vec(&metadata)
            .map_err(|e| StoreError::backend("docs", e))?;
        let compressed = zstd::encode_all(content, ZSTD_LEVEL)
            .map_err(|e| StoreError::backend("docs", e))?;

        let mut record = Vec::with_capacity(8 + meta_json.len() + compressed.len());
        record.extend_from_slice(&crc.to_be_bytes());
        record.extend_from_slice(&(meta_json.len() as u32).to_be_bytes());
        record.extend_from_slice(&meta_json);
        record.extend_from_slice(&compressed);

        let mut batch = self.backend.batch();
        batch.set(&self.backend.docs, doc_id.to_be_bytes().to_vec(), record);
        batch.commit()?;
        debug!(id, bytes = content.len(), "document stored");
        Ok(())
    }

    /// Fetch a document's content and metadata
    pub fn get(&self, id: &str) -> Result<(Vec<u8>, DocMetadata)> {
        let doc_id = self
            .dict
            .lookup_id(id)?
            .ok_or_else(|| StoreError::NotFound(format!("document {id:?}")))?;
        let record = self
            .backend
            .get(&self.backend.docs, &doc_id.to_be_bytes())?
            .ok_or_else(|| StoreError::NotFound(format!("document {id:?}")))?;
        let record = record.as_ref();

        if record.len() < 8 {
            return Err(StoreError::corruption("docs", "record shorter than header"));
        }
        let crc = u32::from_be_bytes(record[0..4].try_into().expect("header width"));
        let meta_len = u32::from_be_bytes(record[4..8].try_into().expect("header width")) as usize;
        if record.len() < 8 + meta_len {
            return Err(StoreError::corruption("docs", "metadata overruns record"));
        }
        let metadata: DocMetadata = serde_json::from_slice(&record[8..8 + meta_len])
            .map_err(|e| StoreError::backend("docs", e))?;
        let content = zstd::decode_all(&record[8 + meta_len..])
            .map_err(|e| StoreError::backend("docs", e))?;

        if crc32fast::hash(&content) != crc {
            return Err(StoreError::corruption(
                "docs",
                format!("checksum mismatch for document {id:?}"),
            ));
        }
        Ok((content, metadata))
    }

    /// Remove a document; `NotFound` if it does not exist
    pub fn delete(&self, id: &str) -> Result<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        let doc_id = self
            .dict
            .lookup_id(id)?
            .ok_or_else(|| StoreError::NotFound(format!("document {id:?}")))?;
        let key = doc_id.to_be_bytes();
        if self.backend.get(&self.backend.docs, &key)?.is_none() {
            return Err(StoreError::NotFound(format!("document {id:?}")));
        }
        let mut batch = self.backend.batch();
        batch.delete(&self.backend.docs, key.to_vec());
        batch.commit()?;
        Ok(())
    }

    /// All stored document ids
    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in self.backend.prefix(&self.backend.docs, &[]) {
            let (key, _) = entry?;
            let bytes: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                StoreError::corruption("docs", "document key has bad width")
            })?;
            let doc_id = u64::from_be_bytes(bytes);
            if let Some(name) = self.dict.get_string(doc_id)? {
                ids.push(name);
            }
        }
        Ok(ids)
    }
}
