//! Store Metadata Sidecar
//!
//! A small JSON file next to the keyspace recording the schema version,
//! a fact-count hint and the creation timestamp. The hint is advisory
//! (the authoritative count lives in the meta partition); the schema
//! version gates opening stores written by incompatible releases.

use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current on-disk schema version; bump when key layouts change
pub const SCHEMA_VERSION: u32 = 1;

const METADATA_FILE: &str = "store_meta.json";

/// Persistent store metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub schema_version: u32,
    /// Advisory snapshot of the fact count at last save
    pub fact_count_hint: u64,
    pub created_at: DateTime<Utc>,
}

impl StoreMetadata {
    fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(METADATA_FILE)
    }

    /// Load existing metadata or create it for a fresh store
    ///
    /// Rejects stores written with a different schema version; key prefix
    /// stability is only guaranteed within one version.
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let path = Self::path(data_dir);
        if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let meta: StoreMetadata =
                serde_json::from_str(&raw).map_err(|e| StoreError::backend("store", e))?;
            if meta.schema_version != SCHEMA_VERSION {
                return Err(StoreError::corruption(
                    "store",
                    format!(
                        "schema version {} on disk, this build expects {SCHEMA_VERSION}",
                        meta.schema_version
                    ),
                ));
            }
            return Ok(meta);
        }
        let meta = StoreMetadata {
            schema_version: SCHEMA_VERSION,
            fact_count_hint: 0,
            created_at: Utc::now(),
        };
        meta.save(data_dir)?;
        Ok(meta)
    }

    /// Persist the metadata file (best effort on shutdown paths)
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| StoreError::backend("store", e))?;
        fs::write(Self::path(data_dir), json)?;
        Ok(())
    }
}
