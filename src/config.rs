//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - factgraph.toml (default configuration)
//! - factgraph.local.toml (git-ignored local overrides)
//! - Environment variables (FACTGRAPH_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # factgraph.toml
//! [storage]
//! data_dir = "/var/lib/factgraph/data"
//! sync_writes = true
//! profile = "bulk_load"
//!
//! [pathfinder]
//! max_depth = 12
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! FACTGRAPH_STORAGE__DATA_DIR=/custom/path
//! FACTGRAPH_STORAGE__READ_ONLY=true
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub pathfinder: PathfinderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage and backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for the keyspace, dictionary and metadata file
    pub data_dir: PathBuf,

    /// Reject all mutating operations
    #[serde(default)]
    pub read_only: bool,

    /// Fsync the journal on every committed batch
    #[serde(default)]
    pub sync_writes: bool,

    /// Skip the advisory single-writer lock file (tooling only)
    #[serde(default)]
    pub bypass_lock_guard: bool,

    /// Number of dictionary shards
    #[serde(default = "default_dict_shards")]
    pub dict_shards: usize,

    /// Resident strings kept per dictionary shard
    #[serde(default = "default_dict_cache")]
    pub dict_cache_per_shard: usize,

    /// Block/index cache sizing
    #[serde(default)]
    pub cache: CacheConfig,

    /// Workload profile tuning the backend
    #[serde(default)]
    pub profile: Profile,
}

fn default_dict_shards() -> usize {
    16
}

fn default_dict_cache() -> usize {
    16_384
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: PathBuf::from("./data"),
            read_only: false,
            sync_writes: false,
            bypass_lock_guard: false,
            dict_shards: default_dict_shards(),
            dict_cache_per_shard: default_dict_cache(),
            cache: CacheConfig::default(),
            profile: Profile::Default,
        }
    }
}

/// Backend cache sizing, in mebibytes
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_block_cache_mb")]
    pub block_mb: u64,
    #[serde(default = "default_index_cache_mb")]
    pub index_mb: u64,
}

fn default_block_cache_mb() -> u64 {
    64
}

fn default_index_cache_mb() -> u64 {
    16
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            block_mb: default_block_cache_mb(),
            index_mb: default_index_cache_mb(),
        }
    }
}

/// Workload profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Balanced defaults
    Default,
    /// Larger write buffers, journal persistence deferred to flush points
    BulkLoad,
    /// Small caches for constrained environments
    LowMemory,
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Default
    }
}

/// Query evaluator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Require `?` or `_` as the variable marker; bare uppercase
    /// identifiers become literals
    #[serde(default)]
    pub strict_variables: bool,

    /// Hard cap on emitted bindings (0 = unlimited)
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    100_000
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            strict_variables: false,
            max_results: default_max_results(),
        }
    }
}

/// Pathfinder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathfinderConfig {
    /// Maximum expansion depth per search side
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Hard cap on visited nodes across both frontiers
    #[serde(default = "default_max_visited")]
    pub max_visited: usize,

    /// Neighbors kept per node after priority sorting
    #[serde(default = "default_max_branching")]
    pub max_branching: usize,

    /// Predicates that produce traversal edges
    #[serde(default = "default_traversal_predicates")]
    pub traversal_predicates: Vec<String>,

    /// Predicate feeding the portal table
    #[serde(default = "default_portal_predicate")]
    pub portal_predicate: String,
}

fn default_max_depth() -> usize {
    15
}

fn default_max_visited() -> usize {
    10_000
}

fn default_max_branching() -> usize {
    100
}

fn default_traversal_predicates() -> Vec<String> {
    [
        "calls",
        "calls_api",
        "handled_by",
        "imports",
        "defines",
        "references",
        "in_package",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_portal_predicate() -> String {
    "handled_by".to_string()
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        PathfinderConfig {
            max_depth: default_max_depth(),
            max_visited: default_max_visited(),
            max_branching: default_max_branching(),
            traversal_predicates: default_traversal_predicates(),
            portal_predicate: default_portal_predicate(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("factgraph.toml"))
            .merge(Toml::file("factgraph.local.toml"))
            .merge(Env::prefixed("FACTGRAPH_").split("__"))
            .extract()
    }

    /// Config rooted at `data_dir` with every other knob at its default
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Config::default();
        config.storage.data_dir = data_dir.into();
        config
    }

    /// Serialize the current configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
