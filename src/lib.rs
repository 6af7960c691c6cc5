//! # factgraph
//!
//! An embedded neuro-symbolic knowledge store for code intelligence:
//! a persistent quad-indexed fact graph, a Datalog-style conjunctive
//! query engine, and a weighted bidirectional pathfinder over the same
//! graph.
//!
//! ## Architecture
//!
//! ```text
//! Facts (s, p, o, g)
//!     ↓
//! [Dictionary]        → strings interned to 64-bit ids, sharded LRU
//!     ↓
//! [Key Codec]         → 33-byte SPO / OPS / PSO composite keys
//!     ↓
//! [KV Backend]        → fjall keyspace: atomic batches, prefix scans
//!     ↑
//! [Quad Store]        → add_batch / scan / delete_graph / count
//!     ↑             ↖
//! [Query Evaluator]   [Pathfinder]
//!  nested-loop join    bidirectional BFS / Dijkstra, portals
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use factgraph::{CancelToken, Config, Fact, Store};
//!
//! let store = Store::open(Config::at("./data"))?;
//! let token = CancelToken::new();
//!
//! store.add_batch(&[
//!     Fact::new("api.go", "defines", "api.go:Login", "repo"),
//!     Fact::new("api.go:Login", "calls", "auth.go:Check", "repo"),
//! ], &token)?;
//!
//! // Pattern join over the fact graph
//! let rows = store.query(&token, "triples(?caller, calls, ?callee)")?;
//!
//! // Structural path between two nodes
//! let path = store.find_path("api.go:Login", "auth.go:Check",
//!     &Default::default(), &token)?;
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `value` | Fact data model and value payload codec |
//! | `codec` | Composite index-key codec |
//! | `dict` | Sharded persistent string interner |
//! | `kv` | Embedded ordered KV backend wrapper |
//! | `store` | Quad store: writes, scans, deletes, counters |
//! | `query` | Datalog-style parser and nested-loop evaluator |
//! | `path` | Bidirectional pathfinder with portal teleports |
//! | `docs` | Compressed document store |
//! | `cancel` | Cooperative cancellation tokens |
//! | `config` | Hierarchical figment configuration |

pub mod cancel;
pub mod codec;
pub mod config;
pub mod dict;
pub mod docs;
pub mod error;
pub mod kv;
pub mod path;
pub mod query;
pub mod store;
pub mod value;

pub use cancel::CancelToken;
pub use config::Config;
pub use docs::{DocMetadata, Documents};
pub use error::{Result, StoreError};
pub use path::{Path, PathEdge, PathFinder, PathOptions};
pub use query::Binding;
pub use store::{ScanIter, Store};
pub use value::{Fact, FactMeta, FactSource, Id, Value};
