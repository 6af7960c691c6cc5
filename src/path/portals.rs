//! Portal Table
//!
//! A derived view over the portal predicate (`handled_by` by default)
//! mapping API routes to their handlers, so the pathfinder can jump
//! across the HTTP boundary in one hop. The table is a cache, not an
//! owner of the underlying facts: any write touching the portal
//! predicate (and any bulk delete) marks it stale, and the next search
//! rebuilds it and publishes the new table atomically.

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::store::Store;
use crate::value::Value;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Immutable route ↔ handler mapping
#[derive(Debug, Default)]
pub struct PortalTable {
    /// route → handler
    forward: HashMap<String, String>,
    /// handler → routes (for the backward frontier)
    reverse: HashMap<String, Vec<String>>,
}

impl PortalTable {
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// The handler a route teleports to, if any
    pub fn handler(&self, route: &str) -> Option<&String> {
        self.forward.get(route)
    }

    /// Routes teleporting to this handler
    pub fn routes(&self, handler: &str) -> &[String] {
        self.reverse.get(handler).map_or(&[], Vec::as_slice)
    }
}

/// Lazily rebuilt, atomically published portal cache
pub struct Portals {
    table: ArcSwap<PortalTable>,
    stale: AtomicBool,
}

impl Portals {
    pub fn new() -> Self {
        Portals {
            table: ArcSwap::from_pointee(PortalTable::default()),
            stale: AtomicBool::new(true),
        }
    }

    /// Mark the table stale; the next snapshot rebuilds it
    pub fn invalidate(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    /// Current table, rebuilding first if a write invalidated it
    pub fn snapshot(&self, store: &Store, token: &CancelToken) -> Result<Arc<PortalTable>> {
        // Clear the flag before scanning so an invalidation racing the
        // rebuild re-marks it rather than being lost
        if self.stale.swap(false, Ordering::SeqCst) {
            match self.rebuild(store, token) {
                Ok(table) => {
                    debug!(routes = table.forward.len(), "portal table rebuilt");
                    let table = Arc::new(table);
                    self.table.store(Arc::clone(&table));
                    return Ok(table);
                }
                Err(e) => {
                    self.stale.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }
        Ok(self.table.load_full())
    }

    fn rebuild(&self, store: &Store, token: &CancelToken) -> Result<PortalTable> {
        let predicate = store.pathfinder_config().portal_predicate.as_str();
        let mut table = PortalTable::default();
        for fact in store.scan(None, Some(predicate), None, None, token)? {
            let fact = fact?;
            if let Value::Str(handler) = fact.object {
                table
                    .reverse
                    .entry(handler.clone())
                    .or_default()
                    .push(fact.subject.clone());
                table.forward.insert(fact.subject, handler);
            }
        }
        Ok(table)
    }
}

impl Default for Portals {
    fn default() -> Self {
        Portals::new()
    }
}
