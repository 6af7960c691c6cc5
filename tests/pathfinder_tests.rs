//! Pathfinder Integration Tests
//!
//! Tests for:
//! - Direct chains over traversal predicates
//! - Symbol → file lifts and the file-level fallback
//! - Portal teleports (route → handler)
//! - Weighted search
//! - Cap exhaustion, unreachable nodes and cancellation (all empty, never
//!   errors)

use factgraph::{CancelToken, Config, Fact, PathOptions, Store};
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn create_test_store() -> (Store, TempDir) {
    let temp = TempDir::new().unwrap();
    let store = Store::open(Config::at(temp.path())).unwrap();
    (store, temp)
}

fn token() -> CancelToken {
    CancelToken::new()
}

fn calls(src: &str, dst: &str) -> Fact {
    Fact::new(src, "calls", dst, "repo")
}

// ============================================================================
// Chains
// ============================================================================

#[test]
fn test_direct_chain() {
    let (store, _temp) = create_test_store();
    store
        .add_batch(&[calls("a", "b"), calls("b", "c")], &token())
        .unwrap();

    let path = store
        .find_path("a", "c", &PathOptions::default(), &token())
        .unwrap();
    assert_eq!(path.nodes, vec!["a", "b", "c"]);
    assert_eq!(path.edges.len(), 2);
    assert!(path.edges.iter().all(|e| e.predicate == "calls"));
}

#[test]
fn test_edges_correspond_to_nodes() {
    let (store, _temp) = create_test_store();
    store
        .add_batch(
            &[calls("a", "b"), calls("b", "c"), calls("c", "d")],
            &token(),
        )
        .unwrap();

    let path = store
        .find_path("a", "d", &PathOptions::default(), &token())
        .unwrap();
    assert_eq!(path.nodes.len(), path.edges.len() + 1);
    for (i, edge) in path.edges.iter().enumerate() {
        assert_eq!(edge.src, path.nodes[i]);
        assert_eq!(edge.dst, path.nodes[i + 1]);
    }
    // No node repeats
    let mut sorted = path.nodes.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), path.nodes.len());
}

#[test]
fn test_same_start_and_end() {
    let (store, _temp) = create_test_store();
    store.add_fact(calls("a", "b"), &token()).unwrap();

    let path = store
        .find_path("a", "a", &PathOptions::default(), &token())
        .unwrap();
    assert_eq!(path.nodes, vec!["a"]);
    assert!(path.edges.is_empty());
}

#[test]
fn test_no_path_is_empty_not_error() {
    let (store, _temp) = create_test_store();
    store
        .add_batch(&[calls("a", "b"), calls("c", "d")], &token())
        .unwrap();

    let path = store
        .find_path("a", "d", &PathOptions::default(), &token())
        .unwrap();
    assert!(path.is_empty());
}

#[test]
fn test_unknown_endpoints_are_empty() {
    let (store, _temp) = create_test_store();
    store.add_fact(calls("a", "b"), &token()).unwrap();

    let path = store
        .find_path("ghost", "b", &PathOptions::default(), &token())
        .unwrap();
    assert!(path.is_empty());
}

// ============================================================================
// Lifts and fallback
// ============================================================================

#[test]
fn test_parent_defines_lift_past_prune_window() {
    let (store, _temp) = create_test_store();
    // Five cheap hops put m:f5 at depth 5, where heavy edges are no
    // longer skipped and the symbol can climb back to its file
    let mut facts: Vec<Fact> = (0..5)
        .map(|i| calls(&format!("m:f{i}"), &format!("m:f{}", i + 1)))
        .collect();
    facts.push(Fact::new("m", "defines", "m:f5", "repo"));
    store.add_batch(&facts, &token()).unwrap();

    let path = store
        .find_path("m:f0", "m", &PathOptions::default(), &token())
        .unwrap();
    assert_eq!(
        path.nodes,
        vec!["m:f0", "m:f1", "m:f2", "m:f3", "m:f4", "m:f5", "m"]
    );
    assert_eq!(
        path.edges.last().map(|e| e.predicate.as_str()),
        Some("parent_defines")
    );
}

#[test]
fn test_heavy_edges_pruned_near_roots() {
    let (store, _temp) = create_test_store();
    // The only route is a weight-10 edge right at the root; the shallow
    // noise filter skips it
    store
        .add_fact(Fact::new("a", "imports", "b", "repo"), &token())
        .unwrap();

    let path = store
        .find_path("a", "b", &PathOptions::default(), &token())
        .unwrap();
    assert!(path.is_empty());
}

#[test]
fn test_file_level_fallback() {
    let (store, _temp) = create_test_store();
    store
        .add_batch(
            &[
                Fact::new("fileA", "defines", "fileA:fn", "repo"),
                Fact::new("fileB", "defines", "fileB:fn", "repo"),
                calls("fileA:fn", "fileB:fn"),
                Fact::new("fileA", "references", "fileB", "repo"),
            ],
            &token(),
        )
        .unwrap();

    // The symbols do not exist; the retry lifts both endpoints to files
    let path = store
        .find_path(
            "fileA:gone",
            "fileB:also_gone",
            &PathOptions::default(),
            &token(),
        )
        .unwrap();
    assert_eq!(path.nodes, vec!["fileA", "fileB"]);
    assert_eq!(
        path.edges.first().map(|e| e.predicate.as_str()),
        Some("references")
    );
}

#[test]
fn test_fallback_does_not_fire_for_plain_files() {
    let (store, _temp) = create_test_store();
    store.add_fact(calls("x", "y"), &token()).unwrap();

    // No colon anywhere: no fallback, just empty
    let path = store
        .find_path("unrelated", "y2", &PathOptions::default(), &token())
        .unwrap();
    assert!(path.is_empty());
}

// ============================================================================
// Portals
// ============================================================================

#[test]
fn test_portal_teleport() {
    let (store, _temp) = create_test_store();
    store
        .add_batch(
            &[
                Fact::new("web.js:login", "calls_api", "/api/login", "repo"),
                Fact::new("/api/login", "handled_by", "auth.go:Login", "repo"),
                calls("auth.go:Login", "db.go:Query"),
            ],
            &token(),
        )
        .unwrap();

    let path = store
        .find_path(
            "web.js:login",
            "db.go:Query",
            &PathOptions::default(),
            &token(),
        )
        .unwrap();
    assert_eq!(
        path.nodes,
        vec!["web.js:login", "/api/login", "auth.go:Login", "db.go:Query"]
    );
    assert!(path
        .edges
        .iter()
        .any(|e| e.predicate == "handled_by"));
}

#[test]
fn test_portal_table_invalidation() {
    let (store, _temp) = create_test_store();
    store
        .add_fact(Fact::new("/r", "handled_by", "h", "repo"), &token())
        .unwrap();
    let path = store
        .find_path("/r", "h", &PathOptions::default(), &token())
        .unwrap();
    assert_eq!(path.nodes, vec!["/r", "h"]);

    // New portal facts are visible to later searches
    store
        .add_fact(Fact::new("/r2", "handled_by", "h2", "repo"), &token())
        .unwrap();
    let path = store
        .find_path("/r2", "h2", &PathOptions::default(), &token())
        .unwrap();
    assert_eq!(path.nodes, vec!["/r2", "h2"]);
}

// ============================================================================
// Weighted search
// ============================================================================

#[test]
fn test_weighted_prefers_cheap_edges() {
    let (store, _temp) = create_test_store();
    // Two routes a → d: one 2-hop via imports (cost 20), one 3-hop via
    // calls (cost 3)
    store
        .add_batch(
            &[
                Fact::new("a", "imports", "m", "repo"),
                Fact::new("m", "imports", "d", "repo"),
                calls("a", "x"),
                calls("x", "y"),
                calls("y", "d"),
            ],
            &token(),
        )
        .unwrap();

    let options = PathOptions {
        weighted: true,
        ..Default::default()
    };
    let path = store.find_path("a", "d", &options, &token()).unwrap();
    assert_eq!(path.nodes, vec!["a", "x", "y", "d"]);
}

// ============================================================================
// Caps and cancellation
// ============================================================================

#[test]
fn test_depth_cap_returns_empty() {
    let (store, _temp) = create_test_store();
    let chain: Vec<Fact> = (0..12).map(|i| calls(&format!("n{i}"), &format!("n{}", i + 1))).collect();
    store.add_batch(&chain, &token()).unwrap();

    let options = PathOptions {
        max_depth: Some(2),
        ..Default::default()
    };
    let path = store.find_path("n0", "n12", &options, &token()).unwrap();
    assert!(path.is_empty());
}

#[test]
fn test_visited_cap_terminates_on_dense_graphs() {
    let (store, _temp) = create_test_store();
    // A dense bipartite blob with no route to the target
    let mut facts = Vec::new();
    for i in 0..40 {
        for j in 0..40 {
            facts.push(calls(&format!("l{i}"), &format!("r{j}")));
            facts.push(calls(&format!("r{j}"), &format!("l{i}")));
        }
    }
    store.add_batch(&facts, &token()).unwrap();

    let options = PathOptions {
        max_visited: Some(100),
        ..Default::default()
    };
    let path = store
        .find_path("l0", "unreachable", &options, &token())
        .unwrap();
    assert!(path.is_empty());
}

#[test]
fn test_cancellation_returns_empty() {
    let (store, _temp) = create_test_store();
    store
        .add_batch(&[calls("a", "b"), calls("b", "c")], &token())
        .unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let path = store
        .find_path("a", "c", &PathOptions::default(), &cancel)
        .unwrap();
    assert!(path.is_empty(), "cancellation yields empty, not an error");
}
