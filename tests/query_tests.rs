//! Query Engine Integration Tests
//!
//! Tests for:
//! - Single and multi-atom joins
//! - Constraint atoms (regex, neq and the != sugar)
//! - Provenance fields (_weight, _source)
//! - Strict vs permissive variable modes
//! - Structured errors for malformed queries

use factgraph::{CancelToken, Config, Fact, FactSource, Store, StoreError, Value};
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

fn social_store() -> (Store, TempDir) {
    let (store, temp) = create_test_store();
    store
        .add_batch(
            &[
                Fact::new("alice", "follows", "bob", "doc1"),
                Fact::new("alice", "interest", "AI", "doc1"),
                Fact::new("bob", "follows", "carol", "doc2"),
            ],
            &token(),
        )
        .unwrap();
    (store, temp)
}

fn str_of(binding: &factgraph::Binding, var: &str) -> String {
    match binding.get(var) {
        Some(Value::Str(s)) => s.clone(),
        other => panic!("expected string binding for {var}, got {other:?}"),
    }
}

// ============================================================================
// Basic joins
// ============================================================================

#[test]
fn test_single_atom_query() {
    let (store, _temp) = social_store();
    let rows = store
        .query(&token(), "triples(alice, follows, ?x)")
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(str_of(&rows[0], "?x"), "bob");
}

#[test]
fn test_query_spans_all_graphs() {
    let (store, _temp) = social_store();
    // follows facts live in doc1 and doc2; both must be visible
    let rows = store.query(&token(), "triples(?s, follows, ?o)").unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_two_atom_join() {
    let (store, _temp) = social_store();
    let rows = store
        .query(
            &token(),
            "triples(?a, follows, ?b), triples(?b, follows, ?c)",
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(str_of(&rows[0], "?a"), "alice");
    assert_eq!(str_of(&rows[0], "?b"), "bob");
    assert_eq!(str_of(&rows[0], "?c"), "carol");
}

#[test]
fn test_join_conflict_prunes_binding() {
    let (store, _temp) = social_store();
    // alice follows bob, but bob has no interest facts
    let rows = store
        .query(&token(), "triples(?a, follows, ?b), triples(?b, interest, ?i)")
        .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_anonymous_wildcard_is_not_bound() {
    let (store, _temp) = social_store();
    let rows = store.query(&token(), "triples(?s, follows, _)").unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert!(!row.contains_key("_"));
    }
}

#[test]
fn test_head_form_is_accepted() {
    let (store, _temp) = social_store();
    let rows = store
        .query(&token(), "followers(?x) :- triples(?x, follows, bob).")
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(str_of(&rows[0], "?x"), "alice");
}

// ============================================================================
// Constraints
// ============================================================================

#[test]
fn test_neq_sugar() {
    let (store, _temp) = social_store();
    let rows = store
        .query(&token(), "triples(?s, follows, ?o), ?s != ?o")
        .unwrap();
    assert_eq!(rows.len(), 2);
    let mut subjects: Vec<String> = rows.iter().map(|r| str_of(r, "?s")).collect();
    subjects.sort();
    assert_eq!(subjects, vec!["alice".to_string(), "bob".to_string()]);
}

#[test]
fn test_neq_drops_equal_pairs() {
    let (store, _temp) = create_test_store();
    store
        .add_batch(
            &[
                Fact::new("a", "links", "a", ""),
                Fact::new("a", "links", "b", ""),
            ],
            &token(),
        )
        .unwrap();
    let rows = store
        .query(&token(), "triples(?s, links, ?o), neq(?s, ?o)")
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(str_of(&rows[0], "?o"), "b");
}

#[test]
fn test_neq_against_literal() {
    let (store, _temp) = social_store();
    let rows = store
        .query(&token(), r#"triples(?s, follows, ?o), ?o != "bob""#)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(str_of(&rows[0], "?o"), "carol");
}

#[test]
fn test_regex_constraint() {
    let (store, _temp) = create_test_store();
    store
        .add_batch(
            &[
                Fact::new("web", "calls", "AuthService", ""),
                Fact::new("web", "calls", "renderPage", ""),
                Fact::new("api", "calls", "UserService", ""),
            ],
            &token(),
        )
        .unwrap();
    let rows = store
        .query(&token(), r#"triples(?s, calls, ?o), regex(?o, ".*Service$")"#)
        .unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert!(str_of(row, "?o").ends_with("Service"));
    }
}

#[test]
fn test_bad_regex_is_invalid_input() {
    let (store, _temp) = social_store();
    let err = store
        .query(&token(), r#"triples(?s, follows, ?o), regex(?o, "[unclosed")"#)
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));
}

#[test]
fn test_regex_on_unbound_variable_fails_binding() {
    let (store, _temp) = social_store();
    let rows = store
        .query(&token(), r#"triples(?s, follows, ?o), regex(?missing, ".*")"#)
        .unwrap();
    assert!(rows.is_empty());
}

// ============================================================================
// Provenance fields
// ============================================================================

#[test]
fn test_weight_and_source_are_injected() {
    let (store, _temp) = create_test_store();
    store
        .add_fact(
            Fact::new("a", "calls", "b", "")
                .with_weight(2.5)
                .with_source(FactSource::Inference),
            &token(),
        )
        .unwrap();
    let rows = store.query(&token(), "triples(a, calls, ?x)").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("_weight"), Some(&Value::Float(2.5)));
    assert_eq!(
        rows[0].get("_source"),
        Some(&Value::Str("inference".to_string()))
    );
}

// ============================================================================
// Variable modes
// ============================================================================

#[test]
fn test_permissive_uppercase_variables() {
    let (store, _temp) = social_store();
    let rows = store.query(&token(), "triples(X, follows, Y)").unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].contains_key("X"));
}

#[test]
fn test_strict_mode_treats_uppercase_as_literal() {
    let temp = TempDir::new().unwrap();
    let mut config = Config::at(temp.path());
    config.query.strict_variables = true;
    let store = Store::open(config).unwrap();
    store
        .add_batch(
            &[
                Fact::new("X", "follows", "bob", ""),
                Fact::new("alice", "follows", "bob", ""),
            ],
            &token(),
        )
        .unwrap();

    // X is a literal subject in strict mode
    let rows = store.query(&token(), "triples(X, follows, ?o)").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("?o"),
        Some(&Value::Str("bob".to_string()))
    );
}

// ============================================================================
// Typed objects
// ============================================================================

#[test]
fn test_integer_literal_matching() {
    let (store, _temp) = create_test_store();
    store
        .add_batch(
            &[
                Fact::new("svc_a", "port", Value::Int(8080), ""),
                Fact::new("svc_b", "port", Value::Int(9090), ""),
            ],
            &token(),
        )
        .unwrap();
    let rows = store.query(&token(), "triples(?s, port, 8080)").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(str_of(&rows[0], "?s"), "svc_a");
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_empty_query_rejected() {
    let (store, _temp) = social_store();
    assert!(matches!(
        store.query(&token(), "   "),
        Err(StoreError::InvalidInput(_))
    ));
}

#[test]
fn test_constraint_only_query_rejected() {
    let (store, _temp) = social_store();
    let err = store.query(&token(), "neq(a, b)").unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));
}

#[test]
fn test_unbalanced_query_rejected() {
    let (store, _temp) = social_store();
    assert!(matches!(
        store.query(&token(), "triples(?s, follows"),
        Err(StoreError::InvalidInput(_))
    ));
}

#[test]
fn test_all_wildcard_query_requires_binding() {
    let (store, _temp) = social_store();
    let err = store.query(&token(), "triples(?s, ?p, ?o)").unwrap_err();
    assert!(matches!(err, StoreError::FullTableScan));
}

#[test]
fn test_cancelled_query_returns_cancelled() {
    let (store, _temp) = social_store();
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = store
        .query(&cancel, "triples(?s, follows, ?o)")
        .unwrap_err();
    assert!(matches!(err, StoreError::Cancelled { .. }));
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_repeat_runs_agree() {
    let (store, _temp) = social_store();
    let first = store.query(&token(), "triples(?s, follows, ?o)").unwrap();
    let second = store.query(&token(), "triples(?s, follows, ?o)").unwrap();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.get("?s"), b.get("?s"));
        assert_eq!(a.get("?o"), b.get("?o"));
    }
}
