//! Query Evaluation
//!
//! Nested-loop join over the parsed atom list, left-deep and in source
//! order (no reordering). Each data atom is answered by a quad-store
//! scan with the currently bound terms substituted; constraints are
//! applied after the join. Output order is the lexicographic scan order
//! of the outer-to-inner loops on one snapshot; the binding maps
//! themselves are unordered.

use super::parser::{Constraint, DataAtom, Term};
use super::{SOURCE_KEY, WEIGHT_KEY};
use crate::cancel::CancelToken;
use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::value::{Fact, Value};
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

/// One query result: variable name (as written) → value, plus the
/// reserved `_weight` and `_source` provenance keys
pub type Binding = HashMap<String, Value>;

/// Substitution of one atom position under a binding
enum Subst<T> {
    /// Unbound, scan as wildcard
    Any,
    /// Bound to a concrete scan argument
    Is(T),
    /// Bound to a value this position can never hold
    Never,
}

/// Evaluate a query string against the store
pub fn evaluate(store: &Store, input: &str, token: &CancelToken) -> Result<Vec<Binding>> {
    let config = store.query_config();
    let parsed = super::parser::parse(input, config.strict_variables)?;
    if parsed.data.is_empty() {
        return Err(StoreError::InvalidInput(
            "query needs at least one data atom".to_string(),
        ));
    }

    let mut bindings = vec![Binding::new()];
    for atom in &parsed.data {
        let mut next = Vec::new();
        for binding in &bindings {
            token.check()?;
            join_atom(store, atom, binding, token, &mut next)?;
        }
        bindings = next;
        if bindings.is_empty() {
            break;
        }
    }

    for constraint in &parsed.constraints {
        apply_constraint(constraint, &mut bindings)?;
        if bindings.is_empty() {
            break;
        }
    }

    if config.max_results > 0 && bindings.len() > config.max_results {
        warn!(
            emitted = bindings.len(),
            cap = config.max_results,
            "query result truncated"
        );
        bindings.truncate(config.max_results);
    }
    debug!(rows = bindings.len(), "query evaluated");
    Ok(bindings)
}

/// Extend one binding through one data atom
fn join_atom(
    store: &Store,
    atom: &DataAtom,
    binding: &Binding,
    token: &CancelToken,
    out: &mut Vec<Binding>,
) -> Result<()> {
    let subject = match string_position(&atom.subject, binding) {
        Subst::Never => return Ok(()),
        Subst::Any => None,
        Subst::Is(s) => Some(s),
    };
    let predicate = match string_position(&atom.predicate, binding) {
        Subst::Never => return Ok(()),
        Subst::Any => None,
        Subst::Is(s) => Some(s),
    };
    let object = match value_position(&atom.object, binding) {
        Subst::Never => return Ok(()),
        Subst::Any => None,
        Subst::Is(v) => Some(v),
    };

    let scan = store.scan_values(
        subject.as_deref(),
        predicate.as_deref(),
        object,
        None,
        token,
    )?;
    for fact in scan {
        let fact = fact?;
        if let Some(extended) = extend(binding, atom, fact) {
            out.push(extended);
        }
    }
    Ok(())
}

/// Substitute a subject/predicate position, which only holds strings
fn string_position(term: &Term, binding: &Binding) -> Subst<String> {
    match term {
        Term::Var(name) if name == "_" => Subst::Any,
        Term::Var(name) => match binding.get(name) {
            None => Subst::Any,
            Some(Value::Str(s)) => Subst::Is(s.clone()),
            Some(_) => Subst::Never,
        },
        Term::Literal(Value::Str(s)) => Subst::Is(s.clone()),
        Term::Literal(_) => Subst::Never,
    }
}

/// Substitute the object position, which holds any value
fn value_position(term: &Term, binding: &Binding) -> Subst<Value> {
    match term {
        Term::Var(name) if name == "_" => Subst::Any,
        Term::Var(name) => match binding.get(name) {
            None => Subst::Any,
            Some(v) => Subst::Is(v.clone()),
        },
        Term::Literal(v) => Subst::Is(v.clone()),
    }
}

/// Merge a fact into a binding; `None` on conflict
fn extend(binding: &Binding, atom: &DataAtom, fact: Fact) -> Option<Binding> {
    let mut extended = binding.clone();
    bind(&mut extended, &atom.subject, Value::Str(fact.subject))?;
    bind(&mut extended, &atom.predicate, Value::Str(fact.predicate))?;
    bind(&mut extended, &atom.object, fact.object)?;
    extended.insert(
        WEIGHT_KEY.to_string(),
        Value::Float(f64::from(fact.meta.weight)),
    );
    extended.insert(
        SOURCE_KEY.to_string(),
        Value::Str(fact.meta.source.as_str().to_string()),
    );
    Some(extended)
}

fn bind(binding: &mut Binding, term: &Term, value: Value) -> Option<()> {
    match term {
        Term::Var(name) if name == "_" => Some(()),
        Term::Var(name) => match binding.get(name) {
            Some(existing) if *existing == value => Some(()),
            Some(_) => None,
            None => {
                binding.insert(name.clone(), value);
                Some(())
            }
        },
        Term::Literal(literal) => {
            if *literal == value {
                Some(())
            } else {
                None
            }
        }
    }
}

fn apply_constraint(constraint: &Constraint, bindings: &mut Vec<Binding>) -> Result<()> {
    match constraint {
        Constraint::Regex { var, pattern } => {
            // Compile once per constraint; a bad pattern is an input
            // error even when no binding survives the join
            let re = Regex::new(pattern).map_err(|e| {
                StoreError::InvalidInput(format!("invalid regex {pattern:?}: {e}"))
            })?;
            bindings.retain(|binding| {
                binding
                    .get(var)
                    .is_some_and(|value| re.is_match(&value.render()))
            });
        }
        Constraint::Neq { left, right } => {
            bindings.retain(|binding| {
                match (resolve(left, binding), resolve(right, binding)) {
                    (Some(l), Some(r)) => l != r,
                    // Unbound variables in a neq fail the binding
                    _ => false,
                }
            });
        }
    }
    Ok(())
}

/// Resolve a constraint term to its comparable rendering
fn resolve(term: &Term, binding: &Binding) -> Option<String> {
    match term {
        Term::Var(name) if name == "_" => None,
        Term::Var(name) => binding.get(name).map(Value::render),
        Term::Literal(value) => Some(value.render()),
    }
}
