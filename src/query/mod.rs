//! Datalog-Style Query Engine
//!
//! Parses conjunctive queries over the fact graph and evaluates them with
//! a nested-loop join against the quad store's prefix scans.
//!
//! ## Syntax
//!
//! ```text
//! Query    := [ Head ":-" ] Body "."?
//! Body     := Atom ("," Atom)*
//! Atom     := Ident "(" Term ("," Term)* ")" | Term "!=" Term
//! Term     := Variable | Literal
//! Variable := "?" Ident | /[A-Z][A-Za-z0-9_]*/ | "_"
//! Literal  := QuotedString | Integer | Float | Bool
//! ```
//!
//! Data atoms are `triples(S, P, O)`. Constraints are `regex(?V, "pat")`
//! and `neq(A, B)` (with `A != B` as sugar). Bare uppercase identifiers
//! are variables in the default permissive mode and literals in strict
//! mode.

mod eval;
mod parser;

pub use eval::{evaluate, Binding};
pub use parser::{parse, Constraint, DataAtom, ParsedQuery, Term};

/// Reserved binding key carrying the matched fact's weight
pub const WEIGHT_KEY: &str = "_weight";
/// Reserved binding key carrying the matched fact's provenance
pub const SOURCE_KEY: &str = "_source";
