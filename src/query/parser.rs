//! Query Parser
//!
//! Hand-rolled parser for the conjunctive query syntax. Splits the body
//! on top-level commas (respecting parentheses and quoted strings),
//! folds the `a != b` sugar into `neq`, and strips one layer of matching
//! quotes from literals. Rejects unbalanced input with a structured
//! error instead of guessing.

use crate::error::{Result, StoreError};
use crate::value::Value;

/// A term in an atom: a variable or a literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Variable, stored as written (`?x`, `X`, `_`)
    Var(String),
    Literal(Value),
}

impl Term {
    /// Whether this is the anonymous don't-care variable
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Term::Var(name) if name == "_")
    }
}

/// A data atom `triples(S, P, O)`
#[derive(Debug, Clone, PartialEq)]
pub struct DataAtom {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

/// A constraint atom from the closed set
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// `regex(?V, "pattern")`
    Regex { var: String, pattern: String },
    /// `neq(A, B)` or the `A != B` sugar
    Neq { left: Term, right: Term },
}

/// A parsed query body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedQuery {
    pub data: Vec<DataAtom>,
    pub constraints: Vec<Constraint>,
}

/// Parse a query string
///
/// `strict_variables` requires the `?`/`_` marker for variables; in the
/// permissive default, bare uppercase identifiers are variables too.
pub fn parse(input: &str, strict_variables: bool) -> Result<ParsedQuery> {
    let mut body = input.trim();
    if body.is_empty() {
        return Err(StoreError::InvalidInput("empty query".to_string()));
    }
    // Optional trailing period
    if let Some(stripped) = body.strip_suffix('.') {
        body = stripped.trim_end();
    }
    // Optional `Head :-` prefix; only the body is evaluated
    if let Some(pos) = find_top_level(body, ":-") {
        body = body[pos + 2..].trim();
    }
    if body.is_empty() {
        return Err(StoreError::InvalidInput("query has an empty body".to_string()));
    }

    let mut query = ParsedQuery::default();
    for piece in split_top_level(body, ',')? {
        let piece = piece.trim();
        if piece.is_empty() {
            return Err(StoreError::InvalidInput("empty atom in query body".to_string()));
        }
        if let Some(pos) = find_top_level(piece, "!=") {
            let left = parse_term(piece[..pos].trim(), strict_variables)?;
            let right = parse_term(piece[pos + 2..].trim(), strict_variables)?;
            query.constraints.push(Constraint::Neq { left, right });
            continue;
        }
        let (name, args) = split_atom(piece)?;
        let terms: Vec<Term> = split_top_level(args, ',')?
            .iter()
            .map(|arg| parse_term(arg.trim(), strict_variables))
            .collect::<Result<_>>()?;
        match name {
            "triples" => {
                let [subject, predicate, object]: [Term; 3] =
                    terms.try_into().map_err(|terms: Vec<Term>| {
                        StoreError::InvalidInput(format!(
                            "triples takes 3 arguments, got {}",
                            terms.len()
                        ))
                    })?;
                query.data.push(DataAtom {
                    subject,
                    predicate,
                    object,
                });
            }
            "regex" => {
                if terms.len() != 2 {
                    return Err(StoreError::InvalidInput(format!(
                        "regex takes 2 arguments, got {}",
                        terms.len()
                    )));
                }
                let mut terms = terms.into_iter();
                let var = match terms.next().expect("arity checked") {
                    Term::Var(name) if name != "_" => name,
                    other => {
                        return Err(StoreError::InvalidInput(format!(
                            "regex needs a named variable, got {other:?}"
                        )));
                    }
                };
                let pattern = match terms.next().expect("arity checked") {
                    Term::Literal(Value::Str(p)) => p,
                    other => {
                        return Err(StoreError::InvalidInput(format!(
                            "regex needs a string pattern, got {other:?}"
                        )));
                    }
                };
                query.constraints.push(Constraint::Regex { var, pattern });
            }
            "neq" => {
                let [left, right]: [Term; 2] = terms.try_into().map_err(|terms: Vec<Term>| {
                    StoreError::InvalidInput(format!("neq takes 2 arguments, got {}", terms.len()))
                })?;
                query.constraints.push(Constraint::Neq { left, right });
            }
            other => {
                return Err(StoreError::InvalidInput(format!(
                    "unknown atom {other:?} (expected triples, regex or neq)"
                )));
            }
        }
    }
    Ok(query)
}

/// Split `name(args)` into its parts
fn split_atom(piece: &str) -> Result<(&str, &str)> {
    let open = piece.find('(').ok_or_else(|| {
        StoreError::InvalidInput(format!("expected an atom of the form name(...), got {piece:?}"))
    })?;
    if !piece.ends_with(')') {
        return Err(StoreError::InvalidInput(format!(
            "unterminated atom {piece:?}"
        )));
    }
    let name = piece[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(StoreError::InvalidInput(format!("bad atom name {name:?}")));
    }
    Ok((name, &piece[open + 1..piece.len() - 1]))
}

/// Parse one term
fn parse_term(text: &str, strict_variables: bool) -> Result<Term> {
    if text.is_empty() {
        return Err(StoreError::InvalidInput("empty term".to_string()));
    }
    if text == "_" {
        return Ok(Term::Var("_".to_string()));
    }
    if let Some(rest) = text.strip_prefix('?') {
        if rest.is_empty() || !rest.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(StoreError::InvalidInput(format!("bad variable {text:?}")));
        }
        return Ok(Term::Var(text.to_string()));
    }
    for quote in ['"', '\''] {
        if text.starts_with(quote) {
            if text.len() < 2 || !text.ends_with(quote) {
                return Err(StoreError::InvalidInput(format!(
                    "unterminated string {text:?}"
                )));
            }
            return Ok(Term::Literal(Value::Str(text[1..text.len() - 1].to_string())));
        }
    }
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Term::Literal(Value::Int(i)));
    }
    if text.contains('.') {
        if let Ok(f) = text.parse::<f64>() {
            return Ok(Term::Literal(Value::Float(f)));
        }
    }
    match text {
        "true" => return Ok(Term::Literal(Value::Bool(true))),
        "false" => return Ok(Term::Literal(Value::Bool(false))),
        _ => {}
    }
    let leading_upper = text.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    if leading_upper && !strict_variables {
        return Ok(Term::Var(text.to_string()));
    }
    Ok(Term::Literal(Value::Str(text.to_string())))
}

/// Split on a delimiter char at paren depth zero, outside quotes
fn split_top_level(input: &str, delimiter: char) -> Result<Vec<&str>> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(StoreError::InvalidInput(
                            "unbalanced parentheses in query".to_string(),
                        ));
                    }
                }
                c if c == delimiter && depth == 0 => {
                    pieces.push(&input[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    if quote.is_some() {
        return Err(StoreError::InvalidInput(
            "unterminated string literal in query".to_string(),
        ));
    }
    if depth != 0 {
        return Err(StoreError::InvalidInput(
            "unbalanced parentheses in query".to_string(),
        ));
    }
    pieces.push(&input[start..]);
    Ok(pieces)
}

/// Byte offset of a two-character token at top level, if present
fn find_top_level(input: &str, token: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let needle = token.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                b'"' | b'\'' => quote = Some(c),
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ => {
                    if depth == 0 && bytes[i..].starts_with(needle) {
                        return Some(i);
                    }
                }
            },
        }
        i += 1;
    }
    None
}
