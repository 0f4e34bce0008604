//! Row filters understood by the store.
//!
//! A `Filter` is rendered into PostgREST query parameters when sent over the wire, and can be
//! evaluated locally against a row with the same semantics. Patterns use `*` as the only
//! wildcard, the way PostgREST spells `%` in URLs.

use std::fmt;

use serde_json::Value;

use crate::store::Row;

/// How a `Pattern` compares a column against its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternOp {
    /// Exact match.
    Eq,
    /// Case sensitive wildcard match.
    Like,
    /// Case insensitive wildcard match.
    ILike,
}

impl fmt::Display for PatternOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PatternOp::Eq => write!(f, "eq"),
            PatternOp::Like => write!(f, "like"),
            PatternOp::ILike => write!(f, "ilike"),
        }
    }
}

/// A single text predicate on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub column: String,
    pub op: PatternOp,
    pub pattern: String,
}

impl Pattern {
    pub fn new(column: &str, op: PatternOp, pattern: &str) -> Self {
        Self {
            column: column.to_owned(),
            op,
            pattern: pattern.to_owned(),
        }
    }

    /// `column ILIKE '*needle*'`
    pub fn contains(column: &str, needle: &str) -> Self {
        Self::new(column, PatternOp::ILike, &format!("*{needle}*"))
    }

    /// `column ILIKE '*suffix'`
    pub fn ends_with(column: &str, suffix: &str) -> Self {
        Self::new(column, PatternOp::ILike, &format!("*{suffix}"))
    }

    pub fn equals(column: &str, value: &str) -> Self {
        Self::new(column, PatternOp::Eq, value)
    }

    pub fn matches_text(&self, text: &str) -> bool {
        match self.op {
            PatternOp::Eq => text == self.pattern,
            PatternOp::Like => wildcard_match(&self.pattern, text),
            PatternOp::ILike => {
                wildcard_match(&self.pattern.to_lowercase(), &text.to_lowercase())
            }
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match row.get(&self.column).and_then(value_as_text) {
            Some(text) => self.matches_text(&text),
            None => false,
        }
    }

    /// Render as an element of a PostgREST logical group, e.g. `email.ilike.*demo*`.
    fn to_group_element(&self) -> String {
        format!("{}.{}.{}", self.column, self.op, quote(&self.pattern))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// No restriction. Never accepted for deletes.
    All,
    Eq { column: String, value: String },
    In { column: String, values: Vec<String> },
    /// Matches when any of the patterns match.
    AnyOf(Vec<Pattern>),
    /// Matches when every inner filter matches.
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: &str) -> Self {
        Filter::Eq {
            column: column.to_owned(),
            value: value.to_owned(),
        }
    }

    pub fn is_in<S: AsRef<str>>(column: &str, values: &[S]) -> Self {
        Filter::In {
            column: column.to_owned(),
            values: values.iter().map(|v| v.as_ref().to_owned()).collect(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        match self {
            Filter::All => true,
            Filter::And(filters) => filters.iter().all(Filter::is_unrestricted),
            _ => false,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { column, value } => row
                .get(column)
                .and_then(value_as_text)
                .is_some_and(|text| &text == value),
            Filter::In { column, values } => row
                .get(column)
                .and_then(value_as_text)
                .is_some_and(|text| values.iter().any(|v| v == &text)),
            Filter::AnyOf(patterns) => patterns.iter().any(|p| p.matches(row)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(row)),
        }
    }

    /// Render as PostgREST query parameters.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        match self {
            Filter::All => vec![],
            Filter::Eq { column, value } => vec![(column.clone(), format!("eq.{value}"))],
            Filter::In { column, values } => {
                let values: Vec<String> = values.iter().map(|v| quote(v)).collect();
                vec![(column.clone(), format!("in.({})", values.join(",")))]
            }
            Filter::AnyOf(patterns) => {
                let elements: Vec<String> =
                    patterns.iter().map(Pattern::to_group_element).collect();
                vec![("or".to_owned(), format!("({})", elements.join(",")))]
            }
            Filter::And(filters) => filters.iter().flat_map(Filter::to_query_pairs).collect(),
        }
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// PostgREST reserves `,().:"` inside list and logic operators; such values must be double quoted.
fn quote(value: &str) -> String {
    if value.contains([',', '(', ')', '"', ':', '\\']) || value.contains(char::is_whitespace) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_owned()
    }
}

/// Glob match where `*` stands for any run of characters.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) || text.len() < first.len() + last.len() {
        return false;
    }

    let mut rest = &text[first.len()..];
    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(index) => rest = &rest[index + middle.len()..],
            None => return false,
        }
    }

    rest.ends_with(last)
}
