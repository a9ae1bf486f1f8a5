//! Row evaluation of filter expressions
//!
//! Post-filters run against documents pulled from an index scan. The
//! comparison semantics follow index key order exactly, so a row passes
//! a post-filter if and only if the equivalent index range would contain it:
//!
//! - equality and membership compare `IndexKey`s (18 == 18.0)
//! - ordered comparisons and exclusions never match null or missing fields
//! - LIKE patterns are compiled once per filter into anchored regexes

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use super::ast::{Comparison, ComparisonOp, FilterExpression, LogicalOp};
use super::errors::{FilterError, FilterResult};
use crate::index::IndexKey;
use crate::store::Document;

/// A filter with its LIKE patterns and value sets prepared for evaluation
#[derive(Debug, Clone)]
pub enum CompiledFilter {
    Compare {
        field: String,
        op: ComparisonOp,
        key: IndexKey,
        value: Value,
    },
    Set {
        field: String,
        keys: HashSet<IndexKey>,
        negated: bool,
    },
    Pattern {
        field: String,
        regex: Regex,
    },
    All(Vec<CompiledFilter>),
    Any(Vec<CompiledFilter>),
    Not(Box<CompiledFilter>),
}

impl CompiledFilter {
    pub fn compile(expr: &FilterExpression) -> FilterResult<Self> {
        match expr {
            FilterExpression::Comparison(c) => Self::compile_comparison(c),
            FilterExpression::Logical(l) => {
                let children = l
                    .children
                    .iter()
                    .map(Self::compile)
                    .collect::<FilterResult<Vec<_>>>()?;
                Ok(match l.op {
                    LogicalOp::And => CompiledFilter::All(children),
                    LogicalOp::Or => CompiledFilter::Any(children),
                    LogicalOp::Not => CompiledFilter::Not(Box::new(CompiledFilter::All(children))),
                })
            }
        }
    }

    fn compile_comparison(c: &Comparison) -> FilterResult<Self> {
        match c.op {
            ComparisonOp::InArray | ComparisonOp::NotInArray => {
                let values = c
                    .value
                    .as_array()
                    .ok_or_else(|| FilterError::ExpectedArray {
                        field: c.field.clone(),
                        op: c.op.as_str(),
                    })?;
                Ok(CompiledFilter::Set {
                    field: c.field.clone(),
                    keys: values.iter().map(IndexKey::from_json).collect(),
                    negated: c.op == ComparisonOp::NotInArray,
                })
            }
            ComparisonOp::Like | ComparisonOp::Ilike => {
                let pattern = c.value.as_str().ok_or_else(|| FilterError::ExpectedString {
                    field: c.field.clone(),
                    op: c.op.as_str(),
                })?;
                let regex = RegexBuilder::new(&like_to_regex(pattern))
                    .case_insensitive(c.op == ComparisonOp::Ilike)
                    .dot_matches_new_line(true)
                    .build()
                    .map_err(|e| FilterError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(CompiledFilter::Pattern {
                    field: c.field.clone(),
                    regex,
                })
            }
            op => {
                if op.takes_string() && !c.value.is_string() {
                    return Err(FilterError::ExpectedString {
                        field: c.field.clone(),
                        op: op.as_str(),
                    });
                }
                Ok(CompiledFilter::Compare {
                    field: c.field.clone(),
                    op,
                    key: IndexKey::from_json(&c.value),
                    value: c.value.clone(),
                })
            }
        }
    }

    /// Checks if a document matches
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            CompiledFilter::Compare {
                field,
                op,
                key,
                value,
            } => Self::compare(doc.get(field), *op, key, value),
            CompiledFilter::Set {
                field,
                keys,
                negated,
            } => {
                let actual = IndexKey::from_field(doc.get(field));
                if *negated {
                    !actual.is_null() && !keys.contains(&actual)
                } else {
                    keys.contains(&actual)
                }
            }
            CompiledFilter::Pattern { field, regex } => doc
                .get(field)
                .and_then(Value::as_str)
                .map_or(false, |s| regex.is_match(s)),
            CompiledFilter::All(children) => children.iter().all(|c| c.matches(doc)),
            CompiledFilter::Any(children) => children.iter().any(|c| c.matches(doc)),
            CompiledFilter::Not(child) => !child.matches(doc),
        }
    }

    fn compare(actual: Option<&Value>, op: ComparisonOp, key: &IndexKey, value: &Value) -> bool {
        let actual_key = IndexKey::from_field(actual);
        match op {
            ComparisonOp::Eq => actual_key == *key,
            ComparisonOp::IsNull => actual_key.is_null(),
            ComparisonOp::IsNotNull => !actual_key.is_null(),
            ComparisonOp::Ne => !actual_key.is_null() && actual_key != *key,
            ComparisonOp::Gt => !actual_key.is_null() && actual_key > *key,
            ComparisonOp::Gte => !actual_key.is_null() && actual_key >= *key,
            ComparisonOp::Lt => !actual_key.is_null() && actual_key < *key,
            ComparisonOp::Lte => !actual_key.is_null() && actual_key <= *key,
            ComparisonOp::StartsWith => match (actual.and_then(Value::as_str), value.as_str()) {
                (Some(s), Some(prefix)) => s.starts_with(prefix),
                _ => false,
            },
            ComparisonOp::EndsWith => match (actual.and_then(Value::as_str), value.as_str()) {
                (Some(s), Some(suffix)) => s.ends_with(suffix),
                _ => false,
            },
            ComparisonOp::Contains => match actual {
                Some(Value::String(s)) => value.as_str().map_or(false, |needle| s.contains(needle)),
                Some(Value::Array(items)) => {
                    items.iter().any(|item| IndexKey::from_json(item) == *key)
                }
                _ => false,
            },
            // compiled into Set / Pattern
            ComparisonOp::InArray
            | ComparisonOp::NotInArray
            | ComparisonOp::Like
            | ComparisonOp::Ilike => false,
        }
    }
}

impl FilterExpression {
    /// Compiles and evaluates in one go. Prefer `CompiledFilter` for scans.
    pub fn matches(&self, doc: &Document) -> FilterResult<bool> {
        Ok(CompiledFilter::compile(self)?.matches(doc))
    }
}

/// Translates a SQL LIKE pattern into an anchored regex.
///
/// `%` matches any sequence, `_` any single character, and a backslash
/// escapes the next character.
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Literal prefix of a `'prefix%'` pattern.
///
/// Returns `None` unless the pattern is a wildcard-free prefix followed by
/// exactly one trailing `%`.
pub fn like_prefix(pattern: &str) -> Option<String> {
    let body = pattern.strip_suffix('%')?;
    let mut prefix = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' | '_' => return None,
            '\\' => prefix.push(chars.next()?),
            other => prefix.push(other),
        }
    }
    Some(prefix)
}
