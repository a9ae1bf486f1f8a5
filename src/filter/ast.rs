//! Filter expression AST
//!
//! A filter is either a comparison on one field or a logical node over
//! child filters. Every where-shape accepted by the query surface is
//! normalized into this single union before compilation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    InArray,
    NotInArray,
    IsNull,
    IsNotNull,
    StartsWith,
    EndsWith,
    Contains,
    Like,
    Ilike,
}

impl ComparisonOp {
    /// Operator name for explain output
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "eq",
            ComparisonOp::Ne => "ne",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Gte => "gte",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Lte => "lte",
            ComparisonOp::InArray => "inArray",
            ComparisonOp::NotInArray => "notInArray",
            ComparisonOp::IsNull => "isNull",
            ComparisonOp::IsNotNull => "isNotNull",
            ComparisonOp::StartsWith => "startsWith",
            ComparisonOp::EndsWith => "endsWith",
            ComparisonOp::Contains => "contains",
            ComparisonOp::Like => "like",
            ComparisonOp::Ilike => "ilike",
        }
    }

    /// Parses an operator name as used in object filters.
    ///
    /// `in` and `notIn` are accepted as aliases.
    pub fn parse(name: &str) -> Option<Self> {
        let op = match name {
            "eq" => ComparisonOp::Eq,
            "ne" => ComparisonOp::Ne,
            "gt" => ComparisonOp::Gt,
            "gte" => ComparisonOp::Gte,
            "lt" => ComparisonOp::Lt,
            "lte" => ComparisonOp::Lte,
            "in" | "inArray" => ComparisonOp::InArray,
            "notIn" | "notInArray" => ComparisonOp::NotInArray,
            "isNull" => ComparisonOp::IsNull,
            "isNotNull" => ComparisonOp::IsNotNull,
            "startsWith" => ComparisonOp::StartsWith,
            "endsWith" => ComparisonOp::EndsWith,
            "contains" => ComparisonOp::Contains,
            "like" => ComparisonOp::Like,
            "ilike" => ComparisonOp::Ilike,
            _ => return None,
        };
        Some(op)
    }

    /// Operators whose value must be an array
    pub fn takes_list(&self) -> bool {
        matches!(self, ComparisonOp::InArray | ComparisonOp::NotInArray)
    }

    /// Operators whose value must be a string
    pub fn takes_string(&self) -> bool {
        matches!(
            self,
            ComparisonOp::StartsWith
                | ComparisonOp::EndsWith
                | ComparisonOp::Like
                | ComparisonOp::Ilike
        )
    }
}

/// A single field comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub field: String,
    pub op: ComparisonOp,
    #[serde(default)]
    pub value: Value,
}

/// Logical connectives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

impl LogicalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
            LogicalOp::Not => "NOT",
        }
    }
}

/// A logical node. `Not` negates the conjunction of its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Logical {
    pub op: LogicalOp,
    pub children: Vec<FilterExpression>,
}

/// Predicate AST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FilterExpression {
    Comparison(Comparison),
    Logical(Logical),
}

impl FilterExpression {
    pub fn comparison(field: impl Into<String>, op: ComparisonOp, value: Value) -> Self {
        FilterExpression::Comparison(Comparison {
            field: field.into(),
            op,
            value,
        })
    }

    pub fn logical(op: LogicalOp, children: Vec<FilterExpression>) -> Self {
        FilterExpression::Logical(Logical { op, children })
    }

    /// Conjunction that collapses to its only child when possible
    pub fn and_all(mut children: Vec<FilterExpression>) -> Option<Self> {
        match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(Self::logical(LogicalOp::And, children)),
        }
    }

    /// Flattens nested ANDs into a list of conjuncts.
    pub fn conjuncts(&self) -> Vec<&FilterExpression> {
        let mut out = Vec::new();
        self.collect_conjuncts(&mut out);
        out
    }

    fn collect_conjuncts<'a>(&'a self, out: &mut Vec<&'a FilterExpression>) {
        match self {
            FilterExpression::Logical(Logical {
                op: LogicalOp::And,
                children,
            }) => {
                for child in children {
                    child.collect_conjuncts(out);
                }
            }
            other => out.push(other),
        }
    }

    /// Every field referenced anywhere in the expression, in first-seen order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FilterExpression::Comparison(c) => {
                if !out.contains(&c.field.as_str()) {
                    out.push(&c.field);
                }
            }
            FilterExpression::Logical(l) => {
                for child in &l.children {
                    child.collect_fields(out);
                }
            }
        }
    }

    pub fn as_comparison(&self) -> Option<&Comparison> {
        match self {
            FilterExpression::Comparison(c) => Some(c),
            FilterExpression::Logical(_) => None,
        }
    }

    /// Human readable rendering used by explain output
    pub fn describe(&self) -> String {
        match self {
            FilterExpression::Comparison(c) => match c.op {
                ComparisonOp::IsNull | ComparisonOp::IsNotNull => {
                    format!("{}({})", c.op.as_str(), c.field)
                }
                _ => format!("{}({}, {})", c.op.as_str(), c.field, c.value),
            },
            FilterExpression::Logical(l) => {
                let children: Vec<String> = l.children.iter().map(|c| c.describe()).collect();
                format!("{}({})", l.op.as_str(), children.join(", "))
            }
        }
    }
}
