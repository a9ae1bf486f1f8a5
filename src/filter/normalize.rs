//! Where-clause normalization
//!
//! Callers may express a where clause as an expression, a JSON object
//! filter, a builder callback or a raw row predicate. All of them are
//! reduced here to a single `NormalizedWhere` so the compiler and the
//! executors never branch on the shape the caller used.
//!
//! Object filters follow this grammar:
//!
//! ```text
//! { "status": "draft" }                     eq
//! { "deletedAt": null }                     isNull
//! { "age": { "gte": 18, "lt": 65 } }        AND of comparisons
//! { "OR": [ {...}, {...} ], "NOT": {...} }  logical nodes
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::ast::{ComparisonOp, FilterExpression, LogicalOp};
use super::builder::FilterBuilder;
use super::errors::{FilterError, FilterResult};
use crate::schema::TableSchema;
use crate::store::Document;

/// Opaque row predicate. Cannot be planned or serialized.
pub type RowPredicate = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// Callback producing an expression from a table-scoped builder
pub type FilterCallback = Arc<dyn Fn(&FilterBuilder<'_>) -> FilterExpression + Send + Sync>;

/// A where clause in any of the accepted shapes
#[derive(Clone)]
pub enum WhereClause {
    Expression(FilterExpression),
    Object(Value),
    Builder(FilterCallback),
    Predicate(RowPredicate),
}

impl WhereClause {
    pub fn object(value: Value) -> Self {
        WhereClause::Object(value)
    }

    pub fn builder<F>(f: F) -> Self
    where
        F: Fn(&FilterBuilder<'_>) -> FilterExpression + Send + Sync + 'static,
    {
        WhereClause::Builder(Arc::new(f))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        WhereClause::Predicate(Arc::new(f))
    }
}

impl fmt::Debug for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhereClause::Expression(expr) => f.debug_tuple("Expression").field(expr).finish(),
            WhereClause::Object(value) => f.debug_tuple("Object").field(value).finish(),
            WhereClause::Builder(_) => f.write_str("Builder(<callback>)"),
            WhereClause::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

impl From<FilterExpression> for WhereClause {
    fn from(expr: FilterExpression) -> Self {
        WhereClause::Expression(expr)
    }
}

/// The single shape every where clause is reduced to.
///
/// `expression` is planned against the indexes; `predicate` is only ever a
/// streaming post-filter.
#[derive(Clone, Default)]
pub struct NormalizedWhere {
    pub expression: Option<FilterExpression>,
    pub predicate: Option<RowPredicate>,
}

impl NormalizedWhere {
    pub fn from_expression(expression: Option<FilterExpression>) -> Self {
        Self {
            expression,
            predicate: None,
        }
    }

    /// True when nothing restricts the rows
    pub fn is_empty(&self) -> bool {
        self.expression.is_none() && self.predicate.is_none()
    }

    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }
}

impl fmt::Debug for NormalizedWhere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedWhere")
            .field("expression", &self.expression)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Normalizes a where clause against a table.
///
/// Field names are checked against the table's declared columns and
/// operand shapes are checked against their operators.
pub fn normalize(table: &TableSchema, clause: Option<&WhereClause>) -> FilterResult<NormalizedWhere> {
    let normalized = match clause {
        None => NormalizedWhere::default(),
        Some(WhereClause::Expression(expr)) => NormalizedWhere::from_expression(Some(expr.clone())),
        Some(WhereClause::Object(value)) => NormalizedWhere::from_expression(parse_object(value)?),
        Some(WhereClause::Builder(callback)) => {
            let builder = FilterBuilder::new(&table.name);
            NormalizedWhere::from_expression(Some(callback(&builder)))
        }
        Some(WhereClause::Predicate(predicate)) => NormalizedWhere {
            expression: None,
            predicate: Some(Arc::clone(predicate)),
        },
    };

    if let Some(expr) = &normalized.expression {
        validate(table, expr)?;
    }
    Ok(normalized)
}

/// Parses a JSON object filter. An empty object means "no filter".
pub fn parse_object(value: &Value) -> FilterResult<Option<FilterExpression>> {
    let map = value
        .as_object()
        .ok_or_else(|| FilterError::malformed(format!("expected an object, got {}", value)))?;
    let mut conjuncts = Vec::with_capacity(map.len());

    for (key, operand) in map {
        match key.as_str() {
            "AND" => conjuncts.push(FilterExpression::logical(
                LogicalOp::And,
                parse_children("AND", operand)?,
            )),
            "OR" => conjuncts.push(FilterExpression::logical(
                LogicalOp::Or,
                parse_children("OR", operand)?,
            )),
            "NOT" => conjuncts.push(FilterExpression::logical(
                LogicalOp::Not,
                parse_children("NOT", operand)?,
            )),
            field => parse_field(field, operand, &mut conjuncts)?,
        }
    }

    Ok(FilterExpression::and_all(conjuncts))
}

fn parse_children(op: &'static str, operand: &Value) -> FilterResult<Vec<FilterExpression>> {
    let items: Vec<&Value> = match operand {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![operand],
        other => {
            return Err(FilterError::malformed(format!(
                "{} expects an object or array, got {}",
                op, other
            )))
        }
    };

    let mut children = Vec::with_capacity(items.len());
    for item in items {
        if let Some(child) = parse_object(item)? {
            children.push(child);
        }
    }
    if children.is_empty() {
        return Err(FilterError::EmptyLogical { op });
    }
    Ok(children)
}

fn parse_field(field: &str, operand: &Value, out: &mut Vec<FilterExpression>) -> FilterResult<()> {
    match operand {
        Value::Null => out.push(FilterExpression::comparison(field, ComparisonOp::IsNull, Value::Null)),
        Value::Object(ops) => parse_operators(field, ops, out)?,
        scalar => out.push(FilterExpression::comparison(field, ComparisonOp::Eq, scalar.clone())),
    }
    Ok(())
}

fn parse_operators(
    field: &str,
    ops: &Map<String, Value>,
    out: &mut Vec<FilterExpression>,
) -> FilterResult<()> {
    if ops.is_empty() {
        return Err(FilterError::malformed(format!("empty operator object on '{}'", field)));
    }
    for (name, value) in ops {
        let op = ComparisonOp::parse(name).ok_or_else(|| FilterError::UnknownOperator {
            field: field.to_string(),
            op: name.clone(),
        })?;
        let expr = match op {
            // {isNull: false} reads as isNotNull and vice versa
            ComparisonOp::IsNull | ComparisonOp::IsNotNull => {
                let wanted = value.as_bool().unwrap_or(true);
                let op = match (op, wanted) {
                    (ComparisonOp::IsNull, true) | (ComparisonOp::IsNotNull, false) => {
                        ComparisonOp::IsNull
                    }
                    _ => ComparisonOp::IsNotNull,
                };
                FilterExpression::comparison(field, op, Value::Null)
            }
            op => FilterExpression::comparison(field, op, value.clone()),
        };
        out.push(expr);
    }
    Ok(())
}

/// Checks columns and operand shapes.
pub fn validate(table: &TableSchema, expr: &FilterExpression) -> FilterResult<()> {
    match expr {
        FilterExpression::Comparison(c) => {
            if !table.has_column(&c.field) {
                return Err(FilterError::UnknownColumn {
                    table: table.name.clone(),
                    field: c.field.clone(),
                });
            }
            if c.op.takes_list() && !c.value.is_array() {
                return Err(FilterError::ExpectedArray {
                    field: c.field.clone(),
                    op: c.op.as_str(),
                });
            }
            if c.op.takes_string() && !c.value.is_string() {
                return Err(FilterError::ExpectedString {
                    field: c.field.clone(),
                    op: c.op.as_str(),
                });
            }
            Ok(())
        }
        FilterExpression::Logical(l) => {
            if l.children.is_empty() {
                return Err(FilterError::EmptyLogical { op: l.op.as_str() });
            }
            l.children.iter().try_for_each(|child| validate(table, child))
        }
    }
}
