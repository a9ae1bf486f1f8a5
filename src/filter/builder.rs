//! Filter construction helpers
//!
//! Free functions mirror the operator names so filters read like the
//! query they describe:
//!
//! ```ignore
//! use boundorm::filter::builder::*;
//! let expr = and(vec![eq("status", json!("draft")), gt("age", json!(18))]);
//! ```

use serde_json::Value;

use super::ast::{ComparisonOp, FilterExpression, LogicalOp};

pub fn eq(field: &str, value: Value) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::Eq, value)
}

pub fn ne(field: &str, value: Value) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::Ne, value)
}

pub fn gt(field: &str, value: Value) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::Gt, value)
}

pub fn gte(field: &str, value: Value) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::Gte, value)
}

pub fn lt(field: &str, value: Value) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::Lt, value)
}

pub fn lte(field: &str, value: Value) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::Lte, value)
}

pub fn in_array(field: &str, values: Vec<Value>) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::InArray, Value::Array(values))
}

pub fn not_in_array(field: &str, values: Vec<Value>) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::NotInArray, Value::Array(values))
}

pub fn is_null(field: &str) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::IsNull, Value::Null)
}

pub fn is_not_null(field: &str) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::IsNotNull, Value::Null)
}

pub fn starts_with(field: &str, prefix: &str) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::StartsWith, Value::from(prefix))
}

pub fn ends_with(field: &str, suffix: &str) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::EndsWith, Value::from(suffix))
}

pub fn contains(field: &str, needle: Value) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::Contains, needle)
}

pub fn like(field: &str, pattern: &str) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::Like, Value::from(pattern))
}

pub fn ilike(field: &str, pattern: &str) -> FilterExpression {
    FilterExpression::comparison(field, ComparisonOp::Ilike, Value::from(pattern))
}

pub fn and(children: Vec<FilterExpression>) -> FilterExpression {
    FilterExpression::logical(LogicalOp::And, children)
}

pub fn or(children: Vec<FilterExpression>) -> FilterExpression {
    FilterExpression::logical(LogicalOp::Or, children)
}

pub fn not(child: FilterExpression) -> FilterExpression {
    FilterExpression::logical(LogicalOp::Not, vec![child])
}

/// Builder handed to callback-style where clauses.
///
/// Carries the table name so callbacks can be written against a table
/// without repeating it; the operators are the free functions above.
#[derive(Debug, Clone, Copy)]
pub struct FilterBuilder<'t> {
    table: &'t str,
}

impl<'t> FilterBuilder<'t> {
    pub fn new(table: &'t str) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &str {
        self.table
    }

    pub fn eq(&self, field: &str, value: Value) -> FilterExpression {
        eq(field, value)
    }

    pub fn ne(&self, field: &str, value: Value) -> FilterExpression {
        ne(field, value)
    }

    pub fn gt(&self, field: &str, value: Value) -> FilterExpression {
        gt(field, value)
    }

    pub fn gte(&self, field: &str, value: Value) -> FilterExpression {
        gte(field, value)
    }

    pub fn lt(&self, field: &str, value: Value) -> FilterExpression {
        lt(field, value)
    }

    pub fn lte(&self, field: &str, value: Value) -> FilterExpression {
        lte(field, value)
    }

    pub fn in_array(&self, field: &str, values: Vec<Value>) -> FilterExpression {
        in_array(field, values)
    }

    pub fn not_in_array(&self, field: &str, values: Vec<Value>) -> FilterExpression {
        not_in_array(field, values)
    }

    pub fn is_null(&self, field: &str) -> FilterExpression {
        is_null(field)
    }

    pub fn is_not_null(&self, field: &str) -> FilterExpression {
        is_not_null(field)
    }

    pub fn starts_with(&self, field: &str, prefix: &str) -> FilterExpression {
        starts_with(field, prefix)
    }

    pub fn like(&self, field: &str, pattern: &str) -> FilterExpression {
        like(field, pattern)
    }

    pub fn and(&self, children: Vec<FilterExpression>) -> FilterExpression {
        and(children)
    }

    pub fn or(&self, children: Vec<FilterExpression>) -> FilterExpression {
        or(children)
    }

    pub fn not(&self, child: FilterExpression) -> FilterExpression {
        not(child)
    }
}
