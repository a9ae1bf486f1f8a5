//! Relation load options

use crate::filter::FilterExpression;
use crate::query::{Columns, Extra, OrderBy};

/// One relation to load onto every returned row.
///
/// `where`, `order_by`, `offset` and `limit` apply per parent row.
#[derive(Debug, Clone, Default)]
pub struct RelationLoad {
    pub alias: String,
    pub where_expression: Option<FilterExpression>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub columns: Option<Columns>,
    pub extras: Vec<Extra>,
    /// Relations of the related rows
    pub with: Vec<RelationLoad>,
    /// Lifts the fan-out and row caps
    pub allow_full_scan: bool,
}

impl RelationLoad {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            ..Default::default()
        }
    }

    pub fn with_where(mut self, expression: FilterExpression) -> Self {
        self.where_expression = Some(expression);
        self
    }

    pub fn with_order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_columns(mut self, columns: Columns) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_extra(mut self, extra: Extra) -> Self {
        self.extras.push(extra);
        self
    }

    pub fn with_relation(mut self, load: RelationLoad) -> Self {
        self.with.push(load);
        self
    }

    pub fn with_allow_full_scan(mut self) -> Self {
        self.allow_full_scan = true;
        self
    }

    /// Levels of nesting, this load included
    pub fn depth(&self) -> usize {
        1 + nesting_depth(&self.with)
    }
}

/// Deepest nesting among `loads`, zero when empty
pub fn nesting_depth(loads: &[RelationLoad]) -> usize {
    loads.iter().map(RelationLoad::depth).max().unwrap_or(0)
}
