//! Read options
//!
//! Every read entry point takes one `FindManyOptions`. Options are plain
//! data plus a few callbacks (extras); nothing is evaluated until a call
//! runs.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::filter::{FilterExpression, WhereClause};
use crate::index::IndexPosition;
use crate::relation::RelationLoad;
use crate::store::{Document, Order};

/// Requested ordering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub order: Order,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: Order::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: Order::Desc,
        }
    }
}

/// Column projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Columns {
    /// Only these columns (plus `_id`)
    Include(Vec<String>),
    /// Every column except these
    Exclude(Vec<String>),
}

impl Columns {
    pub fn include<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Columns::Include(columns.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Columns::Exclude(columns.into_iter().map(Into::into).collect())
    }
}

/// Computes an extra field from the raw row
pub type ExtraFn = Arc<dyn Fn(&Document) -> Value + Send + Sync>;

/// A computed field attached to each returned row
#[derive(Clone)]
pub struct Extra {
    pub name: String,
    pub compute: ExtraFn,
}

impl Extra {
    pub fn new<F>(name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Document) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            compute: Arc::new(compute),
        }
    }
}

impl fmt::Debug for Extra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extra").field("name", &self.name).finish()
    }
}

/// Full-text search request
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub index: String,
    pub query: String,
    pub filters: Vec<(String, Value)>,
}

impl SearchRequest {
    pub fn new(index: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            query: query.into(),
            filters: Vec::new(),
        }
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.push((field.into(), value));
        self
    }
}

/// Largest result a vector search may request
pub const MAX_VECTOR_LIMIT: usize = 256;

/// Vector similarity request. The provider orders and sizes the result.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchRequest {
    pub index: String,
    pub vector: Vec<f64>,
    pub limit: usize,
    pub filters: Vec<(String, Value)>,
}

impl VectorSearchRequest {
    pub fn new(index: impl Into<String>, vector: Vec<f64>, limit: usize) -> Self {
        Self {
            index: index.into(),
            vector,
            limit,
            filters: Vec::new(),
        }
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.push((field.into(), value));
        self
    }
}

/// Options accepted by `find_many`, `find_first` and `paginate`
#[derive(Debug, Clone, Default)]
pub struct FindManyOptions {
    pub where_clause: Option<WhereClause>,
    pub order_by: Option<OrderBy>,
    pub columns: Option<Columns>,
    pub extras: Vec<Extra>,
    pub with: Vec<RelationLoad>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Permits unindexed filtering and ordering
    pub allow_full_scan: bool,
    /// Forces the named index
    pub index: Option<String>,
    /// Rows the read may scan before filtering
    pub max_scan: Option<usize>,
    /// Keep rows with at least one related row matching the expression
    pub relation_where: Vec<(String, FilterExpression)>,
    pub search: Option<SearchRequest>,
    pub vector_search: Option<VectorSearchRequest>,
}

impl FindManyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_where(mut self, clause: impl Into<WhereClause>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    pub fn with_order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
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

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_allow_full_scan(mut self) -> Self {
        self.allow_full_scan = true;
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_max_scan(mut self, max_scan: usize) -> Self {
        self.max_scan = Some(max_scan);
        self
    }

    pub fn with_relation_where(mut self, alias: impl Into<String>, expression: FilterExpression) -> Self {
        self.relation_where.push((alias.into(), expression));
        self
    }

    pub fn with_search(mut self, search: SearchRequest) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_vector_search(mut self, search: VectorSearchRequest) -> Self {
        self.vector_search = Some(search);
        self
    }

    pub(crate) fn has_predicate_where(&self) -> bool {
        matches!(self.where_clause, Some(WhereClause::Predicate(_)))
    }
}

/// One side of a key range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageKey {
    pub position: IndexPosition,
    pub inclusive: bool,
}

impl PageKey {
    pub fn after(position: IndexPosition) -> Self {
        Self {
            position,
            inclusive: false,
        }
    }

    pub fn from(position: IndexPosition) -> Self {
        Self {
            position,
            inclusive: true,
        }
    }
}

/// Key-range page request
#[derive(Debug, Clone, PartialEq)]
pub struct PageByKeyOptions {
    /// Index to read, `by_creation_time` when `None`
    pub index: Option<String>,
    pub order: Order,
    pub start_key: Option<PageKey>,
    pub end_key: Option<PageKey>,
    /// Rows the page aims for
    pub target_max_rows: usize,
    /// Rows the page may grow to so rows sharing index keys stay together
    pub absolute_max_rows: Option<usize>,
}

impl PageByKeyOptions {
    pub fn new(target_max_rows: usize) -> Self {
        Self {
            index: None,
            order: Order::Asc,
            start_key: None,
            end_key: None,
            target_max_rows,
            absolute_max_rows: None,
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn with_start(mut self, key: PageKey) -> Self {
        self.start_key = Some(key);
        self
    }

    pub fn with_end(mut self, key: PageKey) -> Self {
        self.end_key = Some(key);
        self
    }

    pub fn with_absolute_max_rows(mut self, rows: usize) -> Self {
        self.absolute_max_rows = Some(rows);
        self
    }
}

/// A key-range page
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPage {
    pub rows: Vec<Document>,
    /// Index position of each row
    pub index_keys: Vec<IndexPosition>,
    pub has_more: bool,
}

impl KeyPage {
    /// Start key for the next page
    pub fn next_start(&self) -> Option<PageKey> {
        self.index_keys.last().cloned().map(PageKey::after)
    }
}
