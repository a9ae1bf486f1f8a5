//! Query engine
//!
//! Reads rows of one table through a compiled `IndexPlan`:
//!
//! - `find_many` / `find_first` / `find_first_or_throw`
//! - `paginate`: cursor pages over a single contiguous index range
//! - `page_by_key`: key-range pages over one index
//! - `stream`: the raw row stream for custom pipelines
//! - full-text and vector search through the host's provider
//!
//! Results are `RowEnvelope`s carrying the raw row plus projection, extras
//! and loaded relations.

mod envelope;
mod executor;
mod options;
mod sorter;

pub use envelope::{RelationValue, RowEnvelope};
pub use executor::QueryExecutor;
pub use options::{
    Columns, Extra, ExtraFn, FindManyOptions, KeyPage, OrderBy, PageByKeyOptions, PageKey,
    SearchRequest, VectorSearchRequest, MAX_VECTOR_LIMIT,
};
pub use sorter::RowSorter;

pub(crate) use envelope::finish_rows;
