//! Filter expressions
//!
//! The predicate language shared by queries, relation loads and mutations:
//! a two-variant AST, builder helpers, normalization of the accepted
//! where-clause shapes and row evaluation for post-filters.

pub mod builder;

mod ast;
mod errors;
mod eval;
mod normalize;

pub use ast::{Comparison, ComparisonOp, FilterExpression, Logical, LogicalOp};
pub use builder::FilterBuilder;
pub use errors::{FilterError, FilterResult};
pub use eval::{like_prefix, like_to_regex, CompiledFilter};
pub use normalize::{
    normalize, parse_object, validate, FilterCallback, NormalizedWhere, RowPredicate, WhereClause,
};
