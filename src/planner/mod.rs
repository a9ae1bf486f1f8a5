//! Index planning
//!
//! Compiles a where-clause into an `IndexPlan` against one table's index
//! set before any host call is made.
//!
//! # Design Principles
//!
//! - Deterministic: same (table, indexes, expression) gives the same plan
//! - Index-only: a plan never relies on the host to evaluate predicates
//! - Explicit: predicates the index cannot serve are listed as post-filters
//!
//! # Strategy Priority (strict order)
//!
//! 1. singleIndex
//! 2. rangeIndex
//! 3. multiProbe
//! 4. none
//!
//! Ties broken by bound field count, then by first-registered index.

mod compiler;
mod errors;
mod explain;
mod plan;

pub use compiler::{WhereClauseCompiler, MAX_PROBES};
pub use errors::{PlanningError, PlanningResult};
pub use explain::ExplainPlan;
pub use plan::{BoundOp, IndexFilter, IndexPlan, PlanStrategy};
