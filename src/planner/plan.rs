//! Compiled index plans

use std::fmt;

use serde::Serialize;

use crate::filter::FilterExpression;
use crate::index::{IndexKey, IndexRange};

/// Execution strategy, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanStrategy {
    /// Equality on a leading prefix
    SingleIndex,
    /// Equality prefix plus one bounded field
    RangeIndex,
    /// Several disjoint scans of one index
    MultiProbe,
    /// No index coverage: full scan plus post-filters
    None,
}

impl PlanStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStrategy::SingleIndex => "singleIndex",
            PlanStrategy::RangeIndex => "rangeIndex",
            PlanStrategy::MultiProbe => "multiProbe",
            PlanStrategy::None => "none",
        }
    }
}

impl fmt::Display for PlanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator of a single index bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl BoundOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundOp::Eq => "eq",
            BoundOp::Gt => "gt",
            BoundOp::Gte => "gte",
            BoundOp::Lt => "lt",
            BoundOp::Lte => "lte",
        }
    }
}

/// One bound applied by the index itself
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IndexFilter {
    pub field: String,
    pub op: BoundOp,
    pub key: IndexKey,
}

impl IndexFilter {
    /// Flattens a range into the bounds it applies
    pub fn from_range(fields: &[String], range: &IndexRange) -> Vec<IndexFilter> {
        let mut out: Vec<IndexFilter> = range
            .eq
            .iter()
            .zip(fields)
            .map(|(key, field)| IndexFilter {
                field: field.clone(),
                op: BoundOp::Eq,
                key: key.clone(),
            })
            .collect();

        if let Some(field) = fields.get(range.eq.len()) {
            if let Some(lower) = &range.lower {
                out.push(IndexFilter {
                    field: field.clone(),
                    op: if lower.inclusive { BoundOp::Gte } else { BoundOp::Gt },
                    key: lower.key.clone(),
                });
            }
            if let Some(upper) = &range.upper {
                out.push(IndexFilter {
                    field: field.clone(),
                    op: if upper.inclusive { BoundOp::Lte } else { BoundOp::Lt },
                    key: upper.key.clone(),
                });
            }
        }
        out
    }
}

impl fmt::Display for IndexFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.op.as_str(), self.field, self.key)
    }
}

/// The compiled execution strategy for a predicate against one table
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPlan {
    pub table: String,
    pub strategy: PlanStrategy,
    pub selected_index: String,
    /// Effective fields of the selected index
    pub index_fields: Vec<String>,
    /// Bounds of the single scan (single/range/none strategies)
    pub index_filters: Vec<IndexFilter>,
    /// Bounds of each probe (multiProbe strategy)
    pub probe_filters: Vec<Vec<IndexFilter>>,
    /// Conjuncts the index cannot apply
    pub post_filters: Vec<FilterExpression>,
    /// One range per scan, in probe order
    pub ranges: Vec<IndexRange>,
    /// Number of index fields constrained
    pub bound_fields: usize,
}

impl IndexPlan {
    pub fn probe_count(&self) -> usize {
        self.ranges.len()
    }

    /// Can be executed as one contiguous index scan without opt-in
    pub fn is_provably_indexed(&self) -> bool {
        match self.strategy {
            PlanStrategy::SingleIndex | PlanStrategy::RangeIndex => true,
            PlanStrategy::MultiProbe => self.ranges.len() <= 1,
            PlanStrategy::None => false,
        }
    }

    /// Post-filters as one conjunction
    pub fn post_filter(&self) -> Option<FilterExpression> {
        FilterExpression::and_all(self.post_filters.clone())
    }

    /// Index field position where probes start to differ.
    ///
    /// Merging probes by index position orders rows by this field.
    pub fn divergent_position(&self) -> usize {
        let Some(first) = self.ranges.first() else {
            return 0;
        };
        let mut position = first.eq.len();
        for range in &self.ranges[1..] {
            let common = first
                .eq
                .iter()
                .zip(&range.eq)
                .take_while(|(a, b)| a == b)
                .count();
            position = position.min(common);
        }
        position
    }

    /// Field the index order follows first, after constant equality fields
    pub fn leading_order_field(&self) -> Option<&str> {
        let position = if self.ranges.len() > 1 {
            self.divergent_position()
        } else {
            self.ranges.first().map_or(0, |r| r.eq.len())
        };
        self.index_fields.get(position).map(String::as_str)
    }

    /// First field after every probe's equality prefix, when all probes are
    /// pure point lookups of equal depth. Rows of each probe are ordered by it.
    pub fn trailing_order_field(&self) -> Option<&str> {
        let first = self.ranges.first()?;
        let depth = first.eq.len();
        let points_only = self
            .ranges
            .iter()
            .all(|r| r.eq.len() == depth && r.lower.is_none() && r.upper.is_none());
        if !points_only {
            return None;
        }
        self.index_fields.get(depth).map(String::as_str)
    }

    /// Fields bound to a single constant by every probe
    pub fn constant_fields(&self) -> Vec<&str> {
        let depth = if self.ranges.len() > 1 {
            self.divergent_position()
        } else {
            self.ranges.first().map_or(0, |r| r.eq.len())
        };
        self.index_fields[..depth.min(self.index_fields.len())]
            .iter()
            .map(String::as_str)
            .collect()
    }
}
