//! Streams built from compiled plans

use super::merge::{MergeKey, MergeNode};
use super::pipeline::Pipeline;
use super::scan::{EmptyNode, ScanNode, ScanSpec, StreamOptions};
use super::Stream;
use crate::errors::EngineResult;
use crate::filter::CompiledFilter;
use crate::planner::IndexPlan;
use crate::store::{Document, DocumentReader, Order};

/// How the probes of a multi-probe plan are combined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeMerge {
    /// By full index position
    Union,
    /// By the given fields, then id
    InterleaveBy(Vec<String>),
}

impl<'a> Stream<'a, Document> {
    /// One index range scan
    pub fn scan(reader: &'a dyn DocumentReader, spec: ScanSpec, options: &StreamOptions) -> Self {
        Stream::from_node(
            Box::new(ScanNode::new(reader, spec, options)),
            options.row_read_limit,
        )
    }

    /// A stream with no rows
    pub fn empty(order: Order, index_fields: Vec<String>, options: &StreamOptions) -> Self {
        Stream::from_node(
            Box::new(EmptyNode::new(order, index_fields)),
            options.row_read_limit,
        )
    }

    /// One scan per probe of the plan, without post-filters
    pub fn probes(
        reader: &'a dyn DocumentReader,
        plan: &IndexPlan,
        order: Order,
        options: &StreamOptions,
    ) -> Vec<Self> {
        plan.ranges
            .iter()
            .map(|range| {
                let spec = ScanSpec {
                    table: plan.table.clone(),
                    index: plan.selected_index.clone(),
                    fields: plan.index_fields.clone(),
                    range: range.clone(),
                    order,
                };
                Stream::scan(reader, spec, options)
            })
            .collect()
    }

    /// Every row matching the plan, probes merged by index position and
    /// post-filters applied as a streaming filter.
    pub fn from_plan(
        reader: &'a dyn DocumentReader,
        plan: &IndexPlan,
        order: Order,
        options: &StreamOptions,
    ) -> EngineResult<Self> {
        Self::from_plan_merged(reader, plan, order, ProbeMerge::Union, options)
    }

    pub fn from_plan_merged(
        reader: &'a dyn DocumentReader,
        plan: &IndexPlan,
        order: Order,
        merge: ProbeMerge,
        options: &StreamOptions,
    ) -> EngineResult<Self> {
        let mut probes = Self::probes(reader, plan, order, options);
        let base = match probes.len() {
            0 => Stream::empty(order, plan.index_fields.clone(), options),
            1 => probes.remove(0),
            _ => {
                let nodes: Vec<Box<dyn Pipeline<Document> + 'a>> =
                    probes.into_iter().map(|s| s.node).collect();
                let key = match merge {
                    ProbeMerge::Union => MergeKey::Position(plan.index_fields.clone()),
                    ProbeMerge::InterleaveBy(fields) => MergeKey::Fields(fields),
                };
                Stream::from_node(Box::new(MergeNode::new(nodes, key)), options.row_read_limit)
            }
        };

        match plan.post_filter() {
            Some(expression) => {
                let filter = CompiledFilter::compile(&expression)?;
                Ok(base.filter_with(move |doc| filter.matches(doc)))
            }
            None => Ok(base),
        }
    }
}
