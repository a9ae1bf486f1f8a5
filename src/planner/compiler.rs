//! Where-clause compiler
//!
//! Turns a validated `FilterExpression` into an `IndexPlan` for one table.
//!
//! Each top-level conjunct is classified into an index atom when it can be
//! answered by an index walk:
//!
//! - `eq` / `isNull`: a single point
//! - `inArray` / OR of equalities on one field: a sorted point set
//! - `gt` / `gte` / `lt` / `lte` / `startsWith` / prefix `like`: a range
//! - `ne` / `isNotNull` / `notInArray`: complement intervals
//!
//! Every index is then walked field by field. Points extend the equality
//! prefix (sets multiply the probes); a range or complement ends the walk.
//! Unconsumed conjuncts become post-filters.
//!
//! Plan selection is deterministic: strategy first
//! (singleIndex > rangeIndex > multiProbe > none), then the number of bound
//! fields, then registration order.

use std::cmp::Reverse;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use super::errors::{PlanningError, PlanningResult};
use super::plan::{IndexFilter, IndexPlan, PlanStrategy};
use crate::filter::{like_prefix, Comparison, ComparisonOp, FilterExpression, LogicalOp};
use crate::index::{IndexKey, IndexRange, IndexRangeBuilder, RangeBound};
use crate::schema::{IndexDescriptor, TableSchema};

/// Upper bound on probes produced by combining several point sets
pub const MAX_PROBES: usize = 1024;

type Interval = (Option<RangeBound>, Option<RangeBound>);

#[derive(Debug, Clone, PartialEq)]
enum Atom {
    Points { keys: Vec<IndexKey>, set: bool },
    Range {
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    },
    Complement(Vec<Interval>),
}

impl Atom {
    /// Lower is preferred when several conjuncts constrain the same field
    fn rank(&self) -> u8 {
        match self {
            Atom::Points { set: false, .. } => 0,
            Atom::Points { set: true, .. } => 1,
            Atom::Range { .. } => 2,
            Atom::Complement(_) => 3,
        }
    }
}

#[derive(Debug)]
struct FieldAtom {
    atom: Atom,
    sources: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
struct ProbeSpec {
    eq: Vec<IndexKey>,
    lower: Option<RangeBound>,
    upper: Option<RangeBound>,
}

#[derive(Debug)]
struct Candidate {
    registration: usize,
    strategy: PlanStrategy,
    bound: usize,
    probes: Vec<ProbeSpec>,
    consumed: HashSet<usize>,
    /// Position of the first unbound field when the walk stopped on it
    gap: Option<usize>,
}

/// Compiles predicates against one table's indexes
#[derive(Debug, Clone, Copy)]
pub struct WhereClauseCompiler<'s> {
    table: &'s TableSchema,
}

impl<'s> WhereClauseCompiler<'s> {
    pub fn new(table: &'s TableSchema) -> Self {
        Self { table }
    }

    /// Picks the best index for `expression`.
    ///
    /// With no usable index the plan is a `none` strategy over the default
    /// scan index with every conjunct as a post-filter.
    pub fn compile(&self, expression: Option<&FilterExpression>) -> PlanningResult<IndexPlan> {
        let conjuncts = conjuncts_of(expression);
        let atoms = classify_all(&conjuncts);

        let best = self
            .table
            .indexes
            .iter()
            .enumerate()
            .map(|(registration, index)| walk(registration, index, &atoms))
            .filter(|c| c.bound > 0)
            .min_by_key(|c| (c.strategy, Reverse(c.bound), c.registration));

        let plan = match best {
            Some(candidate) => {
                let index = &self.table.indexes[candidate.registration];
                self.assemble(index, candidate, &conjuncts)?
            }
            None => {
                let index = self.scan_index()?;
                self.assemble(index, unbound(0), &conjuncts)?
            }
        };

        debug!(
            table = %self.table.name,
            strategy = plan.strategy.as_str(),
            index = %plan.selected_index,
            probes = plan.probe_count(),
            post_filters = plan.post_filters.len(),
            "compiled where clause"
        );
        Ok(plan)
    }

    /// Compiles against one named index.
    ///
    /// A predicate on an index field whose leading fields are not all bound
    /// by equality is rejected rather than downgraded to a post-filter.
    pub fn compile_with_index(
        &self,
        index_name: &str,
        expression: Option<&FilterExpression>,
    ) -> PlanningResult<IndexPlan> {
        let (registration, index) = self
            .table
            .indexes
            .iter()
            .enumerate()
            .find(|(_, i)| i.name == index_name)
            .ok_or_else(|| PlanningError::UnknownIndex {
                table: self.table.name.clone(),
                index: index_name.to_string(),
            })?;

        let conjuncts = conjuncts_of(expression);
        let atoms = classify_all(&conjuncts);
        let candidate = walk(registration, index, &atoms);

        if let Some(gap) = candidate.gap {
            let fields = index.effective_fields();
            if let Some(offset) = fields[gap + 1..].iter().position(|f| atoms.contains_key(f)) {
                let position = gap + 1 + offset;
                return Err(PlanningError::NonLeadingRange {
                    index: index.name.clone(),
                    field: fields[position].clone(),
                    missing: fields[gap..position].to_vec(),
                });
            }
        }

        let candidate = if candidate.bound == 0 {
            unbound(registration)
        } else {
            candidate
        };
        self.assemble(index, candidate, &conjuncts)
    }

    /// Plan that reads a whole index with no bounds
    pub fn full_scan(&self, index_name: Option<&str>) -> PlanningResult<IndexPlan> {
        match index_name {
            Some(name) => self.compile_with_index(name, None),
            None => self.compile(None),
        }
    }

    fn scan_index(&self) -> PlanningResult<&'s IndexDescriptor> {
        self.table
            .default_index()
            .or_else(|| self.table.indexes.first())
            .ok_or_else(|| PlanningError::UnknownIndex {
                table: self.table.name.clone(),
                index: crate::schema::BY_CREATION_TIME_INDEX.to_string(),
            })
    }

    fn assemble(
        &self,
        index: &IndexDescriptor,
        candidate: Candidate,
        conjuncts: &[&FilterExpression],
    ) -> PlanningResult<IndexPlan> {
        let fields = index.effective_fields();
        let ranges = candidate
            .probes
            .iter()
            .map(|probe| build_range(&fields, probe))
            .collect::<PlanningResult<Vec<IndexRange>>>()?;

        let post_filters = conjuncts
            .iter()
            .enumerate()
            .filter(|(i, _)| !candidate.consumed.contains(i))
            .map(|(_, c)| (*c).clone())
            .collect();

        let (index_filters, probe_filters) = if candidate.strategy == PlanStrategy::MultiProbe {
            let probes = ranges
                .iter()
                .map(|r| IndexFilter::from_range(&fields, r))
                .collect();
            (Vec::new(), probes)
        } else {
            let single = ranges
                .first()
                .map(|r| IndexFilter::from_range(&fields, r))
                .unwrap_or_default();
            (single, Vec::new())
        };

        Ok(IndexPlan {
            table: self.table.name.clone(),
            strategy: candidate.strategy,
            selected_index: index.name.clone(),
            index_fields: fields,
            index_filters,
            probe_filters,
            post_filters,
            ranges,
            bound_fields: candidate.bound,
        })
    }
}

fn conjuncts_of(expression: Option<&FilterExpression>) -> Vec<&FilterExpression> {
    expression.map(FilterExpression::conjuncts).unwrap_or_default()
}

fn unbound(registration: usize) -> Candidate {
    Candidate {
        registration,
        strategy: PlanStrategy::None,
        bound: 0,
        probes: vec![ProbeSpec::default()],
        consumed: HashSet::new(),
        gap: None,
    }
}

fn build_range(fields: &[String], probe: &ProbeSpec) -> PlanningResult<IndexRange> {
    let mut builder = IndexRangeBuilder::new(fields);
    for (field, key) in fields.iter().zip(&probe.eq) {
        builder = builder.eq_key(field, key.clone())?;
    }
    if probe.lower.is_some() || probe.upper.is_some() {
        let field = &fields[probe.eq.len()];
        if let Some(lower) = &probe.lower {
            builder = builder.lower(field, lower.clone())?;
        }
        if let Some(upper) = &probe.upper {
            builder = builder.upper(field, upper.clone())?;
        }
    }
    Ok(builder.build())
}

/// Walks one index's effective fields, consuming atoms in order
fn walk(registration: usize, index: &IndexDescriptor, atoms: &HashMap<String, FieldAtom>) -> Candidate {
    let fields = index.effective_fields();
    let mut probes = vec![ProbeSpec::default()];
    let mut consumed = HashSet::new();
    let mut bound = 0;
    let mut multi = false;
    let mut ranged = false;
    let mut gap = None;

    for (position, field) in fields.iter().enumerate() {
        let Some(entry) = atoms.get(field) else {
            gap = Some(position);
            break;
        };
        match &entry.atom {
            Atom::Points { keys, set } => {
                if probes.len() > 1 && probes.len() * keys.len() > MAX_PROBES {
                    break;
                }
                probes = probes
                    .iter()
                    .flat_map(|probe| {
                        keys.iter().map(move |key| {
                            let mut next = probe.clone();
                            next.eq.push(key.clone());
                            next
                        })
                    })
                    .collect();
                multi |= *set;
                consumed.extend(entry.sources.iter().copied());
                bound += 1;
            }
            Atom::Range { lower, upper } => {
                for probe in &mut probes {
                    probe.lower = lower.clone();
                    probe.upper = upper.clone();
                }
                ranged = true;
                consumed.extend(entry.sources.iter().copied());
                bound += 1;
                break;
            }
            Atom::Complement(intervals) => {
                if probes.len() * intervals.len() > MAX_PROBES {
                    break;
                }
                probes = probes
                    .iter()
                    .flat_map(|probe| {
                        intervals.iter().map(move |(lower, upper)| {
                            let mut next = probe.clone();
                            next.lower = lower.clone();
                            next.upper = upper.clone();
                            next
                        })
                    })
                    .collect();
                multi = true;
                consumed.extend(entry.sources.iter().copied());
                bound += 1;
                break;
            }
        }
    }

    let strategy = if multi {
        PlanStrategy::MultiProbe
    } else if ranged {
        PlanStrategy::RangeIndex
    } else {
        PlanStrategy::SingleIndex
    };

    Candidate {
        registration,
        strategy,
        bound,
        probes,
        consumed,
        gap,
    }
}

fn classify_all(conjuncts: &[&FilterExpression]) -> HashMap<String, FieldAtom> {
    let mut atoms: HashMap<String, FieldAtom> = HashMap::new();
    for (i, conjunct) in conjuncts.iter().enumerate() {
        let Some((field, atom)) = classify(conjunct) else {
            continue;
        };
        match atoms.entry(field) {
            Entry::Vacant(slot) => {
                slot.insert(FieldAtom {
                    atom,
                    sources: vec![i],
                });
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if let (
                    Atom::Range { lower, upper },
                    Atom::Range {
                        lower: new_lower,
                        upper: new_upper,
                    },
                ) = (&mut existing.atom, &atom)
                {
                    *lower = tighter_lower(lower.take(), new_lower.clone());
                    *upper = tighter_upper(upper.take(), new_upper.clone());
                    existing.sources.push(i);
                } else if atom.rank() < existing.atom.rank() {
                    *existing = FieldAtom {
                        atom,
                        sources: vec![i],
                    };
                }
            }
        }
    }
    atoms
}

fn classify(expression: &FilterExpression) -> Option<(String, Atom)> {
    match expression {
        FilterExpression::Comparison(c) => classify_comparison(c).map(|a| (c.field.clone(), a)),
        FilterExpression::Logical(l) if l.op == LogicalOp::Or => classify_or(&l.children),
        FilterExpression::Logical(_) => None,
    }
}

fn classify_comparison(c: &Comparison) -> Option<Atom> {
    let key = || IndexKey::from_json(&c.value);
    let non_null_lower = || Some(RangeBound::exclusive(IndexKey::Null));

    let atom = match c.op {
        ComparisonOp::Eq => Atom::Points {
            keys: vec![key()],
            set: false,
        },
        ComparisonOp::IsNull => Atom::Points {
            keys: vec![IndexKey::Null],
            set: false,
        },
        ComparisonOp::InArray => Atom::Points {
            keys: sorted_keys(c.value.as_array()?),
            set: true,
        },
        ComparisonOp::Gt => Atom::Range {
            lower: Some(RangeBound::exclusive(key())),
            upper: None,
        },
        // null never satisfies an ordering comparison
        ComparisonOp::Gte if c.value.is_null() => Atom::Range {
            lower: non_null_lower(),
            upper: None,
        },
        ComparisonOp::Gte => Atom::Range {
            lower: Some(RangeBound::inclusive(key())),
            upper: None,
        },
        ComparisonOp::Lt => Atom::Range {
            lower: non_null_lower(),
            upper: Some(RangeBound::exclusive(key())),
        },
        ComparisonOp::Lte => Atom::Range {
            lower: non_null_lower(),
            upper: Some(RangeBound::inclusive(key())),
        },
        ComparisonOp::StartsWith => prefix_range(c.value.as_str()?),
        ComparisonOp::Like => prefix_range(&like_prefix(c.value.as_str()?)?),
        ComparisonOp::Ne if c.value.is_null() => not_null(),
        ComparisonOp::Ne => {
            let k = key();
            Atom::Complement(vec![
                (non_null_lower(), Some(RangeBound::exclusive(k.clone()))),
                (Some(RangeBound::exclusive(k)), None),
            ])
        }
        ComparisonOp::IsNotNull => not_null(),
        ComparisonOp::NotInArray => not_in(sorted_keys(c.value.as_array()?)),
        ComparisonOp::EndsWith | ComparisonOp::Contains | ComparisonOp::Ilike => return None,
    };
    Some(atom)
}

/// OR of point comparisons on one field
fn classify_or(children: &[FilterExpression]) -> Option<(String, Atom)> {
    let mut field: Option<&str> = None;
    let mut keys = BTreeSet::new();
    for child in children {
        let c = child.as_comparison()?;
        if field.is_some_and(|f| f != c.field) {
            return None;
        }
        field = Some(&c.field);
        match c.op {
            ComparisonOp::Eq => {
                keys.insert(IndexKey::from_json(&c.value));
            }
            ComparisonOp::IsNull => {
                keys.insert(IndexKey::Null);
            }
            ComparisonOp::InArray => keys.extend(c.value.as_array()?.iter().map(IndexKey::from_json)),
            _ => return None,
        }
    }
    Some((
        field?.to_string(),
        Atom::Points {
            keys: keys.into_iter().collect(),
            set: true,
        },
    ))
}

fn sorted_keys(values: &[Value]) -> Vec<IndexKey> {
    values
        .iter()
        .map(IndexKey::from_json)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn prefix_range(prefix: &str) -> Atom {
    Atom::Range {
        lower: Some(RangeBound::inclusive(IndexKey::from_string(prefix))),
        upper: Some(RangeBound::exclusive(IndexKey::prefix_upper_bound(prefix))),
    }
}

/// Values strictly below null, then values strictly above it.
///
/// Missing fields index as null, so the first interval is always empty;
/// it is kept so both sides of null are probed.
fn not_null() -> Atom {
    Atom::Complement(vec![
        (None, Some(RangeBound::exclusive(IndexKey::Null))),
        (Some(RangeBound::exclusive(IndexKey::Null)), None),
    ])
}

/// Non-null intervals between sorted exclusions, empty ones dropped
fn not_in(excluded: Vec<IndexKey>) -> Atom {
    let mut intervals = Vec::with_capacity(excluded.len() + 1);
    let mut lower = RangeBound::exclusive(IndexKey::Null);
    for key in excluded {
        let upper = RangeBound::exclusive(key.clone());
        let interval = IndexRange {
            eq: Vec::new(),
            lower: Some(lower.clone()),
            upper: Some(upper.clone()),
        };
        if !interval.is_empty_interval() {
            intervals.push((Some(lower), Some(upper)));
        }
        lower = RangeBound::exclusive(key);
    }
    intervals.push((Some(lower), None));
    Atom::Complement(intervals)
}

fn tighter_lower(a: Option<RangeBound>, b: Option<RangeBound>) -> Option<RangeBound> {
    match (a, b) {
        (Some(a), Some(b)) => Some(match a.key.cmp(&b.key) {
            std::cmp::Ordering::Greater => a,
            std::cmp::Ordering::Less => b,
            std::cmp::Ordering::Equal => {
                if a.inclusive {
                    b
                } else {
                    a
                }
            }
        }),
        (a, b) => a.or(b),
    }
}

fn tighter_upper(a: Option<RangeBound>, b: Option<RangeBound>) -> Option<RangeBound> {
    match (a, b) {
        (Some(a), Some(b)) => Some(match a.key.cmp(&b.key) {
            std::cmp::Ordering::Less => a,
            std::cmp::Ordering::Greater => b,
            std::cmp::Ordering::Equal => {
                if a.inclusive {
                    b
                } else {
                    a
                }
            }
        }),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::builder::*;
    use crate::planner::BoundOp;
    use crate::schema::TableBuilder;
    use serde_json::json;

    fn posts() -> TableSchema {
        TableBuilder::new("posts")
            .index("by_status", ["status"])
            .index("by_author", ["authorId"])
            .index("by_author_again", ["authorId"])
            .index("by_status_age", ["status", "age"])
            .index("by_age", ["age"])
            .build()
            .unwrap()
    }

    fn compile(expr: FilterExpression) -> IndexPlan {
        let table = posts();
        WhereClauseCompiler::new(&table).compile(Some(&expr)).unwrap()
    }

    #[test]
    fn test_no_where_scans_creation_time() {
        let table = posts();
        let plan = WhereClauseCompiler::new(&table).compile(None).unwrap();
        assert_eq!(plan.strategy, PlanStrategy::None);
        assert_eq!(plan.selected_index, "by_creation_time");
        assert_eq!(plan.ranges, vec![IndexRange::full()]);
        assert!(plan.post_filters.is_empty());
    }

    #[test]
    fn test_eq_on_leading_field_is_single_index() {
        let plan = compile(eq("status", json!("draft")));
        assert_eq!(plan.strategy, PlanStrategy::SingleIndex);
        assert_eq!(plan.selected_index, "by_status");
        assert_eq!(plan.index_fields, vec!["status", "_creationTime"]);
        assert_eq!(plan.index_filters.len(), 1);
        assert!(plan.post_filters.is_empty());
    }

    #[test]
    fn test_tie_broken_by_registration_order() {
        let plan = compile(eq("authorId", json!("u1")));
        assert_eq!(plan.selected_index, "by_author");
    }

    #[test]
    fn test_compound_range() {
        let plan = compile(and(vec![gt("age", json!(18)), eq("status", json!("active"))]));
        // single index beats range index even with fewer bound fields
        assert_eq!(plan.strategy, PlanStrategy::SingleIndex);
        assert_eq!(plan.selected_index, "by_status");
        assert_eq!(plan.post_filters.len(), 1);

        let table = posts();
        let plan = WhereClauseCompiler::new(&table)
            .compile_with_index(
                "by_status_age",
                Some(&and(vec![gt("age", json!(18)), eq("status", json!("active"))])),
            )
            .unwrap();
        assert_eq!(plan.strategy, PlanStrategy::RangeIndex);
        assert_eq!(plan.bound_fields, 2);
        assert!(plan.post_filters.is_empty());
    }

    #[test]
    fn test_range_bounds_merge() {
        let plan = compile(and(vec![gte("age", json!(18)), lt("age", json!(65)), gt("age", json!(20))]));
        assert_eq!(plan.strategy, PlanStrategy::RangeIndex);
        assert_eq!(plan.selected_index, "by_age");
        let range = &plan.ranges[0];
        assert_eq!(range.lower, Some(RangeBound::exclusive(IndexKey::from_f64(20.0))));
        assert_eq!(range.upper, Some(RangeBound::exclusive(IndexKey::from_f64(65.0))));
        assert!(plan.post_filters.is_empty());
    }

    #[test]
    fn test_in_array_probes_sorted_and_deduped() {
        let plan = compile(in_array("status", vec![json!("b"), json!("a"), json!("c"), json!("a")]));
        assert_eq!(plan.strategy, PlanStrategy::MultiProbe);
        assert_eq!(plan.probe_count(), 3);
        let first: Vec<IndexKey> = plan.ranges.iter().map(|r| r.eq[0].clone()).collect();
        assert_eq!(
            first,
            vec![
                IndexKey::from_string("a"),
                IndexKey::from_string("b"),
                IndexKey::from_string("c")
            ]
        );
        assert_eq!(plan.probe_filters.len(), 3);
    }

    #[test]
    fn test_or_of_eq_is_multi_probe() {
        let plan = compile(or(vec![eq("status", json!("a")), eq("status", json!("b"))]));
        assert_eq!(plan.strategy, PlanStrategy::MultiProbe);
        assert_eq!(plan.probe_count(), 2);

        let mixed = compile(or(vec![eq("status", json!("a")), eq("age", json!(3))]));
        assert_eq!(mixed.strategy, PlanStrategy::None);
        assert_eq!(mixed.post_filters.len(), 1);
    }

    #[test]
    fn test_complement_probe_counts() {
        assert_eq!(compile(ne("status", json!("a"))).probe_count(), 2);
        assert_eq!(compile(is_not_null("status")).probe_count(), 2);

        let plan = compile(not_in_array("age", vec![json!(5), json!(1)]));
        assert_eq!(plan.strategy, PlanStrategy::MultiProbe);
        assert_eq!(plan.probe_count(), 3);
        let ops: Vec<BoundOp> = plan.probe_filters[0].iter().map(|f| f.op).collect();
        assert_eq!(ops, vec![BoundOp::Gt, BoundOp::Lt]);

        let with_null = compile(not_in_array("age", vec![json!(null), json!(1)]));
        assert_eq!(with_null.probe_count(), 2);
    }

    #[test]
    fn test_is_not_null_lower_probe_is_below_null() {
        let plan = compile(is_not_null("status"));
        assert_eq!(plan.ranges[0].upper, Some(RangeBound::exclusive(IndexKey::Null)));
        assert_eq!(plan.ranges[0].lower, None);
        assert_eq!(plan.ranges[1].lower, Some(RangeBound::exclusive(IndexKey::Null)));
    }

    #[test]
    fn test_prefix_patterns_are_ranges() {
        let plan = compile(starts_with("status", "dr"));
        assert_eq!(plan.strategy, PlanStrategy::RangeIndex);
        assert_eq!(plan.ranges[0].upper, Some(RangeBound::exclusive(IndexKey::from_string("ds"))));

        let plan = compile(like("status", "dr%"));
        assert_eq!(plan.strategy, PlanStrategy::RangeIndex);

        let plan = compile(like("status", "%dr"));
        assert_eq!(plan.strategy, PlanStrategy::None);
    }

    #[test]
    fn test_unindexable_predicates_post_filter() {
        let plan = compile(ends_with("status", "ed"));
        assert_eq!(plan.strategy, PlanStrategy::None);
        assert_eq!(plan.post_filters.len(), 1);

        let plan = compile(and(vec![eq("status", json!("a")), contains("title", json!("x"))]));
        assert_eq!(plan.strategy, PlanStrategy::SingleIndex);
        assert_eq!(plan.post_filters.len(), 1);
    }

    #[test]
    fn test_with_index_rejects_non_leading_field() {
        let table = posts();
        let err = WhereClauseCompiler::new(&table)
            .compile_with_index("by_status_age", Some(&gt("age", json!(3))))
            .unwrap_err();
        assert_eq!(
            err,
            PlanningError::NonLeadingRange {
                index: "by_status_age".into(),
                field: "age".into(),
                missing: vec!["status".into()],
            }
        );
    }

    #[test]
    fn test_with_index_unknown() {
        let table = posts();
        let err = WhereClauseCompiler::new(&table)
            .compile_with_index("by_nothing", None)
            .unwrap_err();
        assert!(matches!(err, PlanningError::UnknownIndex { .. }));
    }

    #[test]
    fn test_with_index_and_no_where_is_full_index_scan() {
        let table = posts();
        let plan = WhereClauseCompiler::new(&table).full_scan(Some("by_status")).unwrap();
        assert_eq!(plan.strategy, PlanStrategy::None);
        assert_eq!(plan.selected_index, "by_status");
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let expr = and(vec![in_array("status", vec![json!("x"), json!("y")]), gt("age", json!(1))]);
        assert_eq!(compile(expr.clone()), compile(expr));
    }

    #[test]
    fn test_creation_time_suffix_is_bindable() {
        let plan = compile(and(vec![eq("status", json!("a")), gt("_creationTime", json!(100))]));
        assert_eq!(plan.strategy, PlanStrategy::SingleIndex);

        let table = posts();
        let plan = WhereClauseCompiler::new(&table)
            .compile_with_index(
                "by_status",
                Some(&and(vec![eq("status", json!("a")), gt("_creationTime", json!(100))])),
            )
            .unwrap();
        assert_eq!(plan.strategy, PlanStrategy::RangeIndex);
        assert_eq!(plan.bound_fields, 2);
    }
}
