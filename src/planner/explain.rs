//! `explain()` output
//!
//! A plan is either what the compiler would run or the planning error that
//! stops it. Rendering is stable for identical inputs so explain output can
//! be diffed and asserted on.

use std::fmt;

use serde::Serialize;

use super::errors::PlanningError;
use super::plan::{IndexFilter, IndexPlan, PlanStrategy};

/// What a where clause would compile to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ExplainPlan {
    #[serde(rename_all = "camelCase")]
    Planned {
        table: String,
        index: String,
        strategy: PlanStrategy,
        /// Bounds of a single scan
        bounds: Vec<String>,
        /// Bounds of each probe of a multi-probe plan
        probes: Vec<Vec<String>>,
        post_filters: Vec<String>,
    },
    Rejected {
        code: &'static str,
        reason: String,
    },
}

impl ExplainPlan {
    pub fn from_plan(plan: &IndexPlan) -> Self {
        ExplainPlan::Planned {
            table: plan.table.clone(),
            index: plan.selected_index.clone(),
            strategy: plan.strategy,
            bounds: describe(&plan.index_filters),
            probes: plan.probe_filters.iter().map(|probe| describe(probe)).collect(),
            post_filters: plan.post_filters.iter().map(|f| f.describe()).collect(),
        }
    }

    pub fn from_error(err: &PlanningError) -> Self {
        ExplainPlan::Rejected {
            code: err.code(),
            reason: err.to_string(),
        }
    }

    pub fn is_planned(&self) -> bool {
        matches!(self, ExplainPlan::Planned { .. })
    }

    /// Index the plan reads, if it compiled
    pub fn index(&self) -> Option<&str> {
        match self {
            ExplainPlan::Planned { index, .. } => Some(index),
            ExplainPlan::Rejected { .. } => None,
        }
    }

    pub fn strategy(&self) -> Option<PlanStrategy> {
        match self {
            ExplainPlan::Planned { strategy, .. } => Some(*strategy),
            ExplainPlan::Rejected { .. } => None,
        }
    }
}

fn describe(filters: &[IndexFilter]) -> Vec<String> {
    filters.iter().map(ToString::to_string).collect()
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExplainPlan::Planned {
                table,
                index,
                strategy,
                bounds,
                probes,
                post_filters,
            } => {
                writeln!(f, "{} via {} ({})", table, index, strategy)?;
                if !bounds.is_empty() {
                    writeln!(f, "  bounds: {}", bounds.join(" AND "))?;
                }
                for (n, probe) in probes.iter().enumerate() {
                    writeln!(f, "  probe #{}: {}", n + 1, probe.join(" AND "))?;
                }
                for filter in post_filters {
                    writeln!(f, "  post-filter: {}", filter)?;
                }
                Ok(())
            }
            ExplainPlan::Rejected { code, reason } => writeln!(f, "rejected [{}]: {}", code, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::builder::{and, ends_with, eq, in_array};
    use crate::planner::WhereClauseCompiler;
    use crate::schema::TableBuilder;
    use serde_json::json;

    #[test]
    fn test_planned_output() {
        let table = TableBuilder::new("users").index("by_email", ["email"]).build().unwrap();
        let expr = and(vec![eq("email", json!("a@b.c")), ends_with("name", "son")]);
        let plan = WhereClauseCompiler::new(&table).compile(Some(&expr)).unwrap();
        let explain = ExplainPlan::from_plan(&plan);

        assert!(explain.is_planned());
        assert_eq!(explain.index(), Some("by_email"));
        assert_eq!(explain.strategy(), Some(PlanStrategy::SingleIndex));

        let output = explain.to_string();
        assert!(output.starts_with("users via by_email (singleIndex)"));
        assert!(output.contains("bounds: eq(email, \"a@b.c\")"));
        assert!(output.contains("post-filter: endsWith(name"));
    }

    #[test]
    fn test_probes_listed_in_order() {
        let table = TableBuilder::new("users").index("by_role", ["role"]).build().unwrap();
        let expr = in_array("role", vec![json!("admin"), json!("owner")]);
        let plan = WhereClauseCompiler::new(&table).compile(Some(&expr)).unwrap();
        let output = ExplainPlan::from_plan(&plan).to_string();
        assert!(output.contains("probe #1: eq(role, \"admin\")"));
        assert!(output.contains("probe #2: eq(role, \"owner\")"));
    }

    #[test]
    fn test_rejected_output() {
        let err = PlanningError::UnknownIndex {
            table: "users".into(),
            index: "by_x".into(),
        };
        let explain = ExplainPlan::from_error(&err);

        assert!(!explain.is_planned());
        assert_eq!(explain.index(), None);
        assert!(explain.to_string().starts_with("rejected [ORM_UNKNOWN_INDEX]"));

        let wire = serde_json::to_value(&explain).unwrap();
        assert_eq!(wire["status"], json!("rejected"));
        assert_eq!(wire["code"], json!("ORM_UNKNOWN_INDEX"));
    }
}
