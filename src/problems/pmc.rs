//! Projected model counting: count satisfying assignments up to
//! equivalence on a chosen subset of "projected" variables, grounded on
//! `dpdb.problems.pmc.Pmc`.

use std::collections::BTreeSet;

use crate::cnf::{Clause, VarId};
use crate::db::sql::ColumnDef;
use crate::db::Gateway;
use crate::dp::problem::ProblemVariant;
use crate::error::Result;
use crate::treedecomp::{Node, TreeDecomp};

pub struct Pmc {
    pub num_vars: u32,
    pub num_clauses: u32,
    pub clauses: Vec<Clause>,
    /// Variables every bag carries through to the root so the final
    /// count can group by projected assignment rather than summing raw
    /// model counts.
    pub projected: BTreeSet<VarId>,
}

impl ProblemVariant for Pmc {
    fn type_name(&self) -> &'static str {
        "pmc"
    }

    fn td_node_extra_columns(&self) -> Vec<ColumnDef> {
        vec![ColumnDef::new("model_count", "NUMERIC")]
    }

    fn candidate_extra_cols(&self, node: &Node, td: &TreeDecomp) -> Vec<String> {
        vec![format!("{} AS model_count", super::model_count_product(node, td))]
    }

    fn filter_where(&self, node: &Node) -> Option<String> {
        super::clause_filter(&self.clauses, &node.vertices)
    }

    fn setup_extra(&self, db: &mut Gateway, problem_id: i32) -> Result<()> {
        db.ignore_next_praefix(1);
        db.create_table(
            "problem_pmc",
            &[
                ColumnDef::new("id", "INTEGER NOT NULL PRIMARY KEY REFERENCES problem(id)"),
                ColumnDef::new("num_vars", "INTEGER NOT NULL"),
                ColumnDef::new("num_clauses", "INTEGER NOT NULL"),
                ColumnDef::new("model_count", "NUMERIC"),
            ],
        )?;
        db.ignore_next_praefix(1);
        db.execute(
            "INSERT INTO \"problem_pmc\" (\"id\",\"num_vars\",\"num_clauses\") VALUES ($1,$2,$3)",
            &[&problem_id, &(self.num_vars as i32), &(self.num_clauses as i32)],
        )?;
        Ok(())
    }

    fn after_solve(&self, db: &mut Gateway, problem_id: i32, td: &TreeDecomp) -> Result<()> {
        let root_tab = crate::db::sql::td_node_table(td.root);
        let projected_cols: Vec<String> = self.projected.iter().map(|p| format!("v{p}")).collect();
        let count_expr = if projected_cols.is_empty() {
            format!("(SELECT COUNT(*) FROM {root_tab})")
        } else {
            format!(
                "(SELECT COUNT(*) FROM (SELECT DISTINCT {} FROM {root_tab}) AS projected)",
                projected_cols.join(", ")
            )
        };
        let count_expr = db.replace_dynamic_tabs(&count_expr, &[root_tab]);
        db.ignore_next_praefix(1);
        db.execute(
            &crate::db::sql::update("problem_pmc", &[("model_count", &count_expr)], Some("id = $1"), None),
            &[&problem_id],
        )?;
        Ok(())
    }
}
