//! Nested projected model counting: bags whose inner (non-bag) vertex
//! count exceeds a threshold get their residual subproblem solved by a
//! recursive call instead of being expanded inline, grounded on
//! `dpdb.problems.nestpmc.NestPmc` and the dispatch loop in
//! `nesthdb.solve`.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cnf::{Clause, VarId};
use crate::db::sql::ColumnDef;
use crate::db::Gateway;
use crate::dp::problem::ProblemVariant;
use crate::error::Result;
use crate::treedecomp::{Node, TreeDecomp};

/// The recursive dispatch a bag's residual subproblem is handed off to
/// once it exceeds `inner_vars_threshold`. Implemented by
/// `nested::solver`, kept as a trait here so this module doesn't need to
/// know about the recursion/caching machinery.
pub trait NestedSolve: Send + Sync {
    fn solve(
        &self,
        vars: &[VarId],
        clauses: &[Clause],
        non_nested: &BTreeSet<VarId>,
        projected: &BTreeSet<VarId>,
        depth: u32,
    ) -> Result<i128>;
}

pub struct NestPmc {
    pub num_vars: u32,
    pub num_clauses: u32,
    pub clauses: Vec<Clause>,
    pub projected: BTreeSet<VarId>,
    pub non_nested: BTreeSet<VarId>,
    /// Bags whose `all_vertices \ vertices` exceeds this size get their
    /// residual subproblem dispatched to `recursive` instead of counted
    /// inline.
    pub inner_vars_threshold: usize,
    pub depth: u32,
    pub recursive: Option<Arc<dyn NestedSolve>>,
}

impl ProblemVariant for NestPmc {
    fn type_name(&self) -> &'static str {
        "nest_pmc"
    }

    fn td_node_extra_columns(&self) -> Vec<ColumnDef> {
        vec![ColumnDef::new("model_count", "NUMERIC")]
    }

    fn candidate_extra_cols(&self, node: &Node, td: &TreeDecomp) -> Vec<String> {
        vec![format!("({})::numeric AS model_count", super::model_count_product(node, td))]
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

        db.create_table(
            "projected_vars",
            &[
                ColumnDef::new("id", "INTEGER NOT NULL REFERENCES problem(id)"),
                ColumnDef::new("var", "INTEGER NOT NULL"),
            ],
        )?;
        for &p in &self.projected {
            db.execute(
                "INSERT INTO \"projected_vars\" (\"id\",\"var\") VALUES ($1,$2)",
                &[&problem_id, &(p as i32)],
            )?;
        }
        Ok(())
    }

    fn after_solve_node(&self, db: &mut Gateway, node_id: u32, vertices: &[VarId], all_vertices: &[VarId]) -> Result<()> {
        let Some(recursive) = &self.recursive else {
            return Ok(());
        };
        if all_vertices.len().saturating_sub(vertices.len()) <= self.inner_vars_threshold {
            return Ok(());
        }

        let table = crate::db::sql::td_node_table(node_id);
        let cols: Vec<String> = vertices.iter().map(|v| format!("v{v}")).collect();
        let select = db.replace_dynamic_tabs(&format!("SELECT {} FROM {table}", cols.join(", ")), &[table.clone()]);
        let rows = db.query(&select, &[])?;

        let all_set: BTreeSet<VarId> = all_vertices.iter().copied().collect();
        let local_set: BTreeSet<VarId> = vertices.iter().copied().collect();
        let covered = covered_clauses(&self.clauses, &all_set);
        let projected: BTreeSet<VarId> = self.projected.intersection(&all_set).copied().collect::<BTreeSet<_>>().difference(&local_set).copied().collect();
        let non_nested: BTreeSet<VarId> = self.non_nested.intersection(&all_set).copied().collect::<BTreeSet<_>>().difference(&local_set).copied().collect();

        for row in rows {
            let mut clauses = covered.clone();
            let mut where_parts: Vec<String> = Vec::new();
            for (i, &v) in vertices.iter().enumerate() {
                let val: Option<bool> = row.get(i);
                if let Some(b) = val {
                    where_parts.push(format!("v{v} = {b}"));
                    clauses.push(vec![if b { v as i64 } else { -(v as i64) }]);
                }
            }
            let count = recursive.solve(all_vertices, &clauses, &non_nested, &projected, self.depth + 1)?;
            let update_sql = db.replace_dynamic_tabs(
                &format!(
                    "UPDATE {table} SET model_count = model_count * {count}::numeric WHERE {}",
                    where_parts.join(" AND ")
                ),
                &[table.clone()],
            );
            db.execute(&update_sql, &[])?;
        }
        Ok(())
    }

    fn after_solve(&self, db: &mut Gateway, problem_id: i32, td: &TreeDecomp) -> Result<()> {
        let root_tab = crate::db::sql::td_node_table(td.root);
        let sum_expr = db.replace_dynamic_tabs(
            &format!("(SELECT COALESCE(SUM(model_count), 0) FROM {root_tab})"),
            &[root_tab],
        );
        db.ignore_next_praefix(1);
        db.execute(
            &crate::db::sql::update("problem_pmc", &[("model_count", &sum_expr)], Some("id = $1"), None),
            &[&problem_id],
        )?;
        Ok(())
    }
}

/// Clauses whose variables all lie in `scope` — the portion of the
/// formula a bag's recursive subproblem needs to see.
fn covered_clauses(clauses: &[Clause], scope: &BTreeSet<VarId>) -> Vec<Clause> {
    clauses
        .iter()
        .filter(|c| c.iter().all(|&l| scope.contains(&crate::cnf::var_of(l))))
        .cloned()
        .collect()
}
