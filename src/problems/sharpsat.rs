//! #SAT: count every satisfying assignment (no projection).

use crate::cnf::Clause;
use crate::db::sql::ColumnDef;
use crate::db::Gateway;
use crate::dp::problem::ProblemVariant;
use crate::error::Result;
use crate::treedecomp::{Node, TreeDecomp};

pub struct SharpSat {
    pub num_vars: u32,
    pub num_clauses: u32,
    pub clauses: Vec<Clause>,
}

impl ProblemVariant for SharpSat {
    fn type_name(&self) -> &'static str {
        "sharpsat"
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
            "problem_sharpsat",
            &[
                ColumnDef::new("id", "INTEGER NOT NULL PRIMARY KEY REFERENCES problem(id)"),
                ColumnDef::new("num_vars", "INTEGER NOT NULL"),
                ColumnDef::new("num_clauses", "INTEGER NOT NULL"),
                ColumnDef::new("model_count", "NUMERIC"),
            ],
        )?;
        db.ignore_next_praefix(1);
        db.execute(
            "INSERT INTO \"problem_sharpsat\" (\"id\",\"num_vars\",\"num_clauses\") VALUES ($1,$2,$3)",
            &[&problem_id, &(self.num_vars as i32), &(self.num_clauses as i32)],
        )?;
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
            &crate::db::sql::update("problem_sharpsat", &[("model_count", &sum_expr)], Some("id = $1"), None),
            &[&problem_id],
        )?;
        Ok(())
    }
}
