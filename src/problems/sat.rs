//! Plain SAT: is there any satisfying assignment at all.

use crate::cnf::Clause;
use crate::db::sql::ColumnDef;
use crate::db::Gateway;
use crate::dp::problem::ProblemVariant;
use crate::error::Result;
use crate::treedecomp::{Node, TreeDecomp};

pub struct Sat {
    pub num_vars: u32,
    pub num_clauses: u32,
    pub clauses: Vec<Clause>,
}

impl ProblemVariant for Sat {
    fn type_name(&self) -> &'static str {
        "sat"
    }

    fn filter_where(&self, node: &Node) -> Option<String> {
        super::clause_filter(&self.clauses, &node.vertices)
    }

    fn setup_extra(&self, db: &mut Gateway, problem_id: i32) -> Result<()> {
        db.ignore_next_praefix(1);
        db.create_table(
            "problem_sat",
            &[
                ColumnDef::new("id", "INTEGER NOT NULL PRIMARY KEY REFERENCES problem(id)"),
                ColumnDef::new("num_vars", "INTEGER NOT NULL"),
                ColumnDef::new("num_clauses", "INTEGER NOT NULL"),
                ColumnDef::new("is_sat", "BOOLEAN"),
            ],
        )?;
        db.ignore_next_praefix(1);
        db.execute(
            "INSERT INTO \"problem_sat\" (\"id\",\"num_vars\",\"num_clauses\") VALUES ($1,$2,$3)",
            &[&problem_id, &(self.num_vars as i32), &(self.num_clauses as i32)],
        )?;
        Ok(())
    }

    fn after_solve(&self, db: &mut Gateway, problem_id: i32, td: &TreeDecomp) -> Result<()> {
        let root_tab = crate::db::sql::td_node_table(td.root);
        let is_sat_expr = db.replace_dynamic_tabs(&format!("(SELECT EXISTS(SELECT 1 FROM {root_tab}))"), &[root_tab]);
        db.ignore_next_praefix(1);
        db.execute(
            &crate::db::sql::update("problem_sat", &[("is_sat", &is_sat_expr)], Some("id = $1"), None),
            &[&problem_id],
        )?;
        Ok(())
    }
}
