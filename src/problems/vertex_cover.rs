//! VertexCover as a DP problem variant: `v{var} = true` means the vertex
//! is in the cover. Demonstrates the `ProblemVariant` trait doesn't only
//! fit SAT-shaped problems, grounded on spec.md §4.G's worked formula for
//! `size`.

use std::collections::BTreeSet;

use crate::cnf::VarId;
use crate::db::sql::ColumnDef;
use crate::db::Gateway;
use crate::dp::problem::ProblemVariant;
use crate::error::Result;
use crate::treedecomp::{Node, TreeDecomp};

pub struct VertexCover {
    pub num_vertices: u32,
    pub edges: Vec<(VarId, VarId)>,
}

impl ProblemVariant for VertexCover {
    fn type_name(&self) -> &'static str {
        "vertex_cover"
    }

    fn td_node_extra_columns(&self) -> Vec<ColumnDef> {
        vec![ColumnDef::new("size", "INTEGER")]
    }

    fn candidate_extra_cols(&self, node: &Node, td: &TreeDecomp) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        for &v in &node.vertices {
            if td.needs_introduce(node, v) {
                terms.push(format!("(CASE WHEN v{v} THEN 1 ELSE 0 END)"));
            }
        }
        for &c in &node.children {
            terms.push(format!("t{c}.size"));
        }
        // A vertex carried by more than one child was counted once per
        // carrier; subtract the surplus copies when it's in the cover.
        for &v in &node.vertices {
            let carriers: Vec<u32> = node.children.iter().copied().filter(|&c| td.node(c).vertices.contains(&v)).collect();
            for &c in carriers.iter().skip(1) {
                terms.push(format!("(CASE WHEN t{c}.v{v} THEN -1 ELSE 0 END)"));
            }
        }
        if terms.is_empty() {
            vec!["0 AS size".to_string()]
        } else {
            vec![format!("({}) AS size", terms.join(" + "))]
        }
    }

    fn aggregate_extra_col(&self, column_name: &str) -> String {
        format!("MIN({column_name})")
    }

    fn filter_where(&self, node: &Node) -> Option<String> {
        let bag: BTreeSet<VarId> = node.vertices.iter().copied().collect();
        let parts: Vec<String> = self
            .edges
            .iter()
            .filter(|(a, b)| bag.contains(a) && bag.contains(b))
            .map(|(a, b)| format!("(v{a} OR v{b})"))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        }
    }

    fn setup_extra(&self, db: &mut Gateway, problem_id: i32) -> Result<()> {
        db.ignore_next_praefix(1);
        db.create_table(
            "problem_vertex_cover",
            &[
                ColumnDef::new("id", "INTEGER NOT NULL PRIMARY KEY REFERENCES problem(id)"),
                ColumnDef::new("num_vertices", "INTEGER NOT NULL"),
                ColumnDef::new("num_edges", "INTEGER NOT NULL"),
                ColumnDef::new("min_size", "INTEGER"),
            ],
        )?;
        db.ignore_next_praefix(1);
        db.execute(
            "INSERT INTO \"problem_vertex_cover\" (\"id\",\"num_vertices\",\"num_edges\") VALUES ($1,$2,$3)",
            &[&problem_id, &(self.num_vertices as i32), &(self.edges.len() as i32)],
        )?;
        Ok(())
    }

    fn after_solve(&self, db: &mut Gateway, problem_id: i32, td: &TreeDecomp) -> Result<()> {
        let root_tab = crate::db::sql::td_node_table(td.root);
        let min_expr = db.replace_dynamic_tabs(&format!("(SELECT MIN(size) FROM {root_tab})"), &[root_tab]);
        db.ignore_next_praefix(1);
        db.execute(
            &crate::db::sql::update("problem_vertex_cover", &[("min_size", &min_expr)], Some("id = $1"), None),
            &[&problem_id],
        )?;
        Ok(())
    }
}
