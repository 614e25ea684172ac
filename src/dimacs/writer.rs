//! DIMACS-family writers: CNF (with optional projection directive), GR, TD.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::cnf::Clause;

pub fn write_cnf(num_vars: u32, clauses: &[Clause], proj_vars: Option<&[u32]>) -> String {
    let mut out = String::new();
    writeln!(out, "p cnf {} {}", num_vars, clauses.len()).unwrap();
    if let Some(proj) = proj_vars {
        let vars: Vec<String> = proj.iter().map(u32::to_string).collect();
        writeln!(out, "c ind {} 0", vars.join(" ")).unwrap();
    }
    for clause in clauses {
        let lits: Vec<String> = clause.iter().map(i64::to_string).collect();
        writeln!(out, "{} 0", lits.join(" ")).unwrap();
    }
    out
}

pub fn write_gr(num_vertices: u32, edges: &[(u32, u32)]) -> String {
    let mut out = String::new();
    writeln!(out, "p tw {} {}", num_vertices, edges.len()).unwrap();
    for &(a, b) in edges {
        writeln!(out, "{a} {b}").unwrap();
    }
    out
}

pub fn write_td(
    num_bags: u32,
    tree_width: u32,
    num_orig_vertices: u32,
    root: u32,
    bags: &BTreeMap<u32, Vec<u32>>,
    edges: &[(u32, u32)],
) -> String {
    let mut out = String::new();
    writeln!(out, "s td {} {} {}", num_bags, tree_width + 1, num_orig_vertices).unwrap();
    writeln!(out, "c r {root}").unwrap();
    for (id, vertices) in bags {
        let vs: Vec<String> = vertices.iter().map(u32::to_string).collect();
        writeln!(out, "b {} {}", id, vs.join(" ")).unwrap();
    }
    for &(a, b) in edges {
        writeln!(out, "{a} {b}").unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_cnf_with_projection() {
        let clauses = vec![vec![1, -2], vec![2, 3]];
        let out = write_cnf(3, &clauses, Some(&[1, 2]));
        assert!(out.starts_with("p cnf 3 2\n"));
        assert!(out.contains("c ind 1 2 0\n"));
        assert!(out.contains("1 -2 0\n"));
    }

    #[test]
    fn writes_gr_graph() {
        let out = write_gr(3, &[(1, 2), (2, 3)]);
        assert_eq!(out, "p tw 3 2\n1 2\n2 3\n");
    }

    #[test]
    fn writes_td_with_root_marker() {
        let mut bags = BTreeMap::new();
        bags.insert(1, vec![1, 2]);
        let out = write_td(1, 1, 2, 1, &bags, &[]);
        assert!(out.starts_with("s td 1 2 2\n"));
        assert!(out.contains("c r 1\n"));
        assert!(out.contains("b 1 1 2\n"));
    }
}
