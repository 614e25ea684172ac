//! Concrete DP problem variants: SAT, #SAT (`sharpsat`), projected model
//! counting (`pmc`), nested projected model counting (`nest_pmc`), and
//! (behind a feature flag) VertexCover.

pub mod nest_pmc;
pub mod pmc;
pub mod sat;
pub mod sharpsat;
#[cfg(feature = "vertex-cover")]
pub mod vertex_cover;

pub use crate::dp::problem::ProblemVariant;

use std::collections::BTreeSet;

use crate::cnf::{var_of, Clause, VarId};

fn lit2expr(lit: i64) -> String {
    if lit > 0 {
        format!("v{lit}")
    } else {
        format!("NOT v{}", -lit)
    }
}

/// `WHERE` clause over clauses whose variables all lie in `bag` — the
/// shared predicate every SAT-derived variant filters candidate rows on.
pub(crate) fn clause_filter(clauses: &[Clause], bag: &[VarId]) -> Option<String> {
    let bag_set: BTreeSet<VarId> = bag.iter().copied().collect();
    let relevant: Vec<&Clause> = clauses
        .iter()
        .filter(|c| c.iter().all(|&l| bag_set.contains(&var_of(l))))
        .collect();
    if relevant.is_empty() {
        return None;
    }
    let parts: Vec<String> = relevant
        .iter()
        .map(|c| {
            let lits: Vec<String> = c.iter().map(|&l| lit2expr(l)).collect();
            format!("({})", lits.join(" OR "))
        })
        .collect();
    Some(parts.join(" AND "))
}

/// A candidate row's running model-count expression: the product of each
/// freshly introduced vertex's trivial factor (1) and each child's
/// already-aggregated `model_count`.
pub(crate) fn model_count_product(node: &crate::treedecomp::Node, td: &crate::treedecomp::TreeDecomp) -> String {
    let mut factors: Vec<String> = Vec::new();
    for &v in &node.vertices {
        if td.needs_introduce(node, v) {
            factors.push("1".to_string());
        }
    }
    for &c in &node.children {
        factors.push(format!("t{c}.model_count"));
    }
    if factors.is_empty() {
        "1".to_string()
    } else {
        factors.join(" * ")
    }
}
