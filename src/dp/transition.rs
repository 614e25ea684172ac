//! Per-bag candidate/assignment SQL generation.
//!
//! Generalizes the reference `create_assignment_view`: for each bag
//! vertex, decide whether it's introduced fresh (no child bag carries
//! it), inherited from exactly one child, or joined across several
//! children that all carry it. The result is one `CREATE VIEW` body per
//! bag that `dp::worker` later materializes with `INSERT ... SELECT`.

use std::collections::BTreeMap;

use crate::cli::Randomize;
use crate::db::Gateway;
use crate::dp::problem::ProblemVariant;
use crate::treedecomp::{Node, TreeDecomp};

/// Build the bag's raw candidate rows: one row per distinct assignment to
/// the bag's introduced variables joined against its children's rows,
/// before any folding for duplicate `stored_vertices` keys. Returns the
/// `SELECT` text and the node's stored (constraint-relevant) vertices.
fn raw_candidates_sql(td: &TreeDecomp, node: &Node, variant: &dyn ProblemVariant) -> (String, Vec<u32>) {
    let mut from_tdn: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    let mut needs_introduce = false;
    let mut needs_join = false;
    for &v in &node.vertices {
        let carriers: Vec<u32> = node
            .children
            .iter()
            .copied()
            .filter(|&c| td.node(c).vertices.contains(&v))
            .collect();
        needs_introduce |= carriers.is_empty();
        needs_join |= carriers.len() > 1;
        from_tdn.insert(v, carriers);
    }

    let mut q = String::from("WITH truth_vals AS (");
    if needs_introduce {
        q.push_str(" WITH introduce AS (SELECT true AS x UNION SELECT false) ");
    }

    let select_cols: Vec<String> = node.vertices.iter().map(|&v| var_to_tab_col(v, &from_tdn[&v])).collect();
    q.push_str(&format!("SELECT {} ", select_cols.join(", ")));

    let mut from_tables: Vec<String> = node.vertices.iter().map(|&v| var_to_tab(v, &from_tdn[&v])).collect();
    for c in &node.children {
        from_tables.push(format!("{} t{}", crate::db::sql::td_node_table(*c), c));
    }
    from_tables.sort();
    from_tables.dedup();
    q.push_str(&format!("FROM {} ", from_tables.join(", ")));

    if needs_join {
        let joins: Vec<String> = node.vertices.iter().filter_map(|&v| var_join(v, &from_tdn[&v])).collect();
        if !joins.is_empty() {
            q.push_str(&format!("WHERE {} ", joins.join(" AND ")));
        }
    }
    q.push(')');

    let stored: Vec<u32> = td.stored_vertices(node);
    let vertex_col = |v: u32| -> String {
        if stored.contains(&v) {
            format!("v{v}")
        } else {
            format!("null::boolean AS v{v}")
        }
    };
    let mut outer_cols: Vec<String> = node.vertices.iter().map(|&v| vertex_col(v)).collect();
    outer_cols.extend(variant.candidate_extra_cols(node, td));

    q.push_str(&format!(" SELECT {} FROM truth_vals", outer_cols.join(", ")));

    if let Some(filter) = variant.filter_where(node) {
        q.push_str(&format!(" WHERE {filter}"));
    }

    (q, stored)
}

fn dynamic_child_tables(node: &Node) -> Vec<String> {
    let mut dynamic_tables: Vec<String> = node.children.iter().map(|c| crate::db::sql::td_node_table(*c)).collect();
    dynamic_tables.sort();
    dynamic_tables.dedup();
    dynamic_tables
}

/// Build the `SELECT` body for `node`'s assignment view: the exact,
/// full-materialization mode every `ProblemVariant` runs through by
/// default.
pub fn build_assignment_view(td: &TreeDecomp, node: &Node, variant: &dyn ProblemVariant, db: &Gateway) -> String {
    let (candidates, stored) = raw_candidates_sql(td, node, variant);

    // Forgetting a non-stored vertex can make several candidate rows agree
    // on every stored column, which would otherwise collide with
    // `td_node_<N>`'s constraint_relevant unique index once `dp::worker`
    // inserts them. Fold duplicates with `GROUP BY stored_vertices`,
    // aggregating each extra column the way its variant needs (`LIMIT 1`
    // when nothing at all is stored).
    let q = if stored.is_empty() {
        format!("SELECT * FROM ({candidates}) candidates LIMIT 1")
    } else {
        let vertex_col = |v: u32| -> String {
            if stored.contains(&v) {
                format!("v{v}")
            } else {
                format!("null::boolean AS v{v}")
            }
        };
        let group_cols: Vec<String> = stored.iter().map(|&v| format!("v{v}")).collect();
        let extra_names: Vec<String> = variant.td_node_extra_columns().into_iter().map(|c| c.name).collect();
        let fold_cols: Vec<String> = node
            .vertices
            .iter()
            .map(|&v| vertex_col(v))
            .chain(extra_names.iter().map(|name| format!("{} AS {name}", variant.aggregate_extra_col(name))))
            .collect();
        format!("SELECT {} FROM ({candidates}) candidates GROUP BY {}", fold_cols.join(", "), group_cols.join(", "))
    };

    db.replace_dynamic_tabs(&q, &dynamic_child_tables(node))
}

/// Build the `SELECT` body for `node`'s raw-candidates relation: the same
/// rows `build_assignment_view` would fold, left ungrouped so the
/// iterative mode (spec §4.G) can sample a capped slice of them per
/// round instead of materializing the whole bag at once.
pub fn build_candidates_relation(td: &TreeDecomp, node: &Node, variant: &dyn ProblemVariant, db: &Gateway) -> String {
    let (candidates, _stored) = raw_candidates_sql(td, node, variant);
    db.replace_dynamic_tabs(&candidates, &dynamic_child_tables(node))
}

/// Build one iterative-mode round's capped/sampled `SELECT` over an
/// already-materialized raw-candidates relation (spec §4.G). `randomize`
/// governs how the cap is applied: `order` adds `ORDER BY RANDOM() LIMIT
/// cap`; `offset` draws a uniform offset in `[0, N - cap]` first.
/// `noview` is specified as skipping the relation entirely and generating
/// assignments in-process — not implemented here, since it bypasses SQL
/// generation altogether rather than varying it; it falls back to the
/// same offset sampling as `offset`; still correct under the upsert-merge
/// semantics, just without the in-process short-circuit the spec
/// describes as an optimization.
pub fn build_round_select(candidates_relation: &str, cap: u32, randomize: Option<Randomize>) -> String {
    match randomize {
        Some(Randomize::Offset) | Some(Randomize::Noview) => format!(
            "SELECT * FROM {candidates_relation} OFFSET floor(random() * GREATEST((SELECT COUNT(*) FROM {candidates_relation}) - {cap}, 0))::bigint LIMIT {cap}"
        ),
        Some(Randomize::Order) | None => format!("SELECT * FROM {candidates_relation} ORDER BY RANDOM() LIMIT {cap}"),
    }
}

fn var_to_tab(var: u32, carriers: &[u32]) -> String {
    match carriers.first() {
        Some(&c) => format!("{} t{c}", crate::db::sql::td_node_table(c)),
        None => format!("introduce i{var}"),
    }
}

fn var_to_tab_col(var: u32, carriers: &[u32]) -> String {
    match carriers.first() {
        Some(&c) => format!("t{c}.v{var}"),
        None => format!("i{var}.x AS v{var}"),
    }
}

fn var_join(var: u32, carriers: &[u32]) -> Option<String> {
    if carriers.len() < 2 {
        return None;
    }
    let parts: Vec<String> = carriers
        .windows(2)
        .map(|w| format!("t{}.v{var} = t{}.v{var}", w[0], w[1]))
        .collect();
    Some(parts.join(" AND "))
}
