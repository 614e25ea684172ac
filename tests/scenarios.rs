//! End-to-end scenarios driven entirely in-memory: DIMACS reading, unit
//! propagation, primal/minor graph construction, and `ProblemVariant`
//! SQL-fragment generation. No live Postgres connection or external
//! solver binary is involved — those integrations are exercised by the
//! CLI binary, not this crate's own test suite.

use std::collections::BTreeMap;

use dpsolve::cnf::Cnf;
use dpsolve::config::DbConfig;
use dpsolve::db::sql;
use dpsolve::db::{Gateway, Pool};
use dpsolve::dimacs::read_cnf;
use dpsolve::dp::problem::ProblemVariant;
use dpsolve::dp::transition::build_assignment_view;
use dpsolve::graph::minor::build_minor_graph;
use dpsolve::graph::primal;
use dpsolve::problems::pmc::Pmc;
use dpsolve::problems::sat::Sat;
#[cfg(feature = "vertex-cover")]
use dpsolve::problems::vertex_cover::VertexCover;
use dpsolve::treedecomp::TreeDecomp;
use rustc_hash::{FxHashMap, FxHashSet};

fn cnf_from(text: &str) -> dpsolve::dimacs::ParsedCnf {
    read_cnf("<test>", text).expect("valid DIMACS CNF")
}

/// A `Gateway` that never opens a connection — `build_assignment_view`
/// only needs one for `replace_dynamic_tabs`'s praefix, never for a live
/// query, so the lazily-connecting pool from `gateway`'s own tests works
/// here too.
fn offline_gateway(praefix: &str) -> Gateway {
    let pool = Pool::new(&DbConfig {
        dsn: String::new(),
        max_connections: 1,
    })
    .expect("pool construction never connects eagerly");
    let mut db = Gateway::new(pool);
    db.set_praefix(praefix);
    db
}

#[test]
fn trivially_unsat_formula_short_circuits() {
    // x1 and its negation, each as a unit clause.
    let parsed = cnf_from("p cnf 1 2\n1 0\n-1 0\n");
    let mut cnf = Cnf::new(parsed.num_vars, parsed.num_clauses);
    cnf.clauses = parsed.clauses;
    cnf.simplify_units();
    assert!(!cnf.maybe_sat);
    assert!(cnf.clauses.is_empty());
}

#[test]
fn single_tautology_clause_is_satisfiable_with_no_constraints() {
    let parsed = cnf_from("p cnf 1 1\n1 -1 0\n");
    let mut cnf = Cnf::new(parsed.num_vars, parsed.num_clauses);
    cnf.clauses = parsed.clauses;
    cnf.simplify_units();
    assert!(cnf.maybe_sat);
    // a tautological clause has no unit literal, so it survives simplification untouched.
    assert_eq!(cnf.clauses.len(), 1);
}

#[test]
fn independent_variables_produce_a_disconnected_primal_graph() {
    // Two separate 2-clauses over disjoint variables share no edges.
    let parsed = cnf_from("p cnf 4 2\n1 2 0\n3 4 0\n");
    let graph = primal::build(parsed.num_vars, &parsed.clauses);
    let edges = graph.edge_list();
    assert_eq!(edges, vec![(1, 2), (3, 4)]);
}

#[test]
fn projection_directive_survives_unit_propagation_when_var_remains() {
    let parsed = cnf_from("p cnf 3 2\nc ind 1 2 0\n3 0\n1 2 0\n");
    let mut cnf = Cnf::new(parsed.num_vars, parsed.num_clauses);
    cnf.clauses = parsed.clauses;
    cnf.projected = parsed.projected;
    let dropped = cnf.simplify_units();
    assert!(dropped.is_empty());
    assert_eq!(cnf.projected, [1, 2].into_iter().collect());
}

#[test]
fn projected_var_resolved_only_by_a_unit_clause_is_dropped() {
    let parsed = cnf_from("p cnf 2 2\nc ind 1 2 0\n1 0\n2 0\n");
    let mut cnf = Cnf::new(parsed.num_vars, parsed.num_clauses);
    cnf.clauses = parsed.clauses;
    cnf.projected = parsed.projected;
    let dropped = cnf.simplify_units();
    assert_eq!(dropped, [1, 2].into_iter().collect());
    assert!(cnf.projected.is_empty());
}

#[test]
fn pmc_variant_groups_root_count_by_remaining_projected_columns() {
    let parsed = cnf_from("p cnf 2 1\nc ind 1 2 0\n1 2 0\n");
    let pmc = Pmc {
        num_vars: parsed.num_vars,
        num_clauses: parsed.num_clauses,
        clauses: parsed.clauses.clone(),
        projected: parsed.projected.clone(),
    };
    assert_eq!(pmc.type_name(), "pmc");

    let mut bags = BTreeMap::new();
    bags.insert(1u32, vec![1u32, 2u32]);
    let td = TreeDecomp::build(1, 1, 2, 1, &bags, &[]);
    let root = td.root_node();

    let filter = pmc.filter_where(root).expect("clause fully contained in root bag");
    assert!(filter.contains("v1"));
    assert!(filter.contains("v2"));

    let cols = pmc.candidate_extra_cols(root, &td);
    assert_eq!(cols.len(), 1);
    assert!(cols[0].contains("model_count"));
}

#[test]
fn assignment_view_folds_a_forgotten_vertex_across_a_parent_child_join() {
    // A genuine two-level decomposition: the leaf bag {1, 2} forgets
    // vertex 1 once it's joined into the root bag {2}, which forces two
    // candidate rows (v1=true and v1=false, both with v2=true) onto the
    // same `stored_vertices` key. Without `GROUP BY`, inserting both
    // would violate `td_node_2`'s `constraint_relevant` unique index on
    // `v2` alone; with it, they must fold into one row whose
    // `model_count` sums the two.
    let parsed = cnf_from("p cnf 2 1\nc ind 1 2 0\n1 2 0\n");
    let pmc = Pmc {
        num_vars: parsed.num_vars,
        num_clauses: parsed.num_clauses,
        clauses: parsed.clauses,
        projected: parsed.projected,
    };

    let mut bags = BTreeMap::new();
    bags.insert(1u32, vec![2u32]);
    bags.insert(2u32, vec![1u32, 2u32]);
    let td = TreeDecomp::build(2, 1, 2, 1, &bags, &[(1, 2)]);

    let leaf = td.node(2);
    assert_eq!(td.stored_vertices(leaf), vec![2], "vertex 1 isn't in the parent bag, so it's forgotten here");

    let db = offline_gateway("p1_");
    let leaf_view = build_assignment_view(&td, leaf, &pmc, &db);
    assert!(leaf_view.contains("GROUP BY v2"), "forgetting v1 must fold candidate rows by the stored v2 column");
    assert!(leaf_view.contains("SUM(model_count)"), "pmc's model_count must marginalize via SUM, not survive as duplicate rows");

    // The root bag stores everything it has (there's no parent to forget
    // anything against), so its own view needs no fold of its own vertex
    // column even though it still sums its child's model_count.
    let root = td.root_node();
    assert_eq!(td.stored_vertices(root), vec![2]);
    let root_view = build_assignment_view(&td, root, &pmc, &db);
    assert!(root_view.contains("model_count"));
}

#[test]
fn assignment_view_uses_limit_one_when_every_vertex_is_forgotten() {
    // A root whose only vertex doesn't survive into any parent (there is
    // none) keeps every vertex stored, so to exercise the fully-forgotten
    // path we need a child bag whose entire vertex set is absent from its
    // parent's bag.
    let parsed = cnf_from("p cnf 1 1\n1 0\n");
    let sat = Sat {
        num_vars: parsed.num_vars,
        num_clauses: parsed.num_clauses,
        clauses: parsed.clauses,
    };
    let mut bags = BTreeMap::new();
    bags.insert(1u32, Vec::new());
    bags.insert(2u32, vec![1u32]);
    let td = TreeDecomp::build(2, 0, 1, 1, &bags, &[(1, 2)]);

    let leaf = td.node(2);
    assert!(td.stored_vertices(leaf).is_empty());

    let db = offline_gateway("p1_");
    let leaf_view = build_assignment_view(&td, leaf, &sat, &db);
    assert!(leaf_view.contains("LIMIT 1"), "nothing is stored, so at most one candidate row can survive into the parent");
}

#[test]
fn sat_variant_filters_on_every_clause_contained_in_the_bag() {
    let parsed = cnf_from("p cnf 2 1\n1 -2 0\n");
    let sat = Sat {
        num_vars: parsed.num_vars,
        num_clauses: parsed.num_clauses,
        clauses: parsed.clauses,
    };
    let mut bags = BTreeMap::new();
    bags.insert(1u32, vec![1u32, 2u32]);
    let td = TreeDecomp::build(1, 1, 2, 1, &bags, &[]);
    let filter = sat.filter_where(td.root_node()).expect("clause fully contained in root bag");
    assert_eq!(filter, "(v1 OR NOT v2)");
}

#[test]
#[cfg(feature = "vertex-cover")]
fn vertex_cover_triangle_requires_every_edge_covered() {
    // A 3-cycle: every edge must have at least one endpoint in the cover.
    let vc = VertexCover {
        num_vertices: 3,
        edges: vec![(1, 2), (2, 3), (1, 3)],
    };
    let mut bags = BTreeMap::new();
    bags.insert(1u32, vec![1u32, 2u32, 3u32]);
    let td = TreeDecomp::build(1, 2, 3, 1, &bags, &[]);
    let root = td.root_node();

    let filter = vc.filter_where(root).expect("all three edges are contained in the single bag");
    assert!(filter.contains("(v1 OR v2)"));
    assert!(filter.contains("(v2 OR v3)"));
    assert!(filter.contains("(v1 OR v3)"));

    let cols = vc.candidate_extra_cols(root, &td);
    assert_eq!(cols.len(), 1);
    assert!(cols[0].contains("size"));
}

#[test]
fn minor_graph_contracts_interior_chain_into_an_endpoint_clique() {
    // A path 1-2-3-4-5, projecting out (contracting away) the interior
    // 2-3-4: the surviving endpoints 1 and 5 should end up cliqued.
    let edges: Vec<(u32, u32)> = vec![(1, 2), (2, 3), (3, 4), (4, 5)];
    let mut adj: FxHashMap<u32, FxHashSet<u32>> = FxHashMap::default();
    for &(a, b) in &edges {
        adj.entry(a).or_default().insert(b);
        adj.entry(b).or_default().insert(a);
    }
    let mut mg = build_minor_graph(5, adj, [2u32, 3u32, 4u32]);
    let normalized_edges = mg.normalized_edges();
    let orig_edges: FxHashSet<(u32, u32)> = normalized_edges
        .iter()
        .map(|&(a, b)| {
            let (x, y) = (mg.orig_node(a), mg.orig_node(b));
            if x < y {
                (x, y)
            } else {
                (y, x)
            }
        })
        .collect();
    assert!(orig_edges.contains(&(1, 5)));
    assert!(!orig_edges.iter().any(|&(a, b)| [2, 3, 4].contains(&a) || [2, 3, 4].contains(&b)));
}

#[test]
fn sql_builder_round_trips_a_bag_table_and_its_constraint_index() {
    let cols = vec![sql::ColumnDef::new("v1", "BOOLEAN"), sql::ColumnDef::new("v2", "BOOLEAN")];
    let create = sql::create_table(&sql::td_node_table(7), &cols, true);
    assert_eq!(create, "CREATE TABLE IF NOT EXISTS \"td_node_7\" (\"v1\" BOOLEAN, \"v2\" BOOLEAN)");

    let index = sql::create_unique_index("td_node_7_constraint_relevant", "td_node_7", &["v1".to_string(), "v2".to_string()]);
    assert_eq!(
        index,
        "CREATE UNIQUE INDEX IF NOT EXISTS \"td_node_7_constraint_relevant\" ON \"td_node_7\" (\"v1\", \"v2\")"
    );
}
