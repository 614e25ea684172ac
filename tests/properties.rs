//! Property-based tests over small randomly generated trees and graphs,
//! covering the structural invariants that `tests/scenarios.rs`'s concrete
//! examples don't exhaustively probe: tree-decomposition connectedness and
//! `projectionVariablesOf` disjointness across a postorder traversal.

use std::collections::{BTreeMap, BTreeSet};

use dpsolve::graph::minor::build_minor_graph;
use dpsolve::treedecomp::TreeDecomp;
use proptest::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

/// Build a random tree over `1..=n` as a parent map, node `i`'s parent
/// chosen from `1..i` so the result is always a single connected tree
/// rooted at 1.
fn arbitrary_tree(parents: &[u32]) -> (u32, Vec<(u32, u32)>) {
    let n = parents.len() as u32 + 1;
    let mut edges = Vec::new();
    for (i, &p) in parents.iter().enumerate() {
        let child = i as u32 + 2;
        let parent = 1 + p % (child - 1);
        edges.push((parent, child));
    }
    (n, edges)
}

/// Grow a connected subtree of `n` nodes (with the given edges) by a
/// random walk of `steps` expansions starting from `start`.
fn connected_subtree(n: u32, edges: &[(u32, u32)], start: u32, walk: &[usize]) -> BTreeSet<u32> {
    let mut adj: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for &(a, b) in edges {
        adj.entry(a).or_default().push(b);
        adj.entry(b).or_default().push(a);
    }
    let mut chosen = BTreeSet::from([start.min(n)]);
    for &w in walk {
        let frontier: Vec<u32> = chosen
            .iter()
            .flat_map(|v| adj.get(v).cloned().unwrap_or_default())
            .filter(|v| !chosen.contains(v))
            .collect();
        if frontier.is_empty() {
            break;
        }
        chosen.insert(frontier[w % frontier.len()]);
    }
    chosen
}

/// Whether the bags containing `var` form a connected subtree of `td`.
fn is_connected_subtree(td: &TreeDecomp, var: u32) -> bool {
    let containing: BTreeSet<u32> = td.nodes().filter(|n| n.vertices.contains(&var)).map(|n| n.id).collect();
    if containing.len() <= 1 {
        return true;
    }
    let start = *containing.iter().next().unwrap();
    let mut seen = BTreeSet::from([start]);
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        let node = td.node(id);
        let mut neighbors: Vec<u32> = node.children.clone();
        if let Some(p) = node.parent {
            neighbors.push(p);
        }
        for n in neighbors {
            if containing.contains(&n) && seen.insert(n) {
                stack.push(n);
            }
        }
    }
    seen == containing
}

proptest! {
    /// Variables placed on a randomly grown connected subtree (by
    /// construction) are reported as occupying a connected subtree once
    /// the bags are assembled into a `TreeDecomp`.
    #[test]
    fn td_variable_occurrence_is_connected(
        parents in proptest::collection::vec(0u32..50, 3..15),
        walk_a in proptest::collection::vec(0usize..8, 0..10),
        walk_b in proptest::collection::vec(0usize..8, 0..10),
        start_a in 1u32..16,
        start_b in 1u32..16,
    ) {
        let (n, edges) = arbitrary_tree(&parents);
        let subtree_a = connected_subtree(n, &edges, start_a, &walk_a);
        let subtree_b = connected_subtree(n, &edges, start_b, &walk_b);

        let mut bags: BTreeMap<u32, Vec<u32>> = (1..=n).map(|id| (id, Vec::new())).collect();
        for &id in &subtree_a {
            bags.get_mut(&id).unwrap().push(100);
        }
        for &id in &subtree_b {
            bags.get_mut(&id).unwrap().push(200);
        }

        let td = TreeDecomp::build(n, 2, 2, 1, &bags, &edges);
        prop_assert!(is_connected_subtree(&td, 100));
        prop_assert!(is_connected_subtree(&td, 200));
    }
}

proptest! {
    /// Calling `projection_variables_of` once per bag of a partition of
    /// the surviving nodes never hands the same inner variable back twice,
    /// matching the postorder traversal the DP driver actually performs.
    #[test]
    fn projection_variables_of_partitions_inner_vertices(
        chain_len in 5u32..20,
        proj_stride in 2u32..5,
    ) {
        let edges: Vec<(u32, u32)> = (1..chain_len).map(|v| (v, v + 1)).collect();
        let mut adj: FxHashMap<u32, FxHashSet<u32>> = FxHashMap::default();
        for &(a, b) in &edges {
            adj.entry(a).or_default().insert(b);
            adj.entry(b).or_default().insert(a);
        }
        // Keep every `proj_stride`-th vertex as an outer anchor; project
        // (contract away) the rest.
        let proj_out: Vec<u32> = (1..=chain_len).filter(|v| v % proj_stride != 0).collect();

        let mut mg = build_minor_graph(chain_len, adj, proj_out);
        let _ = mg.normalized_edges();

        // Partition the surviving nodes into singleton bags, one call each,
        // mirroring how the real driver asks once per postorder bag.
        let surviving: Vec<u32> = (1..=chain_len).filter(|v| v % proj_stride == 0).collect();
        let mut seen = FxHashSet::default();
        for &v in &surviving {
            for returned in mg.projection_variables_of(&[v]) {
                prop_assert!(seen.insert(returned), "variable {} claimed by more than one bag", returned);
            }
        }
    }
}
