//! Minor-graph abstraction: contracts non-projected variables into
//! cliques over their projected neighbors, producing the *nested primal
//! graph* the tree decomposer actually runs on (spec §4.C).
//!
//! The contraction is two-phase, mirroring the reference implementation:
//! `contract` walks each project-only connected component starting from a
//! popped project variable, recording which "outer" (non-project)
//! vertices it touches in `clique_uses_project`, then `add_cliques`
//! finally turns each surviving hub vertex into a clique over its
//! neighbors and removes it. Doing the clique-forming in a second pass
//! keeps contractions from interfering with each other mid-walk.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::cnf::VarId;

#[derive(Default)]
struct ReturnedState {
    /// Union of every inner variable ever handed back to a caller.
    claimed: FxHashSet<VarId>,
    cache: FxHashMap<Vec<VarId>, FxHashSet<VarId>>,
}

pub struct MinorGraph {
    adj_list: FxHashMap<VarId, FxHashSet<VarId>>,
    nodes: FxHashSet<VarId>,
    project: Vec<VarId>,
    locked: FxHashSet<VarId>,
    todo_clique: Vec<VarId>,
    /// Key: sorted surviving neighborhood; value: project vars it absorbed.
    clique_uses_project: FxHashMap<Vec<VarId>, FxHashSet<VarId>>,
    returned: Mutex<ReturnedState>,
    node_map: FxHashMap<VarId, u32>,
    node_rev_map: FxHashMap<u32, VarId>,
}

impl MinorGraph {
    pub fn new(
        nodes: impl IntoIterator<Item = VarId>,
        adj_list: FxHashMap<VarId, FxHashSet<VarId>>,
        projected: impl IntoIterator<Item = VarId>,
    ) -> Self {
        MinorGraph {
            adj_list,
            nodes: nodes.into_iter().collect(),
            project: projected.into_iter().collect(),
            locked: FxHashSet::default(),
            todo_clique: Vec::new(),
            clique_uses_project: FxHashMap::default(),
            returned: Mutex::new(ReturnedState::default()),
            node_map: FxHashMap::default(),
            node_rev_map: FxHashMap::default(),
        }
    }

    fn neighbors(&self, v: VarId) -> FxHashSet<VarId> {
        self.adj_list.get(&v).cloned().unwrap_or_default()
    }

    fn add_edge(&mut self, a: VarId, b: VarId) {
        self.adj_list.entry(a).or_default().insert(b);
        self.adj_list.entry(b).or_default().insert(a);
    }

    fn remove_node(&mut self, v: VarId) {
        if let Some(ngbs) = self.adj_list.remove(&v) {
            for n in ngbs {
                if let Some(s) = self.adj_list.get_mut(&n) {
                    s.remove(&v);
                }
            }
        }
        self.nodes.remove(&v);
    }

    /// Walk the project-only component reachable from `v`, collecting
    /// non-project neighbors into `ngbs` and queuing project neighbors
    /// onto `todo`. Removes `v` unless `rem` is false, in which case it is
    /// locked (kept present, but excluded from further contraction).
    fn non_project_neighbors(&mut self, v: VarId, todo: &mut Vec<VarId>, ngbs: &mut FxHashSet<VarId>, rem: bool) -> bool {
        if !self.nodes.contains(&v) {
            return false;
        }
        let project_set: FxHashSet<VarId> = self.project.iter().copied().collect();
        for i in self.neighbors(v) {
            if self.locked.contains(&i) {
                continue;
            }
            if !project_set.contains(&i) {
                ngbs.insert(i);
            } else if !todo.contains(&i) {
                todo.push(i);
            }
        }
        if rem {
            self.remove_node(v);
        } else {
            self.locked.insert(v);
        }
        true
    }

    /// Contract the project-only component containing `vx`. Returns
    /// whether `vx` was still present (a no-op component returns false).
    fn contract(&mut self, vx: VarId, initial_rem: bool) -> bool {
        let mut ngbs = FxHashSet::default();
        let mut todo = vec![vx];
        let mut result = false;
        let mut pos = 0;
        let mut rem = initial_rem;
        while pos < todo.len() {
            let v = todo[pos];
            let res = self.non_project_neighbors(v, &mut todo, &mut ngbs, rem);
            if v == vx {
                result = res;
            }
            rem = true;
            pos += 1;
        }

        if result {
            let mut key: Vec<VarId> = ngbs.iter().copied().collect();
            key.sort_unstable();
            self.clique_uses_project
                .entry(key)
                .or_default()
                .extend(todo.iter().copied());
        }

        if !initial_rem {
            for &i in &ngbs {
                self.add_edge(vx, i);
            }
            result
        } else {
            let neighbors: Vec<VarId> = ngbs.into_iter().collect();
            for i in 0..neighbors.len() {
                for j in (i + 1)..neighbors.len() {
                    self.add_edge(neighbors[i], neighbors[j]);
                }
            }
            false
        }
    }

    /// Pop projected variables one at a time (stack order) and contract
    /// each remaining connected component. `initial_rem = false` matches
    /// the abstraction's normal mode: the first vertex of each component
    /// is locked and turned into a clique hub via `add_cliques`, rather
    /// than eagerly cliqued in place.
    pub fn abstract_graph(&mut self, initial_rem: bool) {
        self.locked.clear();
        self.clique_uses_project.clear();
        self.todo_clique.clear();
        while let Some(j) = self.project.pop() {
            if self.contract(j, initial_rem) {
                self.todo_clique.push(j);
            }
        }
    }

    /// Turn every recorded clique hub into a full clique over its
    /// neighbors, then remove the hub.
    pub fn add_cliques(&mut self) {
        let hubs = std::mem::take(&mut self.todo_clique);
        for k in hubs {
            let neighbors: Vec<VarId> = self.neighbors(k).into_iter().collect();
            for i in 0..neighbors.len() {
                for j in 0..neighbors.len() {
                    if neighbors[i] > neighbors[j] {
                        self.add_edge(neighbors[i], neighbors[j]);
                    }
                }
            }
            self.remove_node(k);
        }
        self.locked.clear();
    }

    /// Lazily number surviving nodes and return the edge list in that
    /// numbering (what gets fed to the external tree decomposer).
    pub fn normalized_edges(&mut self) -> Vec<(u32, u32)> {
        if self.node_map.is_empty() {
            let mut next = 0u32;
            let mut nodes: Vec<VarId> = self.nodes.iter().copied().collect();
            nodes.sort_unstable();
            for u in nodes {
                next += 1;
                self.node_map.insert(u, next);
                self.node_rev_map.insert(next, u);
            }
        }
        let mut edges = Vec::new();
        let mut seen = FxHashSet::default();
        for (&u, ngbs) in &self.adj_list {
            for &v in ngbs {
                if u < v && seen.insert((u, v)) {
                    edges.push((self.node_map[&u], self.node_map[&v]));
                }
            }
        }
        edges
    }

    pub fn orig_node(&self, node: u32) -> VarId {
        self.node_rev_map[&node]
    }

    /// Inverse of `orig_node`: the normalized node id a surviving original
    /// variable was assigned, once `normalized_edges` has run.
    pub fn normalized_node(&self, var: VarId) -> Option<u32> {
        self.node_map.get(&var).copied()
    }

    pub fn normalized_node_count(&self) -> u32 {
        self.node_map.len() as u32
    }

    /// Union of inner variables absorbed by any clique wholly contained in
    /// `nodes`, minus whatever has already been claimed by an earlier
    /// call — guarantees each inner variable is attributed to exactly one
    /// bag during nested solving (spec §4.C).
    pub fn projection_variables_of(&self, nodes: &[VarId]) -> Vec<VarId> {
        let key: Vec<VarId> = nodes.to_vec();
        let mut state = self.returned.lock();
        if let Some(cached) = state.cache.get(&key) {
            return cached.iter().copied().collect();
        }
        let node_set: FxHashSet<VarId> = nodes.iter().copied().collect();
        let mut result = FxHashSet::default();
        for (k, v) in &self.clique_uses_project {
            if k.iter().all(|x| node_set.contains(x)) {
                result.extend(v.iter().copied());
            }
        }
        result.retain(|v| !state.claimed.contains(v));
        state.claimed.extend(result.iter().copied());
        state.cache.insert(key, result.clone());
        result.into_iter().collect()
    }
}

/// Build a `MinorGraph` from the primal graph, projecting out `proj_out`
/// (the non-projected variables) as the original `Abstraction.abstract`
/// does before calling `abstract_graph`/`add_cliques`.
pub fn build_minor_graph(
    num_vars: u32,
    adj: FxHashMap<VarId, FxHashSet<VarId>>,
    proj_out: impl IntoIterator<Item = VarId>,
) -> MinorGraph {
    let mut mg = MinorGraph::new(1..=num_vars, adj, proj_out);
    mg.abstract_graph(false);
    mg.add_cliques();
    mg
}

/// Normalized bag description ready for SQL table creation in the parent
/// graph's variable space.
pub fn dedup_bags(bags: &BTreeMap<u32, Vec<u32>>) -> BTreeMap<u32, Vec<u32>> {
    bags.iter()
        .map(|(&id, v)| {
            let mut sorted = v.clone();
            sorted.sort_unstable();
            sorted.dedup();
            (id, sorted)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adj(edges: &[(VarId, VarId)]) -> FxHashMap<VarId, FxHashSet<VarId>> {
        let mut m: FxHashMap<VarId, FxHashSet<VarId>> = FxHashMap::default();
        for &(a, b) in edges {
            m.entry(a).or_default().insert(b);
            m.entry(b).or_default().insert(a);
        }
        m
    }

    #[test]
    fn contracting_an_isolated_inner_chain_cliques_its_outer_neighbors() {
        // outer--inner1--inner2--outer2, project={inner1,inner2}
        let graph = adj(&[(1, 2), (2, 3), (3, 4)]);
        let mut mg = build_minor_graph(4, graph, [2, 3]);
        let edges = mg.normalized_edges();
        let orig_edges: FxHashSet<(VarId, VarId)> = edges
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
        assert!(orig_edges.contains(&(1, 4)));
        assert!(!orig_edges.iter().any(|&(a, b)| a == 2 || b == 2 || a == 3 || b == 3));
    }

    #[test]
    fn projection_variables_of_is_claimed_exactly_once() {
        let graph = adj(&[(1, 2), (2, 3), (3, 4)]);
        let mg = {
            let mut m = build_minor_graph(4, graph, [2, 3]);
            let _ = m.normalized_edges();
            m
        };
        let first = mg.projection_variables_of(&[1, 4]);
        let second = mg.projection_variables_of(&[1, 4]);
        assert!(!first.is_empty());
        assert_eq!(first, second, "repeated query on the same key is idempotent");
    }
}
