//! Recursive nested-solving dispatch (spec §4.I), grounded on
//! `nesthdb.nesthdb`/`nesthdb.nestedpmc`: preprocess a subproblem, bail
//! out through a plain SAT/#SAT/PMC call once it's small or wide enough,
//! otherwise abstract it into a nested primal graph, decompose it, and
//! either recurse through the classical solvers once more or hand it to
//! the DP driver with `NestPmc` as the per-bag residual callback.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use rustc_hash::FxHasher;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::cnf::{Clause, Cnf, VarId};
use crate::config::Config;
use crate::db::Pool;
use crate::dp::problem::Problem;
use crate::error::Result;
use crate::graph::{minor, primal};
use crate::nested::external::{self, PreprocessOutcome, SatVerdict};
use crate::problems::nest_pmc::{NestPmc, NestedSolve};

/// Shared state a top-level solve and every recursive descendant share: the
/// configuration, a DB pool for bags that get handed to the DP driver, and
/// a memo cache keyed by the subproblem's content.
pub struct NestedSolver {
    config: Config,
    pool: Arc<Pool>,
    cancel: CancelToken,
    cache: DashMap<u64, i128>,
    self_ref: Weak<NestedSolver>,
}

impl NestedSolver {
    pub fn new(config: Config, pool: Arc<Pool>, cancel: CancelToken) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| NestedSolver {
            config,
            pool,
            cancel,
            cache: DashMap::new(),
            self_ref: self_ref.clone(),
        })
    }

    /// Entry point for a freshly-read top-level instance, variables
    /// numbered densely `1..=num_vars`.
    pub fn solve_top(&self, num_vars: u32, clauses: &[Clause], projected: &BTreeSet<VarId>) -> Result<i128> {
        let vars: Vec<VarId> = (1..=num_vars).collect();
        self.solve(&vars, clauses, &BTreeSet::new(), projected, 0)
    }

    fn arc_self(&self) -> Option<Arc<NestedSolver>> {
        self.self_ref.upgrade()
    }
}

impl NestedSolve for NestedSolver {
    fn solve(&self, vars: &[VarId], clauses: &[Clause], non_nested: &BTreeSet<VarId>, projected: &BTreeSet<VarId>, depth: u32) -> Result<i128> {
        let key = cache_key(vars, clauses, non_nested, projected);
        if !self.config.nesthdb.disable_cache {
            if let Some(cached) = self.cache.get(&key) {
                debug!(depth, "nested solve cache hit");
                return Ok(*cached);
            }
        }

        let result = self.solve_uncached(vars, clauses, non_nested, projected, depth)?;

        if !self.config.nesthdb.disable_cache {
            self.cache.insert(key, result);
        }
        Ok(result)
    }
}

impl NestedSolver {
    fn solve_uncached(&self, vars: &[VarId], clauses: &[Clause], non_nested: &BTreeSet<VarId>, projected: &BTreeSet<VarId>, depth: u32) -> Result<i128> {
        let (norm_map, num_vars, clauses, non_nested, projected) = normalize(vars, clauses, non_nested, projected);
        let _ = norm_map;

        let mut cnf = Cnf::new(num_vars, clauses.len() as u32);
        cnf.clauses = clauses;
        cnf.projected = projected;
        let dropped = cnf.simplify_units();
        let correction = dropped.len() as u32;
        let mut multiplier: i128 = 1i128 << correction;

        if !cnf.maybe_sat {
            info!(depth, "nested subproblem UNSAT after unit propagation");
            return Ok(0);
        }

        let mut num_vars = cnf.num_vars;
        let mut clauses = cnf.clauses;
        let mut projected = cnf.projected;
        let non_nested: BTreeSet<VarId> = non_nested.into_iter().filter(|v| *v <= num_vars).collect();

        if let Some(pp_cfg) = &self.config.nesthdb.preprocessor {
            match external::call_preprocessor(pp_cfg, num_vars, &clauses, &self.cancel)? {
                PreprocessOutcome::Unsat => {
                    info!(depth, "nested subproblem UNSAT after preprocessing");
                    return Ok(0);
                }
                PreprocessOutcome::Solved { models } => {
                    info!(depth, models, "nested subproblem solved by preprocessor");
                    return Ok(models.saturating_mul(multiplier));
                }
                PreprocessOutcome::Reduced { num_vars: nv, clauses: cl } => {
                    num_vars = nv;
                    clauses = cl;
                }
            }
        }

        // A variable the preprocessor eliminates (not just our own unit
        // propagation above) is just as free in the remaining formula, so
        // each one dropped from `projected` still doubles the final count.
        let occurring = occurring_vars(&clauses);
        let projected_before_preprocessing = projected.len();
        projected.retain(|v| occurring.contains(v));
        let preprocessor_dropped = (projected_before_preprocessing - projected.len()) as u32;
        multiplier = multiplier.saturating_mul(1i128 << preprocessor_dropped);
        let non_nested: BTreeSet<VarId> = non_nested.into_iter().filter(|v| occurring.contains(v)).collect();

        if projected.is_empty() {
            info!(depth, "projected set empty after preprocessing, falling back to plain SAT");
            let verdict = external::call_sat(
                &self.config.nesthdb.sat_solver,
                num_vars,
                &clauses,
                &self.config.nesthdb.retry_codes,
                self.config.nesthdb.max_retries,
                &self.cancel,
            )?;
            let models = if matches!(verdict, SatVerdict::Sat) { 1 } else { 0 };
            return Ok(models * multiplier);
        }

        let primal = primal::build(num_vars, &clauses);
        let proj_out: BTreeSet<VarId> = (1..=num_vars).filter(|v| !projected.contains(v)).collect();
        let mut mg = minor::build_minor_graph(num_vars, primal.adjacency(), proj_out);
        let mut edges = mg.normalized_edges();
        let mut proj_nodes: BTreeSet<VarId> = projected.iter().filter_map(|&v| mg.normalized_node(v)).collect();

        let mut td = crate::decompose::run(&self.config.htd, mg.normalized_node_count(), &edges, &self.cancel)?;

        let force_classical = depth >= self.config.nesthdb.max_recursion_depth;
        if force_classical || td.tree_width >= self.config.nesthdb.threshold_hybrid {
            info!(depth, tree_width = td.tree_width, "tree width crosses hybrid threshold, calling classical solver");
            let proj_vars: Vec<VarId> = projected.iter().copied().collect();
            let solver_cfg = if projected.len() as u32 == occurring.len() as u32 {
                &self.config.nesthdb.sharpsat_solver
            } else {
                &self.config.nesthdb.pmc_solver
            };
            let count = external::call_classical(
                solver_cfg,
                num_vars,
                &clauses,
                Some(&proj_vars),
                None,
                &self.config.nesthdb.retry_codes,
                self.config.nesthdb.max_retries,
                &self.cancel,
            )?;
            return Ok(count.saturating_mul(multiplier));
        }

        if td.tree_width >= self.config.nesthdb.threshold_abstract {
            info!(depth, tree_width = td.tree_width, "tree width crosses abstract threshold, invoking ASP subset chooser");
            for enc in &self.config.nesthdb.asp.encodings {
                let chosen = crate::abstraction::choose_subset(
                    &self.config.nesthdb.asp.path,
                    &enc.file,
                    &edges,
                    &proj_nodes,
                    enc.size,
                    std::time::Duration::from_secs(enc.timeout),
                    &self.cancel,
                )?;
                if !chosen.is_empty() {
                    proj_nodes = chosen;
                }
            }
            // Re-abstract from the original variable level with the
            // ASP-narrowed projected set, rather than contracting the
            // already-contracted graph a second time.
            projected = proj_nodes.iter().map(|&n| mg.orig_node(n)).collect();
            let proj_out: BTreeSet<VarId> = (1..=num_vars).filter(|v| !projected.contains(v)).collect();
            mg = minor::build_minor_graph(num_vars, primal.adjacency(), proj_out);
            edges = mg.normalized_edges();
            td = crate::decompose::run(&self.config.htd, mg.normalized_node_count(), &edges, &self.cancel)?;
        }

        info!(depth, tree_width = td.tree_width, "dispatching nested subproblem to the DP driver");
        td.map_vertices(|nid| mg.orig_node(nid));
        for n in td.nodes().map(|n| n.id).collect::<Vec<_>>() {
            let orig_vertices = td.node(n).vertices.clone();
            let minor_vertices = mg.projection_variables_of(&orig_vertices);
            td.set_minor_vertices(n, minor_vertices);
        }

        let Some(arc_self) = self.arc_self() else {
            return Err(crate::error::Error::InvariantViolation("nested solver dropped its own Arc handle".to_string()));
        };
        let recursive: Arc<dyn NestedSolve> = arc_self;
        let variant = Arc::new(NestPmc {
            num_vars,
            num_clauses: clauses.len() as u32,
            clauses: clauses.clone(),
            projected: projected.clone(),
            non_nested: non_nested.clone(),
            inner_vars_threshold: self.config.nesthdb.inner_vars_threshold,
            depth,
            recursive: Some(recursive),
        });

        // Nested recursion never exposes `--limit-result-rows`/etc. itself,
        // so every recursive subproblem always runs the exact mode.
        let mut problem = Problem::create(
            &format!("nest-depth{depth}"),
            "nest_pmc",
            Arc::clone(&self.pool),
            td,
            variant.as_ref(),
            crate::dp::problem::IterationOpts::default(),
        )?;
        let problem_id = problem.id;
        problem.solve(variant, &self.cancel, self.config.nesthdb.max_solver_threads)?;

        let mut db = crate::db::Gateway::new(Arc::clone(&self.pool));
        db.ignore_next_praefix(1);
        let row = db.query_one("SELECT model_count::text FROM \"problem_pmc\" WHERE \"id\" = $1", &[&problem_id])?;
        let text: String = row.get(0);
        let count: i128 = text.parse().unwrap_or(0);
        Ok(count.saturating_mul(multiplier))
    }
}

/// Map a `clauses`/`projected`/`non_nested` triple expressed over a sparse
/// variable subset into a dense `1..=n` numbering, the form every external
/// tool and the primal-graph builder expects.
fn normalize(
    vars: &[VarId],
    clauses: &[Clause],
    non_nested: &BTreeSet<VarId>,
    projected: &BTreeSet<VarId>,
) -> (std::collections::BTreeMap<VarId, VarId>, u32, Vec<Clause>, BTreeSet<VarId>, BTreeSet<VarId>) {
    let mut sorted: Vec<VarId> = vars.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let map: std::collections::BTreeMap<VarId, VarId> = sorted.iter().enumerate().map(|(i, &v)| (v, (i + 1) as VarId)).collect();

    let remap_lit = |l: i64| -> i64 {
        let v = crate::cnf::var_of(l);
        let nv = *map.get(&v).unwrap_or(&v);
        if l > 0 {
            nv as i64
        } else {
            -(nv as i64)
        }
    };
    let clauses: Vec<Clause> = clauses.iter().map(|c| c.iter().copied().map(remap_lit).collect()).collect();
    let projected: BTreeSet<VarId> = projected.iter().filter_map(|v| map.get(v).copied()).collect();
    let non_nested: BTreeSet<VarId> = non_nested.iter().filter_map(|v| map.get(v).copied()).collect();

    (map, sorted.len() as u32, clauses, non_nested, projected)
}

fn occurring_vars(clauses: &[Clause]) -> BTreeSet<VarId> {
    clauses.iter().flat_map(|c| c.iter().map(|&l| crate::cnf::var_of(l))).collect()
}

fn cache_key(vars: &[VarId], clauses: &[Clause], non_nested: &BTreeSet<VarId>, projected: &BTreeSet<VarId>) -> u64 {
    let mut hasher = FxHasher::default();
    vars.hash(&mut hasher);
    clauses.hash(&mut hasher);
    non_nested.hash(&mut hasher);
    projected.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn normalize_maps_sparse_vars_densely() {
        let vars = [3, 7, 9, 15];
        let clauses = vec![vec![3, -7], vec![9, 15]];
        let projected: BTreeSet<VarId> = [7, 15].into_iter().collect();
        let non_nested: BTreeSet<VarId> = [9].into_iter().collect();
        let (map, n, clauses, non_nested, projected) = normalize(&vars, &clauses, &non_nested, &projected);
        assert_eq!(n, 4);
        assert_eq!(map[&3], 1);
        assert_eq!(map[&15], 4);
        assert_eq!(clauses, vec![vec![1, -2], vec![3, 4]]);
        assert_eq!(projected, BTreeSet::from([2, 4]));
        assert_eq!(non_nested, BTreeSet::from([3]));
    }

    #[test]
    fn occurring_vars_ignores_sign() {
        let clauses = vec![vec![1, -2], vec![-1, 3]];
        assert_eq!(occurring_vars(&clauses), BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn cache_key_is_deterministic_and_order_sensitive() {
        let vars = [1, 2, 3];
        let clauses = vec![vec![1, 2]];
        let empty = BTreeSet::new();
        let a = cache_key(&vars, &clauses, &empty, &empty);
        let b = cache_key(&vars, &clauses, &empty, &empty);
        assert_eq!(a, b);

        let other_clauses = vec![vec![1, -2]];
        let c = cache_key(&vars, &other_clauses, &empty, &empty);
        assert_ne!(a, c);
    }

    proptest::proptest! {
        /// `normalize` only ever renumbers variables; inverting its map and
        /// applying it back to the output must reproduce the input clauses,
        /// projected set and non-nested set exactly.
        #[test]
        fn normalize_round_trips_through_its_own_map(
            vars in proptest::collection::btree_set(1i64..200, 1..12),
            extra_lits in proptest::collection::vec((1i64..200, proptest::bool::ANY), 0..20),
        ) {
            let vars: Vec<VarId> = vars.into_iter().map(|v| v as VarId).collect();
            let clauses: Vec<Clause> = extra_lits
                .chunks(2)
                .filter(|c| !c.is_empty())
                .map(|c| {
                    c.iter()
                        .map(|&(v, neg)| {
                            let v = *vars.get((v as usize) % vars.len()).unwrap();
                            if neg { -i64::from(v) } else { i64::from(v) }
                        })
                        .collect()
                })
                .collect();
            let projected: BTreeSet<VarId> = vars.iter().step_by(2).copied().collect();
            let non_nested: BTreeSet<VarId> = vars.iter().skip(1).step_by(2).copied().collect();

            let (map, _n, norm_clauses, norm_non_nested, norm_projected) = normalize(&vars, &clauses, &non_nested, &projected);
            let inverse: std::collections::BTreeMap<VarId, VarId> = map.iter().map(|(&orig, &dense)| (dense, orig)).collect();
            let denorm_lit = |l: i64| -> i64 {
                let v = crate::cnf::var_of(l);
                let orig = inverse[&v];
                if l > 0 { orig as i64 } else { -(orig as i64) }
            };

            let denorm_clauses: Vec<Clause> = norm_clauses.iter().map(|c| c.iter().copied().map(denorm_lit).collect()).collect();
            prop_assert_eq!(denorm_clauses, clauses);

            let denorm_projected: BTreeSet<VarId> = norm_projected.iter().map(|v| inverse[v]).collect();
            prop_assert_eq!(denorm_projected, projected);

            let denorm_non_nested: BTreeSet<VarId> = norm_non_nested.iter().map(|v| inverse[v]).collect();
            prop_assert_eq!(denorm_non_nested, non_nested);
        }
    }
}
