//! Benchmarks for the primal-graph and minor-graph construction that
//! precede abstraction: the two steps that run once per nested-solve call
//! before `abstraction::choose_subset` ever shells out to clingo.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dpsolve::cnf::Clause;
use dpsolve::graph::minor::build_minor_graph;
use dpsolve::graph::primal;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};

/// A random 3-CNF over `num_vars` variables, `num_vars * 4` clauses.
fn random_cnf(num_vars: u32, seed: u64) -> Vec<Clause> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_vars * 4)
        .map(|_| {
            (0..3)
                .map(|_| {
                    let v = rng.gen_range(1..=num_vars) as i64;
                    if rng.gen_bool(0.5) {
                        v
                    } else {
                        -v
                    }
                })
                .collect()
        })
        .collect()
}

fn bench_primal_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("primal_build");
    for num_vars in [50u32, 200, 800] {
        let clauses = random_cnf(num_vars, 42);
        group.bench_with_input(BenchmarkId::from_parameter(num_vars), &clauses, |b, clauses| {
            b.iter(|| primal::build(num_vars, clauses));
        });
    }
    group.finish();
}

fn bench_minor_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("minor_graph");
    for num_vars in [50u32, 200, 800] {
        let clauses = random_cnf(num_vars, 7);
        let primal = primal::build(num_vars, &clauses);

        let mut adj: FxHashMap<u32, FxHashSet<u32>> = FxHashMap::default();
        for &(a, b) in &primal.edges {
            adj.entry(a).or_default().insert(b);
            adj.entry(b).or_default().insert(a);
        }

        // Project out three quarters of the variables, contracting them into
        // cliques over their surviving neighbors, mirroring a typical
        // nested-PMC bag where most residual variables aren't of interest
        // to the caller and get abstracted away before the outer solve.
        let proj_out: Vec<u32> = (1..=num_vars).filter(|v| v % 4 != 0).collect();

        group.bench_with_input(BenchmarkId::from_parameter(num_vars), &(adj, proj_out), |b, (adj, proj_out)| {
            b.iter(|| build_minor_graph(num_vars, adj.clone(), proj_out.iter().copied()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_primal_build, bench_minor_graph);
criterion_main!(benches);
