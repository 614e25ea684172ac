//! Clause/Literal/CNF data model (spec §3).
//!
//! A literal is a signed nonzero integer; its variable is its absolute
//! value. Every literal's variable is expected to lie in `[1, num_vars]` —
//! violations are warned, not rejected, per the spec's invariant.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// 1-based variable id.
pub type VarId = u32;

/// A signed literal; `lit.var() == lit.unsigned_abs()`.
pub type Lit = i64;

pub fn var_of(lit: Lit) -> VarId {
    lit.unsigned_abs() as VarId
}

pub fn is_positive(lit: Lit) -> bool {
    lit > 0
}

/// A disjunction of literals.
pub type Clause = Vec<Lit>;

/// A parsed (and possibly simplified) CNF formula.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cnf {
    pub num_vars: u32,
    pub num_clauses: u32,
    pub clauses: Vec<Clause>,
    /// Projected variable set; empty means ordinary #SAT/SAT.
    pub projected: BTreeSet<VarId>,
    /// Set false only once a preprocessing step proves UNSAT by collapsing
    /// a complementary pair of unit clauses.
    pub maybe_sat: bool,
    /// Set when the input carried a pre-solved `s <n>` line.
    pub models: Option<i128>,
    pub done: bool,
}

impl Cnf {
    pub fn new(num_vars: u32, num_clauses: u32) -> Self {
        Cnf {
            num_vars,
            num_clauses,
            clauses: Vec::new(),
            projected: BTreeSet::new(),
            maybe_sat: true,
            models: None,
            done: false,
        }
    }

    /// All variables actually occurring in the formula.
    pub fn vars(&self) -> BTreeSet<VarId> {
        self.clauses
            .iter()
            .flat_map(|c| c.iter().map(|&l| var_of(l)))
            .collect()
    }

    /// Declared variable count is respected but the observed max may be
    /// lower; spec treats a mismatch as warn-only (checked by the reader).
    pub fn effective_num_vars(&self) -> u32 {
        self.vars().iter().copied().max().unwrap_or(0)
    }

    /// Run up to 10 rounds of unit-clause simplification (spec §4.A).
    ///
    /// Returns the set of projected variables whose only occurrence was in
    /// a removed unit clause (for correction-factor bookkeeping, spec §4.I).
    pub fn simplify_units(&mut self) -> BTreeSet<VarId> {
        let mut dropped_projected = BTreeSet::new();
        let mut assigned: std::collections::HashMap<VarId, bool> = std::collections::HashMap::new();

        for _round in 0..10 {
            let units: Vec<Lit> = self
                .clauses
                .iter()
                .filter(|c| c.len() == 1)
                .map(|c| c[0])
                .collect();
            if units.is_empty() {
                break;
            }

            let mut new_assignment = false;
            for &u in &units {
                let v = var_of(u);
                let val = is_positive(u);
                match assigned.get(&v) {
                    Some(&existing) if existing != val => {
                        // complementary units: formula is UNSAT.
                        self.maybe_sat = false;
                        self.clauses.clear();
                        return dropped_projected;
                    }
                    Some(_) => {}
                    None => {
                        assigned.insert(v, val);
                        new_assignment = true;
                    }
                }
            }
            if !new_assignment {
                break;
            }

            let mut next_clauses = Vec::with_capacity(self.clauses.len());
            for clause in self.clauses.drain(..) {
                if clause.len() == 1 {
                    // the unit itself is consumed (it is trivially satisfied
                    // by its own assignment); don't keep it around.
                    continue;
                }
                let satisfied = clause.iter().any(|&l| {
                    assigned
                        .get(&var_of(l))
                        .is_some_and(|&val| val == is_positive(l))
                });
                if satisfied {
                    continue;
                }
                let reduced: Clause = clause
                    .into_iter()
                    .filter(|&l| !matches!(assigned.get(&var_of(l)), Some(&val) if val != is_positive(l)))
                    .collect();
                next_clauses.push(reduced);
            }
            self.clauses = next_clauses;
        }

        let remaining_vars = self.vars();
        for &v in &assigned.keys().copied().collect::<Vec<_>>() {
            if self.projected.contains(&v) && !remaining_vars.contains(&v) {
                dropped_projected.insert(v);
            }
        }
        self.projected.retain(|v| !dropped_projected.contains(v));
        dropped_projected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simplify_propagates_unit_chain() {
        let mut cnf = Cnf::new(3, 3);
        cnf.clauses = vec![vec![1], vec![-1, 2], vec![-2, 3]];
        let dropped = cnf.simplify_units();
        assert!(dropped.is_empty());
        // unit(1) satisfies clause2's -1? no: -1 false, so clause2 reduces to [2] which becomes unit next round,
        // eventually everything collapses and clauses list becomes empty (all satisfied).
        assert!(cnf.maybe_sat);
        assert!(cnf.clauses.is_empty());
    }

    #[test]
    fn complementary_units_are_unsat() {
        let mut cnf = Cnf::new(1, 2);
        cnf.clauses = vec![vec![1], vec![-1]];
        cnf.simplify_units();
        assert!(!cnf.maybe_sat);
    }

    #[test]
    fn drops_projected_vars_resolved_only_by_units() {
        let mut cnf = Cnf::new(2, 2);
        cnf.projected.insert(1);
        cnf.projected.insert(2);
        cnf.clauses = vec![vec![1], vec![2, -2]]; // v2 still occurs (even if tautological here in spirit)
        cnf.clauses = vec![vec![1]];
        let dropped = cnf.simplify_units();
        assert!(dropped.contains(&1));
        assert!(!cnf.projected.contains(&1));
    }
}
