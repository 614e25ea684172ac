//! Nested solving (spec §4.I): the recursive dispatch that decides, per
//! subproblem, whether to preprocess it away, hand it to an external
//! classical solver, abstract it further, or hand it to the DP driver
//! with `problems::nest_pmc::NestPmc` as the residual-bag callback.

pub mod external;
pub mod solver;

pub use solver::NestedSolver;
