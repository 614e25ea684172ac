//! Graph construction and abstraction: the primal graph built from clauses
//! and the minor-graph abstraction that contracts non-projected variables
//! into cliques.

pub mod minor;
pub mod primal;
