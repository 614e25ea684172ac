//! # dpsolve
//!
//! A dynamic-programming engine over tree decompositions for SAT, #SAT,
//! projected model counting (PMC), and nested projected model counting
//! (nestPMC), backed by a relational database.
//!
//! ## Pipeline
//!
//! ```text
//! DIMACS CNF (dimacs::reader)
//!     -> primal graph (graph::primal)
//!     -> [nested: minor-graph abstraction (graph::minor)]
//!     -> tree decomposition (decompose -> treedecomp)
//!     -> per-bag DP tables (db::gateway, driven by dp::problem/worker)
//!     -> ProblemVariant::after_solve aggregates the root bag
//! ```
//!
//! `nested::solver` recurses over this same pipeline for bags whose
//! residual subproblem (`all_vertices \ vertices`) is too large to keep
//! inline, dispatching to an external classical solver or back into the
//! DP driver depending on tree width (spec §4.I).
//!
//! The CLI (`cli`, consumed by `main.rs`) is a thin dispatch shell: the
//! library itself has no dependency on `std::process::exit` or any
//! terminal-facing concern.

pub mod abstraction;
pub mod cancel;
pub mod cli;
pub mod cnf;
pub mod config;
pub mod db;
pub mod decompose;
pub mod dimacs;
pub mod dp;
pub mod error;
pub mod extsolve;
pub mod graph;
pub mod nested;
pub mod problems;
pub mod treedecomp;

pub use error::{Error, Result};
