//! DIMACS family formats: CNF, GR (plain graph), TD (tree decomposition),
//! TW (legacy graph alias), EDGE (legacy graph alias).

pub mod reader;
pub mod writer;

pub use reader::{read_cnf, read_gr, read_td, ParsedCnf, ParsedGraph, ParsedTd};
pub use writer::{write_cnf, write_gr, write_td};
