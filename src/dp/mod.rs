//! Dynamic-programming core: the generic per-bag setup/solve driver and
//! the trait concrete problem variants implement to plug into it.

pub mod problem;
pub mod transition;
pub mod worker;

pub use problem::{Problem, ProblemVariant};
