//! Answer-set-program subset chooser: shrinks an over-large projected-
//! variable set to a size budget the decomposer can handle, grounded on
//! `dpdb.abstraction.ClingoControl.choose_subset`.

pub mod chooser;

pub use chooser::choose_subset;
