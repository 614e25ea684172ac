//! Crate-wide error type.
//!
//! One variant per error kind from the propagation-policy table: callers
//! match on kind to decide whether to retry, continue with degraded state,
//! or abort. `anyhow` is reserved for the CLI boundary, where a final chain
//! is formatted for the user.

use thiserror::Error;

/// Errors produced anywhere in the engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error at {file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("tree decomposer failed: {0}")]
    DecomposerFailed(String),

    #[error("preprocessor failed: {0}")]
    PreprocessorFailed(String),

    #[error("external solver failed after {attempts} attempts: {message}")]
    SolverFailed { attempts: u32, message: String },

    #[error("database administrative shutdown: {0}")]
    DbAdminShutdown(String),

    #[error("database error: {0}")]
    Db(#[from] postgres::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("interrupted")]
    Interrupted,

    #[error("worker failed: {0}")]
    WorkerFailure(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the SQLSTATE the gateway treats as "statement aborted, keep going".
    pub fn is_admin_shutdown(&self) -> bool {
        match self {
            Error::DbAdminShutdown(_) => true,
            Error::Db(e) => e
                .code()
                .is_some_and(|c| c == &postgres::error::SqlState::ADMIN_SHUTDOWN),
            _ => false,
        }
    }
}
