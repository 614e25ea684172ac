//! Subprocess calls nested solving falls back to: the optional
//! preprocessor, the plain SAT solver, and the classical `#SAT`/PMC
//! solvers used once a bag's tree width crosses `threshold_hybrid`.
//! Grounded on `nesthdb.preprocess`/`call_solver`.

use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::cnf::Clause;
use crate::config::SolverConfig;
use crate::dimacs::{read_cnf, write_cnf};
use crate::error::{Error, Result};
use crate::extsolve;

/// Outcome of handing a (reduced) CNF to the configured preprocessor.
pub enum PreprocessOutcome {
    Unsat,
    /// The preprocessor solved the instance outright.
    Solved { models: i128 },
    /// The instance survives, possibly smaller.
    Reduced { num_vars: u32, clauses: Vec<Clause> },
}

pub fn call_preprocessor(cfg: &SolverConfig, num_vars: u32, clauses: &[Clause], cancel: &CancelToken) -> Result<PreprocessOutcome> {
    let stdin = write_cnf(num_vars, clauses, None);

    let args: Vec<String> = cfg.args.split_whitespace().map(String::from).collect();
    let outcome = extsolve::run_once(&cfg.path, &args, stdin.as_bytes(), None, cancel)?;
    let text = String::from_utf8_lossy(&outcome.stdout);
    let parsed = read_cnf("<preprocessor output>", &text)?;

    if let Some(models) = parsed.pre_solved_models {
        return Ok(if models == 0 {
            PreprocessOutcome::Unsat
        } else {
            PreprocessOutcome::Solved { models }
        });
    }
    Ok(PreprocessOutcome::Reduced {
        num_vars: parsed.num_vars,
        clauses: parsed.clauses,
    })
}

pub enum SatVerdict {
    Sat,
    Unsat,
}

/// Call the classical SAT solver and read its `s SATISFIABLE`/`s
/// UNSATISFIABLE` verdict line (the plain DIMACS solver convention,
/// distinct from the pre-solved-CNF convention `call_preprocessor` uses).
pub fn call_sat(cfg: &SolverConfig, num_vars: u32, clauses: &[Clause], retry_codes: &[i32], max_retries: u32, cancel: &CancelToken) -> Result<SatVerdict> {
    let stdin = write_cnf(num_vars, clauses, None);

    let args: Vec<String> = cfg.args.split_whitespace().map(String::from).collect();
    let outcome = extsolve::run_with_retry(&cfg.path, &args, stdin.as_bytes(), None, retry_codes, max_retries, cancel)?;
    let text = String::from_utf8_lossy(&outcome.stdout);
    for line in text.lines() {
        if line.trim_start().starts_with("s UNSATISFIABLE") {
            return Ok(SatVerdict::Unsat);
        }
        if line.trim_start().starts_with("s SATISFIABLE") {
            return Ok(SatVerdict::Sat);
        }
    }
    Err(Error::SolverFailed {
        attempts: 1,
        message: "no s-line found in SAT solver output".to_string(),
    })
}

/// Call a `#SAT`/PMC solver whose output is parsed by `cfg.output_parser`'s
/// regex (one capture group, the model count) rather than the plain
/// DIMACS `s`/`v` convention.
pub fn call_classical(
    cfg: &SolverConfig,
    num_vars: u32,
    clauses: &[Clause],
    proj_vars: Option<&[crate::cnf::VarId]>,
    timeout: Option<Duration>,
    retry_codes: &[i32],
    max_retries: u32,
    cancel: &CancelToken,
) -> Result<i128> {
    let stdin = write_cnf(num_vars, clauses, proj_vars);

    let args: Vec<String> = cfg.args.split_whitespace().map(String::from).collect();
    let outcome = extsolve::run_with_retry(&cfg.path, &args, stdin.as_bytes(), timeout, retry_codes, max_retries, cancel)?;
    let text = String::from_utf8_lossy(&outcome.stdout);

    let spec = cfg.output_parser.as_ref().ok_or_else(|| Error::Config("classical solver requires an output_parser".to_string()))?;
    let re = Regex::new(&spec.pattern).map_err(|e| Error::Config(e.to_string()))?;
    let captures = re.captures(&text).ok_or_else(|| Error::SolverFailed {
        attempts: 1,
        message: "solver output did not match output_parser pattern".to_string(),
    })?;
    let count: i128 = captures
        .get(1)
        .ok_or_else(|| Error::Config("output_parser pattern has no capture group".to_string()))?
        .as_str()
        .parse()
        .map_err(|_| Error::SolverFailed {
            attempts: 1,
            message: "output_parser capture was not an integer".to_string(),
        })?;
    debug!(count, "classical solver reported model count");
    Ok(count)
}
