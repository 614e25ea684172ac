//! Invokes `clingo` as a subprocess to pick a bounded-size subset of the
//! projected variables to keep "outer" for the next abstraction round.
//!
//! The reference implementation links clingo's Python API directly and
//! drives it with an `on_model` callback that tracks the best-cost answer
//! set seen so far. This crate instead shells out to the `clingo` binary
//! (spec's ambient-stack rule: a subprocess plus a regex/JSON parser,
//! matching how `extsolve` already handles every other external solver)
//! and reads back its last JSON witness. The ASP encodings this ships
//! against are expected to mark chosen variables with a `proj/1` atom —
//! this is the one degree of freedom the reference's Python callback had
//! that a subprocess boundary can't observe directly, so the convention
//! is fixed here instead.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::cancel::CancelToken;
use crate::cnf::VarId;
use crate::error::{Error, Result};
use crate::extsolve;

#[derive(Debug, Deserialize)]
struct ClingoOutput {
    #[serde(rename = "Call", default)]
    call: Vec<ClingoCall>,
}

#[derive(Debug, Deserialize)]
struct ClingoCall {
    #[serde(rename = "Witnesses", default)]
    witnesses: Vec<ClingoWitness>,
}

#[derive(Debug, Deserialize)]
struct ClingoWitness {
    #[serde(rename = "Value", default)]
    value: Vec<String>,
}

/// Ask `clingo` to pick `select_subset` of `nodes` (edges between them
/// given as `edges`) using `encoding_file`, aborting after `timeout`.
/// Falls back to returning `nodes` unchanged (with a warning) when clingo
/// produces no answer set at all, mirroring the reference's "fallback to
/// previous result" behavior.
pub fn choose_subset(
    clingo_path: &Path,
    encoding_file: &Path,
    edges: &[(VarId, VarId)],
    nodes: &BTreeSet<VarId>,
    select_subset: usize,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<BTreeSet<VarId>> {
    let select_subset = select_subset.min(nodes.len());

    let mut facts = String::new();
    for &(a, b) in edges {
        facts.push_str(&format!("edge({a},{b}).\n"));
    }
    for &p in nodes {
        facts.push_str(&format!("p({p}).\n"));
    }
    facts.push_str(&format!("#const k = {select_subset}.\n"));

    let encoding = std::fs::read_to_string(encoding_file).map_err(Error::Io)?;
    let program = format!("{facts}\n{encoding}");

    let args = vec!["--outf=2".to_string(), format!("--time-limit={}", timeout.as_secs())];
    let outcome = extsolve::run_once(
        &clingo_path.to_path_buf(),
        &args,
        program.as_bytes(),
        Some(timeout + Duration::from_secs(5)),
        cancel,
    )?;

    let parsed: Option<ClingoOutput> = serde_json::from_slice(&outcome.stdout).ok();
    let best = parsed
        .as_ref()
        .and_then(|o| o.call.last())
        .and_then(|c| c.witnesses.last());

    match best {
        Some(witness) => Ok(parse_proj_atoms(&witness.value)),
        None => {
            warn!("clingo produced no answer set, keeping previous projected set");
            Ok(nodes.clone())
        }
    }
}

fn parse_proj_atoms(atoms: &[String]) -> BTreeSet<VarId> {
    atoms
        .iter()
        .filter_map(|a| {
            let inner = a.strip_prefix("proj(")?.strip_suffix(')')?;
            inner.parse::<VarId>().ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_proj_atoms_extracts_matching_predicate() {
        let atoms = vec!["proj(3)".to_string(), "edge(1,2)".to_string(), "proj(7)".to_string()];
        let vars = parse_proj_atoms(&atoms);
        assert_eq!(vars, [3, 7].into_iter().collect());
    }
}
