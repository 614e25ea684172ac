//! External tree-decomposer driver (spec §4.E): write the graph out in
//! `.gr` form, run the configured decomposer (htd by default), read its
//! `.td` answer back into a `TreeDecomp`.

use crate::cancel::CancelToken;
use crate::config::ExternalToolConfig;
use crate::dimacs::{read_td, write_gr};
use crate::error::{Error, Result};
use crate::extsolve;
use crate::treedecomp::TreeDecomp;

pub fn run(cfg: &ExternalToolConfig, num_vertices: u32, edges: &[(u32, u32)], cancel: &CancelToken) -> Result<TreeDecomp> {
    let gr = write_gr(num_vertices, edges);
    let args: Vec<String> = cfg.parameters.split_whitespace().map(String::from).collect();
    let outcome = extsolve::run_once(&cfg.path, &args, gr.as_bytes(), None, cancel)?;
    if outcome.status_code != Some(0) {
        return Err(Error::DecomposerFailed(format!(
            "exit code {:?}: {}",
            outcome.status_code,
            String::from_utf8_lossy(&outcome.stderr)
        )));
    }
    let text = String::from_utf8_lossy(&outcome.stdout);
    let parsed = read_td("<decomposer output>", &text)?;
    Ok(TreeDecomp::build(
        parsed.num_bags,
        parsed.tree_width,
        parsed.num_orig_vertices,
        parsed.root,
        &parsed.bags,
        &parsed.edges,
    ))
}
