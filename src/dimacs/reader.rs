//! DIMACS-family readers: CNF, GR, TD.
//!
//! All three formats share a preamble convention: blank lines and `c `
//! comments are skipped until a `p <fmt> …` (problem) or `s <fmt> …`
//! (pre-solved) line is found; everything after is the body. Malformed
//! preambles/bodies are logged and, where the original tooling exits the
//! whole process, turned into `Error::Parse` here instead.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use tracing::warn;

use crate::cnf::{Clause, VarId};
use crate::error::{Error, Result};

struct Preamble<'a> {
    kind: char,
    format: &'a str,
    fields: Vec<&'a str>,
    body_start: usize,
}

fn is_comment(line: &str) -> bool {
    line == "c" || line.starts_with("c ")
}

fn parse_preamble<'a>(file: &str, lines: &[&'a str]) -> Result<Preamble<'a>> {
    for (lineno, &line) in lines.iter().enumerate() {
        if line.starts_with("p ") || line.starts_with("s ") {
            let mut tokens = line.split_whitespace();
            let kind = tokens.next().unwrap().chars().next().unwrap();
            let format = tokens.next().ok_or_else(|| Error::Parse {
                file: file.to_string(),
                line: lineno,
                message: "missing format token in preamble line".to_string(),
            })?;
            let fields: Vec<&str> = tokens.collect();
            return Ok(Preamble {
                kind,
                format,
                fields,
                body_start: lineno + 1,
            });
        }
        if line.is_empty() || is_comment(line) {
            continue;
        }
        warn!(file, lineno, line, "invalid content in DIMACS preamble");
    }
    Err(Error::Parse {
        file: file.to_string(),
        line: lines.len(),
        message: "no problem/solution line found".to_string(),
    })
}

/// Parse `c ind`/`pv`/`a` directives anywhere in the comment stream into a
/// projected-variable set (spec §4.A).
fn parse_projection_directive(line: &str) -> Option<Vec<VarId>> {
    let rest = if let Some(r) = line.strip_prefix("c ind") {
        r
    } else if let Some(r) = line.strip_prefix("c p show") {
        r
    } else if let Some(r) = line.strip_prefix("pv") {
        r
    } else if let Some(r) = line.strip_prefix("a") {
        // bare "a ..." lines only count as a projection directive when every
        // remaining token parses as an integer; otherwise this is not ours.
        r
    } else {
        return None;
    };
    let mut vars = Vec::new();
    for tok in rest.split_whitespace() {
        match tok.parse::<i64>() {
            Ok(0) => break,
            Ok(v) if v > 0 => vars.push(v as VarId),
            _ => return None,
        }
    }
    Some(vars)
}

#[derive(Debug, Clone, Default)]
pub struct ParsedCnf {
    pub num_vars: u32,
    pub num_clauses: u32,
    pub clauses: Vec<Clause>,
    pub projected: BTreeSet<VarId>,
    /// Set when the file was pre-solved (`s <n>` preamble rather than `p cnf`).
    pub pre_solved_models: Option<i128>,
}

pub fn read_cnf(file: &str, text: &str) -> Result<ParsedCnf> {
    let lines: Vec<&str> = text.lines().collect();
    let preamble = parse_preamble(file, &lines)?;

    if preamble.kind == 's' {
        let models: i128 = preamble
            .fields
            .first()
            .or(Some(&preamble.format))
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Parse {
                file: file.to_string(),
                line: 0,
                message: "pre-solved line missing model count".to_string(),
            })?;
        return Ok(ParsedCnf {
            pre_solved_models: Some(models),
            ..Default::default()
        });
    }

    if preamble.format != "cnf" {
        return Err(Error::Parse {
            file: file.to_string(),
            line: 0,
            message: format!("expected cnf format, found '{}'", preamble.format),
        });
    }
    let num_vars: u32 = preamble.fields.first().and_then(|s| s.parse().ok()).ok_or_else(|| {
        Error::Parse {
            file: file.to_string(),
            line: 0,
            message: "missing num_vars in p cnf line".to_string(),
        }
    })?;
    let num_clauses: u32 = preamble.fields.get(1).and_then(|s| s.parse().ok()).ok_or_else(|| {
        Error::Parse {
            file: file.to_string(),
            line: 0,
            message: "missing num_clauses in p cnf line".to_string(),
        }
    })?;

    let mut clauses = Vec::new();
    let mut projected = BTreeSet::new();
    let mut maxvar = 0u32;

    let body = &lines[preamble.body_start..];
    let mut i = 0;
    while i < body.len() {
        let line = body[i];
        if line.is_empty() {
            i += 1;
            continue;
        }
        if let Some(vars) = parse_projection_directive(line) {
            projected.extend(vars);
            i += 1;
            continue;
        }
        if is_comment(line) {
            i += 1;
            continue;
        }

        let mut joined = line.to_string();
        let mut j = i;
        while !joined.trim_end().ends_with('0') {
            j += 1;
            if j >= body.len() {
                warn!(file, lineno = i, "clause not terminated with 0");
                joined.push_str(" 0");
                break;
            }
            joined.push(' ');
            joined.push_str(body[j]);
        }
        i = j + 1;

        let tokens: Vec<&str> = joined.split_whitespace().collect();
        let clause: Clause = tokens[..tokens.len() - 1]
            .iter()
            .map(|t| t.parse::<i64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Parse {
                file: file.to_string(),
                line: i,
                message: format!("invalid literal: {e}"),
            })?;
        for &lit in &clause {
            maxvar = maxvar.max(lit.unsigned_abs() as u32);
        }
        clauses.push(clause);
    }

    if maxvar != num_vars {
        warn!(file, maxvar, num_vars, "effective variable count mismatches preamble");
    }
    if clauses.len() as u32 != num_clauses {
        warn!(
            file,
            found = clauses.len(),
            num_clauses,
            "effective clause count mismatches preamble"
        );
    }
    let bad_projected: Vec<VarId> = projected.iter().copied().filter(|&v| v > num_vars).collect();
    for v in bad_projected {
        warn!(file, var = v, "projected variable outside declared range");
    }

    Ok(ParsedCnf {
        num_vars,
        num_clauses,
        clauses,
        projected,
        pre_solved_models: None,
    })
}

#[derive(Debug, Clone, Default)]
pub struct ParsedGraph {
    pub num_vertices: u32,
    pub edges: Vec<(u32, u32)>,
}

/// Shared body for `p tw`/`gr` and legacy `edge` formats: pairs of vertex
/// ids, one undirected edge per line (each stored once in both directions
/// to match the original adjacency-list convention, spec §4.A).
fn read_plain_graph(file: &str, text: &str, want_format: &[&str], edge_prefixed: bool) -> Result<ParsedGraph> {
    let lines: Vec<&str> = text.lines().collect();
    let preamble = parse_preamble(file, &lines)?;
    if !want_format.contains(&preamble.format) {
        return Err(Error::Parse {
            file: file.to_string(),
            line: 0,
            message: format!("expected one of {want_format:?}, found '{}'", preamble.format),
        });
    }
    let num_vertices: u32 = preamble.fields.first().and_then(|s| s.parse().ok()).unwrap_or(0);
    let num_edges: u32 = preamble.fields.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);

    let mut edges = Vec::new();
    for (lineno, &line) in lines[preamble.body_start..].iter().enumerate() {
        if line.is_empty() || is_comment(line) {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (a_tok, b_tok) = if edge_prefixed {
            if tokens.first() != Some(&"e") || tokens.len() != 3 {
                warn!(file, lineno, "invalid edge line");
                continue;
            }
            (tokens[1], tokens[2])
        } else {
            if tokens.len() != 2 {
                warn!(file, lineno, "expected exactly 2 vertices");
                continue;
            }
            (tokens[0], tokens[1])
        };
        let a: u32 = a_tok.parse().map_err(|_| Error::Parse {
            file: file.to_string(),
            line: lineno,
            message: "invalid vertex id".to_string(),
        })?;
        let b: u32 = b_tok.parse().map_err(|_| Error::Parse {
            file: file.to_string(),
            line: lineno,
            message: "invalid vertex id".to_string(),
        })?;
        edges.push((a, b));
        edges.push((b, a));
    }

    if edges.len() as u32 != num_edges * 2 {
        warn!(
            file,
            found = edges.len() / 2,
            num_edges,
            "effective edge count mismatches preamble"
        );
    }
    Ok(ParsedGraph { num_vertices, edges })
}

pub fn read_gr(file: &str, text: &str) -> Result<ParsedGraph> {
    read_plain_graph(file, text, &["tw", "gr"], false)
}

pub fn read_edge(file: &str, text: &str) -> Result<ParsedGraph> {
    read_plain_graph(file, text, &["edge"], true)
}

#[derive(Debug, Clone, Default)]
pub struct ParsedTd {
    pub num_bags: u32,
    pub tree_width: u32,
    pub num_orig_vertices: u32,
    pub root: u32,
    pub bags: BTreeMap<u32, Vec<u32>>,
    pub edges: Vec<(u32, u32)>,
}

pub fn read_td(file: &str, text: &str) -> Result<ParsedTd> {
    let lines: Vec<&str> = text.lines().collect();
    let preamble = parse_preamble(file, &lines)?;
    if preamble.format != "td" {
        return Err(Error::Parse {
            file: file.to_string(),
            line: 0,
            message: format!("expected td format, found '{}'", preamble.format),
        });
    }
    if preamble.kind != 's' {
        return Err(Error::Parse {
            file: file.to_string(),
            line: 0,
            message: "td files are read from their solution (s td ...) line".to_string(),
        });
    }
    let num_bags: u32 = preamble.fields.first().and_then(|s| s.parse().ok()).unwrap_or(0);
    let tree_width = preamble
        .fields
        .get(1)
        .and_then(|s| s.parse::<u32>().ok())
        .map(|w| w.saturating_sub(1))
        .unwrap_or(0);
    let num_orig_vertices: u32 = preamble.fields.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);

    let mut bags = BTreeMap::new();
    let mut edges = Vec::new();
    let mut root = 1u32;

    for (lineno, &line) in lines[preamble.body_start..].iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        if is_comment(line) {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() > 2 && tokens[1] == "r" {
                root = tokens[2].parse().unwrap_or(root);
            }
        } else if let Some(rest) = line.strip_prefix("b ") {
            let mut tokens = rest.split_whitespace();
            let id: u32 = tokens.next().and_then(|s| s.parse().ok()).ok_or_else(|| Error::Parse {
                file: file.to_string(),
                line: lineno,
                message: "bag line missing id".to_string(),
            })?;
            let vertices: Vec<u32> = tokens.filter_map(|t| t.parse().ok()).collect();
            bags.insert(id, vertices);
        } else {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != 2 {
                warn!(file, lineno, "expected exactly 2 vertices in td edge line");
                continue;
            }
            let a: u32 = tokens[0].parse().unwrap_or(0);
            let b: u32 = tokens[1].parse().unwrap_or(0);
            edges.push((a, b));
            edges.push((b, a));
        }
    }

    if bags.len() as u32 != num_bags {
        warn!(file, found = bags.len(), num_bags, "effective bag count mismatches preamble");
    }

    Ok(ParsedTd {
        num_bags,
        tree_width,
        num_orig_vertices,
        root,
        bags,
        edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_plain_cnf() {
        let text = "p cnf 3 2\n1 -2 0\n2 3 0\n";
        let cnf = read_cnf("t.cnf", text).unwrap();
        assert_eq!(cnf.num_vars, 3);
        assert_eq!(cnf.clauses, vec![vec![1, -2], vec![2, 3]]);
    }

    #[test]
    fn reads_ind_projection_directive() {
        let text = "p cnf 3 1\nc ind 1 2 0\n1 2 0\n";
        let cnf = read_cnf("t.cnf", text).unwrap();
        assert_eq!(cnf.projected, BTreeSet::from([1, 2]));
    }

    #[test]
    fn reads_pv_projection_directive() {
        let text = "p cnf 2 1\npv 1 0\n1 2 0\n";
        let cnf = read_cnf("t.cnf", text).unwrap();
        assert_eq!(cnf.projected, BTreeSet::from([1]));
    }

    #[test]
    fn reads_presolved_model_count() {
        let text = "s 4\n";
        let cnf = read_cnf("t.cnf", text).unwrap();
        assert_eq!(cnf.pre_solved_models, Some(4));
    }

    #[test]
    fn clause_spanning_multiple_lines_is_joined() {
        let text = "p cnf 2 1\n1\n2 0\n";
        let cnf = read_cnf("t.cnf", text).unwrap();
        assert_eq!(cnf.clauses, vec![vec![1, 2]]);
    }

    #[test]
    fn reads_td_with_root_marker() {
        let text = "s td 2 3 4\nc r 1\nb 1 1 2 3\nb 2 2 4\n1 2\n";
        let td = read_td("t.td", text).unwrap();
        assert_eq!(td.tree_width, 2);
        assert_eq!(td.root, 1);
        assert_eq!(td.bags.get(&1), Some(&vec![1, 2, 3]));
        assert_eq!(td.edges, vec![(1, 2), (2, 1)]);
    }

    #[test]
    fn reads_gr_graph() {
        let text = "p tw 3 2\n1 2\n2 3\n";
        let g = read_gr("t.gr", text).unwrap();
        assert_eq!(g.num_vertices, 3);
        assert_eq!(g.edges.len(), 4);
    }
}
