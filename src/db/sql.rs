//! Typed SQL statement builder.
//!
//! Every statement goes through `quote_ident` so column/table names are
//! never interpolated raw; values go through `postgres` bind parameters.
//! `replace_dynamic_tabs` reproduces the reference gateway's trick of
//! writing table names literally into a hand-assembled subquery and then
//! rewriting them to the problem-prefixed name after the fact, which is
//! how per-bag view definitions reference sibling `td_node_<n>` tables
//! without the caller needing to know the active prefix.

use regex::Regex;

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        ColumnDef {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

pub fn create_table(table: &str, columns: &[ColumnDef], if_not_exists: bool) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type))
        .collect();
    format!(
        "CREATE TABLE {}{} ({})",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        quote_ident(table),
        cols.join(", ")
    )
}

pub fn drop_table(table: &str, if_exists: bool) -> String {
    format!(
        "DROP TABLE {}{}",
        if if_exists { "IF EXISTS " } else { "" },
        quote_ident(table)
    )
}

pub fn create_unique_index(index_name: &str, table: &str, columns: &[String]) -> String {
    if columns.is_empty() {
        // no columns to key on (an empty bag): nothing to deduplicate.
        return "SELECT 1 WHERE FALSE".to_string();
    }
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_ident(index_name),
        quote_ident(table),
        cols.join(", ")
    )
}

pub fn create_view(view: &str, select: &str) -> String {
    format!("CREATE VIEW {} AS {select}", quote_ident(view))
}

pub fn insert(table: &str, columns: &[&str], returning: Option<&str>) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    let mut q = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        cols.join(", "),
        placeholders.join(", ")
    );
    if let Some(r) = returning {
        q.push_str(&format!(" RETURNING {}", quote_ident(r)));
    }
    q
}

pub fn insert_select(table: &str, select: &str) -> String {
    format!("INSERT INTO {} {select}", quote_ident(table))
}

/// `UPSERT`-merge into a single-row aggregate column: used by the DP
/// transition builder for `model_count = GREATEST(existing, new)` style
/// conflict resolution when two children's candidate rows collapse onto
/// the same key.
pub fn upsert_merge(table: &str, key_columns: &[&str], merge_column: &str, merge_expr: &str) -> String {
    upsert_merge_many(table, key_columns, &[(merge_column, merge_expr)])
}

/// Like `upsert_merge`, but for variants whose bag tables carry more than
/// one extra column (none currently do, but the iterative merge path
/// shouldn't silently drop a second column if one shows up later).
pub fn upsert_merge_many(table: &str, key_columns: &[&str], merges: &[(&str, &str)]) -> String {
    let _ = table;
    let sets: Vec<String> = merges.iter().map(|(col, expr)| format!("{} = {}", quote_ident(col), expr)).collect();
    format!(
        "ON CONFLICT ({}) DO UPDATE SET {}",
        key_columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
        sets.join(", ")
    )
}

/// Plain conflict target with nothing to merge: used by the iterative
/// insert path for bags with no extra columns (e.g. `sat`), where a
/// repeated candidate row carries no information beyond its key already
/// being present.
pub fn on_conflict_do_nothing(key_columns: &[&str]) -> String {
    format!(
        "ON CONFLICT ({}) DO NOTHING",
        key_columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
    )
}

pub fn update(table: &str, assignments: &[(&str, &str)], where_clause: Option<&str>, returning: Option<&str>) -> String {
    let sets: Vec<String> = assignments
        .iter()
        .map(|(col, expr)| format!("{} = {}", quote_ident(col), expr))
        .collect();
    let mut q = format!("UPDATE {} SET {}", quote_ident(table), sets.join(", "));
    if let Some(w) = where_clause {
        q.push_str(&format!(" WHERE {w}"));
    }
    if let Some(r) = returning {
        q.push_str(&format!(" RETURNING {}", quote_ident(r)));
    }
    q
}

/// Substitute bare occurrences of each name in `tables` for its
/// praefixed identifier, leaving word-boundary-adjacent text untouched —
/// ports the reference gateway's regex rewrite of hand-assembled SQL
/// fragments.
pub fn replace_dynamic_tabs(query: &str, tables: &[String], praefix: &str) -> String {
    let mut out = query.to_string();
    for t in tables {
        let pattern = format!(r"(\W|^){}(\W|$)", regex::escape(t));
        let re = Regex::new(&pattern).expect("valid dynamic-table pattern");
        let replacement = format!("${{1}}{}${{2}}", quote_ident(&format!("{praefix}{t}")));
        out = re.replace_all(&out, replacement.as_str()).to_string();
    }
    out
}

pub fn td_node_table(node_id: u32) -> String {
    format!("td_node_{node_id}")
}

pub fn td_node_assignment_view(node_id: u32) -> String {
    format!("td_n_{node_id}_assignment")
}

/// Raw (ungrouped) candidate rows for a bag, used only by the iterative
/// mode's per-round sampling (spec §4.F/§4.G); the default exact mode
/// never creates this relation.
pub fn td_node_candidates_view(node_id: u32) -> String {
    format!("td_n_{node_id}_candidates")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_quotes_identifiers() {
        let cols = vec![ColumnDef::new("v1", "BOOLEAN"), ColumnDef::new("model_count", "NUMERIC")];
        let q = create_table("td_node_3", &cols, true);
        assert_eq!(q, "CREATE TABLE IF NOT EXISTS \"td_node_3\" (\"v1\" BOOLEAN, \"model_count\" NUMERIC)");
    }

    #[test]
    fn replace_dynamic_tabs_rewrites_bare_table_names() {
        let q = "SELECT * FROM td_node_3 t3, td_node_4 t4";
        let out = replace_dynamic_tabs(q, &["td_node_3".to_string(), "td_node_4".to_string()], "p1_");
        assert_eq!(out, "SELECT * FROM \"p1_td_node_3\" t3, \"p1_td_node_4\" t4");
    }

    #[test]
    fn upsert_merge_uses_greatest_style_expr() {
        let q = upsert_merge("td_node_1", &["v1", "v2"], "model_count", "GREATEST(td_node_1.model_count, EXCLUDED.model_count)");
        assert!(q.starts_with("ON CONFLICT (\"v1\", \"v2\")"));
    }
}
