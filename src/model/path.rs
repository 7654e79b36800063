//! Slash-separated node path helpers
//!
//! Paths address nodes within one storage model: `Tables/T`,
//! `Tables/T/Columns/C`, `Sequences/S`. Segment names never contain `/`.

/// Path of a table node.
pub fn table_path(table: &str) -> String {
    format!("Tables/{}", table)
}

/// Path of a column node.
pub fn column_path(table: &str, column: &str) -> String {
    format!("Tables/{}/Columns/{}", table, column)
}

/// Path of a sequence node.
pub fn sequence_path(sequence: &str) -> String {
    format!("Sequences/{}", sequence)
}

/// Last segment of a path (the node's own name).
pub fn leaf_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// The `Tables/T` prefix of a path, if it addresses a table or something
/// inside one.
pub fn table_of(path: &str) -> Option<&str> {
    let mut iter = path.split('/');
    match (iter.next(), iter.next()) {
        (Some("Tables"), Some(table)) if !table.is_empty() => {
            Some(&path[..("Tables/".len() + table.len())])
        }
        _ => None,
    }
}

/// Rewrite the table prefix of `path` from `old_table_path` to
/// `new_table_path`, leaving other paths untouched.
pub fn rewrite_table(path: &str, old_table_path: &str, new_table_path: &str) -> String {
    match path.strip_prefix(old_table_path) {
        Some(rest) if rest.is_empty() => new_table_path.to_string(),
        Some(rest) if rest.starts_with('/') => format!("{}{}", new_table_path, rest),
        _ => path.to_string(),
    }
}
