use chrono::{DateTime, Utc};

use crate::db::error::{DbError, DbResult};

/// Quote a table or column name, rejecting anything that is not a plain identifier.
pub fn quote_ident(name: &str) -> DbResult<String> {
    if crate::config::is_valid_identifier(name) {
        Ok(format!("\"{name}\""))
    } else {
        Err(DbError::Validation(format!("Invalid identifier: {name:?}")))
    }
}

/// Timestamp text as stored in `LastEdited` columns.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `?, ?, ?` for `n` parameters.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
