//! SQL text helpers

pub(crate) use sqlgate_dml::is_read;

/// Wrap a read so every row comes back as one JSON object.
pub(crate) fn wrap_read(sql: &str, max_rows: usize) -> String {
    let body = sql.trim().trim_end_matches(';').trim_end();
    format!("SELECT to_jsonb(q) AS row FROM ({}) q LIMIT {}", body, max_rows)
}

/// Double-quote an identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render an `information_schema.columns` type with its length or precision.
pub(crate) fn display_type(
    data_type: &str,
    char_len: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
) -> String {
    match (data_type, char_len, precision, scale) {
        (_, Some(len), _, _) => format!("{}({})", data_type, len),
        ("numeric", _, Some(p), Some(s)) => format!("numeric({},{})", p, s),
        _ => data_type.to_string(),
    }
}
