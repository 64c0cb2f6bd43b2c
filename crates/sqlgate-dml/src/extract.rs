//! Pattern-based structural extraction for single-row DML.
//!
//! This is deliberately not a SQL parser. It understands quoting and
//! parenthesis nesting well enough to split lists and locate clauses, and
//! nothing more.

use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z_]+)").expect("valid regex"));
static INSERT_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*INSERT\s+INTO\s+([^\s(]+)").expect("valid regex"));
static UPDATE_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*UPDATE\s+([^\s(]+)").expect("valid regex"));
static DELETE_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*DELETE\s+FROM\s+([^\s(]+)").expect("valid regex"));
static UPDATE_SET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*UPDATE\s+[^\s(]+\s+SET\s+").expect("valid regex"));
static VALUES_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*VALUES\s*").expect("valid regex"));

/// Statement kinds the validator distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
    Other,
}

/// Upper-cased first keyword of a statement, if any.
pub fn leading_keyword(sql: &str) -> Option<String> {
    LEADING_KEYWORD
        .captures(sql)
        .map(|c| c[1].to_ascii_uppercase())
}

pub fn classify(sql: &str) -> StatementKind {
    match leading_keyword(sql).as_deref() {
        Some("INSERT") => StatementKind::Insert,
        Some("UPDATE") => StatementKind::Update,
        Some("DELETE") => StatementKind::Delete,
        _ => StatementKind::Other,
    }
}

/// Lower-cased target table of an INSERT, UPDATE or DELETE.
pub fn target_table(sql: &str, kind: StatementKind) -> Option<String> {
    let pattern = match kind {
        StatementKind::Insert => &INSERT_TABLE,
        StatementKind::Update => &UPDATE_TABLE,
        StatementKind::Delete => &DELETE_TABLE,
        StatementKind::Other => return None,
    };
    pattern.captures(sql).map(|c| c[1].to_lowercase())
}

/// Columns and values of a single-row `INSERT INTO t (...) VALUES (...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertParts<'a> {
    pub columns: Vec<&'a str>,
    pub values: Vec<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertShapeError {
    /// More than one parenthesized row after VALUES
    MultiRow,
    /// Anything else the pattern does not recognize
    Unrecognized,
}

pub fn insert_parts(sql: &str) -> Result<InsertParts<'_>, InsertShapeError> {
    let head = INSERT_TABLE
        .find(sql)
        .ok_or(InsertShapeError::Unrecognized)?;
    let rest = sql[head.end()..].trim_start();

    let (columns, after_columns) =
        parenthesized(rest).ok_or(InsertShapeError::Unrecognized)?;
    let values_kw = VALUES_KEYWORD
        .find(after_columns)
        .ok_or(InsertShapeError::Unrecognized)?;
    let (values, tail) =
        parenthesized(&after_columns[values_kw.end()..]).ok_or(InsertShapeError::Unrecognized)?;

    let tail = tail.trim();
    if tail.starts_with(',') {
        return Err(InsertShapeError::MultiRow);
    }
    if !tail.is_empty() {
        return Err(InsertShapeError::Unrecognized);
    }

    let columns: Vec<&str> = split_top_level(columns, ',')
        .into_iter()
        .map(str::trim)
        .collect();
    if columns.iter().any(|c| c.is_empty()) {
        return Err(InsertShapeError::Unrecognized);
    }
    let values = split_top_level(values, ',')
        .into_iter()
        .map(str::trim)
        .collect();

    Ok(InsertParts { columns, values })
}

/// Top-level clauses between `SET` and `WHERE` that the rewriter cannot keep.
const UPDATE_UNSUPPORTED_CLAUSES: [&str; 4] = ["RETURNING", "FROM", "ORDER", "LIMIT"];

/// Assignment list and verbatim where clause of `UPDATE t SET ... [WHERE ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateParts<'a> {
    pub assignments: Vec<&'a str>,
    pub where_clause: Option<&'a str>,
}

pub fn update_parts(sql: &str) -> Option<UpdateParts<'_>> {
    let head = UPDATE_SET.find(sql)?;
    let rest = &sql[head.end()..];

    let (set_text, where_clause) = match find_keyword(rest, "WHERE") {
        Some(idx) => (&rest[..idx], Some(rest[idx..].trim())),
        None => (rest, None),
    };
    if UPDATE_UNSUPPORTED_CLAUSES
        .iter()
        .any(|kw| find_keyword(set_text, kw).is_some())
    {
        return None;
    }

    let assignments: Vec<&str> = split_top_level(set_text, ',')
        .into_iter()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect();
    if assignments.is_empty() {
        return None;
    }

    Some(UpdateParts {
        assignments,
        where_clause,
    })
}

/// Split on `sep` where it is outside quotes and parentheses.
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut scanner = Scanner::default();
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if scanner.at_top_level() && c == sep {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
            continue;
        }
        scanner.feed(c);
    }
    parts.push(&text[start..]);
    parts
}

/// Non-empty top-level statements of a `;`-separated script.
pub fn split_statements(sql: &str) -> Vec<&str> {
    split_top_level(sql, ';')
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Byte offset of the first top-level occurrence of `keyword` as a whole
/// word, compared case-insensitively.
pub fn find_keyword(text: &str, keyword: &str) -> Option<usize> {
    let mut scanner = Scanner::default();
    let bytes = text.as_bytes();

    for (i, c) in text.char_indices() {
        if scanner.at_top_level()
            && text.len() - i >= keyword.len()
            && text.is_char_boundary(i + keyword.len())
            && text[i..i + keyword.len()].eq_ignore_ascii_case(keyword)
        {
            let before_ok = i == 0 || !is_word_byte(bytes[i - 1]);
            let after = i + keyword.len();
            let after_ok = after == bytes.len() || !is_word_byte(bytes[after]);
            if before_ok && after_ok {
                return Some(i);
            }
        }
        scanner.feed(c);
    }
    None
}

/// Whether `keyword` occurs anywhere outside quoted text as a whole word.
pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    let mut scanner = Scanner::default();
    let bytes = text.as_bytes();

    for (i, c) in text.char_indices() {
        if !scanner.in_quotes()
            && text.len() - i >= keyword.len()
            && text.is_char_boundary(i + keyword.len())
            && text[i..i + keyword.len()].eq_ignore_ascii_case(keyword)
        {
            let after = i + keyword.len();
            if (i == 0 || !is_word_byte(bytes[i - 1]))
                && (after == bytes.len() || !is_word_byte(bytes[after]))
            {
                return true;
            }
        }
        scanner.feed(c);
    }
    false
}

/// Split `text` (which must start with `(`) into the inside of its first
/// balanced group and whatever follows it.
fn parenthesized(text: &str) -> Option<(&str, &str)> {
    if !text.starts_with('(') {
        return None;
    }
    let mut scanner = Scanner::default();
    for (i, c) in text.char_indices() {
        scanner.feed(c);
        if scanner.at_top_level() && c == ')' {
            return Some((&text[1..i], &text[i + 1..]));
        }
    }
    None
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Tracks quoting and nesting while walking a statement.
///
/// A doubled quote inside a quoted section closes and reopens it, which
/// leaves the state unchanged, so SQL's `''` escape needs no special case.
#[derive(Default)]
struct Scanner {
    quote: Option<char>,
    depth: usize,
}

impl Scanner {
    fn feed(&mut self, c: char) {
        match (self.quote, c) {
            (Some(q), c) if c == q => self.quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => self.quote = Some(c),
            (None, '(') => self.depth += 1,
            (None, ')') => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
    }

    fn in_quotes(&self) -> bool {
        self.quote.is_some()
    }

    fn at_top_level(&self) -> bool {
        self.quote.is_none() && self.depth == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("  insert into t values (1)"), StatementKind::Insert);
        assert_eq!(classify("UPDATE t SET a = 1"), StatementKind::Update);
        assert_eq!(classify("delete from t"), StatementKind::Delete);
        assert_eq!(classify("SELECT * FROM t"), StatementKind::Other);
        assert_eq!(classify(""), StatementKind::Other);
    }

    #[test]
    fn test_target_table() {
        assert_eq!(
            target_table("INSERT INTO Country(code) VALUES ('x')", StatementKind::Insert),
            Some("country".to_string())
        );
        assert_eq!(
            target_table("update  Public.City set a = 1", StatementKind::Update),
            Some("public.city".to_string())
        );
        assert_eq!(
            target_table("DELETE FROM t WHERE id = 1", StatementKind::Delete),
            Some("t".to_string())
        );
        assert_eq!(target_table("DELETE t", StatementKind::Delete), None);
    }

    #[test]
    fn test_insert_parts_respects_quotes_and_calls() {
        let parts = insert_parts(
            "INSERT INTO t (a, b, c) VALUES ('x, y', now(), 'it''s')",
        )
        .unwrap();
        assert_eq!(parts.columns, vec!["a", "b", "c"]);
        assert_eq!(parts.values, vec!["'x, y'", "now()", "'it''s'"]);
    }

    #[test]
    fn test_insert_parts_rejects_multi_row() {
        assert_eq!(
            insert_parts("INSERT INTO t (a) VALUES (1), (2)"),
            Err(InsertShapeError::MultiRow)
        );
    }

    #[test]
    fn test_insert_parts_rejects_unknown_shapes() {
        assert_eq!(
            insert_parts("INSERT INTO t VALUES (1)"),
            Err(InsertShapeError::Unrecognized)
        );
        assert_eq!(
            insert_parts("INSERT INTO t (a) SELECT a FROM u"),
            Err(InsertShapeError::Unrecognized)
        );
        assert_eq!(
            insert_parts("INSERT INTO t (a) VALUES (1) RETURNING a"),
            Err(InsertShapeError::Unrecognized)
        );
        assert_eq!(
            insert_parts("INSERT INTO t (a) VALUES (1"),
            Err(InsertShapeError::Unrecognized)
        );
    }

    #[test]
    fn test_update_parts() {
        let parts =
            update_parts("UPDATE t SET a = 1, b = 'where, here' WHERE id = 3").unwrap();
        assert_eq!(parts.assignments, vec!["a = 1", "b = 'where, here'"]);
        assert_eq!(parts.where_clause, Some("WHERE id = 3"));

        let parts = update_parts("update t set a = 1").unwrap();
        assert_eq!(parts.where_clause, None);

        assert!(update_parts("UPDATE t WHERE id = 1").is_none());
    }

    #[test]
    fn test_update_trailing_clauses_are_not_assignments() {
        assert!(update_parts("UPDATE country SET population = 5 RETURNING code").is_none());
        assert!(update_parts("UPDATE t SET a = u.a FROM u WHERE t.id = u.id").is_none());
        assert!(update_parts("UPDATE t SET a = 1 ORDER BY id").is_none());

        let parts = update_parts("UPDATE t SET note = 'from returning' WHERE id = 1").unwrap();
        assert_eq!(parts.assignments, vec!["note = 'from returning'"]);
    }

    #[test]
    fn test_update_where_inside_subquery_is_not_the_clause() {
        let parts = update_parts(
            "UPDATE t SET a = (SELECT max(x) FROM u WHERE u.k = 1) where id = 2",
        )
        .unwrap();
        assert_eq!(parts.assignments, vec!["a = (SELECT max(x) FROM u WHERE u.k = 1)"]);
        assert_eq!(parts.where_clause, Some("where id = 2"));
    }

    #[test]
    fn test_find_keyword_whole_word() {
        assert_eq!(find_keyword("somewhere = 1 WHERE x", "WHERE"), Some(14));
        assert_eq!(find_keyword("a = 'WHERE'", "WHERE"), None);
    }

    #[test]
    fn test_contains_keyword_ignores_quotes() {
        assert!(contains_keyword("WITH x AS (DELETE FROM t RETURNING *) SELECT 1", "DELETE"));
        assert!(!contains_keyword("SELECT 'delete me' FROM t", "DELETE"));
        assert!(!contains_keyword("SELECT deleted FROM t", "DELETE"));
    }

    #[test]
    fn test_split_statements() {
        assert_eq!(split_statements("DELETE FROM t;"), vec!["DELETE FROM t"]);
        assert_eq!(
            split_statements("DELETE FROM t; DROP TABLE u"),
            vec!["DELETE FROM t", "DROP TABLE u"]
        );
        assert_eq!(
            split_statements("INSERT INTO t (a) VALUES ('x;y')"),
            vec!["INSERT INTO t (a) VALUES ('x;y')"]
        );
    }
}
