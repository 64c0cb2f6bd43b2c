//! Parsing of raw proposer output

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlgate_core::{Error, Result};

/// SQL and follow-up suggestions pulled out of a proposer response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub sql: String,
    pub suggestions: Vec<String>,
    /// Set by the proposer when it judges the statement to change data
    pub requires_confirmation: bool,
}

/// Parse the raw text a proposer returned.
///
/// Accepts a JSON object with `sql`, `suggestions` and
/// `requires_confirmation`, optionally wrapped in a Markdown code fence.
/// When `sql` itself holds a JSON object (encoded as a string or inline)
/// with those fields, one extra layer is unwrapped. Anything that is not
/// JSON is taken as a bare SQL statement.
pub fn parse_proposal(raw: &str) -> Result<Proposal> {
    let text = strip_code_fence(raw);

    let proposal = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(outer)) => from_object(&outer),
        Ok(Value::String(sql)) => Proposal {
            sql,
            ..Default::default()
        },
        _ => Proposal {
            sql: text.to_string(),
            ..Default::default()
        },
    };

    let sql = strip_code_fence(&proposal.sql).to_string();
    if sql.is_empty() {
        return Err(Error::upstream("proposer", "Proposal contained no SQL"));
    }

    Ok(Proposal { sql, ..proposal })
}

fn from_object(outer: &Map<String, Value>) -> Proposal {
    let mut proposal = Proposal {
        sql: String::new(),
        suggestions: suggestions(outer),
        requires_confirmation: flag(outer),
    };

    let inner = match outer.get("sql") {
        Some(Value::String(sql)) => match serde_json::from_str::<Value>(sql.trim()) {
            Ok(Value::Object(inner)) => Some(inner),
            _ => {
                proposal.sql = sql.clone();
                None
            }
        },
        Some(Value::Object(inner)) => Some(inner.clone()),
        _ => None,
    };

    if let Some(inner) = inner {
        proposal.sql = inner
            .get("sql")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if proposal.suggestions.is_empty() {
            proposal.suggestions = suggestions(&inner);
        }
        proposal.requires_confirmation |= flag(&inner);
    }

    proposal
}

fn suggestions(object: &Map<String, Value>) -> Vec<String> {
    match object.get("suggestions") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(single)) if !single.trim().is_empty() => vec![single.clone()],
        _ => Vec::new(),
    }
}

fn flag(object: &Map<String, Value>) -> bool {
    object
        .get("requires_confirmation")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Remove a surrounding Markdown code fence (```sql ... ```), if present.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // drop the language tag line
    match body.split_once('\n') {
        Some((_, code)) => code.trim(),
        None => body.trim(),
    }
}
