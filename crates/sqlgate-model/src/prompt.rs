//! Prompt rendering shared by all proposers

use sqlgate_core::ProposalRequest;

/// Standing instructions sent ahead of every request.
pub const SYSTEM_INSTRUCTION: &str = "\
You convert natural-language requests into a single valid PostgreSQL statement.
Compare strings case-insensitively with LOWER(TRIM(column)).
Prefer table-qualified column names and joins where the schema supports them.
Only reference columns that exist on the table they are used with.
In follow-up requests, refine the most recent SQL instead of starting over.
Use the sample values in the context to match strings exactly as stored.
Use LIMIT when the user asks for a number of results.
Use single quotes for string literals.
Answer with a JSON object only:
{\"sql\": \"<statement>\", \"suggestions\": [\"<short follow-up>\"], \"requires_confirmation\": <true if the statement changes data>}";

/// Render the user turn of the prompt.
pub fn render_prompt(request: &ProposalRequest) -> String {
    let history = or_none(&request.history);
    let context = or_none(&request.context);

    format!(
        "Database schema:\n{}\n\n\
         Recent requests and statements:\n{}\n\n\
         Related context:\n{}\n\n\
         User request: {}",
        request.schema_text.trim(),
        history,
        context,
        request.request.trim()
    )
}

fn or_none(text: &str) -> &str {
    match text.trim() {
        "" => "(none)",
        trimmed => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_prompt_sections() {
        let prompt = render_prompt(&ProposalRequest {
            schema_text: "country(code CHAR(3), name TEXT)".to_string(),
            history: String::new(),
            context: "Table country".to_string(),
            request: " list countries ".to_string(),
        });

        assert!(prompt.starts_with("Database schema:\ncountry(code CHAR(3), name TEXT)"));
        assert!(prompt.contains("Recent requests and statements:\n(none)"));
        assert!(prompt.contains("Related context:\nTable country"));
        assert!(prompt.ends_with("User request: list countries"));
    }
}
