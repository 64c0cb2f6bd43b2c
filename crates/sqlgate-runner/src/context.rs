//! Context assembly: short-term history plus long-term retrieval

use sqlgate_core::{Error, Result, RetrievalIndex};
use sqlgate_session::{HistoryEntry, UserSession};
use std::fmt::Write;
use std::sync::Arc;

/// Context handed to the proposer for one turn, with the confidence signal
/// used to decide whether to ask for clarification instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    pub history_text: String,
    /// Text of the best retrieval match, if any
    pub retrieved_text: String,
    /// Score of the best retrieval match; `0.0` without a match
    pub confidence: f32,
    /// The user had no session before this turn
    pub first_turn: bool,
}

impl AssembledContext {
    /// Whether the turn should ask a clarifying question. Never true on a
    /// user's first turn.
    pub fn needs_clarification(&self, threshold: f32) -> bool {
        !self.first_turn && self.confidence < threshold
    }
}

pub struct ContextAssembler {
    index: Arc<dyn RetrievalIndex>,
    top_k: usize,
    max_history: usize,
}

impl ContextAssembler {
    pub fn new(index: Arc<dyn RetrievalIndex>, top_k: usize, max_history: usize) -> Self {
        Self {
            index,
            top_k: top_k.max(1),
            max_history,
        }
    }

    /// Build the context for `request`. `session` is `None` when the user
    /// has never interacted before.
    pub async fn assemble(
        &self,
        session: Option<&UserSession>,
        request: &str,
    ) -> Result<AssembledContext> {
        let history_text = session
            .map(|s| render_history(&s.recent(self.max_history)))
            .unwrap_or_default();

        let matches = self
            .index
            .search(request, self.top_k)
            .await
            .map_err(|e| match e {
                Error::Upstream { .. } => e,
                other => Error::upstream("retrieval", other.to_string()),
            })?;

        let (retrieved_text, confidence) = matches
            .into_iter()
            .next()
            .map(|top| (top.text, top.score))
            .unwrap_or_default();

        tracing::debug!(
            first_turn = session.is_none(),
            confidence,
            "Assembled context"
        );

        Ok(AssembledContext {
            history_text,
            retrieved_text,
            confidence,
            first_turn: session.is_none(),
        })
    }
}

/// Render history entries, oldest first, as one summary block per turn.
pub fn render_history(entries: &[HistoryEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(out, "- request: {}", entry.query);
        let _ = writeln!(out, "  sql: {}", entry.sql);
        let _ = writeln!(
            out,
            "  executed: {}",
            if entry.executed() { "yes" } else { "no" }
        );
        if !entry.suggestions.is_empty() {
            let _ = writeln!(out, "  suggestions: {}", entry.suggestions.join("; "));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticIndex;

    #[test]
    fn test_render_history() {
        let entries = vec![
            HistoryEntry::executed_read("list countries", "SELECT * FROM country", vec![]),
            HistoryEntry::pending(
                "drop test",
                "DELETE FROM country WHERE code = 'TST'",
                vec!["Check first".to_string()],
            ),
        ];

        assert_eq!(
            render_history(&entries),
            "- request: list countries\n  sql: SELECT * FROM country\n  executed: yes\n\
             - request: drop test\n  sql: DELETE FROM country WHERE code = 'TST'\n  executed: no\n  \
             suggestions: Check first\n"
        );
    }

    #[test]
    fn test_clarification_gate() {
        let mut ctx = AssembledContext {
            confidence: 0.1,
            first_turn: true,
            ..Default::default()
        };
        assert!(!ctx.needs_clarification(0.35));

        ctx.first_turn = false;
        assert!(ctx.needs_clarification(0.35));

        ctx.confidence = 0.35;
        assert!(!ctx.needs_clarification(0.35));
    }

    #[tokio::test]
    async fn test_only_top_match_is_used() {
        let index = StaticIndex::new(vec![("best match", 0.9), ("runner up", 0.8)]);
        let assembler = ContextAssembler::new(Arc::new(index), 3, 10);

        let session = UserSession::new("u", 10);
        session.push(HistoryEntry::executed_read("q", "SELECT 1", vec![]));

        let ctx = assembler.assemble(Some(&session), "anything").await.unwrap();
        assert_eq!(ctx.retrieved_text, "best match");
        assert!((ctx.confidence - 0.9).abs() < f32::EPSILON);
        assert!(!ctx.first_turn);
        assert!(ctx.history_text.contains("SELECT 1"));
    }

    #[tokio::test]
    async fn test_no_match_means_zero_confidence() {
        let assembler = ContextAssembler::new(Arc::new(StaticIndex::new(vec![])), 3, 10);
        let ctx = assembler.assemble(None, "anything").await.unwrap();
        assert_eq!(ctx.confidence, 0.0);
        assert!(ctx.retrieved_text.is_empty());
        assert!(ctx.first_turn);
        assert!(ctx.history_text.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let assembler = ContextAssembler::new(Arc::new(StaticIndex::new(vec![])), 3, 2);
        let session = UserSession::new("u", 10);
        for i in 0..5 {
            session.push(HistoryEntry::executed_read("q", format!("SELECT {i}"), vec![]));
        }

        let ctx = assembler.assemble(Some(&session), "x").await.unwrap();
        assert!(!ctx.history_text.contains("SELECT 2"));
        assert!(ctx.history_text.contains("SELECT 3"));
        assert!(ctx.history_text.contains("SELECT 4"));
    }
}
