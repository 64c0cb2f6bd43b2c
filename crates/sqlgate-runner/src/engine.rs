use crate::context::ContextAssembler;
use crate::proposal::parse_proposal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlgate_core::{
    AuditEntry, AuditLog, AuditRow, ConversationConfig, Error, ErrorKind, ExecutionResult,
    Executor, ProposalRequest, Proposer, Result, RetrievalIndex,
};
use sqlgate_dml::{PatternValidator, StatementKind, StatementValidator, classify, is_read};
use sqlgate_schema::{SchemaMap, SchemaSource, load_schema};
use sqlgate_session::{HistoryEntry, InMemorySessionStore, SessionStore, UserSession};
use sqlgate_telemetry::{
    ProposalSpanAttributes, StatementSpanAttributes, trace_proposal_call,
    trace_statement_execution,
};
use std::sync::Arc;

const CLARIFICATION_MESSAGE: &str = "I'm not sure which data you mean. \
    Could you name the table or the values you are interested in?";

/// Result of a query turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Retrieval confidence was too low to propose SQL
    ClarificationNeeded { message: String, confidence: f32 },
    /// A statement that is not a plain read is waiting for the user's go-ahead
    ConfirmationNeeded {
        sql: String,
        suggestions: Vec<String>,
        message: String,
    },
    Executed {
        sql: String,
        results: Value,
        suggestions: Vec<String>,
        /// Audit log id; `None` when recording failed
        history_id: Option<i64>,
    },
}

/// Result of a confirm turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    Cancelled { message: String },
    Executed {
        sql: String,
        affected_rows: u64,
        history_id: Option<i64>,
    },
    Rejected { reason: ErrorKind, message: String },
}

impl ConfirmOutcome {
    fn rejected(err: &Error) -> Self {
        let message = match err {
            Error::NotFound(m)
            | Error::ConflictingState(m)
            | Error::ValidationFailure(m)
            | Error::MalformedInput(m) => m.clone(),
            other => other.to_string(),
        };
        ConfirmOutcome::Rejected {
            reason: err.kind(),
            message,
        }
    }
}

/// Drives query and confirm turns for every user.
///
/// Reads run as soon as they are proposed. Mutating statements are parked in
/// the user's session and only run after an explicit confirm, re-validated
/// against the schema as it is at confirmation time.
pub struct ConversationEngine {
    schema_source: Arc<dyn SchemaSource>,
    proposer: Arc<dyn Proposer>,
    executor: Arc<dyn Executor>,
    audit: Arc<dyn AuditLog>,
    index: Arc<dyn RetrievalIndex>,
    sessions: Arc<dyn SessionStore>,
    validator: Arc<dyn StatementValidator>,
    assembler: ContextAssembler,
    config: ConversationConfig,
}

impl ConversationEngine {
    pub fn builder() -> ConversationEngineBuilder {
        ConversationEngineBuilder::new()
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn index(&self) -> &Arc<dyn RetrievalIndex> {
        &self.index
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    /// Handle one natural-language request from `user_id` against `db_name`.
    pub async fn query(&self, user_id: &str, db_name: &str, request: &str) -> Result<QueryOutcome> {
        let request = request.trim();
        if request.is_empty() {
            return Err(Error::MalformedInput("Request must not be empty.".to_string()));
        }

        let schema = load_schema(self.schema_source.as_ref(), db_name).await?;

        let existing = match self.sessions.get(user_id).await {
            Ok(session) => Some(session),
            Err(Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let context = self.assembler.assemble(existing.as_deref(), request).await?;
        if context.needs_clarification(self.config.clarification_threshold) {
            tracing::info!(
                user_id = %user_id,
                confidence = context.confidence,
                threshold = self.config.clarification_threshold,
                "Asking for clarification"
            );
            return Ok(QueryOutcome::ClarificationNeeded {
                message: CLARIFICATION_MESSAGE.to_string(),
                confidence: context.confidence,
            });
        }

        let proposal_request = ProposalRequest {
            schema_text: schema.prompt_text(),
            history: context.history_text,
            context: context.retrieved_text,
            request: request.to_string(),
        };
        let raw = self.propose(user_id, db_name, &proposal_request).await?;
        let proposal = parse_proposal(&raw)?;

        let (session, created) = self.sessions.get_or_create(user_id).await?;
        if created {
            tracing::debug!(user_id = %user_id, "Started session");
        }

        if proposal.requires_confirmation || !is_read(&proposal.sql) {
            let message = self.precheck(&proposal.sql, &schema);
            tracing::info!(user_id = %user_id, sql = %proposal.sql, "Statement awaiting confirmation");

            session.push(HistoryEntry::pending(
                request,
                proposal.sql.clone(),
                proposal.suggestions.clone(),
            ));
            return Ok(QueryOutcome::ConfirmationNeeded {
                sql: proposal.sql,
                suggestions: proposal.suggestions,
                message,
            });
        }

        let result = self
            .run_statement(user_id, db_name, &proposal.sql, "read")
            .await?;
        session.push(HistoryEntry::executed_read(
            request,
            proposal.sql.clone(),
            proposal.suggestions.clone(),
        ));

        let results = result.to_json();
        let history_id = self
            .remember(user_id, db_name, request, &proposal.sql, results.clone())
            .await;

        Ok(QueryOutcome::Executed {
            sql: proposal.sql,
            results,
            suggestions: proposal.suggestions,
            history_id,
        })
    }

    /// Confirm or cancel a statement previously returned as
    /// [`QueryOutcome::ConfirmationNeeded`]. `sql` must match it exactly.
    pub async fn confirm(
        &self,
        user_id: &str,
        db_name: &str,
        sql: &str,
        confirm: bool,
    ) -> Result<ConfirmOutcome> {
        if !confirm {
            tracing::info!(user_id = %user_id, "Statement cancelled");
            return Ok(ConfirmOutcome::Cancelled {
                message: "Statement cancelled. Nothing was executed.".to_string(),
            });
        }

        let session = match self.sessions.get(user_id).await {
            Ok(session) => session,
            Err(e @ Error::NotFound(_)) => return Ok(ConfirmOutcome::rejected(&e)),
            Err(e) => return Err(e),
        };

        let claimed = match session.claim(sql) {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::info!(user_id = %user_id, error = %e, "Confirm rejected");
                return Ok(ConfirmOutcome::rejected(&e));
            }
        };

        // the session lock is released; the claim keeps other confirms out
        let schema = match load_schema(self.schema_source.as_ref(), db_name).await {
            Ok(schema) => schema,
            Err(e) => {
                session.release(claimed.id);
                return Err(e);
            }
        };

        let validation = self.validator.validate(&claimed.sql, &schema);
        if !validation.valid {
            session.release(claimed.id);
            tracing::info!(user_id = %user_id, reason = %validation.message, "Statement failed validation");
            return Ok(ConfirmOutcome::Rejected {
                reason: ErrorKind::ValidationFailure,
                message: validation.message,
            });
        }

        let result = match self
            .run_statement(user_id, db_name, &validation.sql, "write")
            .await
        {
            Ok(result) => result,
            Err(e) => {
                session.release(claimed.id);
                return Err(e);
            }
        };

        if !session.complete(claimed.id) {
            tracing::warn!(user_id = %user_id, "Executed statement was evicted from history");
        }

        let affected_rows = match &result {
            ExecutionResult::Affected(n) => *n,
            ExecutionResult::Rows(rows) => rows.len() as u64,
        };
        let history_id = self
            .remember(user_id, db_name, &claimed.query, &validation.sql, result.to_json())
            .await;

        Ok(ConfirmOutcome::Executed {
            sql: validation.sql,
            affected_rows,
            history_id,
        })
    }

    /// In-memory turn history of `user_id`, oldest first.
    pub async fn session_entries(&self, user_id: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self.sessions.get(user_id).await?.snapshot())
    }

    /// Most recent audit records of `user_id` in `db_name`, newest first.
    pub async fn history(&self, user_id: &str, db_name: &str, limit: i64) -> Result<Vec<AuditRow>> {
        self.audit.fetch(user_id, db_name, limit).await
    }

    /// Existing session handle, if any.
    pub async fn session(&self, user_id: &str) -> Option<Arc<UserSession>> {
        self.sessions.get(user_id).await.ok()
    }

    async fn propose(
        &self,
        user_id: &str,
        db_name: &str,
        request: &ProposalRequest,
    ) -> Result<String> {
        let result = self
            .proposer
            .propose(request)
            .await
            .map_err(|e| match e {
                Error::Upstream { .. } => e,
                other => Error::upstream(self.proposer.name(), other.to_string()),
            });

        let (response, outcome) = match &result {
            Ok(text) => (text.clone(), "ok"),
            Err(e) => (e.to_string(), "error"),
        };
        trace_proposal_call(&ProposalSpanAttributes {
            proposer: self.proposer.name().to_string(),
            user_id: user_id.to_string(),
            db_name: db_name.to_string(),
            request: request.request.clone(),
            response,
            outcome: outcome.to_string(),
        });

        result
    }

    async fn run_statement(
        &self,
        user_id: &str,
        db_name: &str,
        sql: &str,
        kind: &'static str,
    ) -> Result<ExecutionResult> {
        let result = self.executor.execute(db_name, sql).await;

        let (rows, outcome) = match &result {
            Ok(ExecutionResult::Rows(rows)) => (Some(rows.len() as u64), "ok".to_string()),
            Ok(ExecutionResult::Affected(n)) => (Some(*n), "ok".to_string()),
            Err(e) => (None, e.to_string()),
        };
        trace_statement_execution(&StatementSpanAttributes {
            user_id: user_id.to_string(),
            db_name: db_name.to_string(),
            sql: sql.to_string(),
            kind,
            rows,
            outcome,
        });

        result
    }

    /// Validator dry run shown alongside a confirmation prompt.
    fn precheck(&self, sql: &str, schema: &SchemaMap) -> String {
        match classify(sql) {
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete => {
                let check = self.validator.validate(sql, schema);
                if check.valid {
                    "This statement modifies data. Confirm to execute it.".to_string()
                } else {
                    format!(
                        "This statement modifies data. Confirm to execute it. \
                         Validation currently reports: {}",
                        check.message
                    )
                }
            }
            // confirm re-validates, and only the three DML forms can pass
            _ => "This statement cannot be executed through confirmation. \
                  Only single INSERT, UPDATE or DELETE statements can be confirmed."
                .to_string(),
        }
    }

    /// Write the audit record and the long-term memory document. Failures
    /// are logged; the statement has already run.
    async fn remember(
        &self,
        user_id: &str,
        db_name: &str,
        request: &str,
        sql: &str,
        result: Value,
    ) -> Option<i64> {
        let entry = AuditEntry {
            user_id: user_id.to_string(),
            db_name: db_name.to_string(),
            request: request.to_string(),
            sql: sql.to_string(),
            result,
        };

        let history_id = match self.audit.record(entry).await {
            Ok(record) => Some(record.id),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to record audit entry");
                None
            }
        };

        if let Err(e) = self.index.add_document(&memory_document(request, sql)).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to add memory document");
        }

        history_id
    }
}

fn memory_document(request: &str, sql: &str) -> String {
    format!("Request: {}\nSQL: {}", request, sql)
}

pub struct ConversationEngineBuilder {
    schema_source: Option<Arc<dyn SchemaSource>>,
    proposer: Option<Arc<dyn Proposer>>,
    executor: Option<Arc<dyn Executor>>,
    audit: Option<Arc<dyn AuditLog>>,
    index: Option<Arc<dyn RetrievalIndex>>,
    sessions: Option<Arc<dyn SessionStore>>,
    validator: Option<Arc<dyn StatementValidator>>,
    config: ConversationConfig,
}

impl ConversationEngineBuilder {
    pub fn new() -> Self {
        Self {
            schema_source: None,
            proposer: None,
            executor: None,
            audit: None,
            index: None,
            sessions: None,
            validator: None,
            config: ConversationConfig::default(),
        }
    }

    pub fn schema_source(mut self, source: Arc<dyn SchemaSource>) -> Self {
        self.schema_source = Some(source);
        self
    }

    pub fn proposer(mut self, proposer: Arc<dyn Proposer>) -> Self {
        self.proposer = Some(proposer);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn retrieval_index(mut self, index: Arc<dyn RetrievalIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Defaults to an [`InMemorySessionStore`] bounded by `max_history`.
    pub fn session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Defaults to [`PatternValidator`].
    pub fn validator(mut self, validator: Arc<dyn StatementValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn config(mut self, config: ConversationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<ConversationEngine> {
        let schema_source = self
            .schema_source
            .ok_or_else(|| Error::config_error("Schema source is required"))?;
        let proposer = self
            .proposer
            .ok_or_else(|| Error::config_error("Proposer is required"))?;
        let executor = self
            .executor
            .ok_or_else(|| Error::config_error("Executor is required"))?;
        let audit = self
            .audit
            .ok_or_else(|| Error::config_error("Audit log is required"))?;
        let index = self
            .index
            .ok_or_else(|| Error::config_error("Retrieval index is required"))?;

        let sessions = self.sessions.unwrap_or_else(|| {
            Arc::new(InMemorySessionStore::new(self.config.max_history))
        });
        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(PatternValidator));
        let assembler = ContextAssembler::new(
            index.clone(),
            self.config.retrieval_top_k,
            self.config.max_history,
        );

        Ok(ConversationEngine {
            schema_source,
            proposer,
            executor,
            audit,
            index,
            sessions,
            validator,
            assembler,
            config: self.config,
        })
    }
}

impl Default for ConversationEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
