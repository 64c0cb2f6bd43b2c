//! Core traits and types for sqlgate
//!
//! This crate provides the error taxonomy, configuration, and the traits the
//! conversation engine uses to reach its external collaborators.

pub mod config;
pub mod error;
pub mod traits;

// Re-exports
pub use config::{
    ConversationConfig, DatabaseConfig, GateConfig, ModelConfig, ObservabilityConfig,
    RetrievalConfig, ServerConfig,
};
pub use error::{Error, ErrorKind, Result};
pub use traits::{
    AuditEntry, AuditLog, AuditRecord, AuditRow, ExecutionResult, Executor, ProposalRequest,
    Proposer, RetrievalIndex, RetrievalMatch,
};
