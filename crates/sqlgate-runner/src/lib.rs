//! Conversation engine for sqlgate
//!
//! Turns a natural-language request into SQL through a [`Proposer`], runs
//! reads straight away and holds every other statement until the user
//! confirms it.
//!
//! [`Proposer`]: sqlgate_core::Proposer

pub mod context;
pub mod engine;
pub mod proposal;
pub mod testing;

pub use context::{AssembledContext, ContextAssembler, render_history};
pub use engine::{ConfirmOutcome, ConversationEngine, ConversationEngineBuilder, QueryOutcome};
pub use proposal::{Proposal, parse_proposal};
