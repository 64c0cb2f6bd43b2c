//! Logging and tracing for sqlgate
//!
//! [`init_telemetry`] installs the process-wide subscriber: an `EnvFilter`,
//! a human-readable or JSON fmt layer and an OpenTelemetry layer. The span
//! helpers record proposer calls and statement executions with stable
//! attribute names from [`attributes`].

pub mod attributes;
pub mod spans;
pub mod tracer;

pub use spans::{
    ProposalSpanAttributes, StatementSpanAttributes, safe_serialize, trace_proposal_call,
    trace_statement_execution,
};
pub use tracer::{init_telemetry, register_span_processor, shutdown_telemetry, tracer_provider};
