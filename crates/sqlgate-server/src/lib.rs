//! HTTP server for sqlgate

pub mod rest;
pub mod types;

pub use rest::{AppError, AppState, ReadinessCheck, create_router, status_for};
pub use types::*;
