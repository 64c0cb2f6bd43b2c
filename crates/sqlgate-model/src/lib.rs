//! Language-model proposers for sqlgate

pub mod factory;
pub mod gemini;
pub mod openai;
pub mod prompt;
pub mod types;

pub use factory::{Provider, create_proposer};
pub use gemini::GeminiProposer;
pub use openai::OpenAiProposer;
pub use prompt::{SYSTEM_INSTRUCTION, render_prompt};
