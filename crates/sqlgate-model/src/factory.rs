//! Proposer factory

use std::sync::Arc;
use sqlgate_core::{Error, ModelConfig, Proposer, Result};

/// Supported proposer providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenAI,
}

impl Provider {
    /// Parse provider from string
    ///
    /// # Example
    /// ```
    /// use sqlgate_model::Provider;
    ///
    /// let provider = Provider::from_str("Gemini").unwrap();
    /// assert_eq!(provider, Provider::Gemini);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAI),
            _ => Err(Error::config_error(format!("Unknown provider: {}", s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAI => "openai",
        }
    }
}

/// Create the proposer named by `config.provider`.
pub fn create_proposer(config: &ModelConfig) -> Result<Arc<dyn Proposer>> {
    let provider = Provider::from_str(&config.provider)?;
    let api_key = config.api_key.clone().ok_or_else(|| {
        Error::config_error(format!(
            "API key not found for provider '{}'. Set model.api_key in config.toml",
            provider.as_str()
        ))
    })?;

    tracing::info!(provider = provider.as_str(), model = %config.model_name, "Creating proposer");

    match provider {
        Provider::Gemini => create_gemini(config, api_key),
        Provider::OpenAI => create_openai(config, api_key),
    }
}

#[cfg(feature = "gemini")]
fn create_gemini(config: &ModelConfig, api_key: String) -> Result<Arc<dyn Proposer>> {
    use crate::gemini::GeminiProposer;

    let mut proposer = GeminiProposer::new(api_key, config.model_name.clone())
        .with_temperature(config.temperature);
    if let Some(ref base_url) = config.base_url {
        proposer = proposer.with_base_url(base_url.clone());
    }
    Ok(Arc::new(proposer))
}

#[cfg(not(feature = "gemini"))]
fn create_gemini(_config: &ModelConfig, _api_key: String) -> Result<Arc<dyn Proposer>> {
    Err(Error::config_error(
        "Gemini provider not enabled. Add 'gemini' feature to sqlgate-model",
    ))
}

#[cfg(feature = "openai")]
fn create_openai(config: &ModelConfig, api_key: String) -> Result<Arc<dyn Proposer>> {
    use crate::openai::OpenAiProposer;

    let mut proposer = OpenAiProposer::new(api_key, config.model_name.clone())
        .with_temperature(config.temperature);
    // OpenAI-compatible endpoints
    if let Some(ref base_url) = config.base_url {
        proposer = proposer.with_base_url(base_url.clone());
    }
    Ok(Arc::new(proposer))
}

#[cfg(not(feature = "openai"))]
fn create_openai(_config: &ModelConfig, _api_key: String) -> Result<Arc<dyn Proposer>> {
    Err(Error::config_error(
        "OpenAI provider not enabled. Add 'openai' feature to sqlgate-model",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, api_key: Option<&str>) -> ModelConfig {
        ModelConfig {
            provider: provider.to_string(),
            api_key: api_key.map(str::to_string),
            model_name: "some-model".to_string(),
            base_url: None,
            temperature: 0.0,
        }
    }

    #[test]
    fn test_create_by_provider() {
        let gemini = create_proposer(&config("gemini", Some("k"))).unwrap();
        assert_eq!(gemini.name(), "some-model");

        let openai = create_proposer(&config("OpenAI", Some("k"))).unwrap();
        assert_eq!(openai.name(), "some-model");
    }

    #[test]
    fn test_unknown_provider_and_missing_key() {
        let err = create_proposer(&config("anthropic", Some("k"))).err().unwrap();
        assert!(matches!(err, Error::Config(_)));

        let err = create_proposer(&config("gemini", None)).err().unwrap();
        assert!(err.to_string().contains("API key"));
    }
}
