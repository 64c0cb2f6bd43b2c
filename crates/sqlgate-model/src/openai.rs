use super::prompt::{SYSTEM_INSTRUCTION, render_prompt};
use super::types::*;
use async_trait::async_trait;
use reqwest::Client;
use sqlgate_core::{Error, ProposalRequest, Proposer, Result};

/// Proposer backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiProposer {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
    temperature: f32,
}

impl OpenAiProposer {
    pub fn new(api_key: String, model_name: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.0,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(&self, request: &ProposalRequest) -> OpenAIRequest {
        OpenAIRequest {
            model: self.model_name.clone(),
            messages: vec![
                OpenAIMessage::new("system", SYSTEM_INSTRUCTION),
                OpenAIMessage::new("user", render_prompt(request)),
            ],
            temperature: Some(self.temperature),
        }
    }
}

#[async_trait]
impl Proposer for OpenAiProposer {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn propose(&self, request: &ProposalRequest) -> Result<String> {
        let body = self.build_request(request);

        let resp = self
            .client
            .post(self.build_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::upstream("openai", format!("Request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(
                "openai",
                format!("OpenAI API error {}: {}", status, error_text),
            ));
        }

        let openai_resp = resp
            .json::<OpenAIResponse>()
            .await
            .map_err(|e| Error::upstream("openai", format!("Failed to parse response: {}", e)))?;

        openai_resp
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| Error::upstream("openai", "Response contained no text"))
    }
}
