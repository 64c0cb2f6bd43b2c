use super::prompt::{SYSTEM_INSTRUCTION, render_prompt};
use super::types::*;
use async_trait::async_trait;
use reqwest::Client;
use sqlgate_core::{Error, ProposalRequest, Proposer, Result};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Proposer backed by the Gemini `generateContent` REST endpoint.
pub struct GeminiProposer {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
    temperature: f32,
}

impl GeminiProposer {
    pub fn new(api_key: String, model_name: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url: DEFAULT_BASE_URL.to_string(),
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
        format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.model_name, self.api_key
        )
    }

    fn build_request(&self, request: &ProposalRequest) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent::text(Some("user"), render_prompt(request))],
            generation_config: Some(GenerationConfig {
                temperature: Some(self.temperature),
                response_mime_type: Some("application/json".to_string()),
            }),
            system_instruction: Some(GeminiContent::text(None, SYSTEM_INSTRUCTION)),
        }
    }
}

#[async_trait]
impl Proposer for GeminiProposer {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn propose(&self, request: &ProposalRequest) -> Result<String> {
        let body = self.build_request(request);

        let resp = self
            .client
            .post(self.build_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::upstream("gemini", format!("Request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(
                "gemini",
                format!("Gemini API error {}: {}", status, error_text),
            ));
        }

        let gemini_resp = resp
            .json::<GeminiResponse>()
            .await
            .map_err(|e| Error::upstream("gemini", format!("Failed to parse response: {}", e)))?;

        gemini_resp
            .text()
            .ok_or_else(|| Error::upstream("gemini", "Response contained no text"))
    }
}
