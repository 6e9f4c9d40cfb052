//! Hosted text generation.
//!
//! [`TextGenerator`] is the seam between the session and the language
//! model. [`HuggingFaceGenerator`] sends the prompt to the Hugging Face
//! Inference API and returns the completion verbatim. There is no retry:
//! network, authentication and model errors surface as
//! [`RagError::Generation`] and the user decides whether to ask again.

use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::GenerationConfig;
use crate::error::{RagError, Result};
use crate::settings::RagSettings;

/// Sampling parameters for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub return_full_text: bool,
    /// Present (and `false`) only for models decoded greedily.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub do_sample: Option<bool>,
}

impl GenerationParams {
    pub fn from_settings(settings: &RagSettings) -> Self {
        Self {
            max_new_tokens: settings.max_tokens(),
            temperature: settings.temperature(),
            return_full_text: false,
            do_sample: if settings.deterministic() {
                Some(false)
            } else {
                None
            },
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt` with `model`.
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        token: &str,
        params: &GenerationParams,
    ) -> Result<String>;
}

/// Client for the Hugging Face Inference API text-generation task.
pub struct HuggingFaceGenerator {
    client: reqwest::Client,
    api_url: String,
}

impl HuggingFaceGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/models/{}", self.api_url, model)
    }
}

#[async_trait]
impl TextGenerator for HuggingFaceGenerator {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        token: &str,
        params: &GenerationParams,
    ) -> Result<String> {
        let body = serde_json::json!({
            "inputs": prompt,
            "parameters": params,
        });

        let started = Instant::now();
        let response = self
            .client
            .post(self.model_url(model))
            .header("Authorization", format!("Bearer {}", token))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Generation(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RagError::Generation(e.to_string()))?;
        tracing::info!(
            model,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generation request finished"
        );

        if !status.is_success() {
            let detail = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or(text);
            return Err(RagError::Generation(format!("HTTP {}: {}", status, detail)));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| RagError::Generation(format!("invalid response: {}", e)))?;
        parse_generation_response(&json)
    }
}

/// Accepts `[{"generated_text": ..}]`, `{"generated_text": ..}` or
/// `{"error": ..}`.
fn parse_generation_response(json: &serde_json::Value) -> Result<String> {
    if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
        return Err(RagError::Generation(err.to_string()));
    }
    let item = match json.as_array() {
        Some(arr) => arr.first().ok_or_else(|| {
            RagError::Generation("invalid response: empty result array".to_string())
        })?,
        None => json,
    };
    item.get("generated_text")
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| RagError::Generation("invalid response: missing generated_text".to_string()))
}
