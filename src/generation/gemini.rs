//! Hosted Generation Client
//!
//! Calls the `generateContent` endpoint of a Gemini-style API.
//!
//! Several models and several API keys may be configured. Each call picks one
//! of each at random, which spreads load across keys and models with separate
//! quotas. Keys are read from environment variables, never from the config
//! file.

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use serde::Deserialize;
use std::time::Duration;

use super::retry::{retry_with_backoff, RetryConfig};
use super::TextGenerator;
use crate::config::GenerationConfig;
use crate::error::GenerationError;

/// HTTP client for the hosted generation API
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    models: Vec<String>,
    api_keys: Vec<String>,
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    /// Create a client from explicit models and keys
    pub fn new(
        base_url: impl Into<String>,
        models: Vec<String>,
        api_keys: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        if api_keys.is_empty() {
            return Err(GenerationError::MissingApiKey("no keys given".to_string()));
        }
        if models.is_empty() {
            return Err(GenerationError::InvalidResponse(
                "no models configured".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            models,
            api_keys,
            retry: RetryConfig::default(),
        })
    }

    /// Create a client from configuration, resolving keys from the environment
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_keys: Vec<String> = config
            .api_key_env
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();

        if api_keys.is_empty() {
            return Err(GenerationError::MissingApiKey(config.api_key_env.join(", ")));
        }

        tracing::info!(
            models = config.models.len(),
            keys = api_keys.len(),
            "Configured hosted generation backend"
        );

        Ok(Self::new(
            config.base_url.clone(),
            config.models.clone(),
            api_keys,
            Duration::from_secs(config.timeout_secs),
        )?
        .with_retry(RetryConfig::new().max_attempts(config.max_attempts)))
    }

    /// Replace the retry configuration
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    fn pick(&self) -> Result<(String, String), GenerationError> {
        let mut rng = rand::rng();
        let model = self
            .models
            .choose(&mut rng)
            .ok_or_else(|| GenerationError::InvalidResponse("no models configured".to_string()))?;
        let key = self
            .api_keys
            .choose(&mut rng)
            .ok_or_else(|| GenerationError::MissingApiKey("no keys given".to_string()))?;
        Ok((model.clone(), key.clone()))
    }

    async fn call_once(&self, prompt: &str) -> Result<String, GenerationError> {
        let (model, key) = self.pick()?;
        tracing::debug!(model = %model, "Sending generation request");

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(self.endpoint(&model))
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        extract_text(parsed)
    }
}

// First candidate's text parts, concatenated
fn extract_text(response: GenerateContentResponse) -> Result<String, GenerationError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        retry_with_backoff(&self.retry, || self.call_once(prompt), GenerationError::is_transient)
            .await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
