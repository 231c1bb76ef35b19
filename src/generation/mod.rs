//! Text Generation Backends
//!
//! The generative model is an external collaborator with a simple
//! call/response contract: a rendered prompt goes in, text comes out.
//!
//! # Backends
//!
//! - [`GeminiClient`]: hosted `generateContent` API over HTTPS
//! - [`EchoGenerator`]: offline backend that answers with the prompt itself

pub mod gemini;
pub mod retry;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

/// Default cap on response length, in characters
pub const DEFAULT_MAX_RESPONSE_CHARS: usize = 5000;

/// A text generation backend
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for an already rendered prompt
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Backend name used in logs and metrics
    fn name(&self) -> &str;
}

/// Wraps user input in the instruction preamble sent to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    max_response_chars: usize,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RESPONSE_CHARS)
    }
}

impl PromptTemplate {
    pub fn new(max_response_chars: usize) -> Self {
        Self { max_response_chars }
    }

    pub fn max_response_chars(&self) -> usize {
        self.max_response_chars
    }

    /// Preamble line followed by the user prompt
    pub fn render(&self, user_prompt: &str) -> String {
        format!(
            "Please generate a response based on the following input, but ensure that the response does not exceed {} characters.\n{}",
            self.max_response_chars, user_prompt
        )
    }

    /// Cut a response down to the character limit
    ///
    /// Backends do not always honour the instruction, so the limit is
    /// enforced here on a character boundary.
    pub fn truncate(&self, text: &str) -> String {
        match text.char_indices().nth(self.max_response_chars) {
            Some((byte_idx, _)) => text[..byte_idx].to_string(),
            None => text.to_string(),
        }
    }
}

/// Offline backend that returns the user's input
///
/// Strips the template preamble so the echoed text is what the user typed.
#[derive(Debug, Clone, Default)]
pub struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = prompt.split_once('\n').map(|(_, rest)| rest).unwrap_or(prompt);
        if body.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(body.to_string())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Build the backend selected in configuration
pub fn build_generator(config: &GenerationConfig) -> anyhow::Result<Arc<dyn TextGenerator>> {
    match config.backend.to_lowercase().as_str() {
        "echo" => Ok(Arc::new(EchoGenerator)),
        "gemini" => Ok(Arc::new(GeminiClient::from_config(config)?)),
        other => anyhow::bail!("Unknown generation backend: {}", other),
    }
}
