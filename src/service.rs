//! Generation Service
//!
//! Wires the rate limiter to the external collaborators. Control flow for a
//! generation request:
//!
//! ```text
//! validate prompt ──► check_and_consume ──► generate ──► (overlap search) ──► response
//!                           │
//!                           └─ Denied ──► RateLimited { seconds_remaining, message }
//! ```
//!
//! The quota slot is consumed at the moment of the attempt, so it stays used
//! when the backend fails afterwards.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::{GenerationError, ServiceError};
use crate::generation::{build_generator, PromptTemplate, TextGenerator};
use crate::metrics;
use crate::rate_limit::{
    humanize_wait, Clock, Decision, RateLimitConfig, RateLimitPolicy, RateLimiter, SessionId,
    SessionUsage, SystemClock,
};
use crate::search::{overlap_query, CustomSearchClient, SearchHit, WebSearch};

/// Body of a generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,

    /// Also look for published pages overlapping the response
    #[serde(default)]
    pub search: bool,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            search: false,
        }
    }

    pub fn with_search(mut self) -> Self {
        self.search = true;
        self
    }
}

/// Dry-run decision plus usage, if the session is known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub decision: Decision,
    pub usage: Option<SessionUsage>,
}

/// Successful generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub session_id: SessionId,
    pub text: String,
    #[serde(default)]
    pub sources: Vec<SearchHit>,
    pub quota: QuotaStatus,
}

/// Rate-limited access to the generation backend
#[derive(Clone)]
pub struct GenerationService {
    limiter: RateLimiter,
    generator: Arc<dyn TextGenerator>,
    search: Option<Arc<dyn WebSearch>>,
    template: PromptTemplate,
    clock: Arc<dyn Clock>,
    max_prompt_chars: usize,
    search_results: usize,
    query_words: usize,
}

impl GenerationService {
    pub fn new(limiter: RateLimiter, generator: Arc<dyn TextGenerator>) -> Self {
        let defaults = crate::config::GenerationConfig::default();
        let search_defaults = crate::config::SearchConfig::default();
        Self {
            limiter,
            generator,
            search: None,
            template: PromptTemplate::default(),
            clock: Arc::new(SystemClock),
            max_prompt_chars: defaults.max_prompt_chars,
            search_results: search_defaults.max_results,
            query_words: search_defaults.query_words,
        }
    }

    /// Build the service and its backends from configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let generator = build_generator(&config.generation)?;
        let limiter = RateLimiter::new(config.rate_limit.clone());

        let mut service = Self::new(limiter, generator)
            .with_template(PromptTemplate::new(config.generation.max_response_chars))
            .with_prompt_limit(config.generation.max_prompt_chars);

        if let Some(client) = CustomSearchClient::from_config(&config.search)? {
            service = service
                .with_search(Arc::new(client))
                .with_search_options(config.search.max_results, config.search.query_words);
        }

        Ok(service)
    }

    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_search_options(mut self, max_results: usize, query_words: usize) -> Self {
        self.search_results = max_results;
        self.query_words = query_words;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_prompt_limit(mut self, max_prompt_chars: usize) -> Self {
        self.max_prompt_chars = max_prompt_chars;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub fn search_enabled(&self) -> bool {
        self.search.is_some()
    }

    /// Run one generation for `session`
    ///
    /// # Errors
    ///
    /// * `EmptyPrompt` / `PromptTooLong` - rejected before the quota is touched
    /// * `RateLimited` - quota exhausted, nothing was sent to the backend
    /// * `Generation` - the backend failed; the quota slot stays consumed
    pub async fn generate(
        &self,
        session: &SessionId,
        request: GenerateRequest,
    ) -> Result<GenerateResponse, ServiceError> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(ServiceError::EmptyPrompt);
        }
        let len = prompt.chars().count();
        if len > self.max_prompt_chars {
            return Err(ServiceError::PromptTooLong {
                len,
                max: self.max_prompt_chars,
            });
        }

        let decision = self
            .limiter
            .check_and_consume(session, self.clock.now())
            .await;
        if let Decision::Denied { seconds_remaining } = decision {
            let config = self.limiter.get_config().await;
            let message = denial_message(&config, seconds_remaining);
            tracing::warn!(session_id = %session, seconds_remaining, "Generation refused: {}", message);
            return Err(ServiceError::RateLimited {
                seconds_remaining,
                message,
            });
        }

        let text = self.call_generator(prompt).await?;
        let text = self.template.truncate(&text);

        let sources = if request.search {
            self.find_sources(&text).await
        } else {
            Vec::new()
        };

        Ok(GenerateResponse {
            session_id: session.clone(),
            text,
            sources,
            quota: self.quota(session).await,
        })
    }

    /// Dry-run quota check; never creates or mutates the session
    pub async fn quota(&self, session: &SessionId) -> QuotaStatus {
        let now = self.clock.now();
        QuotaStatus {
            decision: self.limiter.evaluate(session, now).await,
            usage: self.limiter.usage(session, now).await,
        }
    }

    async fn call_generator(&self, prompt: &str) -> Result<String, GenerationError> {
        let backend = self.generator.name().to_string();
        let started = Instant::now();

        let result = self.generator.generate(&self.template.render(prompt)).await;

        metrics::GENERATION_DURATION_SECONDS
            .with_label_values(&[backend.as_str()])
            .observe(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::GENERATION_REQUESTS_TOTAL
            .with_label_values(&[backend.as_str(), status])
            .inc();

        match &result {
            Ok(text) => tracing::info!(backend = %backend, chars = text.len(), "Generation completed"),
            Err(e) => tracing::warn!(backend = %backend, "Generation failed: {}", e),
        }
        result
    }

    // Search failures never fail the generation
    async fn find_sources(&self, text: &str) -> Vec<SearchHit> {
        let Some(search) = &self.search else {
            return Vec::new();
        };
        let Some(query) = overlap_query(text, self.query_words) else {
            return Vec::new();
        };

        match search.search(&query, self.search_results).await {
            Ok(hits) => {
                metrics::SEARCH_REQUESTS_TOTAL
                    .with_label_values(&["success"])
                    .inc();
                tracing::debug!(hits = hits.len(), "Overlap search completed");
                hits
            }
            Err(e) => {
                metrics::SEARCH_REQUESTS_TOTAL
                    .with_label_values(&["error"])
                    .inc();
                tracing::warn!("Overlap search failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Message shown to a user whose request was refused
pub fn denial_message(config: &RateLimitConfig, seconds_remaining: u64) -> String {
    let wait = humanize_wait(seconds_remaining);
    match config.policy {
        RateLimitPolicy::SlidingWindow => format!(
            "You have reached the maximum limit of {} responses in the past {}. Please try again in {}.",
            config.max_requests,
            humanize_wait(config.window_secs),
            wait
        ),
        RateLimitPolicy::FixedCooldown => format!(
            "You have reached the maximum limit of {} responses. You are temporarily blocked. Please try again in {}.",
            config.max_requests, wait
        ),
    }
}
