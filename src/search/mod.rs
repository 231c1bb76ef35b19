//! Web Search for Overlapping Content
//!
//! After a generation, the service can look for published pages that share
//! text with the response. Ranking is the provider's concern; this module
//! only builds the query and maps the provider's JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SearchConfig;
use crate::error::SearchError;

/// Upper bound the provider accepts for `num`
pub const MAX_RESULTS: usize = 10;

/// One search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// A web search backend
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError>;
}

/// Programmable-search JSON API client
pub struct CustomSearchClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    engine_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

impl CustomSearchClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
        })
    }

    /// Build a client from configuration
    ///
    /// Returns `Ok(None)` when search is disabled.
    pub fn from_config(config: &SearchConfig) -> Result<Option<Self>, SearchError> {
        if !config.enabled {
            return Ok(None);
        }

        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| SearchError::NotConfigured(format!("{} is not set", config.api_key_env)))?;
        let engine_id = std::env::var(&config.engine_id_env).map_err(|_| {
            SearchError::NotConfigured(format!("{} is not set", config.engine_id_env))
        })?;

        Self::new(
            config.endpoint.clone(),
            api_key,
            engine_id,
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    fn request_url(&self, query: &str, limit: usize) -> Result<reqwest::Url, SearchError> {
        let num = limit.clamp(1, MAX_RESULTS).to_string();
        reqwest::Url::parse_with_params(
            &self.endpoint,
            &[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ],
        )
        .map_err(|e| SearchError::NotConfigured(format!("invalid endpoint: {}", e)))
    }
}

#[async_trait]
impl WebSearch for CustomSearchClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let url = self.request_url(query, limit)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        Ok(parsed
            .items
            .into_iter()
            .filter(|item| !item.link.is_empty())
            .map(|item| SearchHit {
                title: item.title,
                url: item.link,
                snippet: item.snippet,
            })
            .collect())
    }
}

/// Quoted phrase search built from the longest sentence of `text`
///
/// Returns `None` for blank text.
pub fn overlap_query(text: &str, max_words: usize) -> Option<String> {
    let sentence = text
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .max_by_key(|s| s.split_whitespace().count())?;

    let words: Vec<&str> = sentence
        .split_whitespace()
        .take(max_words.max(1))
        .map(|w| w.trim_matches('"'))
        .filter(|w| !w.is_empty())
        .collect();

    if words.is_empty() {
        return None;
    }
    Some(format!("\"{}\"", words.join(" ")))
}
