//! Provider-agnostic completion interface.
//!
//! Any completion backend implements [`AIProvider`]. The
//! [`ProviderManager`] calls providers in priority order; providers never
//! see each other or the usage ledger.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod manager;
pub mod openrouter;
pub mod usage;

pub use manager::{ManagerError, ProviderManager};
pub use openrouter::OpenRouterProvider;
pub use usage::{UsageRecord, UsageStats, UsageTracker};

// ── Core Types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String, // "system" | "user" | "assistant"
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

/// A completion request. Built once, then only borrowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    /// Overrides the provider's default model.
    #[serde(default)]
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: None,
            max_tokens: 4096,
            temperature: 0.7,
            stop: None,
            stream: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// USD price per million tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
}

/// Cost breakdown in USD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

impl Cost {
    pub fn compute(pricing: ModelPricing, usage: &TokenUsage) -> Self {
        let input_cost = (usage.prompt_tokens as f64 / 1_000_000.0) * pricing.input;
        let output_cost = (usage.completion_tokens as f64 / 1_000_000.0) * pricing.output;
        Self {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub cost: Cost,
    pub latency_ms: u64,
    pub provider: String,
    pub request_id: Option<String>,
}

/// Lazily produced text fragments of one streamed completion. Dropping the
/// stream releases the upstream connection; a new call starts a new stream.
pub type CompletionStream = BoxStream<'static, Result<String, ProviderError>>;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider}: rate limit exceeded, retry after {}s", .retry_after.as_secs())]
    RateLimited { provider: String, retry_after: Duration },

    #[error("{provider}: HTTP {status}: {message}")]
    Upstream { provider: String, status: u16, message: String },

    #[error("{provider}: request error: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider}: malformed response: {message}")]
    Decode { provider: String, message: String },
}

impl ProviderError {
    /// Rate limits, 5xx and transport failures may succeed on retry; 4xx
    /// semantics and malformed payloads will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } | ProviderError::Transport { .. } => true,
            ProviderError::Upstream { status, .. } => *status >= 500,
            ProviderError::Decode { .. } => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            ProviderError::RateLimited { provider, .. }
            | ProviderError::Upstream { provider, .. }
            | ProviderError::Transport { provider, .. }
            | ProviderError::Decode { provider, .. } => provider,
        }
    }
}

// ── Provider Trait ──────────────────────────────────────────────────

/// The completion gateway contract.
///
/// Adding a backend means implementing this trait in a new module and
/// handing an instance to the [`ProviderManager`].
#[async_trait]
pub trait AIProvider: Send + Sync {
    /// Unique provider identifier (e.g., "openrouter").
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream, ProviderError>;

    async fn health_check(&self) -> bool;

    /// Price per million tokens; unknown models are free.
    fn get_model_pricing(&self, model: &str) -> ModelPricing;
}
