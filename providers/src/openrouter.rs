//! OpenRouter backend. One OpenAI-compatible endpoint fronting many models.

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use common::config::AiSettings;

use crate::{
    AIProvider, CompletionRequest, CompletionResponse, CompletionStream, Cost, Message, ModelPricing,
    ProviderError, TokenUsage,
};

const PROVIDER: &str = "openrouter";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
const MAX_ERROR_BODY: usize = 500;

/// USD per million tokens, (input, output).
const PRICING: &[(&str, f64, f64)] = &[
    ("anthropic/claude-3-haiku", 0.25, 1.25),
    ("anthropic/claude-3-5-haiku", 1.0, 5.0),
    ("anthropic/claude-3-5-sonnet", 3.0, 15.0),
    ("anthropic/claude-3-opus", 15.0, 75.0),
    ("openai/gpt-4o-mini", 0.15, 0.60),
    ("openai/gpt-4o", 2.5, 10.0),
    ("openai/gpt-4-turbo", 10.0, 30.0),
    ("google/gemini-pro", 0.125, 0.375),
    ("google/gemini-pro-1.5", 1.25, 5.0),
    ("meta-llama/llama-3-70b-instruct", 0.59, 0.79),
    ("mistralai/mistral-7b-instruct", 0.06, 0.06),
    ("mistralai/mixtral-8x7b-instruct", 0.24, 0.24),
];

/// Known models, for listing.
pub fn known_models() -> impl Iterator<Item = (&'static str, ModelPricing)> {
    PRICING
        .iter()
        .map(|(model, input, output)| (*model, ModelPricing { input: *input, output: *output }))
}

pub struct OpenRouterProvider {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl OpenRouterProvider {
    pub fn new(settings: &AiSettings) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", settings.api_key))?,
        );
        headers.insert("HTTP-Referer", header_value(&settings.app_url)?);
        headers.insert("X-Title", header_value(&settings.app_name)?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()
            .map_err(transport)?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            default_model: settings.default_model.clone(),
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn resolve_model<'a>(&'a self, request: &'a CompletionRequest) -> &'a str {
        request.model.as_deref().unwrap_or(&self.default_model)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_chat(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let body = ChatBody {
            model: self.resolve_model(request),
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stop: request.stop.as_deref(),
            stream,
        };
        let resp = self
            .client
            .post(self.url("/chat/completions"))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        check_status(resp).await
    }
}

#[async_trait]
impl AIProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let model = self.resolve_model(request).to_string();
        let start = Instant::now();
        let resp = self.post_chat(request, false).await?;
        let body: ChatCompletion = resp.json().await.map_err(|e| ProviderError::Decode {
            provider: PROVIDER.into(),
            message: e.to_string(),
        })?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let content = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode {
                provider: PROVIDER.into(),
                message: "response has no choices".into(),
            })?
            .message
            .content
            .unwrap_or_default();

        let raw = body.usage.unwrap_or_default();
        let usage = TokenUsage {
            prompt_tokens: raw.prompt_tokens,
            completion_tokens: raw.completion_tokens,
            total_tokens: if raw.total_tokens > 0 {
                raw.total_tokens
            } else {
                raw.prompt_tokens + raw.completion_tokens
            },
        };
        let cost = Cost::compute(self.get_model_pricing(&model), &usage);

        tracing::debug!(
            "🤖 {} answered in {}ms ({} tokens, ${:.6})",
            model, latency_ms, usage.total_tokens, cost.total_cost
        );

        Ok(CompletionResponse {
            content,
            model: body.model.unwrap_or(model),
            usage,
            cost,
            latency_ms,
            provider: PROVIDER.into(),
            request_id: body.id,
        })
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream, ProviderError> {
        let resp = self.post_chat(request, true).await?;
        Ok(sse_text_stream(Box::pin(resp.bytes_stream())))
    }

    async fn health_check(&self) -> bool {
        match self.client.get(self.url("/models")).send().await {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                tracing::warn!("OpenRouter health check failed: {}", e);
                false
            }
        }
    }

    fn get_model_pricing(&self, model: &str) -> ModelPricing {
        PRICING
            .iter()
            .find(|(name, _, _)| *name == model)
            .map(|(_, input, output)| ModelPricing { input: *input, output: *output })
            .unwrap_or_default()
    }
}

// ── Wire Types ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletion {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<RawUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

// ── Helpers ─────────────────────────────────────────────────────────

fn header_value(value: &str) -> Result<HeaderValue, ProviderError> {
    HeaderValue::from_str(value).map_err(|e| ProviderError::Transport {
        provider: PROVIDER.into(),
        message: format!("invalid header value: {}", e),
    })
}

fn transport(e: reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        provider: PROVIDER.into(),
        message: e.to_string(),
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let secs = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        tracing::warn!("⏳ OpenRouter rate limited, retry after {}s", secs);
        return Err(ProviderError::RateLimited {
            provider: PROVIDER.into(),
            retry_after: Duration::from_secs(secs),
        });
    }

    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Upstream {
        provider: PROVIDER.into(),
        status: status.as_u16(),
        message: body.chars().take(MAX_ERROR_BODY).collect(),
    })
}

struct SseState<S> {
    bytes: S,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
}

impl<S> SseState<S> {
    fn drain_lines(&mut self) {
        while !self.done {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&line);
        }
    }

    fn handle_line(&mut self, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        let Some(data) = line.trim().strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            self.buffer.clear();
            return;
        }
        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => {
                let text = chunk.choices.into_iter().next().and_then(|c| c.delta.content);
                if let Some(text) = text.filter(|t| !t.is_empty()) {
                    self.pending.push_back(text);
                }
            }
            Err(e) => tracing::debug!("Skipping malformed stream event: {}", e),
        }
    }
}

/// Turn a server-sent-events byte stream into content fragments.
/// Events may be split across network chunks.
fn sse_text_stream<S, B, E>(bytes: S) -> CompletionStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(text) = st.pending.pop_front() {
                return Some((Ok(text), st));
            }
            if st.done {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    st.buffer.extend_from_slice(chunk.as_ref());
                    st.drain_lines();
                }
                Some(Err(e)) => {
                    st.done = true;
                    let err = ProviderError::Transport {
                        provider: PROVIDER.into(),
                        message: e.to_string(),
                    };
                    return Some((Err(err), st));
                }
                None => {
                    st.done = true;
                    let tail = std::mem::take(&mut st.buffer);
                    st.handle_line(&tail);
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenRouterProvider {
        OpenRouterProvider::new(&AiSettings::default()).unwrap()
    }

    #[test]
    fn test_pricing_lookup() {
        let p = provider();
        assert_eq!(
            p.get_model_pricing("anthropic/claude-3-haiku"),
            ModelPricing { input: 0.25, output: 1.25 }
        );
        assert_eq!(
            p.get_model_pricing("openai/gpt-4o-mini"),
            ModelPricing { input: 0.15, output: 0.60 }
        );
        assert_eq!(p.get_model_pricing("acme/unknown-model"), ModelPricing::default());
        assert_eq!(known_models().count(), 12);
    }

    #[test]
    fn test_request_model_overrides_default() {
        let p = provider();
        let plain = CompletionRequest::new(vec![Message::user("hi")]);
        assert_eq!(p.resolve_model(&plain), "anthropic/claude-3-haiku");

        let pinned = plain.clone().with_model("openai/gpt-4o");
        assert_eq!(p.resolve_model(&pinned), "openai/gpt-4o");
    }

    #[test]
    fn test_stop_is_omitted_when_unset() {
        let messages = vec![Message::user("hi")];
        let body = ChatBody {
            model: "m",
            messages: &messages,
            max_tokens: 10,
            temperature: 0.5,
            stop: None,
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("stop").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_sse_events_split_across_chunks() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel".to_vec()),
            Ok(b"lo\"}}]}\n\n: keep-alive\n".to_vec()),
            Ok(b"data: not json\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n".to_vec()),
            Ok(b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n".to_vec()),
        ];
        let parts: Vec<String> = sse_text_stream(stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(parts, vec!["Hello".to_string(), " world".to_string()]);
    }

    #[tokio::test]
    async fn test_sse_transport_error_ends_stream() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let results: Vec<Result<String, ProviderError>> = sse_text_stream(stream::iter(chunks)).collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "a");
        assert!(matches!(results[1], Err(ProviderError::Transport { .. })));
    }
}
