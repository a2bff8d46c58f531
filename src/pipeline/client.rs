//! Remote OCR client: one image plus one instruction in, raw text out.
//!
//! Two back ends implement [`VisionClient`]:
//!
//! * [`HttpChatClient`] talks to any OpenAI-compatible
//!   `/chat/completions` endpoint with a bearer credential. This is the path
//!   used when [`OcrConfig::endpoint`] is set.
//! * [`LlmVisionClient`] delegates to an `edgequake_llm` provider, resolved
//!   from the config or the environment.
//!
//! Requests are sent exactly once: no retry, no backoff, no caching. Errors
//! come back as [`ItemError`] and the caller decides what to do with them.

use crate::config::OcrConfig;
use crate::error::{ItemError, OcrError};
use crate::pipeline::encode::ImagePayload;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Longest error body kept from a failed HTTP response.
const MAX_ERROR_BODY: usize = 500;

/// Sends one image with one instruction and returns the model's text.
pub trait VisionClient: Send + Sync {
    fn complete(
        &self,
        prompt: &str,
        image: &ImagePayload,
    ) -> impl Future<Output = Result<String, ItemError>> + Send;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

// ── OpenAI-compatible HTTP endpoint ──────────────────────────────────────────

/// Client for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct HttpChatClient {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: usize,
    temperature: Option<f32>,
}

impl std::fmt::Debug for HttpChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChatClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpChatClient {
    /// Build a client for `endpoint` (the API base, e.g. `https://host/v1/`).
    pub fn from_config(endpoint: &str, config: &OcrConfig) -> Result<Self, OcrError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("specsheet-ocr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OcrError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: completions_url(endpoint),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// The URL requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// JSON request body for one image.
    pub fn request_body(&self, prompt: &str, image: &ImagePayload) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image.data_uri() } }
                ]
            }],
            "max_tokens": self.max_tokens,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        body
    }
}

impl VisionClient for HttpChatClient {
    async fn complete(&self, prompt: &str, image: &ImagePayload) -> Result<String, ItemError> {
        let body = self.request_body(prompt, image);

        let mut request = self.http.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| ItemError::Request {
            detail: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            truncate_at_char_boundary(&mut text, MAX_ERROR_BODY);
            return Err(ItemError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: Value = response.json().await.map_err(|e| ItemError::Request {
            detail: format!("invalid response body: {e}"),
        })?;

        if let Some(usage) = payload.get("usage") {
            debug!("Token usage: {}", usage);
        }

        extract_content(&payload).ok_or(ItemError::EmptyResponse)
    }

    fn describe(&self) -> String {
        format!("{} (model {})", self.url, self.model)
    }
}

/// `{base}/chat/completions`, tolerant of a trailing slash or a full URL.
fn completions_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

/// Pull `choices[0].message.content` out of a completion response.
///
/// Accepts both a plain string and the array-of-parts form.
pub fn extract_content(payload: &Value) -> Option<String> {
    let content = payload
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?;

    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => return None,
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    s.push('…');
}

// ── edgequake-llm provider ───────────────────────────────────────────────────

/// Client backed by an `edgequake_llm` provider.
#[derive(Clone)]
pub struct LlmVisionClient {
    provider: Arc<dyn LLMProvider>,
    max_tokens: usize,
    temperature: Option<f32>,
}

impl LlmVisionClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &OcrConfig) -> Self {
        Self {
            provider,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

impl VisionClient for LlmVisionClient {
    async fn complete(&self, prompt: &str, image: &ImagePayload) -> Result<String, ItemError> {
        let data = ImageData::new(image.base64(), image.mime_type).with_detail("high");
        let messages = vec![ChatMessage::user_with_images(prompt, vec![data])];
        let options = self.options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ItemError::Provider {
                detail: e.to_string(),
            })?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        if response.content.is_empty() {
            Err(ItemError::EmptyResponse)
        } else {
            Ok(response.content)
        }
    }

    fn describe(&self) -> String {
        "edgequake-llm provider".to_string()
    }
}

/// Resolve an edgequake-llm provider, from most-specific to least-specific:
///
/// 1. pre-built provider (`config.provider`)
/// 2. named provider (`config.provider_name`) with `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 4. OpenAI when `OPENAI_API_KEY` is present
/// 5. `ProviderFactory::from_env`
pub fn resolve_provider(config: &OcrConfig) -> Result<Arc<dyn LLMProvider>, OcrError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, &config.model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", &config.model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| OcrError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "Set OCR_ENDPOINT and OCR_API_KEY for an OpenAI-compatible endpoint,\n\
                or OPENAI_API_KEY / ANTHROPIC_API_KEY for a hosted provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, OcrError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        OcrError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

// ── Runtime selection ────────────────────────────────────────────────────────

/// The client chosen for a run.
#[derive(Clone)]
pub enum Backend {
    Http(HttpChatClient),
    Llm(LlmVisionClient),
}

impl Backend {
    /// An explicit endpoint wins; otherwise an edgequake-llm provider is resolved.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        match config.endpoint {
            Some(ref endpoint) => Ok(Backend::Http(HttpChatClient::from_config(endpoint, config)?)),
            None => Ok(Backend::Llm(LlmVisionClient::new(
                resolve_provider(config)?,
                config,
            ))),
        }
    }
}

impl VisionClient for Backend {
    async fn complete(&self, prompt: &str, image: &ImagePayload) -> Result<String, ItemError> {
        match self {
            Backend::Http(c) => c.complete(prompt, image).await,
            Backend::Llm(c) => c.complete(prompt, image).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Backend::Http(c) => c.describe(),
            Backend::Llm(c) => c.describe(),
        }
    }
}
