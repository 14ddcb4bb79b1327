//! LLM Client — provider-bound model handles and the generation seam.
//!
//! ARCHITECTURAL RULE: No other module may call a provider API directly.
//! Handles are produced by `resolver::ProviderResolver` and driven through the
//! `GenerationClient` trait, so the orchestrator never sees wire formats.
//!
//! No retries happen here. Retry and fallback belong to the orchestrator.

use std::borrow::Cow;
use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::deadline::{Deadline, DeadlineExceeded};

pub mod prompts;
pub mod provider;
pub mod registry;
pub mod resolver;

pub use provider::{ProviderIdentity, WireFormat};
pub use resolver::{ClientResolver, ProviderResolver, ResolveError};

use registry::{ModelCapabilities, ModelDescriptor, ModelRegistry};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("model {model:?} is not available on provider {provider}")]
    UnknownModel {
        provider: ProviderIdentity,
        model: String,
    },

    #[error("LLM returned no result")]
    EmptyResponse,

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

/// One generation call: fully-qualified or bare model name plus prompts.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub prompt: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Raw model output from a successful call.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub usage: Option<Usage>,
}

impl Generation {
    /// Decodes the text as JSON. The prompt must instruct the model to return
    /// valid JSON; markdown code fences are tolerated.
    pub fn output<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(strip_json_fences(&self.text))
    }
}

/// Executes generation calls against one resolved provider.
///
/// `Ok(None)` means the provider answered but produced no result.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        request: GenerationRequest<'_>,
        deadline: &Deadline,
    ) -> Result<Option<Generation>, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types — OpenAI-compatible chat completions
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Cow<'a, str>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types — Anthropic Messages API
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicResponse {
    /// Text of the first text block.
    fn into_text(self) -> Option<String> {
        self.content
            .into_iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text)
    }
}

/// Both wire formats report failures as `{"error": {"message": ...}}`.
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// ModelClient
// ────────────────────────────────────────────────────────────────────────────

/// A provider-bound handle. Built per orchestration, never shared across
/// providers or requests.
#[derive(Clone)]
pub struct ModelClient {
    provider: ProviderIdentity,
    client: Client,
    base_url: String,
    api_key: String,
    registry: ModelRegistry,
}

impl fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("registry", &self.registry)
            .finish()
    }
}

impl ModelClient {
    pub fn new(provider: ProviderIdentity, client: Client, base_url: &str, api_key: String) -> Self {
        Self {
            provider,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            registry: ModelRegistry::default(),
        }
    }

    pub fn provider(&self) -> ProviderIdentity {
        self.provider
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn define_model(&mut self, descriptor: ModelDescriptor) {
        self.registry.define(self.provider.prefix(), descriptor);
    }

    pub fn is_defined_model(&self, qualified: &str) -> bool {
        self.registry.is_defined(qualified)
    }

    /// Maps `<prefix>/<model>` (or a bare model name) to the name sent on the
    /// wire, rejecting models addressed to another provider or missing from
    /// the registry of a provider that requires registration.
    fn route<'m>(&self, model: &'m str) -> Result<(&'m str, ModelCapabilities), LlmError> {
        let unknown = || LlmError::UnknownModel {
            provider: self.provider,
            model: model.to_string(),
        };

        let name = match model.split_once('/') {
            Some((prefix, name)) if prefix == self.provider.prefix() => name,
            Some((prefix, _)) if prefix.parse::<ProviderIdentity>().is_ok() => {
                return Err(unknown())
            }
            _ => model,
        };

        if !self.provider.requires_registration() {
            return Ok((name, ModelCapabilities::OPEN));
        }

        self.registry
            .lookup(&self.provider.qualify(name))
            .map(|descriptor| (name, descriptor.supports))
            .ok_or_else(unknown)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, LlmError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!(
                provider = %self.provider,
                status = status.as_u16(),
                "LLM API returned {status}: {message}"
            );
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    async fn chat_completions(
        &self,
        model: &str,
        supports: ModelCapabilities,
        system: &str,
        prompt: &str,
    ) -> Result<Option<Generation>, LlmError> {
        let messages = if supports.system_role {
            vec![
                ChatMessage {
                    role: "system",
                    content: Cow::Borrowed(system),
                },
                ChatMessage {
                    role: "user",
                    content: Cow::Borrowed(prompt),
                },
            ]
        } else {
            vec![ChatMessage {
                role: "user",
                content: Cow::Owned(format!("{system}\n\n{prompt}")),
            }]
        };

        let body = ChatCompletionRequest {
            model,
            max_tokens: MAX_TOKENS,
            messages,
            response_format: supports.json_output.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);

        let response: ChatCompletionResponse = self.send(request).await?;
        let usage = response.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| Generation { text, usage }))
    }

    async fn messages(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
    ) -> Result<Option<Generation>, LlmError> {
        let body = AnthropicRequest {
            model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![ChatMessage {
                role: "user",
                content: Cow::Borrowed(prompt),
            }],
        };

        let request = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response: AnthropicResponse = self.send(request).await?;
        let usage = response.usage.as_ref().map(|u| Usage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        });

        Ok(response.into_text().map(|text| Generation { text, usage }))
    }
}

#[async_trait]
impl GenerationClient for ModelClient {
    async fn generate(
        &self,
        request: GenerationRequest<'_>,
        deadline: &Deadline,
    ) -> Result<Option<Generation>, LlmError> {
        let (model, supports) = self.route(request.model)?;

        debug!(provider = %self.provider, model, "Sending generation request");

        let call = async {
            match self.provider.wire_format() {
                WireFormat::ChatCompletions => {
                    self.chat_completions(model, supports, request.system, request.prompt)
                        .await
                }
                WireFormat::Messages => {
                    self.messages(model, request.system, request.prompt).await
                }
            }
        };

        deadline.run(call).await?
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));

    match inner {
        Some(stripped) => {
            let stripped = stripped.trim_start();
            stripped
                .strip_suffix("```")
                .map(str::trim)
                .unwrap_or(stripped)
        }
        None => text,
    }
}
