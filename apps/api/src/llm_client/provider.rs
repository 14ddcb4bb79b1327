//! Closed set of supported LLM providers and their per-provider defaults.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::llm_client::registry::{ModelDescriptor, DEEPSEEK_MODELS};

/// Wire protocol spoken by a provider's generation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `POST <base>/chat/completions` with bearer auth.
    ChatCompletions,
    /// Anthropic Messages API: `POST <base>/messages` with `x-api-key`.
    Messages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderIdentity {
    OpenAi,
    Anthropic,
    DeepSeek,
}

#[derive(Debug, Error)]
#[error("unsupported provider: {0:?} (expected one of: openai, anthropic, deepseek)")]
pub struct UnknownProvider(pub String);

impl ProviderIdentity {
    pub const ALL: [ProviderIdentity; 3] = [Self::OpenAi, Self::Anthropic, Self::DeepSeek];

    /// Prefix used when addressing models as `<prefix>/<model>`.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::DeepSeek => "deepseek",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::DeepSeek => "https://api.deepseek.com/v1",
        }
    }

    pub fn credential_var(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }

    pub fn base_url_var(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_BASE_URL",
            Self::Anthropic => "ANTHROPIC_BASE_URL",
            Self::DeepSeek => "DEEPSEEK_BASE_URL",
        }
    }

    pub fn wire_format(self) -> WireFormat {
        match self {
            Self::OpenAi | Self::DeepSeek => WireFormat::ChatCompletions,
            Self::Anthropic => WireFormat::Messages,
        }
    }

    /// OpenAI-compatible providers expose `GET /models`, which doubles as a
    /// cheap authenticated reachability check.
    pub fn has_preflight(self) -> bool {
        self.wire_format() == WireFormat::ChatCompletions
    }

    /// Models that must be registered on the client before use. Empty for
    /// providers that accept any model name.
    pub fn registered_models(self) -> &'static [ModelDescriptor] {
        match self {
            Self::DeepSeek => DEEPSEEK_MODELS,
            Self::OpenAi | Self::Anthropic => &[],
        }
    }

    /// Qualified model used when `LLM_MODEL` is unset.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "openai/gpt-4o-mini",
            Self::Anthropic => "anthropic/claude-3-5-sonnet-latest",
            Self::DeepSeek => "deepseek/deepseek-chat",
        }
    }

    /// Whether `model` can be sent to this provider: a bare name or one
    /// carrying this provider's prefix, and registered where registration is
    /// required.
    pub fn accepts_model(self, model: &str) -> bool {
        let name = match model.split_once('/') {
            Some((prefix, name)) if prefix == self.prefix() => name,
            Some((prefix, _)) if prefix.parse::<ProviderIdentity>().is_ok() => return false,
            _ => model,
        };
        !self.requires_registration() || self.registered_models().iter().any(|m| m.name == name)
    }

    pub fn requires_registration(self) -> bool {
        !self.registered_models().is_empty()
    }

    /// `<prefix>/<model>`, leaving names that already carry this provider's
    /// prefix untouched.
    pub fn qualify(self, model: &str) -> String {
        match model.split_once('/') {
            Some((prefix, _)) if prefix == self.prefix() => model.to_string(),
            _ => format!("{}/{}", self.prefix(), model),
        }
    }
}

impl fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for ProviderIdentity {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.prefix() == normalized)
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_and_whitespace_insensitive() {
        assert_eq!(
            " DeepSeek ".parse::<ProviderIdentity>().unwrap(),
            ProviderIdentity::DeepSeek
        );
        assert_eq!(
            "openai".parse::<ProviderIdentity>().unwrap(),
            ProviderIdentity::OpenAi
        );
        assert_eq!(
            "ANTHROPIC".parse::<ProviderIdentity>().unwrap(),
            ProviderIdentity::Anthropic
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "gemini".parse::<ProviderIdentity>().unwrap_err();
        assert!(err.to_string().contains("gemini"));
    }

    #[test]
    fn test_only_deepseek_requires_registration() {
        assert!(ProviderIdentity::DeepSeek.requires_registration());
        assert!(!ProviderIdentity::OpenAi.requires_registration());
        assert!(!ProviderIdentity::Anthropic.requires_registration());
    }

    #[test]
    fn test_preflight_only_for_openai_compatible() {
        assert!(ProviderIdentity::DeepSeek.has_preflight());
        assert!(ProviderIdentity::OpenAi.has_preflight());
        assert!(!ProviderIdentity::Anthropic.has_preflight());
    }

    #[test]
    fn test_default_models_belong_to_their_provider() {
        for provider in ProviderIdentity::ALL {
            assert!(provider.accepts_model(provider.default_model()), "{provider}");
        }
    }

    #[test]
    fn test_accepts_model() {
        let ds = ProviderIdentity::DeepSeek;
        assert!(ds.accepts_model("deepseek-reasoner"));
        assert!(!ds.accepts_model("deepseek/deepseek-coder"));
        assert!(!ds.accepts_model("openai/gpt-4o"));

        let openai = ProviderIdentity::OpenAi;
        assert!(openai.accepts_model("gpt-4o"));
        assert!(openai.accepts_model("openai/gpt-4o"));
        assert!(!openai.accepts_model("deepseek/deepseek-chat"));
    }

    #[test]
    fn test_qualify() {
        let ds = ProviderIdentity::DeepSeek;
        assert_eq!(ds.qualify("deepseek-chat"), "deepseek/deepseek-chat");
        assert_eq!(ds.qualify("deepseek/deepseek-chat"), "deepseek/deepseek-chat");
        assert_eq!(
            ProviderIdentity::OpenAi.qualify("gpt-4o-mini"),
            "openai/gpt-4o-mini"
        );
    }
}
