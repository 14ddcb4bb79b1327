use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::llm_client::ProviderIdentity;

const DEFAULT_PROVIDER: ProviderIdentity = ProviderIdentity::DeepSeek;
const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 300;

/// Credential and optional base-address override for one provider.
#[derive(Clone, Default)]
pub struct ProviderSettings {
    api_key: Option<String>,
    base_url: Option<String>,
}

impl ProviderSettings {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self { api_key, base_url }
    }

    /// The credential, or `None` when unset or blank.
    pub fn api_key(&self) -> Option<&str> {
        non_blank(self.api_key.as_deref())
    }

    pub fn base_url(&self) -> Option<&str> {
        non_blank(self.base_url.as_deref())
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Application configuration loaded once at startup and shared read-only.
///
/// Provider credentials are optional here: a missing key surfaces as
/// `MissingCredential` when that provider is resolved, which ends the request
/// without retries or fallback.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderIdentity,
    pub model: String,
    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub deepseek: ProviderSettings,
    /// Outbound proxy for provider traffic, e.g. `socks5://127.0.0.1:1080`.
    pub proxy_url: Option<String>,
    pub analysis_timeout: Duration,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let settings = |provider: ProviderIdentity| {
            ProviderSettings::new(
                lookup(provider.credential_var()),
                lookup(provider.base_url_var()),
            )
        };

        let provider = match var("LLM_PROVIDER") {
            Some(raw) => raw
                .parse::<ProviderIdentity>()
                .context("LLM_PROVIDER must name a supported provider")?,
            None => DEFAULT_PROVIDER,
        };

        let analysis_timeout_secs = match var("ANALYSIS_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .context("ANALYSIS_TIMEOUT_SECS must be a whole number of seconds")?,
            None => DEFAULT_ANALYSIS_TIMEOUT_SECS,
        };

        let model = match var("LLM_MODEL") {
            Some(raw) => raw.trim().to_string(),
            None => provider.default_model().to_string(),
        };
        if !provider.accepts_model(&model) {
            bail!("LLM_MODEL {model:?} is not served by LLM_PROVIDER {provider}");
        }

        Ok(Config {
            provider,
            model,
            openai: settings(ProviderIdentity::OpenAi),
            anthropic: settings(ProviderIdentity::Anthropic),
            deepseek: settings(ProviderIdentity::DeepSeek),
            proxy_url: var("LLM_PROXY"),
            analysis_timeout: Duration::from_secs(analysis_timeout_secs),
            port: var("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn provider_settings(&self, provider: ProviderIdentity) -> &ProviderSettings {
        match provider {
            ProviderIdentity::OpenAi => &self.openai,
            ProviderIdentity::Anthropic => &self.anthropic,
            ProviderIdentity::DeepSeek => &self.deepseek,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
