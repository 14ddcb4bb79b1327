//! Provider Resolver — turns a `ProviderIdentity` into a ready `ModelClient`.
//!
//! Steps, in order: credential lookup, base-address validation, preflight
//! (`GET <base>/models`, OpenAI-compatible providers only), model registration
//! (providers that require it). Nothing here retries; a failed resolution is
//! reported once and the orchestrator decides what to do next.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, Proxy};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{Config, ProviderSettings};
use crate::deadline::{Deadline, DeadlineExceeded};
use crate::llm_client::{GenerationClient, ModelClient, ProviderIdentity};

const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("missing required credential {variable} for provider {provider}")]
    MissingCredential {
        provider: ProviderIdentity,
        variable: &'static str,
    },

    #[error("{variable}: invalid base address {url:?}: {reason}")]
    InvalidBaseAddress {
        variable: &'static str,
        url: String,
        reason: String,
    },

    #[error("{provider} preflight failed: {reason}")]
    PreflightFailed {
        provider: ProviderIdentity,
        reason: String,
    },

    #[error("{provider} models are not registered: {missing:?}")]
    ModelRegistrationFailed {
        provider: ProviderIdentity,
        missing: Vec<String>,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

impl ResolveError {
    /// Configuration errors cannot heal between attempts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ResolveError::MissingCredential { .. } | ResolveError::InvalidBaseAddress { .. }
        )
    }
}

/// Produces generation clients for a provider. The orchestrator is generic
/// over this so tests can substitute scripted resolvers.
#[async_trait]
pub trait ClientResolver: Send + Sync {
    type Client: GenerationClient;

    async fn resolve(
        &self,
        provider: ProviderIdentity,
        model: &str,
        deadline: &Deadline,
    ) -> Result<Self::Client, ResolveError>;
}

/// Resolves providers from the process configuration.
pub struct ProviderResolver {
    config: Arc<Config>,
    proxy: Option<Proxy>,
    preflight: Client,
}

impl ProviderResolver {
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        let proxy = config
            .proxy_url
            .as_deref()
            .map(Proxy::all)
            .transpose()
            .context("LLM_PROXY is not a valid proxy URL")?;

        let preflight = http_client(PREFLIGHT_TIMEOUT, proxy.clone())
            .context("Failed to build preflight HTTP client")?;

        Ok(Self {
            config,
            proxy,
            preflight,
        })
    }

    /// Authenticated `GET <base>/models`. Any transport error or non-2xx
    /// status fails the preflight.
    async fn preflight(
        &self,
        provider: ProviderIdentity,
        base_url: &str,
        api_key: &str,
        deadline: &Deadline,
    ) -> Result<(), ResolveError> {
        let url = format!("{}/models", base_url.trim_end_matches('/'));
        let request = self
            .preflight
            .get(&url)
            .bearer_auth(api_key)
            .header(ACCEPT, "application/json")
            .send();

        let response = deadline
            .run(request)
            .await?
            .map_err(|e| ResolveError::PreflightFailed {
                provider,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%provider, status = status.as_u16(), "Preflight rejected");
            return Err(ResolveError::PreflightFailed {
                provider,
                reason: format!("unexpected status {} from {url}", status.as_u16()),
            });
        }

        debug!(%provider, "Preflight succeeded");
        Ok(())
    }
}

#[async_trait]
impl ClientResolver for ProviderResolver {
    type Client = ModelClient;

    async fn resolve(
        &self,
        provider: ProviderIdentity,
        model: &str,
        deadline: &Deadline,
    ) -> Result<ModelClient, ResolveError> {
        let settings = self.config.provider_settings(provider);
        let api_key = require_credential(provider, settings)?;

        let base_url = match settings.base_url() {
            Some(raw) => validate_base_url(provider.base_url_var(), raw)?.to_string(),
            None => provider.default_base_url().to_string(),
        };

        if provider.has_preflight() {
            self.preflight(provider, &base_url, &api_key, deadline)
                .await?;
        }

        let client =
            http_client(REQUEST_TIMEOUT, self.proxy.clone()).map_err(ResolveError::Client)?;
        let mut model_client = ModelClient::new(provider, client, &base_url, api_key);

        if provider.requires_registration() {
            register_models(&mut model_client)?;
        }

        info!(
            %provider,
            model,
            base_url = model_client.base_url(),
            "Model client ready"
        );
        Ok(model_client)
    }
}

fn http_client(timeout: Duration, proxy: Option<Proxy>) -> reqwest::Result<Client> {
    let builder = Client::builder().timeout(timeout);
    let builder = match proxy {
        Some(proxy) => builder.proxy(proxy),
        None => builder,
    };
    builder.build()
}

fn require_credential(
    provider: ProviderIdentity,
    settings: &ProviderSettings,
) -> Result<String, ResolveError> {
    settings
        .api_key()
        .map(str::to_string)
        .ok_or(ResolveError::MissingCredential {
            provider,
            variable: provider.credential_var(),
        })
}

/// Parses a configured base address, requiring both a scheme and a host.
pub fn validate_base_url(variable: &'static str, raw: &str) -> Result<Url, ResolveError> {
    let invalid = |reason: String| ResolveError::InvalidBaseAddress {
        variable,
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if url.scheme().is_empty() || url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing scheme or host".to_string()));
    }
    Ok(url)
}

/// Registers every model the provider requires, then confirms each one is
/// discoverable through the client's registry.
fn register_models(client: &mut ModelClient) -> Result<(), ResolveError> {
    let provider = client.provider();

    for descriptor in provider.registered_models() {
        client.define_model(*descriptor);
        debug!(
            %provider,
            model = descriptor.name,
            label = descriptor.label,
            "Registered model"
        );
    }

    let missing: Vec<String> = provider
        .registered_models()
        .iter()
        .map(|d| provider.qualify(d.name))
        .filter(|qualified| !client.is_defined_model(qualified))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ResolveError::ModelRegistrationFailed { provider, missing })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use axum::{http::StatusCode, routing::get, Router};

    use super::*;
    use crate::test_support::{config_from, spawn_models_endpoint, spawn_server};

    fn resolver(vars: &[(&str, &str)]) -> ProviderResolver {
        ProviderResolver::new(Arc::new(config_from(vars))).unwrap()
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(30))
    }

    #[test]
    fn test_validate_base_url_accepts_https() {
        let url = validate_base_url("X", "https://api.deepseek.com/v1").unwrap();
        assert_eq!(url.host_str(), Some("api.deepseek.com"));
    }

    #[test]
    fn test_validate_base_url_rejects_missing_scheme_or_host() {
        for raw in ["localhost:8080", "api.deepseek.com/v1", "/v1", "not a url"] {
            let err = validate_base_url("DEEPSEEK_BASE_URL", raw).unwrap_err();
            assert!(
                matches!(err, ResolveError::InvalidBaseAddress { .. }),
                "{raw} should be rejected"
            );
            assert!(err.is_configuration());
        }
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_network_call() {
        let (base, hits) = spawn_models_endpoint(StatusCode::OK).await;

        for provider in ProviderIdentity::ALL {
            let resolver = resolver(&[
                ("OPENAI_BASE_URL", base.as_str()),
                ("ANTHROPIC_BASE_URL", base.as_str()),
                ("DEEPSEEK_BASE_URL", base.as_str()),
            ]);

            let err = resolver
                .resolve(provider, "any", &deadline())
                .await
                .unwrap_err();

            match err {
                ResolveError::MissingCredential { variable, .. } => {
                    assert_eq!(variable, provider.credential_var())
                }
                other => panic!("unexpected error for {provider}: {other:?}"),
            }
        }

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_credential_is_missing() {
        let resolver = resolver(&[("DEEPSEEK_API_KEY", "  ")]);
        let err = resolver
            .resolve(ProviderIdentity::DeepSeek, "deepseek-chat", &deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn test_invalid_base_address_fails_before_preflight() {
        let resolver = resolver(&[
            ("DEEPSEEK_API_KEY", "sk-test"),
            ("DEEPSEEK_BASE_URL", "api.deepseek.com"),
        ]);

        let err = resolver
            .resolve(ProviderIdentity::DeepSeek, "deepseek-chat", &deadline())
            .await
            .unwrap_err();

        match err {
            ResolveError::InvalidBaseAddress { variable, url, .. } => {
                assert_eq!(variable, "DEEPSEEK_BASE_URL");
                assert_eq!(url, "api.deepseek.com");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_preflight_rejection_is_retryable() {
        let (base, hits) = spawn_models_endpoint(StatusCode::OK).await;
        let resolver = resolver(&[
            ("DEEPSEEK_API_KEY", "sk-wrong"),
            ("DEEPSEEK_BASE_URL", base.as_str()),
        ]);

        let err = resolver
            .resolve(ProviderIdentity::DeepSeek, "deepseek-chat", &deadline())
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::PreflightFailed { .. }));
        assert!(err.to_string().contains("401"));
        assert!(!err.is_configuration());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_preflight_server_error() {
        let (base, _) = spawn_models_endpoint(StatusCode::BAD_GATEWAY).await;
        let resolver = resolver(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", base.as_str()),
        ]);

        let err = resolver
            .resolve(ProviderIdentity::OpenAi, "gpt-4o-mini", &deadline())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ResolveError::PreflightFailed {
                provider: ProviderIdentity::OpenAi,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_preflight_times_out_on_unresponsive_endpoint() {
        let router = Router::new().route(
            "/v1/models",
            get(|| async { std::future::pending::<StatusCode>().await }),
        );
        let base = spawn_server(router).await;
        let resolver = resolver(&[
            ("DEEPSEEK_API_KEY", "sk-test"),
            ("DEEPSEEK_BASE_URL", base.as_str()),
        ]);
        let deadline = deadline();

        let started = std::time::Instant::now();
        let err = resolver
            .resolve(ProviderIdentity::DeepSeek, "deepseek-chat", &deadline)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, ResolveError::PreflightFailed { .. }), "{err:?}");
        assert!(elapsed >= PREFLIGHT_TIMEOUT, "returned after {elapsed:?}");
        assert!(elapsed < PREFLIGHT_TIMEOUT * 2, "returned after {elapsed:?}");
        assert!(!deadline.is_expired());
    }

    #[tokio::test]
    async fn test_deepseek_resolves_with_registered_models() {
        let (base, hits) = spawn_models_endpoint(StatusCode::OK).await;
        let resolver = resolver(&[
            ("DEEPSEEK_API_KEY", "sk-test"),
            ("DEEPSEEK_BASE_URL", base.as_str()),
        ]);

        let client = resolver
            .resolve(ProviderIdentity::DeepSeek, "deepseek-chat", &deadline())
            .await
            .unwrap();

        assert_eq!(client.provider(), ProviderIdentity::DeepSeek);
        assert!(client.is_defined_model("deepseek/deepseek-chat"));
        assert!(client.is_defined_model("deepseek/deepseek-reasoner"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolution_is_repeatable() {
        let (base, hits) = spawn_models_endpoint(StatusCode::OK).await;
        let resolver = resolver(&[
            ("DEEPSEEK_API_KEY", "sk-test"),
            ("DEEPSEEK_BASE_URL", base.as_str()),
        ]);

        for _ in 0..2 {
            resolver
                .resolve(ProviderIdentity::DeepSeek, "deepseek-chat", &deadline())
                .await
                .unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_anthropic_has_no_preflight() {
        let resolver = resolver(&[
            ("ANTHROPIC_API_KEY", "ak-test"),
            ("ANTHROPIC_BASE_URL", "http://127.0.0.1:9/v1"),
        ]);

        let client = resolver
            .resolve(
                ProviderIdentity::Anthropic,
                "claude-sonnet-4-5",
                &deadline(),
            )
            .await
            .unwrap();

        assert_eq!(client.provider(), ProviderIdentity::Anthropic);
        assert_eq!(client.base_url(), "http://127.0.0.1:9/v1");
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_preflight() {
        let (base, hits) = spawn_models_endpoint(StatusCode::OK).await;
        let resolver = resolver(&[
            ("DEEPSEEK_API_KEY", "sk-test"),
            ("DEEPSEEK_BASE_URL", base.as_str()),
        ]);

        let err = resolver
            .resolve(
                ProviderIdentity::DeepSeek,
                "deepseek-chat",
                &Deadline::after(Duration::ZERO),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Deadline(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_proxy_rejected_at_construction() {
        let config = config_from(&[("LLM_PROXY", "http://[::1")]);
        assert!(ProviderResolver::new(Arc::new(config)).is_err());
    }
}
