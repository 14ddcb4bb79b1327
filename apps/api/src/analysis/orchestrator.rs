//! Invocation Orchestrator — resilient questionnaire analysis.
//!
//! Flow: acquire_client (Phase A) → build_prompt → generate_report (Phase B).
//!
//! Phase A retries provider resolution and, once more than
//! `fallback_after_failures` attempts have failed, spends the final attempt on
//! the fallback provider. Phase B retries generation and parsing against the
//! acquired client and returns a sentinel response when it runs out of
//! attempts. Both phases share one `RetryPolicy` and one `Deadline`; the
//! provider never changes once Phase B has started.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::analysis::error::{AnalysisError, AnalysisFailure};
use crate::analysis::models::{AnalysisRequest, AnalysisResponse};
use crate::analysis::prompts::{build_prompt, system_instruction};
use crate::deadline::Deadline;
use crate::llm_client::{
    ClientResolver, GenerationClient, GenerationRequest, LlmError, ProviderIdentity, ResolveError,
};

pub const MAX_ATTEMPTS: u32 = 5;
pub const FALLBACK_AFTER_FAILURES: u32 = 2;
pub const BASE_BACKOFF: Duration = Duration::from_millis(200);

pub const FALLBACK_PROVIDER: ProviderIdentity = ProviderIdentity::DeepSeek;
pub const FALLBACK_MODEL: &str = "deepseek/deepseek-chat";

/// Attempt budget and backoff schedule shared by both phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub fallback_after_failures: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            fallback_after_failures: FALLBACK_AFTER_FAILURES,
            base_delay: BASE_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    fn budget(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Provider and model an orchestration is currently working with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptState {
    pub provider: ProviderIdentity,
    pub model: String,
    pub attempt: u32,
    pub fallen_back: bool,
}

impl AttemptState {
    fn new(provider: ProviderIdentity, model: &str) -> Self {
        Self {
            provider,
            model: model.to_string(),
            attempt: 0,
            fallen_back: false,
        }
    }

    fn is_fallback(&self) -> bool {
        self.provider == FALLBACK_PROVIDER && self.model == FALLBACK_MODEL
    }

    /// One-time, irreversible switch to the fallback provider.
    fn fall_back(&mut self) {
        self.provider = FALLBACK_PROVIDER;
        self.model = FALLBACK_MODEL.to_string();
        self.fallen_back = true;
    }
}

/// Runs one questionnaire through an LLM. Carried in `AppState` as
/// `Arc<dyn Analyzer>`.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
        deadline: &Deadline,
    ) -> Result<AnalysisResponse, AnalysisFailure>;
}

pub struct Orchestrator<R> {
    resolver: R,
    provider: ProviderIdentity,
    model: String,
    policy: RetryPolicy,
    system: String,
}

impl<R: ClientResolver> Orchestrator<R> {
    pub fn new(resolver: R, provider: ProviderIdentity, model: impl Into<String>) -> Self {
        Self {
            resolver,
            provider,
            model: model.into(),
            policy: RetryPolicy::default(),
            system: system_instruction(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Full analysis: acquire a client, then generate and parse the report.
    pub async fn invoke(
        &self,
        request: &AnalysisRequest,
        provider: ProviderIdentity,
        model: &str,
        deadline: &Deadline,
    ) -> Result<AnalysisResponse, AnalysisFailure> {
        let (client, state) = self.acquire_client(provider, model, deadline).await?;

        info!(
            provider = %state.provider,
            model = %state.model,
            fallen_back = state.fallen_back,
            "Model selected, sending analysis request"
        );

        self.generate_report(&client, &state, request, deadline)
            .await
    }

    /// Phase A. Configuration errors and deadline expiry end the phase
    /// immediately; anything else is retried with backoff.
    async fn acquire_client(
        &self,
        provider: ProviderIdentity,
        model: &str,
        deadline: &Deadline,
    ) -> Result<(R::Client, AttemptState), AnalysisError> {
        let budget = self.policy.budget();
        let mut state = AttemptState::new(provider, model);

        loop {
            state.attempt += 1;
            deadline.check()?;

            let failures = state.attempt - 1;
            if state.attempt == budget
                && failures > self.policy.fallback_after_failures
                && !state.fallen_back
                && !state.is_fallback()
            {
                warn!(
                    failures,
                    from = %state.provider,
                    to = %FALLBACK_PROVIDER,
                    model = FALLBACK_MODEL,
                    "Switching to fallback model"
                );
                state.fall_back();
            }

            let error = match self
                .resolver
                .resolve(state.provider, &state.model, deadline)
                .await
            {
                Ok(client) => return Ok((client, state)),
                Err(ResolveError::Deadline(e)) => return Err(e.into()),
                Err(e) if e.is_configuration() => {
                    warn!(provider = %state.provider, "Model initialization misconfigured: {e}");
                    return Err(AnalysisError::Configuration(e));
                }
                Err(e) => e,
            };

            warn!(
                attempt = state.attempt,
                provider = %state.provider,
                "Model initialization failed: {error}"
            );

            if state.attempt >= budget {
                return Err(AnalysisError::InitializationExhausted {
                    attempts: state.attempt,
                    source: error,
                });
            }

            deadline.sleep(self.policy.backoff(state.attempt)).await?;
        }
    }

    /// Phase B. The prompt is built once; every failed attempt backs off and
    /// retries against the same client.
    async fn generate_report(
        &self,
        client: &R::Client,
        state: &AttemptState,
        request: &AnalysisRequest,
        deadline: &Deadline,
    ) -> Result<AnalysisResponse, AnalysisFailure> {
        let budget = self.policy.budget();
        let prompt = build_prompt(&request.answers);
        let call = GenerationRequest {
            model: &state.model,
            system: &self.system,
            prompt: &prompt,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            deadline.check()?;

            let error = match client.generate(call, deadline).await {
                Ok(Some(generation)) => {
                    match generation.usage {
                        Some(usage) => info!(
                            model = %state.model,
                            input_tokens = usage.input_tokens,
                            output_tokens = usage.output_tokens,
                            "Token usage"
                        ),
                        None => debug!(model = %state.model, "Token usage not reported"),
                    }

                    match generation.output::<AnalysisResponse>() {
                        Ok(response) => {
                            info!(attempt, "Analysis received from model");
                            return Ok(response);
                        }
                        Err(e) => {
                            warn!(attempt, model = %state.model, "Failed to parse model output: {e}");
                            AnalysisError::ParseFailed {
                                attempts: attempt,
                                source: e,
                            }
                        }
                    }
                }
                Ok(None) => {
                    warn!(attempt, model = %state.model, "Model returned no result");
                    AnalysisError::GenerationFailed {
                        attempts: attempt,
                        source: LlmError::EmptyResponse,
                    }
                }
                Err(LlmError::Deadline(e)) => return Err(e.into()),
                Err(e) => {
                    warn!(attempt, model = %state.model, "Model call failed: {e}");
                    AnalysisError::GenerationFailed {
                        attempts: attempt,
                        source: e,
                    }
                }
            };

            if attempt >= budget {
                return Err(AnalysisFailure::exhausted(error));
            }

            deadline.sleep(self.policy.backoff(attempt)).await?;
        }
    }
}

#[async_trait]
impl<R: ClientResolver> Analyzer for Orchestrator<R> {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
        deadline: &Deadline,
    ) -> Result<AnalysisResponse, AnalysisFailure> {
        self.invoke(request, self.provider, &self.model, deadline)
            .await
    }
}
