//! Completion client: one request to the language model, one reply back.
//!
//! Whatever goes wrong on the way (transport, timeout, a reply the backend
//! couldn't make sense of) surfaces as [`SessionError::CompletionUnavailable`].

use riskprofiler_config::AppConfig;
use riskprofiler_core::error::SessionError;
use riskprofiler_core::message::ChatTurn;
use riskprofiler_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Sends composed message lists to a [`Provider`] and returns the reply text.
pub struct CompletionClient {
    /// The completion backend
    provider: Arc<dyn Provider>,

    /// Model identifier passed through to the backend
    model: String,

    /// Sampling temperature
    temperature: f32,

    /// Max tokens per reply
    max_tokens: Option<u32>,

    /// Upper bound on a whole completion, retries included
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            timeout: Duration::from_secs(180),
        }
    }

    /// Client using the configured model, sampling settings and timeout.
    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig) -> Self {
        Self::new(provider, config.effective_model())
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_timeout(Duration::from_secs(config.completion.timeout_secs))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Request a completion for `messages` and return the reply text.
    pub async fn complete(&self, messages: Vec<ChatTurn>) -> Result<String, SessionError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let message_count = request.messages.len();

        let response = match tokio::time::timeout(self.timeout, self.provider.complete(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(provider = self.provider.name(), error = %e, "Completion failed");
                return Err(SessionError::CompletionUnavailable {
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    provider = self.provider.name(),
                    timeout_secs = self.timeout.as_secs(),
                    "Completion timed out"
                );
                return Err(SessionError::CompletionUnavailable {
                    reason: format!("no reply within {}s", self.timeout.as_secs()),
                });
            }
        };

        if response.content.trim().is_empty() {
            warn!(provider = self.provider.name(), "Completion returned an empty reply");
            return Err(SessionError::CompletionUnavailable {
                reason: "empty reply".into(),
            });
        }

        debug!(
            provider = self.provider.name(),
            model = %response.model,
            messages = message_count,
            reply_len = response.content.len(),
            "Completion received"
        );
        Ok(response.content)
    }
}
