//! Provider router: selects the completion backend based on config.
//!
//! Handles provider creation, retry wrapping, and lookup by name.

use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::RetryProvider;
use riskprofiler_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Routes completion requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }
}

/// Build providers from configuration.
///
/// Every backend is wrapped in a [`RetryProvider`] when
/// `completion.max_attempts > 1`.
pub fn build_from_config(config: &riskprofiler_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_else(|| default_api_key(name));

        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        let provider = Arc::new(OpenAiCompatProvider::new(name, &base_url, &api_key));
        router.register(name.clone(), with_retry(provider, config));
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let api_key = config
            .api_key
            .clone()
            .unwrap_or_else(|| default_api_key(&config.default_provider));
        let base_url = default_base_url(&config.default_provider);

        let provider = Arc::new(OpenAiCompatProvider::new(
            &config.default_provider,
            &base_url,
            &api_key,
        ));
        router.register(config.default_provider.clone(), with_retry(provider, config));
    }

    router
}

fn with_retry(
    provider: Arc<dyn Provider>,
    config: &riskprofiler_config::AppConfig,
) -> Arc<dyn Provider> {
    if config.completion.max_attempts <= 1 {
        return provider;
    }

    Arc::new(
        RetryProvider::new(provider)
            .with_max_attempts(config.completion.max_attempts)
            .with_initial_backoff(Duration::from_millis(config.completion.initial_backoff_ms))
            .with_attempt_timeout(Duration::from_secs(config.completion.attempt_timeout_secs)),
    )
}

/// Local servers accept any key.
fn default_api_key(provider_name: &str) -> String {
    match provider_name {
        "ollama" | "vllm" | "llamacpp" | "llama.cpp" => provider_name.into(),
        _ => String::new(),
    }
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "ollama" => "http://localhost:11434/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
