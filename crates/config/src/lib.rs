//! Configuration loading, validation, and management for RiskProfiler.
//!
//! Loads configuration from `~/.riskprofiler/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.riskprofiler/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default completion provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per completion
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Completion call limits (timeout, retry)
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Session store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Profiling policy overrides
    #[serde(default)]
    pub profiler: ProfilerConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "llama3.2".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("completion", &self.completion)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .field("profiler", &self.profiler)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Limits applied around every call to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Overall deadline for one completion, retries included
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per completion (1 = no retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Per-attempt deadline used by the retry wrapper
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    180
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_attempt_timeout_secs() -> u64 {
    55
}

impl CompletionConfig {
    /// Worst-case time the retry wrapper can spend on one completion:
    /// every attempt running to its deadline, plus the backoff between them.
    pub fn retry_budget_ms(&self) -> u64 {
        let attempts = u64::from(self.max_attempts);
        let backoff: u64 = (1..self.max_attempts)
            .map(|retry| {
                self.initial_backoff_ms
                    .saturating_mul(2u64.saturating_pow(retry - 1))
            })
            .fold(0, u64::saturating_add);
        attempts
            .saturating_mul(self.attempt_timeout_secs.saturating_mul(1000))
            .saturating_add(backoff)
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "file"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Directory for the file backend (defaults to `~/.riskprofiler/sessions`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> String {
    "memory".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// Resolved directory for the file backend.
    pub fn sessions_dir(&self) -> PathBuf {
        self.path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::config_dir().join("sessions"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Replace the built-in system instruction entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,

    /// Replace the built-in greeting kickoff instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kickoff_override: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.riskprofiler/config.toml).
    ///
    /// Also checks environment variables:
    /// - `RISKPROFILER_API_KEY`, then `OPENAI_API_KEY`
    /// - `RISKPROFILER_PROVIDER`, `RISKPROFILER_MODEL`
    /// - `RISKPROFILER_BASE_URL` (base URL of the default provider)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("RISKPROFILER_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("RISKPROFILER_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("RISKPROFILER_MODEL") {
            self.default_model = model;
        }

        if let Ok(url) = std::env::var("RISKPROFILER_BASE_URL") {
            self.providers
                .entry(self.default_provider.clone())
                .or_insert_with(|| ProviderConfig {
                    api_key: None,
                    api_url: None,
                    default_model: None,
                })
                .api_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".riskprofiler")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.completion.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "completion.timeout_secs must be > 0".into(),
            ));
        }

        if self.completion.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "completion.max_attempts must be >= 1".into(),
            ));
        }

        if self.completion.max_attempts > 1 {
            if self.completion.attempt_timeout_secs == 0 {
                return Err(ConfigError::ValidationError(
                    "completion.attempt_timeout_secs must be > 0".into(),
                ));
            }
            let budget_ms = self.completion.retry_budget_ms();
            if budget_ms > self.completion.timeout_secs.saturating_mul(1000) {
                return Err(ConfigError::ValidationError(format!(
                    "completion.timeout_secs ({}s) is shorter than {} attempts of {}s plus backoff ({budget_ms}ms)",
                    self.completion.timeout_secs,
                    self.completion.max_attempts,
                    self.completion.attempt_timeout_secs,
                )));
            }
        }

        if !matches!(self.store.backend.as_str(), "memory" | "file") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be \"memory\" or \"file\", got \"{}\"",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Model to use for the default provider, honoring a per-provider override.
    pub fn effective_model(&self) -> &str {
        self.providers
            .get(&self.default_provider)
            .and_then(|p| p.default_model.as_deref())
            .unwrap_or(&self.default_model)
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            completion: CompletionConfig::default(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
            profiler: ProfilerConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "ollama");
        assert_eq!(config.default_model, "llama3.2");
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.store.backend, "memory");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.completion.max_attempts, config.completion.max_attempts);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = AppConfig::default();
        config.completion.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_attempt_timeout_rejected() {
        let mut config = AppConfig::default();
        config.completion.attempt_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("attempt_timeout_secs"));
    }

    #[test]
    fn retries_must_fit_overall_timeout() {
        let defaults = CompletionConfig::default();
        assert_eq!(defaults.retry_budget_ms(), 3 * 55_000 + 500 + 1000);
        assert!(defaults.retry_budget_ms() < defaults.timeout_secs * 1000);

        let mut config = AppConfig::default();
        config.completion.attempt_timeout_secs = 60;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));

        // A single attempt is bounded by timeout_secs alone
        config.completion.max_attempts = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_store_backend_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "redis".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("redis"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().default_provider, "ollama");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_model = "qwen2.5"

[completion]
timeout_secs = 30
attempt_timeout_secs = 9

[store]
backend = "file"
path = "/var/lib/riskprofiler"

[providers.ollama]
api_url = "http://gpu-box:11434/v1"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "qwen2.5");
        assert_eq!(config.completion.timeout_secs, 30);
        assert_eq!(config.completion.max_attempts, 3);
        assert_eq!(config.completion.attempt_timeout_secs, 9);
        assert_eq!(
            config.store.sessions_dir(),
            PathBuf::from("/var/lib/riskprofiler")
        );
        assert_eq!(
            config.providers["ollama"].api_url.as_deref(),
            Some("http://gpu-box:11434/v1")
        );
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn effective_model_prefers_provider_override() {
        let mut config = AppConfig::default();
        assert_eq!(config.effective_model(), "llama3.2");

        config.providers.insert(
            "ollama".into(),
            ProviderConfig {
                api_key: None,
                api_url: None,
                default_model: Some("mistral".into()),
            },
        );
        assert_eq!(config.effective_model(), "mistral");
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("ollama"));
        assert!(toml_str.contains("llama3.2"));
    }
}
