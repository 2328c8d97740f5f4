//! Completion service backends for RiskProfiler.
//!
//! All providers implement the `riskprofiler_core::Provider` trait.
//! The router builds the configured backend and wraps it with retry.

pub mod openai_compat;
pub mod retry;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryProvider;
pub use router::{ProviderRouter, build_from_config};
