//! # RiskProfiler Core
//!
//! Domain types, traits, and error definitions for the RiskProfiler
//! onboarding assistant. This crate does **no I/O**: it defines the domain
//! model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The two collaborators with real-world side effects are defined as traits
//! here and implemented elsewhere:
//! - [`Provider`]: the text-completion service (an LLM behind HTTP)
//! - [`SessionStore`]: where profile sessions live between turns
//!
//! The engine crate only ever talks to these traits, so tests can script the
//! model and swap the store without touching the orchestration code.

pub mod error;
pub mod message;
pub mod profile;
pub mod provider;
pub mod session;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProfileError, ProviderError, Result, SessionError, StoreError};
pub use message::{ChatTurn, Role};
pub use profile::{Allocation, ClientProfile, InvestmentGoal, RiskCategory};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use session::{ClientId, ProfileSession, SessionState};
pub use store::SessionStore;
