//! The risk profiling engine.
//!
//! A client's interview is a loop of:
//!
//! 1. **Compose** the elicitation policy and the conversation so far
//! 2. **Complete** it with the language model
//! 3. **Extract** a finished profile from the reply, if there is one
//!
//! The loop ends when a reply carries a valid profile. The session is then
//! complete and accepts no further turns.

pub mod completion;
pub mod extractor;
pub mod orchestrator;
pub mod prompt;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use completion::CompletionClient;
pub use extractor::{Extraction, advisories, extract_profile};
pub use orchestrator::{ProfileStatus, SessionOrchestrator, SessionStart, TurnOutcome};
pub use prompt::ProfilePolicy;
