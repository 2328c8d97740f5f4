//! Session orchestrator: drives one client's interview from greeting to profile.
//!
//! Each turn runs under a per-session lock:
//!
//! 1. **Load** the session; reject unknown or already complete ones
//! 2. **Compose** policy + history + the new user turn
//! 3. **Complete** via the completion client
//! 4. **Commit** the user turn and the reply together
//! 5. **Extract** a profile from the reply; on success the session completes
//!
//! Nothing is written until the completion has succeeded, so a failed turn
//! leaves the session exactly as it was and the caller can simply retry.

use crate::completion::CompletionClient;
use crate::extractor::{Extraction, advisories, extract_profile};
use crate::prompt::ProfilePolicy;
use riskprofiler_core::error::{Error, ProfileError, Result, SessionError};
use riskprofiler_core::message::ChatTurn;
use riskprofiler_core::profile::ClientProfile;
use riskprofiler_core::session::{ClientId, ProfileSession};
use riskprofiler_core::store::SessionStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// A freshly started session and its opening message.
#[derive(Debug, Clone)]
pub struct SessionStart {
    pub client_id: ClientId,
    pub greeting: String,
}

/// The profile outcome of a single turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileStatus {
    /// Interview still in progress.
    Pending,
    /// The reply carried a valid profile; the session is now complete.
    Complete(ClientProfile),
    /// The reply claimed completion but the payload was unusable. The session
    /// stays active and the conversation can continue.
    Malformed(ProfileError),
}

impl ProfileStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, ProfileStatus::Complete(_))
    }

    pub fn profile(&self) -> Option<&ClientProfile> {
        match self {
            ProfileStatus::Complete(profile) => Some(profile),
            _ => None,
        }
    }
}

/// Result of advancing a session by one user turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The model's reply, verbatim (including any JSON payload)
    pub reply: String,

    pub status: ProfileStatus,

    /// Non-fatal problems with a completed profile
    pub warnings: Vec<String>,
}

/// Coordinates the store, the prompt policy and the completion client.
pub struct SessionOrchestrator {
    store: Arc<dyn SessionStore>,
    policy: ProfilePolicy,
    client: CompletionClient,

    /// One async lock per session; turns on the same session run one at a time
    locks: Mutex<HashMap<ClientId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionOrchestrator {
    pub fn new(store: Arc<dyn SessionStore>, policy: ProfilePolicy, client: CompletionClient) -> Self {
        Self {
            store,
            policy,
            client,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn client(&self) -> &CompletionClient {
        &self.client
    }

    /// Create a session and generate its greeting.
    ///
    /// If the greeting can't be generated the session still exists; the
    /// error carries its id so the caller can [`retry_greeting`](Self::retry_greeting)
    /// or go straight to [`advance`](Self::advance).
    pub async fn start_session(&self) -> Result<SessionStart> {
        let client_id = ClientId::new();
        self.store
            .create(ProfileSession::new(client_id.clone()))
            .await?;
        info!(client_id = %client_id, "Session created");

        let greeting = self.greet(&client_id).await?;
        Ok(SessionStart {
            client_id,
            greeting,
        })
    }

    /// Generate the greeting for a session whose history is still empty.
    ///
    /// Returns the existing greeting when there already is one. A session
    /// that went straight to [`advance`](Self::advance) after a failed
    /// greeting gets [`SessionError::GreetingSkipped`].
    pub async fn retry_greeting(&self, client_id: &ClientId) -> Result<String> {
        self.ensure_exists(client_id).await?;
        self.greet(client_id).await
    }

    /// Advance a session by one user turn.
    pub async fn advance(&self, client_id: &ClientId, user_text: &str) -> Result<TurnOutcome> {
        self.ensure_exists(client_id).await?;
        let lock = self.lock_for(client_id);
        let _guard = lock.lock().await;

        let mut session = self.load(client_id).await?;
        if session.is_complete() {
            return Err(SessionError::AlreadyComplete(client_id.clone()).into());
        }

        let user_turn = ChatTurn::user(user_text);
        let messages = self.policy.compose(session.history(), &user_turn);
        let reply = self.client.complete(messages).await?;
        debug!(client_id = %client_id, reply = %reply, "Model reply");

        session.push(user_turn);
        session.push(ChatTurn::assistant(&reply));

        let (status, warnings) = match extract_profile(&reply) {
            Extraction::Complete(profile) => {
                let warnings = advisories(&profile);
                session.complete(profile.clone());
                info!(
                    client_id = %client_id,
                    risk_score = profile.risk_score,
                    risk_category = %profile.risk_category,
                    turns = session.history().len(),
                    "Profile complete"
                );
                (ProfileStatus::Complete(profile), warnings)
            }
            Extraction::Malformed(e) => {
                warn!(client_id = %client_id, error = %e, "Reply claimed completion with an unusable profile");
                (ProfileStatus::Malformed(e), Vec::new())
            }
            Extraction::NotFound => (ProfileStatus::Pending, Vec::new()),
        };

        self.store.put(session).await?;
        Ok(TurnOutcome {
            reply,
            status,
            warnings,
        })
    }

    /// The completed profile, or `None` while the interview is in progress.
    pub async fn get_profile(&self, client_id: &ClientId) -> Result<Option<ClientProfile>> {
        Ok(self.load(client_id).await?.profile().cloned())
    }

    /// A snapshot of the whole session.
    pub async fn session(&self, client_id: &ClientId) -> Result<ProfileSession> {
        self.load(client_id).await
    }

    /// [`start_session`](Self::start_session) on its own task, so it runs to
    /// completion even if the caller stops waiting.
    pub async fn start_session_detached(self: &Arc<Self>) -> Result<SessionStart> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.start_session().await })
            .await
            .map_err(|e| Error::Internal(format!("session start task failed: {e}")))?
    }

    /// [`advance`](Self::advance) on its own task. Dropping the returned
    /// future doesn't cancel the turn; it is still committed.
    pub async fn advance_detached(
        self: &Arc<Self>,
        client_id: ClientId,
        user_text: String,
    ) -> Result<TurnOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.advance(&client_id, &user_text).await })
            .await
            .map_err(|e| Error::Internal(format!("turn task failed: {e}")))?
    }

    /// [`retry_greeting`](Self::retry_greeting) on its own task.
    pub async fn retry_greeting_detached(self: &Arc<Self>, client_id: ClientId) -> Result<String> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.retry_greeting(&client_id).await })
            .await
            .map_err(|e| Error::Internal(format!("greeting task failed: {e}")))?
    }

    async fn greet(&self, client_id: &ClientId) -> Result<String> {
        let lock = self.lock_for(client_id);
        let _guard = lock.lock().await;

        let mut session = self.load(client_id).await?;
        if let Some(greeting) = session.greeting() {
            return Ok(greeting.to_string());
        }
        if !session.history().is_empty() {
            return Err(SessionError::GreetingSkipped(client_id.clone()).into());
        }

        let greeting = match self.client.complete(self.policy.compose_kickoff()).await {
            Ok(greeting) => greeting,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Greeting failed");
                let reason = match e {
                    SessionError::CompletionUnavailable { reason } => reason,
                    other => other.to_string(),
                };
                return Err(SessionError::GreetingUnavailable {
                    client_id: client_id.clone(),
                    reason,
                }
                .into());
            }
        };

        session.push(ChatTurn::assistant(&greeting));
        self.store.put(session).await?;
        info!(client_id = %client_id, "Greeting sent");
        Ok(greeting)
    }

    async fn load(&self, client_id: &ClientId) -> Result<ProfileSession> {
        self.store
            .get(client_id)
            .await?
            .ok_or_else(|| SessionError::UnknownSession(client_id.clone()).into())
    }

    // Sessions are never deleted, so checking first keeps unknown ids out of
    // the lock table.
    async fn ensure_exists(&self, client_id: &ClientId) -> Result<()> {
        self.load(client_id).await.map(|_| ())
    }

    fn lock_for(&self, client_id: &ClientId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(client_id.clone()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, completion_reply};
    use riskprofiler_core::error::ProviderError;
    use riskprofiler_core::message::Role;
    use riskprofiler_core::profile::RiskCategory;
    use riskprofiler_core::session::SessionState;
    use riskprofiler_store::InMemorySessionStore;
    use std::time::Duration;

    fn orchestrator(provider: Arc<ScriptedProvider>) -> Arc<SessionOrchestrator> {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        Arc::new(SessionOrchestrator::new(
            store,
            ProfilePolicy::default(),
            CompletionClient::new(provider, "mock-model"),
        ))
    }

    fn unavailable() -> ProviderError {
        ProviderError::Network("connection refused".into())
    }

    #[tokio::test]
    async fn full_interview_completes_profile() {
        let complete = completion_reply(87, "aggressive");
        let provider = Arc::new(ScriptedProvider::replies(&[
            "Welcome! How old are you?",
            "Thanks. What's your investment horizon?",
            "How would you describe your risk tolerance?",
            "What is your main goal?",
            &complete,
        ]));
        let orch = orchestrator(provider.clone());

        let start = orch.start_session().await.unwrap();
        assert_eq!(start.greeting, "Welcome! How old are you?");
        assert!(orch.get_profile(&start.client_id).await.unwrap().is_none());

        for answer in ["I'm 28", "30 years", "Aggressive"] {
            let outcome = orch.advance(&start.client_id, answer).await.unwrap();
            assert_eq!(outcome.status, ProfileStatus::Pending);
        }

        let last = orch
            .advance(&start.client_id, "Wealth building, $95k income, $20k invested")
            .await
            .unwrap();
        assert!(last.status.is_complete());
        assert!(last.warnings.is_empty());
        assert_eq!(last.reply, complete);

        let profile = orch.get_profile(&start.client_id).await.unwrap().unwrap();
        assert_eq!(profile.risk_score, 87);
        assert_eq!(profile.risk_category, RiskCategory::Aggressive);
        assert_eq!(last.status.profile(), Some(&profile));

        let session = orch.session(&start.client_id).await.unwrap();
        assert_eq!(session.state(), SessionState::Complete);
        // greeting + 4 user/assistant pairs
        assert_eq!(session.history().len(), 9);

        let err = orch.advance(&start.client_id, "one more thing").await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::AlreadyComplete(_))));
        assert_eq!(provider.call_count(), 5);
        assert_eq!(orch.session(&start.client_id).await.unwrap().history().len(), 9);
    }

    #[tokio::test]
    async fn each_turn_resends_full_history() {
        let provider = Arc::new(ScriptedProvider::replies(&["Hello!", "Q2", "Q3"]));
        let orch = orchestrator(provider.clone());
        let start = orch.start_session().await.unwrap();

        orch.advance(&start.client_id, "a1").await.unwrap();
        orch.advance(&start.client_id, "a2").await.unwrap();

        let requests = provider.requests();
        // kickoff: system + kickoff instruction
        assert_eq!(requests[0].messages.len(), 2);
        // system + greeting + a1
        assert_eq!(requests[1].messages.len(), 3);
        // system + greeting + a1 + Q2 + a2
        let last = &requests[2].messages;
        assert_eq!(last.len(), 5);
        assert_eq!(last[0].role, Role::System);
        assert_eq!(last[1].content, "Hello!");
        assert_eq!(last[4].content, "a2");
        assert_eq!(last[4].role, Role::User);
    }

    #[tokio::test]
    async fn unknown_session_is_rejected_without_side_effects() {
        let provider = Arc::new(ScriptedProvider::replies(&[]));
        let orch = orchestrator(provider.clone());
        let ghost = ClientId::from("does-not-exist");

        let err = orch.advance(&ghost, "hello").await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::UnknownSession(_))));
        assert!(matches!(
            orch.get_profile(&ghost).await.unwrap_err(),
            Error::Session(SessionError::UnknownSession(_))
        ));
        assert_eq!(orch.store().count().await.unwrap(), 0);
        assert_eq!(provider.call_count(), 0);
        assert!(orch.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_keeps_session_active() {
        let malformed = r#"Done! {"profile_complete": true, "risk_category": "moderate"}"#;
        let provider = Arc::new(ScriptedProvider::replies(&[
            "Hi!",
            malformed,
            &completion_reply(50, "moderate"),
        ]));
        let orch = orchestrator(provider);
        let start = orch.start_session().await.unwrap();

        let outcome = orch.advance(&start.client_id, "all my answers").await.unwrap();
        assert_eq!(
            outcome.status,
            ProfileStatus::Malformed(ProfileError::MissingField("risk_score"))
        );
        assert_eq!(outcome.reply, malformed);

        let session = orch.session(&start.client_id).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.history().len(), 3);

        let retry = orch.advance(&start.client_id, "please try again").await.unwrap();
        assert!(retry.status.is_complete());
    }

    #[tokio::test]
    async fn completion_failure_leaves_session_untouched() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("Hi!".into()),
            Err(unavailable()),
            Ok("How old are you?".into()),
        ]));
        let orch = orchestrator(provider);
        let start = orch.start_session().await.unwrap();

        let err = orch.advance(&start.client_id, "hello").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::CompletionUnavailable { .. })
        ));
        assert!(err.is_transient());
        assert_eq!(orch.session(&start.client_id).await.unwrap().history().len(), 1);

        orch.advance(&start.client_id, "hello").await.unwrap();
        let history = orch.session(&start.client_id).await.unwrap().history().to_vec();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].content, "hello");
    }

    #[tokio::test]
    async fn greeting_failure_keeps_session_and_can_be_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(unavailable()),
            Ok("Welcome back!".into()),
        ]));
        let orch = orchestrator(provider.clone());

        let err = orch.start_session().await.unwrap_err();
        let client_id = match err {
            Error::Session(SessionError::GreetingUnavailable { client_id, reason }) => {
                assert!(reason.contains("connection refused"));
                client_id
            }
            other => panic!("unexpected error: {other:?}"),
        };
        assert!(orch.session(&client_id).await.unwrap().history().is_empty());

        assert_eq!(orch.retry_greeting(&client_id).await.unwrap(), "Welcome back!");
        // A second retry returns the stored greeting without calling the model
        assert_eq!(orch.retry_greeting(&client_id).await.unwrap(), "Welcome back!");
        assert_eq!(provider.call_count(), 2);
        assert_eq!(orch.session(&client_id).await.unwrap().greeting(), Some("Welcome back!"));
    }

    #[tokio::test]
    async fn interview_without_greeting_keeps_two_turns_per_advance() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(unavailable()),
            Ok("How long will you stay invested?".into()),
            Ok("And how would you react to a 20% drop?".into()),
        ]));
        let orch = orchestrator(provider.clone());

        let client_id = match orch.start_session().await.unwrap_err() {
            Error::Session(SessionError::GreetingUnavailable { client_id, .. }) => client_id,
            other => panic!("unexpected error: {other:?}"),
        };
        orch.advance(&client_id, "hi, I'm 40").await.unwrap();
        orch.advance(&client_id, "about 15 years").await.unwrap();

        let session = orch.session(&client_id).await.unwrap();
        assert_eq!(session.history().len(), 4);
        assert_eq!(session.history()[0].role, Role::User);
        assert!(session.greeting().is_none());

        // A reply to the client is not a greeting
        let err = orch.retry_greeting(&client_id).await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::GreetingSkipped(_))));
        assert!(err.is_client_error());
        assert_eq!(provider.call_count(), 3);
        assert_eq!(orch.session(&client_id).await.unwrap().history().len(), 4);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let provider = Arc::new(ScriptedProvider::replies(&[
            "Hi A",
            "Hi B",
            &completion_reply(20, "conservative"),
        ]));
        let orch = orchestrator(provider);
        let a = orch.start_session().await.unwrap();
        let b = orch.start_session().await.unwrap();
        assert_ne!(a.client_id, b.client_id);

        orch.advance(&a.client_id, "everything").await.unwrap();
        assert!(orch.get_profile(&a.client_id).await.unwrap().is_some());
        assert!(orch.get_profile(&b.client_id).await.unwrap().is_none());
        assert_eq!(orch.session(&b.client_id).await.unwrap().history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_turns_on_one_session_are_serialized() {
        let provider = Arc::new(
            ScriptedProvider::replies(&["Hi!", "Q2", "Q3"]).with_delay(Duration::from_millis(100)),
        );
        let orch = orchestrator(provider.clone());
        let start = orch.start_session().await.unwrap();

        let (first, second) = tokio::join!(
            orch.advance(&start.client_id, "first"),
            orch.advance(&start.client_id, "second"),
        );
        first.unwrap();
        second.unwrap();

        let history = orch.session(&start.client_id).await.unwrap().history().to_vec();
        assert_eq!(history.len(), 5);
        let roles: Vec<Role> = history.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::Assistant, Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        // The second turn saw the first one's reply
        assert_eq!(provider.requests()[2].messages.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn detached_turn_survives_caller_giving_up() {
        let provider = Arc::new(
            ScriptedProvider::replies(&["Hi!", "Q2"]).with_delay(Duration::from_secs(10)),
        );
        let orch = orchestrator(provider);
        let start = orch.start_session_detached().await.unwrap();

        let gave_up = tokio::time::timeout(
            Duration::from_secs(1),
            orch.advance_detached(start.client_id.clone(), "answer".into()),
        )
        .await;
        assert!(gave_up.is_err());

        tokio::time::sleep(Duration::from_secs(20)).await;
        let history = orch.session(&start.client_id).await.unwrap().history().to_vec();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].content, "Q2");
    }

    #[tokio::test]
    async fn completed_profile_reports_advisories() {
        let reply = r#"{"profile_complete": true, "risk_score": 90, "risk_category": "conservative",
            "allocation": {"stocks": 30, "bonds": 50, "cash": 15, "alternatives": 5}}"#;
        let provider = Arc::new(ScriptedProvider::replies(&["Hi!", reply]));
        let orch = orchestrator(provider);
        let start = orch.start_session().await.unwrap();

        let outcome = orch.advance(&start.client_id, "done").await.unwrap();
        assert!(outcome.status.is_complete());
        assert_eq!(outcome.warnings.len(), 1);
        // The model's category stands; the mismatch is only reported
        let profile = orch.get_profile(&start.client_id).await.unwrap().unwrap();
        assert_eq!(profile.risk_category, RiskCategory::Conservative);
    }
}
