//! Profile session: one per client, advanced turn by turn.
//!
//! Lifecycle: `active → complete`. There is no way back out of `complete`.
//! The state and the profile change together: a session is complete exactly
//! when it holds a profile whose completion flag is set.

use crate::message::ChatTurn;
use crate::profile::ClientProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, unique identifier of a client's session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Complete,
}

/// A client's profiling session.
///
/// Deserialization goes through [`ProfileSession::restore`], so a serialized
/// `state` is never trusted over the profile it claims to hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "SessionParts")]
pub struct ProfileSession {
    client_id: ClientId,
    history: Vec<ChatTurn>,
    profile: Option<ClientProfile>,
    state: SessionState,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct SessionParts {
    client_id: ClientId,
    #[serde(default)]
    history: Vec<ChatTurn>,
    #[serde(default)]
    profile: Option<ClientProfile>,
    created_at: DateTime<Utc>,
}

impl From<SessionParts> for ProfileSession {
    fn from(parts: SessionParts) -> Self {
        Self::restore(parts.client_id, parts.history, parts.profile, parts.created_at)
    }
}

impl ProfileSession {
    /// Create a new active session with empty history.
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            history: Vec::new(),
            profile: None,
            state: SessionState::Active,
            created_at: Utc::now(),
        }
    }

    /// Rebuild a session from persisted parts. The state is derived from the profile.
    pub fn restore(
        client_id: ClientId,
        history: Vec<ChatTurn>,
        profile: Option<ClientProfile>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut session = Self {
            client_id,
            history,
            profile: None,
            state: SessionState::Active,
            created_at,
        };
        if let Some(profile) = profile {
            session.complete(profile);
        }
        session
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn profile(&self) -> Option<&ClientProfile> {
        self.profile.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Append a turn to the history.
    pub fn push(&mut self, turn: ChatTurn) {
        self.history.push(turn);
    }

    /// Store the final profile and move to `complete`.
    ///
    /// Returns `false` and leaves the session untouched if the profile is not
    /// flagged complete or the session already is.
    pub fn complete(&mut self, profile: ClientProfile) -> bool {
        if !profile.profile_complete || self.is_complete() {
            return false;
        }
        self.profile = Some(profile);
        self.state = SessionState::Complete;
        true
    }

    /// The first assistant turn, if a greeting was generated.
    pub fn greeting(&self) -> Option<&str> {
        self.history
            .first()
            .filter(|t| t.role == crate::message::Role::Assistant)
            .map(|t| t.content.as_str())
    }
}
