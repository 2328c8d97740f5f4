//! File-based session store: one append-only JSON-lines log per session.
//!
//! Layout: `<dir>/<client_id>.jsonl`. Each line is one record:
//!
//! ```text
//! {"type":"created","client_id":"…","created_at":"…"}
//! {"type":"turn","turn":{"role":"assistant","content":"Welcome!…","timestamp":"…"}}
//! {"type":"turn","turn":{"role":"user","content":"I'm 28","timestamp":"…"}}
//! {"type":"profile","profile":{"profile_complete":true,"risk_score":87,…}}
//! ```
//!
//! Turns are only ever appended and the profile record is written once, so
//! `put` rejects any snapshot that rewrites what is already on disk. All logs
//! are replayed into memory on open; reads never touch the filesystem.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use riskprofiler_core::error::StoreError;
use riskprofiler_core::message::ChatTurn;
use riskprofiler_core::profile::ClientProfile;
use riskprofiler_core::session::{ClientId, ProfileSession};
use riskprofiler_core::store::SessionStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LogRecord {
    Created {
        client_id: ClientId,
        created_at: DateTime<Utc>,
    },
    Turn {
        turn: ChatTurn,
    },
    Profile {
        profile: ClientProfile,
    },
}

/// A durable store backed by per-session JSONL turn logs.
pub struct FileSessionStore {
    dir: PathBuf,
    sessions: RwLock<HashMap<ClientId, ProfileSession>>,
}

impl FileSessionStore {
    /// Open (or create) a store rooted at `dir`, replaying every existing log.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            StoreError::Storage(format!(
                "Failed to create sessions directory {}: {e}",
                dir.display()
            ))
        })?;

        let mut sessions = HashMap::new();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| StoreError::Storage(format!("Failed to list {}: {e}", dir.display())))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(session) = Self::replay(&path) {
                sessions.insert(session.client_id().clone(), session);
            }
        }

        debug!(dir = %dir.display(), count = sessions.len(), "File session store loaded");
        Ok(Self {
            dir,
            sessions: RwLock::new(sessions),
        })
    }

    /// Rebuild one session from its log. Corrupt lines are skipped.
    fn replay(path: &Path) -> Option<ProfileSession> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable session log");
                return None;
            }
        };

        let mut header: Option<(ClientId, DateTime<Utc>)> = None;
        let mut history = Vec::new();
        let mut profile = None;

        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<LogRecord>(line) {
                Ok(LogRecord::Created {
                    client_id,
                    created_at,
                }) => header = Some((client_id, created_at)),
                Ok(LogRecord::Turn { turn }) => history.push(turn),
                Ok(LogRecord::Profile { profile: p }) => profile = Some(p),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping corrupted session record");
                }
            }
        }

        let Some((client_id, created_at)) = header else {
            warn!(path = %path.display(), "Session log has no header record, skipping");
            return None;
        };

        Some(ProfileSession::restore(client_id, history, profile, created_at))
    }

    fn log_path(&self, client_id: &ClientId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", client_id.as_str()))
    }

    /// Append already-serialized records to a session's log in one write.
    fn append(&self, client_id: &ClientId, records: &[LogRecord], create: bool) -> Result<(), StoreError> {
        let mut content = String::new();
        for record in records {
            let line = serde_json::to_string(record).map_err(|e| {
                StoreError::Storage(format!("Failed to serialize session record: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        let path = self.log_path(client_id);
        let mut options = std::fs::OpenOptions::new();
        if create {
            options.write(true).create_new(true);
        } else {
            options.append(true);
        }

        let mut file = options.open(&path).map_err(|e| {
            StoreError::Storage(format!("Failed to open {}: {e}", path.display()))
        })?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| StoreError::Storage(format!("Failed to write {}: {e}", path.display())))
    }
}

/// Ids become file names, so only allow a conservative character set.
fn is_safe_id(client_id: &ClientId) -> bool {
    let id = client_id.as_str();
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn create(&self, session: ProfileSession) -> Result<(), StoreError> {
        let client_id = session.client_id().clone();
        if !is_safe_id(&client_id) {
            return Err(StoreError::Storage(format!(
                "Client id '{client_id}' is not usable as a file name"
            )));
        }

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&client_id) {
            return Err(StoreError::AlreadyExists(client_id));
        }

        let mut records = vec![LogRecord::Created {
            client_id: client_id.clone(),
            created_at: session.created_at(),
        }];
        records.extend(session.history().iter().cloned().map(|turn| LogRecord::Turn { turn }));
        if let Some(profile) = session.profile() {
            records.push(LogRecord::Profile {
                profile: profile.clone(),
            });
        }

        self.append(&client_id, &records, true)?;
        sessions.insert(client_id, session);
        Ok(())
    }

    async fn get(&self, client_id: &ClientId) -> Result<Option<ProfileSession>, StoreError> {
        Ok(self.sessions.read().await.get(client_id).cloned())
    }

    async fn put(&self, session: ProfileSession) -> Result<(), StoreError> {
        let client_id = session.client_id().clone();
        let mut sessions = self.sessions.write().await;
        let Some(existing) = sessions.get(&client_id) else {
            return Err(StoreError::NotFound(client_id));
        };

        let persisted = existing.history();
        if session.history().len() < persisted.len()
            || session.history()[..persisted.len()] != *persisted
        {
            return Err(StoreError::HistoryRewritten(client_id));
        }
        if existing.profile().is_some() && existing.profile() != session.profile() {
            return Err(StoreError::HistoryRewritten(client_id));
        }

        let mut records: Vec<LogRecord> = session.history()[persisted.len()..]
            .iter()
            .cloned()
            .map(|turn| LogRecord::Turn { turn })
            .collect();
        if existing.profile().is_none() {
            if let Some(profile) = session.profile() {
                records.push(LogRecord::Profile {
                    profile: profile.clone(),
                });
            }
        }

        if !records.is_empty() {
            self.append(&client_id, &records, false)?;
        }
        sessions.insert(client_id, session);
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.sessions.read().await.len())
    }
}
