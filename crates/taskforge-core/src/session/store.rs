//! Session store: concurrent in-memory map mirrored to one JSON snapshot
//!
//! Every mutation rewrites the whole snapshot (temp file + rename). Loading is
//! best-effort: an unreadable or corrupt snapshot is logged and the store
//! starts empty.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::types::{Session, SessionStatus, State};
use crate::error::StoreError;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    sessions: Vec<Session>,
}

pub struct SessionStore {
    sessions: DashMap<String, Session>,
    /// `None` keeps everything in memory
    path: Option<PathBuf>,
    write_lock: parking_lot::Mutex<()>,
    session_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl SessionStore {
    /// Open a store backed by `path`, reloading any existing snapshot
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sessions = DashMap::new();
        for session in load_snapshot(&path) {
            sessions.insert(session.id.clone(), session);
        }
        tracing::info!(
            path = %path.display(),
            sessions = sessions.len(),
            "Session store opened"
        );
        Self {
            sessions,
            path: Some(path),
            write_lock: parking_lot::Mutex::new(()),
            session_locks: DashMap::new(),
        }
    }

    /// Store with no backing file
    pub fn in_memory() -> Self {
        Self {
            sessions: DashMap::new(),
            path: None,
            write_lock: parking_lot::Mutex::new(()),
            session_locks: DashMap::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create a session in `CREATED` state
    pub fn create_session(&self, requirement: &str) -> Result<Session, StoreError> {
        let session = Session::new(requirement);
        self.sessions.insert(session.id.clone(), session.clone());
        self.persist()?;
        tracing::info!(session_id = %session.id, "Session created");
        Ok(session)
    }

    /// Replace a session's state
    pub fn update_state(&self, id: &str, state: State) -> Result<Session, StoreError> {
        self.update_session(id, move |session| session.state = state)
    }

    /// Apply `f` to a copy of the session and swap the copy in.
    /// Readers never observe a half-applied update.
    pub fn update_session<F>(&self, id: &str, f: F) -> Result<Session, StoreError>
    where
        F: FnOnce(&mut Session),
    {
        let mut updated = self
            .get_session(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        f(&mut updated);
        updated.updated_at = crate::unix_timestamp().max(updated.updated_at);
        self.sessions.insert(id.to_string(), updated.clone());
        self.persist()?;
        Ok(updated)
    }

    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// All sessions, most recently updated first
    pub fn list_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        sessions
    }

    /// Force a session to `COMPLETED`
    pub fn end_session(&self, id: &str) -> Result<Session, StoreError> {
        let session = self.update_session(id, |session| {
            session.state.status = SessionStatus::Completed;
        })?;
        tracing::info!(session_id = %id, "Session ended");
        Ok(session)
    }

    /// Remove a session. Returns whether it existed.
    pub fn delete_session(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self.sessions.remove(id).is_some();
        // A lock still shared with a running engine call stays put so later
        // callers queue behind it instead of getting a fresh one
        self.session_locks
            .remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
        if removed {
            self.persist()?;
            tracing::info!(session_id = %id, "Session deleted");
        }
        Ok(removed)
    }

    pub fn clear_all(&self) -> Result<(), StoreError> {
        let count = self.sessions.len();
        self.sessions.clear();
        self.session_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        self.persist()?;
        tracing::info!(count, "Cleared all sessions");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Per-session lock held by engines for the duration of an
    /// execute/continue call
    pub fn session_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.session_locks
            .entry(id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Rewrite the whole snapshot
    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.write_lock.lock();

        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            sessions,
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        tracing::debug!(
            path = %path.display(),
            sessions = snapshot.sessions.len(),
            "Session snapshot written"
        );
        Ok(())
    }
}

fn load_snapshot(path: &Path) -> Vec<Session> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable session snapshot, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Snapshot>(&content) {
        Ok(snapshot) => {
            if snapshot.version != SNAPSHOT_VERSION {
                tracing::warn!(
                    version = snapshot.version,
                    "Unexpected session snapshot version, loading anyway"
                );
            }
            snapshot.sessions
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Corrupt session snapshot, starting empty");
            Vec::new()
        }
    }
}
