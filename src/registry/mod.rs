//! Process-wide index of live recording sessions.
//!
//! The registry is the only state shared across sessions: a canonical
//! stream-path key mapped to its session. It indexes sessions, it does not
//! own their lifecycle. One canonicalization function is applied at both
//! registration and lookup; lookup additionally tries a short, fixed list of
//! legacy key variants and never mutates the map.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::session::{RecordingSession, SessionStatus};

/// Legacy clients address streams without the default application prefix.
const LEGACY_APP_PREFIX: &str = "/live";

#[derive(Debug, Error)]
#[error("a live session is already registered for stream {stream_path}")]
pub struct DuplicateSessionError {
    pub stream_path: String,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<RecordingSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical registry key: leading separator, no duplicate or trailing
    /// separators.
    pub fn canonical_key(path: &str) -> String {
        let mut key = String::with_capacity(path.len() + 1);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            key.push('/');
            key.push_str(segment);
        }
        if key.is_empty() {
            key.push('/');
        }
        key
    }

    /// The bounded set of keys a lookup will try, in order: the path as
    /// given, its canonical form, and the canonical form with the legacy
    /// application prefix added or removed.
    fn lookup_keys(path: &str) -> Vec<String> {
        let canonical = Self::canonical_key(path);

        let legacy = if let Some(rest) = canonical.strip_prefix(LEGACY_APP_PREFIX) {
            if rest.starts_with('/') {
                Some(rest.to_string())
            } else {
                None
            }
        } else {
            Some(format!("{}{}", LEGACY_APP_PREFIX, canonical))
        };

        let mut keys = vec![path.to_string(), canonical];
        keys.extend(legacy);
        keys.dedup();
        keys
    }

    /// Insert a session under the canonical key. Fails if a non-terminal
    /// session already holds the key; a terminal leftover is replaced.
    pub async fn register(
        &self,
        path: &str,
        session: Arc<RecordingSession>,
    ) -> Result<(), DuplicateSessionError> {
        let key = Self::canonical_key(path);
        let mut sessions = self.sessions.write().await;

        if let Some(existing) = sessions.get(&key) {
            if !existing.state().await.is_terminal() {
                return Err(DuplicateSessionError { stream_path: key });
            }
        }

        debug!("registered session for {}", key);
        sessions.insert(key, session);
        Ok(())
    }

    /// Resolve a loosely-specified path to its session. Pure read: tries
    /// each normalized variant in order, first match wins.
    pub async fn lookup(&self, path: &str) -> Option<Arc<RecordingSession>> {
        let sessions = self.sessions.read().await;
        for key in Self::lookup_keys(path) {
            if let Some(session) = sessions.get(&key) {
                return Some(Arc::clone(session));
            }
        }
        None
    }

    /// Remove by canonical key. Idempotent: removing an absent key is a
    /// no-op.
    pub async fn remove(&self, path: &str) -> Option<Arc<RecordingSession>> {
        let key = Self::canonical_key(path);
        let removed = self.sessions.write().await.remove(&key);
        if removed.is_some() {
            debug!("removed session for {}", key);
        }
        removed
    }

    /// Remove only if the entry still holds this exact session instance.
    /// Guards the terminal-cleanup race against a re-registered successor.
    pub async fn remove_session(&self, path: &str, session: &Arc<RecordingSession>) {
        let key = Self::canonical_key(path);
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&key) {
            if Arc::ptr_eq(existing, session) {
                sessions.remove(&key);
                debug!("removed session for {}", key);
            }
        }
    }

    /// Snapshot of (key, session) pairs for bulk operations.
    pub async fn snapshot(&self) -> Vec<(String, Arc<RecordingSession>)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(k, s)| (k.clone(), Arc::clone(s)))
            .collect()
    }

    /// Status snapshots for every registered session, recomputed per call.
    pub async fn list(&self) -> Vec<(String, SessionStatus)> {
        let entries = self.snapshot().await;
        let mut out = Vec::with_capacity(entries.len());
        for (key, session) in entries {
            out.push((key, session.status().await));
        }
        out
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
