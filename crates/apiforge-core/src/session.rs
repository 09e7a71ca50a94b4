//! Per-session state.
//!
//! Each client session keeps its own most recent analysis; nothing is
//! shared between sessions. The store is bounded: once `capacity` sessions
//! exist, recording into a new one evicts the least recently updated.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::DEFAULT_MAX_SESSIONS;
use crate::error::{ForgeError, ForgeResult};
use crate::reconcile::AnalysisResult;

const MAX_SESSION_ID_LEN: usize = 128;

/// Opaque client session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// A fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Accept a client-supplied id: 1-128 chars of `[A-Za-z0-9._-]`.
    pub fn parse(raw: &str) -> ForgeResult<Self> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(ForgeError::InvalidRequest(format!("invalid session id: {raw:?}")));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What one session remembers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub latest_analysis: Option<AnalysisResult>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic update order, used for eviction.
    seq: u64,
}

/// Bounded map of session states.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionState>>,
    capacity: usize,
    clock: AtomicU64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            clock: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remember `result` as the latest analysis of `session`.
    pub async fn record_analysis(&self, session: &SessionId, result: AnalysisResult) {
        let seq = self.clock.fetch_add(1, Ordering::Relaxed);
        let mut sessions = self.sessions.write().await;

        if !sessions.contains_key(session) && sessions.len() >= self.capacity {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, state)| state.seq)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                sessions.remove(&oldest);
                debug!(session = %oldest, "evicted least recently updated session");
            }
        }

        sessions.insert(
            session.clone(),
            SessionState {
                latest_analysis: Some(result),
                updated_at: Utc::now(),
                seq,
            },
        );
    }

    pub async fn latest_analysis(&self, session: &SessionId) -> Option<AnalysisResult> {
        self.sessions
            .read()
            .await
            .get(session)
            .and_then(|state| state.latest_analysis.clone())
    }

    #[cfg(test)]
    async fn get(&self, session: &SessionId) -> Option<SessionState> {
        self.sessions.read().await.get(session).cloned()
    }

    #[cfg(test)]
    async fn remove(&self, session: &SessionId) -> bool {
        self.sessions.write().await.remove(session).is_some()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    #[cfg(test)]
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
