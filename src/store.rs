//! In-memory session store
//!
//! One ordered message log per session id. Sessions are created implicitly
//! on first touch and live for the life of the process; nothing is evicted
//! and nothing survives a restart.

use crate::llm::{ChatMessage, Role};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// A committed message. Immutable once appended.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Position in the session's log, strictly increasing from 0.
    pub seq: u64,
    pub created_at: DateTime<Utc>,
}

/// Summary of one session, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One conversation's state.
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    messages: RwLock<Vec<StoredMessage>>,
    /// Serializes turns on this session. Held for the whole turn, so a
    /// second message queues behind the in-flight one instead of
    /// interleaving writes to the log.
    turn_gate: Arc<Mutex<()>>,
}

impl Session {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            created_at: Utc::now(),
            messages: RwLock::new(Vec::new()),
            turn_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Acquire the turn gate. The guard must be held until the turn either
    /// commits or is abandoned.
    pub async fn begin_turn(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.turn_gate).lock_owned().await
    }

    /// Whether a turn is currently in flight.
    pub fn turn_in_flight(&self) -> bool {
        self.turn_gate.try_lock().is_err()
    }

    /// Ordered snapshot of the log.
    pub async fn history(&self) -> Vec<StoredMessage> {
        self.messages.read().await.clone()
    }

    /// The log rendered as model request context.
    pub async fn context(&self) -> Vec<ChatMessage> {
        self.messages
            .read()
            .await
            .iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    #[allow(dead_code)] // Useful for tests
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    #[allow(dead_code)] // Useful for tests
    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    /// Append one completed turn: the user message followed by the
    /// assistant response, as a single atomic extension of the log.
    ///
    /// This is the only way messages enter a session, which keeps the log
    /// free of user-only or assistant-only partial turns.
    pub async fn commit_turn(
        &self,
        user_text: &str,
        assistant_text: &str,
    ) -> (StoredMessage, StoredMessage) {
        let mut messages = self.messages.write().await;
        let now = Utc::now();

        let user = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: user_text.to_string(),
            seq: messages.len() as u64,
            created_at: now,
        };
        messages.push(user.clone());

        let assistant = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: assistant_text.to_string(),
            seq: messages.len() as u64,
            created_at: now,
        };
        messages.push(assistant.clone());

        (user, assistant)
    }

    async fn summary(&self) -> SessionSummary {
        let messages = self.messages.read().await;
        SessionSummary {
            id: self.id.clone(),
            message_count: messages.len(),
            created_at: self.created_at,
            updated_at: messages.last().map_or(self.created_at, |m| m.created_at),
        }
    }
}

/// Process-wide store of all sessions.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a session, creating an empty one if the id is unknown.
    pub async fn session(&self, id: &str) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        // Racing creators both reach here; the second finds the first's entry.
        Arc::clone(
            sessions
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Session::new(id))),
        )
    }

    /// List known sessions, most recently active first.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<Session>> =
            self.sessions.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            summaries.push(session.summary().await);
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }
}
