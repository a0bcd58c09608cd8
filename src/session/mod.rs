//! Conversation session store contract.
//!
//! Sessions are owned by an external collaborator; the engine only
//! appends `(user, query)` / `(assistant, response)` pairs and reads
//! recent history for prompt context. Store failures are logged and
//! never fail a query. [`MemorySessionStore`] is the in-process
//! reference implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::model::Metadata;

/// Role of a stored conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// A user turn.
    User,
    /// An assistant turn.
    Assistant,
}

impl MessageRole {
    /// Returns the stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A stored conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Who produced the message.
    pub role: MessageRole,
    /// Message content.
    pub content: String,
    /// When the message was appended.
    pub timestamp: DateTime<Utc>,
    /// Additional metadata (path marker, confidence, timings).
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl SessionMessage {
    /// Creates a message with the current timestamp.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
        }
    }
}

/// Trait for session store backends.
///
/// A session's log is append-only; concurrent queries sharing a
/// session serialize their writes inside the implementation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Appends a message to the session's log.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on backend failure; callers log and
    /// continue.
    async fn append(&self, session_id: &str, message: SessionMessage) -> Result<(), SessionError>;

    /// Returns up to `n` most recent messages, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on backend failure; callers treat this
    /// as an empty history.
    async fn recent(&self, session_id: &str, n: usize)
    -> Result<Vec<SessionMessage>, SessionError>;
}

/// In-memory session store.
///
/// Per-session logs behind a single mutex; writes to one session's log
/// serialize through the lock.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Vec<SessionMessage>>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn append(&self, session_id: &str, message: SessionMessage) -> Result<(), SessionError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| SessionError::Backend(format!("lock poisoned: {e}")))?;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn recent(
        &self,
        session_id: &str,
        n: usize,
    ) -> Result<Vec<SessionMessage>, SessionError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|e| SessionError::Backend(format!("lock poisoned: {e}")))?;

        Ok(sessions.get(session_id).map_or_else(Vec::new, |log| {
            log.iter().rev().take(n).cloned().collect()
        }))
    }
}
