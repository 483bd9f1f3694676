//! Session store contract and an in-memory implementation

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::session::Session;

/// Errors reported by a session store
#[derive(Error, Debug)]
pub enum StoreError {
    /// No session exists under this id
    #[error("session not found: {0}")]
    NotFound(String),

    /// `create` was called for an id that is already stored
    #[error("session already exists: {0}")]
    AlreadyExists(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document could not be encoded or decoded
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Any other backend failure
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    /// Check if this is the not-found case
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Durable home of sessions between `execute` calls.
///
/// Implementations must report a missing session as [`StoreError::NotFound`]
/// and nothing else. Per-id serialization of concurrent writers is up to the
/// implementation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session by id
    async fn find_by_id(&self, id: &str) -> Result<Session, StoreError>;

    /// Persist a newly created session
    async fn create(&self, session: &Session) -> Result<(), StoreError>;

    /// Overwrite the stored state of an existing session
    async fn save(&self, session: &Session) -> Result<(), StoreError>;
}

/// Process-local store keeping sessions in a map
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether the store holds no sessions
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Snapshot of a stored session, if any
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.lock().get(id).cloned()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find_by_id(&self, id: &str) -> Result<Session, StoreError> {
        self.get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(session.id()) {
            return Err(StoreError::AlreadyExists(session.id().to_string()));
        }
        sessions.insert(session.id().to_string(), session.clone());
        Ok(())
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(session.id()) {
            Some(stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(session.id().to_string())),
        }
    }
}
