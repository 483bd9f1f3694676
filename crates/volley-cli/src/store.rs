//! File-backed chat storage: one pretty-printed JSON document per chat

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use volley_chat::{Session, SessionStore, StoreError};

/// Stores each session as `<dir>/<id>.json`
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the session files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Session ids become file names, so only `[A-Za-z0-9_-]` is accepted
    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::Backend(format!("invalid session id: {:?}", id)));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    /// List all stored sessions, newest first
    pub async fn list_sessions(&self) -> std::io::Result<Vec<SessionInfo>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match read_session(&path).await {
                Ok(session) => sessions.push(SessionInfo::from(&session)),
                Err(e) => tracing::warn!("Skipping unreadable session {}: {}", path.display(), e),
            }
        }

        // Sort by created_at descending (newest first)
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}

async fn read_session(path: &Path) -> Result<Session, StoreError> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn find_by_id(&self, id: &str) -> Result<Session, StoreError> {
        let path = self.path_for(id)?;
        match read_session(&path).await {
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            other => other,
        }
    }

    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.path_for(session.id())?;
        fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(session)?;

        // Stage the full document, then link it into place. Linking refuses
        // an existing target, and an interrupted write only leaves the stage.
        let staged = self
            .dir
            .join(format!("{}.{}.json.tmp", session.id(), uuid::Uuid::new_v4()));
        let linked = match fs::write(&staged, &json).await {
            Ok(()) => fs::hard_link(&staged, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = fs::remove_file(&staged).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", staged.display(), e);
            }
        }

        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(session.id().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.path_for(session.id())?;
        if !fs::try_exists(&path).await? {
            return Err(StoreError::NotFound(session.id().to_string()));
        }

        // Write beside the target and rename so readers never see a torn file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(session)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Information about a saved session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: i64,
    pub model: String,
    pub message_count: usize,
    pub ended: bool,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id().to_string(),
            created_at: session.created_at(),
            model: session.model().name().to_string(),
            message_count: session.messages().len(),
            ended: session.is_ended(),
        }
    }
}

impl SessionInfo {
    /// Format the created_at timestamp for display
    pub fn created_at_display(&self) -> String {
        use chrono::{TimeZone, Utc};
        Utc.timestamp_millis_opt(self.created_at)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volley_chat::{GenerationConfig, Message, ModelDescriptor, Role};

    fn session(id: &str) -> Session {
        let model = ModelDescriptor::new("test-model", 1000).unwrap();
        let system = Message::new(Role::System, "You are terse.", &model).unwrap();
        Session::create_with_id(id, "user-1", system, model, GenerationConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_create_find_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions"));

        let mut chat = session("chat-1");
        store.create(&chat).await.unwrap();

        let model = chat.model().clone();
        chat.append_message(Message::new(Role::User, "hello", &model).unwrap())
            .unwrap();
        store.save(&chat).await.unwrap();

        let loaded = store.find_by_id("chat-1").await.unwrap();
        assert_eq!(loaded.messages().len(), 2);
        assert_eq!(loaded.messages()[1].content(), "hello");
        assert_eq!(loaded.messages()[1].id(), chat.messages()[1].id());
        assert!(!dir.path().join("sessions").join("chat-1.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        assert!(store.find_by_id("nope").await.unwrap_err().is_not_found());
        assert!(store.save(&session("nope")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_create_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.create(&session("chat-1")).await.unwrap();
        let err = store.create(&session("chat-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_path_like_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let err = store.find_by_id("../etc/passwd").await.unwrap_err();
        assert!(!err.is_not_found());
        assert!(store.find_by_id("").await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_not_reported_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chat-1.json"), "{not json").unwrap();
        let store = FileSessionStore::new(dir.path());
        let err = store.find_by_id("chat-1").await.unwrap_err();
        assert!(matches!(err, StoreError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions"));
        assert!(store.list_sessions().await.unwrap().is_empty());

        store.create(&session("a")).await.unwrap();
        let mut ended = session("b");
        ended.end();
        store.create(&ended).await.unwrap();
        std::fs::write(dir.path().join("sessions").join("notes.txt"), "ignored").unwrap();

        let listed = store.list_sessions().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|s| s.id == "b" && s.ended));
        assert!(listed.iter().all(|s| s.model == "test-model" && s.message_count == 1));
    }

    #[tokio::test]
    async fn test_create_leaves_only_the_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.create(&session("chat-1")).await.unwrap();
        assert!(store.create(&session("chat-1")).await.is_err());

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["chat-1.json"]);
    }

    #[tokio::test]
    async fn test_interrupted_create_does_not_claim_the_id() {
        let dir = tempfile::tempdir().unwrap();
        // What a create cut off mid-write leaves behind
        std::fs::write(
            dir.path().join("chat-1.0b5c6f1e-0000-4000-8000-000000000000.json.tmp"),
            "{\"id\": \"chat-1\", \"mess",
        )
        .unwrap();
        let store = FileSessionStore::new(dir.path());

        assert!(store.find_by_id("chat-1").await.unwrap_err().is_not_found());
        store.create(&session("chat-1")).await.unwrap();
        assert_eq!(store.find_by_id("chat-1").await.unwrap().id(), "chat-1");
        assert_eq!(store.list_sessions().await.unwrap().len(), 1);
    }
}
