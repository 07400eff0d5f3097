use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::info;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ derive_title, sort_by_activity, SessionStore, StoreError, StoredMessage };
use crate::models::chat::{ Role, SessionSummary };

struct SessionRecord {
    title: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    messages: Vec<StoredMessage>,
}

impl SessionRecord {
    fn new() -> Self {
        let now = Utc::now();
        Self { title: None, created_at: now, updated_at: now, messages: Vec::new() }
    }

    fn summary(&self, id: &str) -> SessionSummary {
        SessionSummary {
            id: id.to_string(),
            title: self.title
                .clone()
                .unwrap_or_else(|| derive_title(self.messages.first().map(|m| m.content.as_str()))),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len(),
            starred: false,
            archived: false,
            tags: Vec::new(),
        }
    }
}

/// Process-local store; everything is lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions.entry(session_id.to_string()).or_insert_with(SessionRecord::new);
        let message = StoredMessage::new(role, content);
        record.updated_at = message.timestamp;
        record.messages.push(message);
        Ok(())
    }

    async fn history(
        &self,
        session_id: &str,
        limit: Option<usize>
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions.entry(session_id.to_string()).or_insert_with(|| {
            info!("Created new session: {}", session_id);
            SessionRecord::new()
        });
        let skip = limit.map_or(0, |n| record.messages.len().saturating_sub(n));
        Ok(record.messages[skip..].to_vec())
    }

    async fn replace_last(&self, session_id: &str, role: Role, content: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        let last = record.messages
            .last_mut()
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        *last = StoredMessage::new(role, content);
        record.updated_at = last.timestamp;
        Ok(())
    }

    async fn reset(&self, session_id: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .iter()
            .map(|(id, record)| record.summary(id))
            .collect();
        sort_by_activity(&mut summaries);
        Ok(summaries)
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        match self.sessions.write().await.remove(session_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(session_id.to_string())),
        }
    }

    async fn set_title(&self, session_id: &str, title: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions.entry(session_id.to_string()).or_insert_with(SessionRecord::new);
        record.title = Some(title.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }
}
