mod memory;
mod redis;

pub use memory::MemorySessionStore;
pub use self::redis::RedisSessionStore;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::info;
use serde::{ Deserialize, Serialize };
use std::error::Error;
use std::sync::Arc;
use thiserror::Error as ThisError;

use crate::cli::ServeArgs;
use crate::models::api::{ ExportFormat, WireMessage };
use crate::models::chat::{ Message, Role, SessionSummary };

pub const DEFAULT_TITLE: &str = "New Chat";
const TITLE_MAX_CHARS: usize = 30;

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("Session not found")]
    NotFound(String),
    #[error("Session store error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("Corrupt session entry: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(role: Role, content: &str) -> Self {
        Self { role, content: content.to_string(), timestamp: Utc::now() }
    }
}

/// Server-side key-value store of conversations.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<(), StoreError>;

    /// Messages in chronological order; with `limit`, only the most recent
    /// ones (`Some(0)` yields none). Reading an unknown session creates it
    /// empty without counting as activity.
    async fn history(
        &self,
        session_id: &str,
        limit: Option<usize>
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// Overwrites the newest message. Fails with `NotFound` when the session
    /// holds no messages.
    async fn replace_last(&self, session_id: &str, role: Role, content: &str) -> Result<(), StoreError>;

    /// Drops every message of the session. Unknown sessions are not an error.
    async fn reset(&self, session_id: &str) -> Result<(), StoreError>;

    /// All sessions, most active first.
    async fn list(&self) -> Result<Vec<SessionSummary>, StoreError>;

    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;

    async fn set_title(&self, session_id: &str, title: &str) -> Result<(), StoreError>;
}

pub fn create_session_store(
    args: &ServeArgs
) -> Result<Arc<dyn SessionStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemorySessionStore::new())),
        "redis" => {
            let store = RedisSessionStore::new(
                &args.history_host,
                &args.history_redis_prefix,
                args.history_redis_scan_count
            )?;
            Ok(Arc::new(store))
        }
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub fn initialize_session_store(
    args: &ServeArgs
) -> Result<Arc<dyn SessionStore>, Box<dyn Error + Send + Sync>> {
    info!("Chat sessions will be stored in: {} at {}", args.history_type, args.history_host);
    create_session_store(args)
}

/// Title shown in session lists: the first message, shortened.
pub fn derive_title(first_message: Option<&str>) -> String {
    let Some(first) = first_message.map(str::trim).filter(|s| !s.is_empty()) else {
        return DEFAULT_TITLE.to_string();
    };
    if first.chars().count() > TITLE_MAX_CHARS {
        let short: String = first.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", short)
    } else {
        first.to_string()
    }
}

pub fn sort_by_activity(sessions: &mut [SessionSummary]) {
    sessions.sort_by(|a, b| {
        b.message_count.cmp(&a.message_count).then_with(|| b.updated_at.cmp(&a.updated_at))
    });
}

/// Client-facing messages carry `<session>_<index>` ids.
pub fn to_messages(session_id: &str, stored: Vec<StoredMessage>) -> Vec<Message> {
    stored
        .into_iter()
        .enumerate()
        .map(|(i, msg)| Message {
            id: format!("{}_{}", session_id, i),
            role: msg.role,
            content: msg.content,
            timestamp: msg.timestamp,
            reaction: None,
            attachments: Vec::new(),
            metadata: None,
        })
        .collect()
}

pub fn format_transcript(messages: &[Message]) -> String {
    let mut result = String::new();
    for msg in messages {
        result.push_str(&format!("{}: {}\n", msg.role.display_name(), msg.content));
    }
    result
}

pub fn export_messages(
    session_id: &str,
    messages: &[Message],
    format: ExportFormat
) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Json => {
            let wire: Vec<WireMessage> = messages.iter().map(WireMessage::from).collect();
            serde_json::to_string_pretty(&wire)
        }
        ExportFormat::Markdown => {
            let mut out = format!("# Conversation {}\n", session_id);
            for msg in messages {
                out.push_str(&format!("\n### {}\n\n{}\n", msg.role.display_name(), msg.content));
            }
            Ok(out)
        }
        ExportFormat::Text => Ok(format_transcript(messages)),
    }
}
