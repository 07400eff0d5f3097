use chrono::{ DateTime, NaiveDateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;

use super::chat::{
    Attachment,
    GenerationConfig,
    Message,
    Reaction,
    ResponseMetadata,
    Role,
    SessionSummary,
};

/// Uniform envelope used by every backend endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, message: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()), message: None }
    }
}

impl ApiResponse<()> {
    pub fn done(message: impl Into<String>) -> Self {
        Self { success: true, data: None, error: None, message: Some(message.into()) }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<GenerationConfig>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub regenerate: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatReply {
    pub message: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TitleRequest {
    pub title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthStatus {
    pub message: String,
    pub version: String,
    pub status: String,
    pub llm_status: String,
}

/// Message as it travels over the wire. Timestamps stay strings here so
/// that slightly malformed server output does not fail the whole payload.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WireMessage {
    pub id: String,
    pub content: String,
    pub sender: Role,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            content: msg.content.clone(),
            sender: msg.role,
            timestamp: msg.timestamp.to_rfc3339(),
            reaction: msg.reaction,
            attachments: msg.attachments.clone(),
            metadata: msg.metadata.clone(),
        }
    }
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        Message {
            timestamp: parse_timestamp(&wire.timestamp).unwrap_or_else(Utc::now),
            id: wire.id,
            role: wire.sender,
            content: wire.content,
            reaction: wire.reaction,
            attachments: wire.attachments,
            metadata: wire.metadata,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WireSession {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: usize,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl From<&SessionSummary> for WireSession {
    fn from(s: &SessionSummary) -> Self {
        Self {
            id: s.id.clone(),
            title: s.title.clone(),
            created_at: s.created_at.to_rfc3339(),
            updated_at: s.updated_at.to_rfc3339(),
            message_count: s.message_count,
            starred: s.starred,
            archived: s.archived,
            tags: s.tags.clone(),
        }
    }
}

impl From<WireSession> for SessionSummary {
    fn from(wire: WireSession) -> Self {
        let now = Utc::now();
        SessionSummary {
            created_at: parse_timestamp(&wire.created_at).unwrap_or(now),
            updated_at: parse_timestamp(&wire.updated_at).unwrap_or(now),
            id: wire.id,
            title: wire.title,
            message_count: wire.message_count,
            starred: wire.starred,
            archived: wire.archived,
            tags: wire.tags,
        }
    }
}

/// Accepts RFC 3339, falling back to a zone-less ISO-8601 datetime read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Markdown,
    Text,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "markdown",
            ExportFormat::Text => "text",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "text" | "txt" => Ok(ExportFormat::Text),
            _ => Err(format!("Unsupported export format: {}", s)),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct ExportQuery {
    pub format: Option<String>,
}
