pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::api::{ ExportFormat, HealthStatus };
use crate::models::chat::{ GenerationConfig, Message, ResponseMetadata, SessionSummary };

pub const NETWORK_ERROR_MESSAGE: &str = "Network error: unable to reach the chat service";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    /// The request never produced a response (connection refused, timeout, DNS).
    #[error("transport failure: {0}")]
    Transport(String),
    /// The service answered with `success: false`.
    #[error("{0}")]
    Rejected(String),
    #[error("unexpected response from chat service: {0}")]
    Decode(String),
    /// Client-side failure unrelated to the network (bad configuration, crashed task).
    #[error("chat client error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Text recorded as the controller's last error.
    pub fn describe(&self) -> String {
        match self {
            ServiceError::Transport(_) => NETWORK_ERROR_MESSAGE.to_string(),
            ServiceError::Rejected(msg) => msg.clone(),
            ServiceError::Decode(_) | ServiceError::Internal(_) => self.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedReply {
    pub content: String,
    pub metadata: Option<ResponseMetadata>,
}

/// Remote side of a conversation: session CRUD plus reply generation.
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn load_history(&self, session_id: &str) -> Result<Vec<Message>, ServiceError>;

    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        config: Option<&GenerationConfig>
    ) -> Result<GeneratedReply, ServiceError>;

    /// Produces a new reply to `content`, the latest user turn, replacing the
    /// stored reply instead of recording another exchange.
    async fn regenerate_reply(
        &self,
        session_id: &str,
        content: &str,
        config: Option<&GenerationConfig>
    ) -> Result<GeneratedReply, ServiceError>;

    async fn reset_session(&self, session_id: &str) -> Result<(), ServiceError>;

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ServiceError>;

    async fn delete_session(&self, session_id: &str) -> Result<(), ServiceError>;

    async fn update_session_title(&self, session_id: &str, title: &str) -> Result<(), ServiceError>;

    async fn export_session(
        &self,
        session_id: &str,
        format: ExportFormat
    ) -> Result<String, ServiceError>;

    async fn health_check(&self) -> Result<Option<HealthStatus>, ServiceError>;
}
