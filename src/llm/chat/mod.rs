pub mod echo;
pub mod hosted;
pub mod ollama;

use async_trait::async_trait;
use log::warn;
use std::error::Error as StdError;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::echo::EchoChatClient;
use self::hosted::HostedChatClient;
use self::ollama::OllamaClient;
use crate::models::chat::{ GenerationConfig, Role };

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
    /// Completion tokens, when the provider reports them.
    pub tokens: Option<u32>,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Produces the next assistant turn for `turns`, the last of which is the
    /// user's new message.
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        config: &GenerationConfig
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>>;

    fn get_model(&self) -> String;
    fn llm_type(&self) -> LlmType;
    fn is_development(&self) -> bool {
        false
    }
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let missing_key = config.api_key.as_deref().map_or(true, |k| k.trim().is_empty());
    if config.llm_type.needs_api_key() && missing_key {
        warn!(
            "No API key configured for {}; running in development mode with echo replies",
            config.llm_type
        );
        return Ok(Arc::new(EchoChatClient::new()));
    }

    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Echo => Arc::new(EchoChatClient::new()),
        LlmType::Ollama => Arc::new(OllamaClient::from_config(config)?),
        _ => Arc::new(HostedChatClient::from_config(config)?),
    };
    Ok(client)
}
