use async_trait::async_trait;
use std::error::Error as StdError;

use super::{ ChatClient, CompletionResponse, Turn };
use crate::llm::LlmType;
use crate::models::chat::{ GenerationConfig, Role };

/// Stand-in used when no provider credentials are configured.
#[derive(Debug, Default)]
pub struct EchoChatClient;

impl EchoChatClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChatClient for EchoChatClient {
    async fn complete(
        &self,
        _system_prompt: &str,
        turns: &[Turn],
        _config: &GenerationConfig
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let input = turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .unwrap_or_default();
        let response = format!(
            "Hello! I'm NovaChat. You said: '{}'. I'm currently in development mode. \
Please configure your LLM API key to enable full functionality.",
            input
        );
        Ok(CompletionResponse { response, tokens: None })
    }

    fn get_model(&self) -> String {
        "echo".to_string()
    }

    fn llm_type(&self) -> LlmType {
        LlmType::Echo
    }

    fn is_development(&self) -> bool {
        true
    }
}
