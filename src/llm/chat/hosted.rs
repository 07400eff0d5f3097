use async_trait::async_trait;
use log::info;
use std::error::Error as StdError;
use std::time::Instant;

use super::{ ChatClient, CompletionResponse, Turn };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::{ GenerationConfig, Role };
use rllm::builder::{ LLMBackend, LLMBuilder };
use rllm::chat::{ ChatMessage, ChatRole, MessageType };
use rllm::LLMProvider;

/// Client for the hosted providers, all reached through rllm. The provider
/// is built per request because model and sampling settings may change with
/// every call.
pub struct HostedChatClient {
    llm_type: LlmType,
    api_key: String,
    model: String,
    base_url: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

fn backend_for(llm_type: LlmType) -> Result<LLMBackend, Box<dyn StdError + Send + Sync>> {
    match llm_type {
        LlmType::Gemini => Ok(LLMBackend::Google),
        LlmType::OpenAI => Ok(LLMBackend::OpenAI),
        LlmType::Anthropic => Ok(LLMBackend::Anthropic),
        LlmType::Groq => Ok(LLMBackend::Groq),
        LlmType::DeepSeek => Ok(LLMBackend::DeepSeek),
        LlmType::XAI => Ok(LLMBackend::XAI),
        other => Err(format!("{} is not a hosted provider", other).into()),
    }
}

pub fn default_model(llm_type: LlmType) -> &'static str {
    match llm_type {
        LlmType::Gemini => "gemini-1.5-flash",
        LlmType::OpenAI => "gpt-4o-mini",
        LlmType::Anthropic => "claude-3-5-haiku-latest",
        LlmType::Groq => "llama-3.1-8b-instant",
        LlmType::DeepSeek => "deepseek-chat",
        LlmType::XAI => "grok-2-latest",
        LlmType::Ollama => "llama3",
        LlmType::Echo => "echo",
    }
}

fn to_chat_messages(turns: &[Turn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .map(|turn| ChatMessage {
            role: match turn.role {
                Role::User => ChatRole::User,
                Role::Assistant => ChatRole::Assistant,
            },
            content: turn.content.clone(),
            message_type: MessageType::Text,
        })
        .collect()
}

impl HostedChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        backend_for(config.llm_type)?;
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| format!("API key is required for the {} provider", config.llm_type))?;
        let model = config.completion_model
            .clone()
            .unwrap_or_else(|| default_model(config.llm_type).to_string());

        Ok(Self {
            llm_type: config.llm_type,
            api_key,
            model,
            base_url: config.base_url.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ChatClient for HostedChatClient {
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        config: &GenerationConfig
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let model = config.model.clone().unwrap_or_else(|| self.model.clone());
        let mut builder = LLMBuilder::new()
            .backend(backend_for(self.llm_type)?)
            .api_key(self.api_key.clone())
            .model(&model)
            .stream(false);

        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(tokens) = config.max_tokens.or(self.max_tokens) {
            builder = builder.max_tokens(tokens);
        }
        if let Some(temp) = config.temperature.or(self.temperature) {
            builder = builder.temperature(temp);
        }
        let system = config.system_prompt.as_deref().unwrap_or(system_prompt);
        if !system.trim().is_empty() {
            builder = builder.system(system);
        }

        let provider: Box<dyn LLMProvider> = builder.build()?;
        info!(
            "HostedChatClient::complete() → provider={} model={} turns={}",
            self.llm_type,
            model,
            turns.len()
        );
        let started = Instant::now();
        let resp = provider.chat(&to_chat_messages(turns)).await?;
        let text = resp
            .text()
            .map(|s| s.to_string())
            .unwrap_or_else(|| resp.to_string());
        info!("{} replied in {} ms", self.llm_type, started.elapsed().as_millis());
        Ok(CompletionResponse { response: text, tokens: None })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn llm_type(&self) -> LlmType {
        self.llm_type
    }
}
