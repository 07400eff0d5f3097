use async_trait::async_trait;
use log::info;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ ChatClient, CompletionResponse, Turn };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::GenerationConfig;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3";

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize, Default, Debug)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Serialize, Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        let model = completion_model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into());

        Self {
            http: HttpClient::new(),
            base_url: url.trim_end_matches('/').to_string(),
            completion_model: model,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != LlmType::Ollama {
            return Err("Invalid config type for OllamaClient".into());
        }

        let mut client = Self::new(config.base_url.clone(), config.completion_model.clone());
        client.temperature = config.temperature;
        client.max_tokens = config.max_tokens;
        Ok(client)
    }

    fn build_request(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        config: &GenerationConfig
    ) -> ChatRequest {
        let system = config.system_prompt.as_deref().unwrap_or(system_prompt);
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if !system.trim().is_empty() {
            messages.push(OllamaMessage { role: "system".into(), content: system.to_string() });
        }
        messages.extend(
            turns.iter().map(|t| OllamaMessage {
                role: t.role.as_str().to_string(),
                content: t.content.clone(),
            })
        );

        ChatRequest {
            model: config.model.clone().unwrap_or_else(|| self.completion_model.clone()),
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: config.temperature.or(self.temperature),
                num_predict: config.max_tokens.or(self.max_tokens),
            },
        }
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        config: &GenerationConfig
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let url = format!("{}/api/chat", self.base_url);
        let req = self.build_request(system_prompt, turns, config);
        info!("OllamaClient::complete() → model={} messages={}", req.model, req.messages.len());
        let resp = self.http.post(&url).json(&req).send().await?.error_for_status()?;
        let data = resp.json::<ChatResponse>().await?;
        Ok(CompletionResponse { response: data.message.content, tokens: data.eval_count })
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn llm_type(&self) -> LlmType {
        LlmType::Ollama
    }
}
