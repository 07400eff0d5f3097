use crate::cli::ServeArgs;
use crate::config::prompt::{ load_prompts, PromptConfig };
use crate::history::{ initialize_session_store, to_messages, SessionStore, StoreError, StoredMessage };
use crate::llm::chat::{ new_client as new_chat_client, ChatClient, Turn };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::{ GenerationConfig, Message, ResponseMetadata, Role, SessionSummary };

use log::{ error, info, warn };
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;

/// Assistant reply produced for one chat request.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub content: String,
    pub metadata: ResponseMetadata,
}

/// Server-side conversation engine: replays stored history to the chat
/// provider and records both turns once a reply is produced.
#[derive(Clone)]
pub struct ChatAgent {
    chat_client: Arc<dyn ChatClient>,
    session_store: Arc<dyn SessionStore>,
    prompt_config: Arc<PromptConfig>,
    history_prompt_turns: usize,
    default_temperature: Option<f32>,
}

impl ChatAgent {
    pub async fn new(args: &ServeArgs) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let chat_client = Self::initialize_llm_client(args)?;
        let session_store = initialize_session_store(args)?;
        let prompt_config = load_prompts(args.prompts_path.as_deref())?;

        Ok(Self {
            chat_client,
            session_store,
            prompt_config: Arc::new(prompt_config),
            history_prompt_turns: args.history_prompt_turns,
            default_temperature: args.chat_temperature,
        })
    }

    pub fn with_parts(
        chat_client: Arc<dyn ChatClient>,
        session_store: Arc<dyn SessionStore>,
        prompt_config: PromptConfig,
        history_prompt_turns: usize
    ) -> Self {
        Self {
            chat_client,
            session_store,
            prompt_config: Arc::new(prompt_config),
            history_prompt_turns,
            default_temperature: None,
        }
    }

    fn initialize_llm_client(
        args: &ServeArgs
    ) -> Result<Arc<dyn ChatClient>, Box<dyn Error + Send + Sync>> {
        let llm_type: LlmType = args.chat_llm_type.parse()?;
        let config = LlmConfig {
            llm_type,
            api_key: Some(args.chat_api_key.clone()),
            completion_model: args.chat_model.clone(),
            base_url: args.chat_base_url.clone(),
            temperature: args.chat_temperature,
            max_tokens: args.chat_max_tokens,
        };
        let client = new_chat_client(&config)?;
        info!("Chat client ready: {} ({})", client.llm_type(), client.get_model());
        Ok(client)
    }

    pub fn is_development(&self) -> bool {
        self.chat_client.is_development()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.session_store
    }

    pub async fn process_message(
        &self,
        session_id: &str,
        message: &str,
        config: Option<GenerationConfig>
    ) -> Result<AgentReply, Box<dyn Error + Send + Sync>> {
        let context = self.session_store.history(
            session_id,
            Some(self.history_prompt_turns)
        ).await?;
        let reply = self.generate(session_id, context, message, config.unwrap_or_default()).await?;

        self.session_store.append(session_id, Role::User, message).await?;
        self.session_store.append(session_id, Role::Assistant, &reply.content).await?;
        Ok(reply)
    }

    /// Answers `message` again. When it is the latest stored exchange the old
    /// reply is overwritten; an earlier exchange is answered without touching
    /// the stored history.
    pub async fn regenerate_message(
        &self,
        session_id: &str,
        message: &str,
        config: Option<GenerationConfig>
    ) -> Result<AgentReply, Box<dyn Error + Send + Sync>> {
        let mut stored = self.session_store.history(session_id, None).await?;
        let exchange = stored
            .windows(2)
            .rposition(|pair| {
                pair[0].role == Role::User &&
                    pair[0].content == message &&
                    pair[1].role == Role::Assistant
            });
        let is_latest = exchange.map_or(false, |i| i + 2 == stored.len());
        match exchange {
            Some(i) => stored.truncate(i),
            None => warn!("Session {}: no stored exchange to regenerate, answering fresh", session_id),
        }
        if exchange.is_some() && !is_latest {
            warn!("Session {}: regenerating an earlier exchange; stored history unchanged", session_id);
        }

        let skip = stored.len().saturating_sub(self.history_prompt_turns);
        let context = stored.split_off(skip);
        let reply = self.generate(session_id, context, message, config.unwrap_or_default()).await?;

        if is_latest {
            self.session_store.replace_last(session_id, Role::Assistant, &reply.content).await?;
        }
        Ok(reply)
    }

    async fn generate(
        &self,
        session_id: &str,
        context: Vec<StoredMessage>,
        message: &str,
        config: GenerationConfig
    ) -> Result<AgentReply, Box<dyn Error + Send + Sync>> {
        let mut turns: Vec<Turn> = context
            .into_iter()
            .map(|m| Turn::new(m.role, m.content))
            .collect();
        turns.push(Turn::new(Role::User, message));

        let started = Instant::now();
        let completion = self.chat_client
            .complete(&self.prompt_config.system_prompt, &turns, &config).await
            .map_err(|e| {
                error!("LLM interaction error for session {}: {}", session_id, e);
                e
            })?;
        let latency_ms = started.elapsed().as_millis() as u64;
        info!("Session {}: reply generated in {} ms", session_id, latency_ms);

        Ok(AgentReply {
            content: completion.response,
            metadata: ResponseMetadata {
                tokens: completion.tokens,
                latency_ms: Some(latency_ms),
                temperature: config.temperature.or(self.default_temperature),
            },
        })
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let stored = self.session_store.history(session_id, None).await?;
        Ok(to_messages(session_id, stored))
    }

    pub async fn reset(&self, session_id: &str) -> Result<(), StoreError> {
        self.session_store.reset(session_id).await?;
        info!("Session {} reset", session_id);
        Ok(())
    }

    pub async fn sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        self.session_store.list().await
    }

    pub async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        match self.session_store.delete(session_id).await {
            Ok(()) => {
                info!("Session {} deleted", session_id);
                Ok(())
            }
            Err(e) => {
                warn!("Deleting session {} failed: {}", session_id, e);
                Err(e)
            }
        }
    }

    pub async fn rename(&self, session_id: &str, title: &str) -> Result<(), StoreError> {
        self.session_store.set_title(session_id, title).await
    }
}
