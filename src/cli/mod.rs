use clap::{ Args, Parser, Subcommand, ValueEnum };

use crate::controller::{ ControllerOptions, LoadFailurePolicy, ResetPolicy };
use crate::models::chat::GenerationConfig;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the backend proxy in front of the LLM provider.
    Serve(ServeArgs),
    /// Chat with a running backend from the terminal.
    Chat(ChatArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    // --- History Store Args ---
    /// Session store type (memory, redis)
    #[arg(long, env = "HISTORY_TYPE", default_value = "memory")]
    pub history_type: String,

    /// Session store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for Redis session keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "novachat:")]
    pub history_redis_prefix: String,

    /// Batch size for Redis SCAN command when listing sessions.
    #[arg(long, env = "HISTORY_REDIS_SCAN_COUNT", default_value = "100")]
    pub history_redis_scan_count: usize,

    /// Number of stored messages replayed to the LLM with every request.
    #[arg(long, env = "HISTORY_PROMPT_TURNS", default_value = "20")]
    pub history_prompt_turns: usize,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider (gemini, openai, anthropic, groq, deepseek, xai, ollama, echo)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "gemini")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider. Leave empty to run hosted providers in development mode.
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gemini-1.5-flash, gpt-4o, llama3)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Default sampling temperature when a request does not carry one.
    #[arg(long, env = "CHAT_TEMPERATURE")]
    pub chat_temperature: Option<f32>,

    /// Default completion token limit when a request does not carry one.
    #[arg(long, env = "CHAT_MAX_TOKENS")]
    pub chat_max_tokens: Option<u32>,

    // --- General App Args ---
    /// Optional JSON file overriding the system prompt and quick-action templates.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:8000")]
    pub server_addr: String,
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    /// Base URL of the NovaChat backend.
    #[arg(long, env = "NOVACHAT_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Session to resume. Defaults to the one remembered in the session file.
    #[arg(long, env = "NOVACHAT_SESSION")]
    pub session_id: Option<String>,

    /// File remembering the last active session between runs.
    #[arg(long, env = "NOVACHAT_SESSION_FILE", default_value = ".novachat_session")]
    pub session_file: String,

    /// Request timeout in seconds.
    #[arg(long, env = "NOVACHAT_TIMEOUT", default_value = "60")]
    pub timeout_secs: u64,

    #[arg(long, env = "NOVACHAT_TEMPERATURE")]
    pub temperature: Option<f32>,

    #[arg(long, env = "NOVACHAT_MAX_TOKENS")]
    pub max_tokens: Option<u32>,

    #[arg(long, env = "NOVACHAT_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "NOVACHAT_SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    /// Whether /reset may run while a reply is still pending.
    #[arg(long, env = "NOVACHAT_RESET_POLICY", value_enum, default_value_t = ResetPolicyArg::Allow)]
    pub reset_policy: ResetPolicyArg,

    /// What a failed history load does to the visible conversation.
    #[arg(long, env = "NOVACHAT_ON_LOAD_FAILURE", value_enum, default_value_t = LoadFailureArg::Clear)]
    pub on_load_failure: LoadFailureArg,

    /// Optional JSON file overriding the quick-action templates.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicyArg {
    Allow,
    Block,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailureArg {
    Clear,
    Preserve,
}

impl ChatArgs {
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
        }
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            reset_policy: match self.reset_policy {
                ResetPolicyArg::Allow => ResetPolicy::Allow,
                ResetPolicyArg::Block => ResetPolicy::Block,
            },
            load_failure: match self.on_load_failure {
                LoadFailureArg::Clear => LoadFailurePolicy::Clear,
                LoadFailureArg::Preserve => LoadFailurePolicy::Preserve,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_flags_map_to_controller_options() {
        let cli = Cli::try_parse_from([
            "novachat",
            "chat",
            "--reset-policy",
            "block",
            "--on-load-failure",
            "preserve",
            "--temperature",
            "0.3",
        ]).unwrap();
        let Command::Chat(args) = cli.command else {
            panic!("expected chat subcommand");
        };
        let options = args.controller_options();
        assert_eq!(options.reset_policy, ResetPolicy::Block);
        assert_eq!(options.load_failure, LoadFailurePolicy::Preserve);
        assert_eq!(args.generation_config().temperature, Some(0.3));
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["novachat", "serve", "--history-type", "memory"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve subcommand");
        };
        assert_eq!(args.history_type, "memory");
        assert_eq!(args.history_prompt_turns, 20);
    }
}
