use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::str::FromStr;
use log::info;

pub const INPUT_PLACEHOLDER: &str = "{input}";

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are NovaChat, a friendly and knowledgeable assistant. Answer clearly and concisely, \
use the conversation history for context, and say so when you are unsure.";

#[derive(Debug)]
pub enum PromptError {
    TemplateNotFound(String),
    MissingPlaceholder(String),
    UnknownAction(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::TemplateNotFound(key) => write!(f, "Quick action template '{}' not found", key),
            PromptError::MissingPlaceholder(key) =>
                write!(f, "Quick action template '{}' has no {} placeholder", key, INPUT_PLACEHOLDER),
            PromptError::UnknownAction(key) => write!(f, "Unknown quick action '{}'", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuickAction {
    Explain,
    Summarize,
    Translate,
    Improve,
    Code,
}

impl QuickAction {
    pub const ALL: [QuickAction; 5] = [
        QuickAction::Explain,
        QuickAction::Summarize,
        QuickAction::Translate,
        QuickAction::Improve,
        QuickAction::Code,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            QuickAction::Explain => "explain",
            QuickAction::Summarize => "summarize",
            QuickAction::Translate => "translate",
            QuickAction::Improve => "improve",
            QuickAction::Code => "code",
        }
    }

    pub fn default_template(&self) -> &'static str {
        match self {
            QuickAction::Explain => "Explain the following in simple terms:\n\n{input}",
            QuickAction::Summarize => "Summarize the following in a few bullet points:\n\n{input}",
            QuickAction::Translate => "Translate the following into English:\n\n{input}",
            QuickAction::Improve => "Improve the wording and clarity of the following text:\n\n{input}",
            QuickAction::Code => "Write well-commented code for the following task:\n\n{input}",
        }
    }
}

impl FromStr for QuickAction {
    type Err = PromptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuickAction::ALL
            .into_iter()
            .find(|a| a.key() == s.to_lowercase())
            .ok_or_else(|| PromptError::UnknownAction(s.to_string()))
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
struct PromptFile {
    system_prompt: Option<String>,
    #[serde(default)]
    quick_actions: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PromptConfig {
    pub system_prompt: String,
    templates: HashMap<QuickAction, String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            templates: QuickAction::ALL
                .into_iter()
                .map(|a| (a, a.default_template().to_string()))
                .collect(),
        }
    }
}

impl PromptConfig {
    pub fn validate(&self) -> Result<(), PromptError> {
        for action in QuickAction::ALL {
            let template = self.templates
                .get(&action)
                .ok_or_else(|| PromptError::TemplateNotFound(action.key().to_string()))?;
            if !template.contains(INPUT_PLACEHOLDER) {
                return Err(PromptError::MissingPlaceholder(action.key().to_string()));
            }
        }
        Ok(())
    }

    pub fn template(&self, action: QuickAction) -> &str {
        self.templates
            .get(&action)
            .map(|s| s.as_str())
            .unwrap_or_else(|| action.default_template())
    }

    pub fn render(&self, action: QuickAction, input: &str) -> String {
        self.template(action).replace(INPUT_PLACEHOLDER, input)
    }

    fn merge(mut self, file: PromptFile) -> Result<Self, PromptError> {
        if let Some(system_prompt) = file.system_prompt.filter(|s| !s.trim().is_empty()) {
            self.system_prompt = system_prompt;
        }
        for (key, template) in file.quick_actions {
            let action: QuickAction = key.parse()?;
            self.templates.insert(action, template);
        }
        Ok(self)
    }
}

pub fn parse_prompts(raw: &str) -> Result<PromptConfig, PromptError> {
    let file: PromptFile = serde_json::from_str(raw)?;
    let config = PromptConfig::default().merge(file)?;
    config.validate()?;
    Ok(config)
}

/// Loads prompt overrides from `path`, or the built-in table when no path is given.
pub fn load_prompts(path: Option<&str>) -> Result<PromptConfig, Box<dyn Error + Send + Sync>> {
    let Some(path) = path.filter(|p| !p.trim().is_empty()) else {
        let config = PromptConfig::default();
        config.validate()?;
        return Ok(config);
    };
    let file_content = fs
        ::read_to_string(path)
        .map_err(|e| format!("Failed to read prompts file '{}': {}", path, e))?;
    let config = parse_prompts(&file_content).map_err(|e|
        format!("Failed to parse prompts file '{}': {}", path, e)
    )?;
    info!("Loaded prompt configuration from {}", path);
    Ok(config)
}
