use log::{ info, warn };
use std::sync::Arc;

use crate::client::{ ServiceError, SessionService };
use crate::config::prompt::{ PromptConfig, QuickAction };
use crate::controller::{ ControllerOptions, SessionController, SessionRuntime, Snapshot };
use crate::models::api::ExportFormat;
use crate::models::chat::{ new_session_id, GenerationConfig, Role, SessionSummary };

/// Called with the new session id after every successful rebind.
pub type SessionPersistence = Box<dyn Fn(&str) + Send + Sync>;

/// Application-level coordinator: owns the current-session pointer and the
/// session list, and drives the session controller bound to it.
pub struct ChatApp {
    runtime: SessionRuntime,
    sessions: Vec<SessionSummary>,
    prompts: PromptConfig,
    persist: Option<SessionPersistence>,
}

impl ChatApp {
    pub fn new(
        service: Arc<dyn SessionService>,
        config: GenerationConfig,
        options: ControllerOptions,
        prompts: PromptConfig
    ) -> Self {
        let controller = SessionController::new("", config, options);
        Self {
            runtime: SessionRuntime::new(controller, service),
            sessions: Vec::new(),
            prompts,
            persist: None,
        }
    }

    pub fn with_persistence(mut self, persist: SessionPersistence) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn runtime(&self) -> &SessionRuntime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut SessionRuntime {
        &mut self.runtime
    }

    pub fn current_session(&self) -> &str {
        self.runtime.controller().session_id()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.runtime.snapshot()
    }

    pub fn sessions(&self) -> &[SessionSummary] {
        &self.sessions
    }

    pub fn prompts(&self) -> &PromptConfig {
        &self.prompts
    }

    /// Binds to `initial` when given, otherwise to a brand new session.
    pub async fn start(&mut self, initial: Option<String>) {
        self.runtime.refresh_health().await;
        match initial.filter(|id| !id.trim().is_empty()) {
            Some(id) => self.switch_session(&id).await,
            None => self.new_chat().await,
        }
    }

    /// Allocates a fresh session id locally and binds to it.
    pub async fn new_chat(&mut self) {
        let id = new_session_id();
        info!("Starting new chat {}", id);
        self.switch_session(&id).await;
    }

    pub async fn switch_session(&mut self, session_id: &str) {
        self.runtime.bind(session_id).await;
        let controller = self.runtime.controller();
        if controller.error().is_none() && controller.session_id() == session_id.trim() {
            if let Some(persist) = &self.persist {
                persist(controller.session_id());
            }
        }
    }

    pub async fn refresh_sessions(&mut self) -> Result<&[SessionSummary], ServiceError> {
        self.sessions = self.runtime.service().list_sessions().await?;
        Ok(&self.sessions)
    }

    /// Deletes a session remotely; deleting the active one moves to a new chat.
    pub async fn delete_session(&mut self, session_id: &str) -> Result<(), ServiceError> {
        self.runtime.service().delete_session(session_id).await?;
        self.sessions.retain(|s| s.id != session_id);
        if session_id == self.current_session() {
            warn!("Active session {} deleted; falling back to a new chat", session_id);
            self.new_chat().await;
        }
        Ok(())
    }

    pub async fn rename_session(&mut self, session_id: &str, title: &str) -> Result<(), ServiceError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ServiceError::Rejected("Title must not be empty".to_string()));
        }
        self.runtime.service().update_session_title(session_id, title).await?;
        if let Some(summary) = self.sessions.iter_mut().find(|s| s.id == session_id) {
            summary.title = title.to_string();
        }
        Ok(())
    }

    pub async fn export_current(&self, format: ExportFormat) -> Result<String, ServiceError> {
        self.runtime.service().export_session(self.current_session(), format).await
    }

    pub async fn send(&mut self, content: &str) {
        self.runtime.send(content).await;
    }

    /// Expands a quick-action template around `input` and sends the result.
    pub async fn quick_action(&mut self, action: QuickAction, input: &str) {
        if input.trim().is_empty() {
            return;
        }
        let prompt = self.prompts.render(action, input.trim());
        self.runtime.send(&prompt).await;
    }

    pub async fn reset(&mut self) {
        self.runtime.reset().await;
    }

    /// Regenerates the most recent assistant reply, if any.
    pub async fn regenerate_last(&mut self) {
        let last = self.runtime
            .controller()
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.id.clone());
        if let Some(id) = last {
            self.runtime.regenerate(&id).await;
        }
    }

    pub async fn check_health(&mut self) -> bool {
        self.runtime.refresh_health().await
    }

    pub fn set_generation_config(&mut self, config: GenerationConfig) {
        self.runtime.controller_mut().set_config(config);
    }
}
