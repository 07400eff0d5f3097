use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, RequestBuilder };
use serde::de::DeserializeOwned;
use std::error::Error;
use std::time::Duration;
use url::Url;

use super::{ GeneratedReply, ServiceError, SessionService };
use crate::models::api::{
    ApiResponse,
    ChatReply,
    ChatRequest,
    ExportFormat,
    HealthStatus,
    TitleRequest,
    WireMessage,
    WireSession,
};
use crate::models::chat::{ GenerationConfig, Message, SessionSummary };

const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub struct HttpSessionService {
    http: HttpClient,
    base_url: Url,
}

impl HttpSessionService {
    pub fn new(
        base_url: &str,
        timeout: Option<Duration>
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let mut base_url = Url::parse(base_url).map_err(|e|
            format!("Invalid chat service URL '{}': {}", base_url, e)
        )?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = HttpClient::builder()
            .timeout(timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)))
            .build()?;
        info!("Chat service client configured for {}", base_url);
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, route: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(route.trim_start_matches('/'))
            .map_err(|e| ServiceError::Internal(format!("invalid route '{}': {}", route, e)))
    }

    fn session_endpoint(&self, session_id: &str, suffix: &str) -> Result<Url, ServiceError> {
        let mut url = self.endpoint("api/v1/sessions")?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::Internal("base URL cannot carry a path".to_string()))?
            .push(session_id)
            .extend(suffix.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    /// Sends the request and unwraps the envelope, keeping the payload optional.
    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder
    ) -> Result<Option<T>, ServiceError> {
        let resp = request.send().await.map_err(|e| ServiceError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| ServiceError::Transport(e.to_string()))?;
        debug!("Chat service answered {} ({} bytes)", status, body.len());

        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(ServiceError::Decode(e.to_string()));
            }
            Err(_) => {
                return Err(ServiceError::Rejected(format!("HTTP {}", status)));
            }
        };

        if envelope.success {
            Ok(envelope.data)
        } else {
            Err(
                ServiceError::Rejected(
                    envelope.error
                        .or(envelope.message)
                        .unwrap_or_else(|| format!("Request failed with HTTP {}", status))
                )
            )
        }
    }

    async fn generate(
        &self,
        session_id: &str,
        content: &str,
        config: Option<&GenerationConfig>,
        regenerate: bool
    ) -> Result<GeneratedReply, ServiceError> {
        let url = self.endpoint("api/v1/chat")?;
        let payload = ChatRequest {
            session_id: session_id.to_string(),
            message: content.to_string(),
            config: config.filter(|c| !c.is_empty()).cloned(),
            regenerate,
        };
        let reply: ChatReply = self.call_required(self.http.post(url).json(&payload)).await?;
        Ok(GeneratedReply { content: reply.message, metadata: reply.metadata })
    }

    async fn call_required<T: DeserializeOwned>(
        &self,
        request: RequestBuilder
    ) -> Result<T, ServiceError> {
        self.call(request).await?.ok_or_else(|| ServiceError::Decode("missing data".to_string()))
    }
}

#[async_trait]
impl SessionService for HttpSessionService {
    async fn load_history(&self, session_id: &str) -> Result<Vec<Message>, ServiceError> {
        let url = self.session_endpoint(session_id, "history")?;
        let wire: Vec<WireMessage> = self.call(self.http.get(url)).await?.unwrap_or_default();
        Ok(wire.into_iter().map(Message::from).collect())
    }

    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        config: Option<&GenerationConfig>
    ) -> Result<GeneratedReply, ServiceError> {
        self.generate(session_id, content, config, false).await
    }

    async fn regenerate_reply(
        &self,
        session_id: &str,
        content: &str,
        config: Option<&GenerationConfig>
    ) -> Result<GeneratedReply, ServiceError> {
        self.generate(session_id, content, config, true).await
    }

    async fn reset_session(&self, session_id: &str) -> Result<(), ServiceError> {
        let url = self.session_endpoint(session_id, "reset")?;
        self.call::<serde_json::Value>(self.http.post(url)).await.map(|_| ())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ServiceError> {
        let url = self.endpoint("api/v1/sessions")?;
        let wire: Vec<WireSession> = self.call(self.http.get(url)).await?.unwrap_or_default();
        Ok(wire.into_iter().map(SessionSummary::from).collect())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ServiceError> {
        let url = self.session_endpoint(session_id, "")?;
        self.call::<serde_json::Value>(self.http.delete(url)).await.map(|_| ())
    }

    async fn update_session_title(&self, session_id: &str, title: &str) -> Result<(), ServiceError> {
        let url = self.session_endpoint(session_id, "title")?;
        let payload = TitleRequest { title: title.to_string() };
        self.call::<serde_json::Value>(self.http.put(url).json(&payload)).await.map(|_| ())
    }

    async fn export_session(
        &self,
        session_id: &str,
        format: ExportFormat
    ) -> Result<String, ServiceError> {
        let mut url = self.session_endpoint(session_id, "export")?;
        url.query_pairs_mut().append_pair("format", format.as_str());
        self.call_required(self.http.get(url)).await
    }

    async fn health_check(&self) -> Result<Option<HealthStatus>, ServiceError> {
        let url = self.endpoint("api/v1/health")?;
        self.call(self.http.get(url)).await
    }
}
