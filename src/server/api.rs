use crate::agent::ChatAgent;
use crate::history::{ export_messages, StoreError };
use crate::models::api::{
    ApiResponse,
    ChatReply,
    ChatRequest,
    ExportFormat,
    ExportQuery,
    HealthStatus,
    TitleRequest,
    WireMessage,
    WireSession,
};
use axum::{
    extract::{ Path, Query, State },
    http::StatusCode,
    response::{ IntoResponse, Response },
    routing::{ delete, get, post, put },
    Json,
    Router,
};
use log::{ error, info };
use std::sync::Arc;
use tower_http::cors::{ Any, CorsLayer };

const SERVICE_NAME: &str = "NovaChat API";

#[derive(Clone)]
struct AppState {
    agent: Arc<ChatAgent>,
}

pub fn router(agent: Arc<ChatAgent>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/chat", post(chat_handler))
        .route("/api/v1/sessions", get(list_sessions_handler))
        .route("/api/v1/sessions/{id}", delete(delete_session_handler))
        .route("/api/v1/sessions/{id}/history", get(history_handler))
        .route("/api/v1/sessions/{id}/reset", post(reset_handler))
        .route("/api/v1/sessions/{id}/title", put(title_handler))
        .route("/api/v1/sessions/{id}/export", get(export_handler))
        .layer(cors)
        .with_state(AppState { agent })
}

fn health(agent: &ChatAgent) -> HealthStatus {
    HealthStatus {
        message: format!("{} is running", SERVICE_NAME),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "healthy".to_string(),
        llm_status: (if agent.is_development() { "development_mode" } else { "configured" }).to_string(),
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::failure(message))).into_response()
}

fn store_failure(context: &str, e: StoreError) -> Response {
    match e {
        StoreError::NotFound(_) => failure(StatusCode::NOT_FOUND, e.to_string()),
        other => {
            error!("{} failed: {}", context, other);
            failure(StatusCode::INTERNAL_SERVER_ERROR, format!("{} failed: {}", context, other))
        }
    }
}

async fn root_handler(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(health(&state.agent))
}

async fn health_handler(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::ok(health(&state.agent)))
}

async fn chat_handler(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    let session_id = req.session_id.trim();
    if session_id.is_empty() || req.message.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "session_id and message are required");
    }
    info!("Chat request for session {} (regenerate: {})", session_id, req.regenerate);
    let result = if req.regenerate {
        state.agent.regenerate_message(session_id, &req.message, req.config).await
    } else {
        state.agent.process_message(session_id, &req.message, req.config).await
    };
    match result {
        Ok(reply) =>
            Json(
                ApiResponse::ok(ChatReply {
                    message: reply.content,
                    session_id: session_id.to_string(),
                    metadata: Some(reply.metadata),
                })
            ).into_response(),
        Err(e) => {
            error!("Chat request for session {} failed: {}", session_id, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to process message: {}", e))
        }
    }
}

async fn history_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.agent.history(&id).await {
        Ok(messages) => {
            let wire: Vec<WireMessage> = messages.iter().map(WireMessage::from).collect();
            Json(ApiResponse::ok(wire)).into_response()
        }
        Err(e) => store_failure("Loading history", e),
    }
}

async fn reset_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.agent.reset(&id).await {
        Ok(()) => Json(ApiResponse::done("Session reset successfully")).into_response(),
        Err(e) => store_failure("Resetting session", e),
    }
}

async fn list_sessions_handler(State(state): State<AppState>) -> Response {
    match state.agent.sessions().await {
        Ok(sessions) => {
            let wire: Vec<WireSession> = sessions.iter().map(WireSession::from).collect();
            Json(ApiResponse::ok(wire)).into_response()
        }
        Err(e) => store_failure("Listing sessions", e),
    }
}

async fn delete_session_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.agent.delete(&id).await {
        Ok(()) => Json(ApiResponse::done("Session deleted successfully")).into_response(),
        Err(e) => store_failure("Deleting session", e),
    }
}

async fn title_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TitleRequest>
) -> Response {
    let title = req.title.trim();
    if title.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Title must not be empty");
    }
    match state.agent.rename(&id, title).await {
        Ok(()) => Json(ApiResponse::done("Session title updated")).into_response(),
        Err(e) => store_failure("Updating title", e),
    }
}

async fn export_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>
) -> Response {
    let format = match query.format.as_deref().map(str::parse::<ExportFormat>) {
        None => ExportFormat::Json,
        Some(Ok(format)) => format,
        Some(Err(e)) => {
            return failure(StatusCode::BAD_REQUEST, e);
        }
    };
    let messages = match state.agent.history(&id).await {
        Ok(messages) => messages,
        Err(e) => {
            return store_failure("Exporting session", e);
        }
    };
    match export_messages(&id, &messages, format) {
        Ok(body) => Json(ApiResponse::ok(body)).into_response(),
        Err(e) => {
            error!("Export of session {} failed: {}", id, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Export failed: {}", e))
        }
    }
}
