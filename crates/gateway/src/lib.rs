//! HTTP API gateway for RiskProfiler.
//!
//! Exposes the session orchestrator over REST: start a session, chat turn
//! by turn, fetch the finished profile. Every orchestrator call runs on its
//! own task, so a client hanging up mid-turn can't leave a session half
//! updated.
//!
//! Built on Axum.

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use riskprofiler_config::AppConfig;
use riskprofiler_core::error::{Error, SessionError};
use riskprofiler_core::message::Role;
use riskprofiler_core::profile::ClientProfile;
use riskprofiler_core::provider::Provider;
use riskprofiler_core::session::{ClientId, ProfileSession};
use riskprofiler_engine::{
    CompletionClient, ProfilePolicy, ProfileStatus, SessionOrchestrator,
};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<SessionOrchestrator>,
    /// The completion backend, probed by `/health`
    pub provider: Arc<dyn Provider>,
}

pub type SharedState = Arc<GatewayState>;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - Permissive CORS (browser front ends on any origin)
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/session/start", post(start_session_handler))
        .route("/api/session/{client_id}", get(session_handler))
        .route("/api/session/{client_id}/greeting", post(greeting_handler))
        .route("/api/chat/{client_id}", post(chat_handler))
        .route("/api/profile/{client_id}", get(profile_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire provider, store and orchestrator from configuration.
pub fn build_state(config: &AppConfig) -> Result<SharedState, Box<dyn std::error::Error>> {
    let router = riskprofiler_providers::build_from_config(config);
    let provider = router
        .default()
        .ok_or("No default completion provider configured")?;
    let store = riskprofiler_store::build_from_config(&config.store)?;

    let orchestrator = Arc::new(SessionOrchestrator::new(
        store,
        ProfilePolicy::from_config(&config.profiler),
        CompletionClient::from_config(provider.clone(), config),
    ));

    Ok(Arc::new(GatewayState {
        orchestrator,
        provider,
    }))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = build_state(&config)?;

    info!(
        addr = %addr,
        provider = state.provider.name(),
        model = state.orchestrator.client().model(),
        store = state.orchestrator.store().name(),
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

// --- Errors ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Set when a session was created but its greeting failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

fn error_response(e: Error) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        Error::Session(SessionError::UnknownSession(_)) => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::CONFLICT,
        e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let client_id = match &e {
        Error::Session(SessionError::GreetingUnavailable { client_id, .. }) => {
            Some(client_id.to_string())
        }
        _ => None,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "Request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            client_id,
        }),
    )
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            client_id: None,
        }),
    )
}

// --- Handlers ---

#[derive(Serialize)]
struct IndexResponse {
    service: &'static str,
    version: &'static str,
    endpoints: Vec<&'static str>,
}

async fn index_handler() -> Json<IndexResponse> {
    Json(IndexResponse {
        service: "RiskProfiler client onboarding API",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            "GET /health",
            "POST /api/session/start",
            "POST /api/session/{client_id}/greeting",
            "GET /api/session/{client_id}",
            "POST /api/chat/{client_id}",
            "GET /api/profile/{client_id}",
        ],
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub completion_service: String,
    pub model: String,
    pub sessions: Option<usize>,
    pub version: String,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let reachable = matches!(
        tokio::time::timeout(Duration::from_secs(5), state.provider.health_check()).await,
        Ok(Ok(true))
    );

    let status = if reachable { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        completion_service: state.provider.name().to_string(),
        model: state.orchestrator.client().model().to_string(),
        sessions: state.orchestrator.store().count().await.ok(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStartResponse {
    pub client_id: String,
    pub message: String,
}

async fn start_session_handler(
    State(state): State<SharedState>,
) -> ApiResult<SessionStartResponse> {
    let start = state
        .orchestrator
        .start_session_detached()
        .await
        .map_err(error_response)?;

    Ok(Json(SessionStartResponse {
        client_id: start.client_id.to_string(),
        message: start.greeting,
    }))
}

async fn greeting_handler(
    State(state): State<SharedState>,
    Path(client_id): Path<String>,
) -> ApiResult<SessionStartResponse> {
    let greeting = state
        .orchestrator
        .retry_greeting_detached(ClientId(client_id.clone()))
        .await
        .map_err(error_response)?;

    Ok(Json(SessionStartResponse {
        client_id,
        message: greeting,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub content: String,
    /// Only "user" is accepted; the field exists for client compatibility
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub profile_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_data: Option<ClientProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_warning: Option<String>,
}

async fn chat_handler(
    State(state): State<SharedState>,
    Path(client_id): Path<String>,
    Json(payload): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    if payload.role.is_some_and(|role| role != Role::User) {
        return Err(bad_request("only user turns can be submitted"));
    }
    info!(client_id = %client_id, content_len = payload.content.len(), "Chat turn received");

    let outcome = state
        .orchestrator
        .advance_detached(ClientId(client_id), payload.content)
        .await
        .map_err(error_response)?;

    let (profile_data, profile_warning) = match outcome.status {
        ProfileStatus::Complete(profile) => {
            let warning = (!outcome.warnings.is_empty()).then(|| outcome.warnings.join("; "));
            (Some(profile), warning)
        }
        ProfileStatus::Malformed(e) => (None, Some(e.to_string())),
        ProfileStatus::Pending => (None, None),
    };

    Ok(Json(ChatResponse {
        message: outcome.reply,
        profile_complete: profile_data.is_some(),
        profile_data,
        profile_warning,
    }))
}

async fn profile_handler(
    State(state): State<SharedState>,
    Path(client_id): Path<String>,
) -> ApiResult<Option<ClientProfile>> {
    let profile = state
        .orchestrator
        .get_profile(&ClientId(client_id))
        .await
        .map_err(error_response)?;
    Ok(Json(profile))
}

async fn session_handler(
    State(state): State<SharedState>,
    Path(client_id): Path<String>,
) -> ApiResult<ProfileSession> {
    let session = state
        .orchestrator
        .session(&ClientId(client_id))
        .await
        .map_err(error_response)?;
    Ok(Json(session))
}
