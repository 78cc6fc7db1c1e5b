//! Axum HTTP gateway: chat, admin retrain/re-index, stats, health.
//!
//! Body size and request time are capped by tower-http layers. Admin routes
//! take `Authorization: Bearer <token>` when `gateway.admin_token` is set.

use crate::assistant::Assistant;
use crate::config::GatewayConfig;
use crate::error::Error;
use crate::gatekeeper::RouteOutcome;
use crate::telemetry::ExchangeQuery;
use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Concrete return type for JSON handlers.
type ApiResponse = (StatusCode, Json<serde_json::Value>);

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Assistant>,
    /// SHA-256 hex of the admin token; `None` leaves admin routes open.
    pub admin_token_hash: Option<Arc<str>>,
}

impl AppState {
    pub fn new(assistant: Arc<Assistant>) -> Self {
        let admin_token_hash = assistant
            .config()
            .gateway
            .admin_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| Arc::<str>::from(hash_token(token)));
        Self {
            assistant,
            admin_token_hash,
        }
    }
}

fn hash_token(value: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(value.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn is_public_bind(host: &str) -> bool {
    !matches!(host, "127.0.0.1" | "localhost" | "::1" | "[::1]")
}

/// Run the HTTP gateway until Ctrl-C.
pub async fn run_gateway(assistant: Arc<Assistant>) -> Result<()> {
    let gateway = assistant.config().gateway.clone();
    if is_public_bind(&gateway.host) && gateway.admin_token.is_none() {
        tracing::warn!(
            host = %gateway.host,
            "Binding to a non-loopback address without an admin token; /api/train and /api/embed are open"
        );
    }

    let addr: SocketAddr = format!("{}:{}", gateway.host, gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;

    let status = assistant.status();
    tracing::info!(
        addr = %local,
        classifier_ready = status.classifier_ready,
        documents = status.documents,
        generative = status.generative_backend.as_deref().unwrap_or("none"),
        "Gateway listening"
    );

    let app = build_router(AppState::new(assistant), &gateway);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub fn build_router(state: AppState, gateway: &GatewayConfig) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/chat", post(handle_chat))
        .route("/api/train", post(handle_train))
        .route("/api/embed", post(handle_embed))
        .route("/api/stats", get(handle_stats))
        .route("/api/exchanges", get(handle_exchanges))
        .with_state(state)
        .layer(cors_layer(&gateway.allowed_origins))
        .layer(RequestBodyLimitLayer::new(gateway.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(gateway.request_timeout_secs.max(1)),
        ))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    if allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Training(_) | Error::EmptyCorpus(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn admin_error(message: &str, err: &Error) -> ApiResponse {
    let body = serde_json::json!({
        "status": "error",
        "message": message,
        "details": err.to_string(),
    });
    (status_for(err), Json(body))
}

/// Check `Authorization: Bearer <token>` against the hashed admin token.
fn authenticate_admin(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(ref expected_hash) = state.admin_token_hash else {
        return true;
    };
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("");

    if token.is_empty() {
        return false;
    }
    constant_time_eq(hash_token(token).as_bytes(), expected_hash.as_bytes())
}

fn unauthorized() -> ApiResponse {
    let err = serde_json::json!({
        "status": "error",
        "message": "Unauthorized: provide Authorization: Bearer <admin token>"
    });
    (StatusCode::UNAUTHORIZED, Json(err))
}

// ══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /
async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "intentgate is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /health (always public)
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.assistant.status();
    let body = serde_json::json!({
        "status": if status.classifier_ready { "ok" } else { "degraded" },
        "classifier_ready": status.classifier_ready,
        "intents": status.intents.len(),
        "documents": status.documents,
        "generative_backend": status.generative_backend,
        "model_version": status.model_version,
    });
    Json(body)
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub intent: String,
    pub confidence: f64,
    pub sentiment: String,
    pub polarity: f64,
    pub response_type: String,
    pub model_version: u64,
    pub context_documents: Vec<String>,
}

impl From<RouteOutcome> for ChatReply {
    fn from(outcome: RouteOutcome) -> Self {
        Self {
            response: outcome.response,
            intent: outcome.intent,
            confidence: outcome.confidence,
            sentiment: outcome.sentiment.label.to_string(),
            polarity: outcome.sentiment.polarity,
            response_type: outcome.response_type.to_string(),
            model_version: outcome.model_version,
            context_documents: outcome.context_documents,
        }
    }
}

/// POST /api/chat with `{"message": "..."}`
async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> ApiResponse {
    let Json(chat_body) = match body {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("Chat JSON parse error: {e}");
            let err = serde_json::json!({
                "error": "Invalid JSON body. Expected: {\"message\": \"...\"}"
            });
            return (StatusCode::BAD_REQUEST, Json(err));
        }
    };

    match state.assistant.chat(&chat_body.message).await {
        Ok(outcome) => {
            let reply = ChatReply::from(outcome);
            match serde_json::to_value(&reply) {
                Ok(value) => (StatusCode::OK, Json(value)),
                Err(e) => {
                    tracing::error!("Failed to serialize chat reply: {e}");
                    let err = serde_json::json!({"error": "Internal error"});
                    (StatusCode::INTERNAL_SERVER_ERROR, Json(err))
                }
            }
        }
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                tracing::error!("Chat failed: {e}");
            }
            (status, Json(serde_json::json!({ "error": e.to_string() })))
        }
    }
}

/// POST /api/train: retrain the intent classifier (admin)
async fn handle_train(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    if !authenticate_admin(&state, &headers) {
        return unauthorized();
    }

    match state.assistant.retrain().await {
        Ok(report) => {
            let body = serde_json::json!({
                "status": "success",
                "message": "Intent classifier retrained",
                "details": {
                    "intents": report.summary.intents,
                    "samples": report.summary.samples,
                    "model_version": report.model_version,
                }
            });
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            tracing::error!("Retrain failed: {e}");
            admin_error("Training failed", &e)
        }
    }
}

/// POST /api/embed: rebuild the knowledge-base index (admin)
async fn handle_embed(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    if !authenticate_admin(&state, &headers) {
        return unauthorized();
    }

    match state.assistant.rebuild_index().await {
        Ok(report) => {
            let body = serde_json::json!({
                "status": "success",
                "message": "Knowledge base indexed",
                "details": {
                    "documents": report.summary.documents,
                    "model_version": report.model_version,
                }
            });
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            tracing::warn!("Index rebuild failed: {e}");
            admin_error("Indexing failed", &e)
        }
    }
}

/// GET /api/stats
async fn handle_stats(State(state): State<AppState>) -> ApiResponse {
    match state.assistant.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "success", "data": stats })),
        ),
        Err(e) => {
            tracing::error!("Stats query failed: {e}");
            admin_error("Failed to load stats", &e)
        }
    }
}

/// GET /api/exchanges: filtered exchange log (admin)
async fn handle_exchanges(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ExchangeQuery>,
) -> ApiResponse {
    if !authenticate_admin(&state, &headers) {
        return unauthorized();
    }

    match state.assistant.recent(query).await {
        Ok(exchanges) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "success",
                "count": exchanges.len(),
                "data": exchanges,
            })),
        ),
        Err(e) => {
            tracing::error!("Exchange query failed: {e}");
            admin_error("Failed to load exchanges", &e)
        }
    }
}
