//! REST endpoints: health, manual trigger, webhook intake, status and contacts.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::pipeline::Scheduler;
use crate::source::{PushedMessage, WebhookPayload};

const DEFAULT_CONTACT_LIMIT: usize = 50;
const MAX_CONTACT_LIMIT: usize = 500;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    /// Startup config warnings, reported on `/health`.
    pub config_warnings: Arc<Vec<String>>,
}

/// Build the Axum router with all REST routes.
pub fn api_routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/check-emails", post(check_emails))
        .route("/webhook/email", post(email_webhook))
        .route("/api/scheduler/status", get(scheduler_status))
        .route("/api/contacts/stats", get(contact_stats))
        .route("/api/contacts", get(list_contacts))
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_json(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

// ── Service ─────────────────────────────────────────────────────────────

async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.scheduler.status().await;
    Json(serde_json::json!({
        "service": "recruiter-sync",
        "version": env!("CARGO_PKG_VERSION"),
        "owner": state.scheduler.orchestrator().owner(),
        "check_interval_minutes": status.interval_secs / 60,
        "endpoints": {
            "health": "GET /health",
            "check_emails": "POST /check-emails",
            "webhook": "POST /webhook/email",
            "scheduler_status": "GET /api/scheduler/status",
            "contact_stats": "GET /api/contacts/stats",
            "contacts": "GET /api/contacts",
        },
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = state.scheduler.orchestrator();
    match orchestrator.ledger().contact_stats(orchestrator.owner()).await {
        Ok(_) => Json(serde_json::json!({
            "status": "healthy",
            "timestamp": Utc::now(),
            "ledger": "ok",
            "config_warnings": state.config_warnings.len(),
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "timestamp": Utc::now(),
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

// ── Runs ────────────────────────────────────────────────────────────────

async fn check_emails(State(state): State<AppState>) -> impl IntoResponse {
    info!("Manual email check triggered");
    let result = state.scheduler.run_now().await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(result))
}

async fn email_webhook(
    State(state): State<AppState>,
    Form(payload): Form<WebhookPayload>,
) -> impl IntoResponse {
    let orchestrator = state.scheduler.orchestrator();
    let recipient = payload.recipient.trim().to_lowercase();

    // Single configured mailbox; anything else is not ours.
    if recipient != orchestrator.owner() {
        warn!(recipient = %recipient, "Webhook for unknown recipient");
        return error_json(StatusCode::NOT_FOUND, "Unknown recipient");
    }

    let message = match payload.into_raw_message() {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Rejected webhook payload");
            return error_json(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    info!(message_id = %message.message_id, "Webhook message received");
    let source = PushedMessage::new(recipient, message);
    let result = orchestrator.run(&source).await;
    Json(result).into_response()
}

// ── Status ──────────────────────────────────────────────────────────────

async fn scheduler_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.status().await)
}

async fn contact_stats(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = state.scheduler.orchestrator();
    match orchestrator.ledger().contact_stats(orchestrator.owner()).await {
        Ok(by_status) => Json(serde_json::json!({
            "owner": orchestrator.owner(),
            "total": by_status.values().sum::<i64>(),
            "by_status": by_status,
        }))
        .into_response(),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct ContactsQuery {
    limit: Option<usize>,
}

async fn list_contacts(
    State(state): State<AppState>,
    Query(query): Query<ContactsQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_CONTACT_LIMIT)
        .clamp(1, MAX_CONTACT_LIMIT);
    let orchestrator = state.scheduler.orchestrator();
    match orchestrator.ledger().list_entries(orchestrator.owner(), limit).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn not_found() -> impl IntoResponse {
    error_json(StatusCode::NOT_FOUND, "Not found")
}
