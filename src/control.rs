//! Operator Control API
//!
//! Small axum server used by the operator to start and stop message
//! processing, inspect counters and reset conversations.
//!
//! | Method | Path | Effect |
//! |---|---|---|
//! | GET | `/api/health` | liveness + uptime |
//! | GET | `/api/bot/status` | gate state |
//! | POST | `/api/bot/start` | activate the gate |
//! | POST | `/api/bot/stop` | deactivate the gate |
//! | GET | `/api/history/{chat_id}` | window size for a chat |
//! | DELETE | `/api/history/{chat_id}` | clear a chat's window |
//! | GET | `/api/stats` | audit counters |
//! | GET | `/api/directory/categories` | catalog categories |

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::directory::BusinessDirectory;
use crate::gate::ActivityGate;
use crate::history::{ChatId, HistoryStore};

/// State shared across handlers
pub struct ControlState {
    pub gate: Arc<ActivityGate>,
    pub history: Arc<HistoryStore>,
    pub audit: Arc<dyn AuditLog>,
    pub directory: Arc<BusinessDirectory>,
    /// Transport identifier reported by `/api/bot/status`
    pub transport: String,
    pub start_time: Instant,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// ISO 8601
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct BotStatus {
    pub active: bool,
    pub transport: String,
    pub active_conversations: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryInfo {
    pub chat_id: ChatId,
    pub size: usize,
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub messages: u64,
    pub commands: u64,
    pub active_conversations: usize,
}

type ApiError = (StatusCode, String);

fn internal(e: anyhow::Error) -> ApiError {
    warn!("Control API error: {:#}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Build the router with all routes and middleware
pub fn router(state: Arc<ControlState>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/bot/status", get(bot_status))
        .route("/bot/start", post(start_bot))
        .route("/bot/stop", post(stop_bot))
        .route("/history/{chat_id}", get(history_info).delete(clear_history))
        .route("/stats", get(stats))
        .route("/directory/categories", get(categories))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

/// Serve the control API until a shutdown signal arrives
pub async fn serve(state: Arc<ControlState>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind control API on {}", addr))?;

    info!("Control API listening on http://{}", addr);
    if !addr.ip().is_loopback() {
        warn!("Control API bound to {} - it has no authentication", addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Control API shut down gracefully");
    Ok(())
}

async fn health(State(state): State<Arc<ControlState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version,
        uptime_secs: state.start_time.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

fn status_of(state: &ControlState) -> BotStatus {
    BotStatus {
        active: state.gate.is_active(),
        transport: state.transport.clone(),
        active_conversations: state.history.active_conversation_count(),
    }
}

async fn bot_status(State(state): State<Arc<ControlState>>) -> Json<BotStatus> {
    Json(status_of(&state))
}

async fn start_bot(State(state): State<Arc<ControlState>>) -> Json<BotStatus> {
    state.gate.set_active(true);
    Json(status_of(&state))
}

async fn stop_bot(State(state): State<Arc<ControlState>>) -> Json<BotStatus> {
    state.gate.set_active(false);
    Json(status_of(&state))
}

async fn history_info(
    State(state): State<Arc<ControlState>>,
    Path(chat_id): Path<ChatId>,
) -> Json<HistoryInfo> {
    Json(HistoryInfo {
        chat_id,
        size: state.history.size(chat_id),
    })
}

async fn clear_history(
    State(state): State<Arc<ControlState>>,
    Path(chat_id): Path<ChatId>,
) -> StatusCode {
    state.history.clear(chat_id);
    StatusCode::NO_CONTENT
}

async fn stats(State(state): State<Arc<ControlState>>) -> Result<Json<Stats>, ApiError> {
    Ok(Json(Stats {
        messages: state.audit.count_messages().map_err(internal)?,
        commands: state.audit.count_commands().map_err(internal)?,
        active_conversations: state.history.active_conversation_count(),
    }))
}

async fn categories(State(state): State<Arc<ControlState>>) -> Result<Json<Vec<String>>, ApiError> {
    state.directory.categories().map(Json).map_err(internal)
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
