//! Minimal admin HTTP surface shared by the worker binaries.
//!
//! `GET /health` for liveness, `GET /status` for stage counters and queue
//! depth, and an optional manual trigger route (`POST /collect` on the
//! collector, `POST /publish` on the publisher).

pub mod counters;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use mill_core::config::ServerConfig;
use mill_core::Shutdown;
use mill_queue::QueueClient;

pub use counters::{CountersSnapshot, StageCounters};

/// Manual trigger request forwarded to the worker loop.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub correlation_id: Uuid,
    pub reason: String,
}

/// State behind the admin routes.
pub struct AdminState {
    pub service: String,
    pub counters: Arc<StageCounters>,
    /// Named queues whose depth shows up in `/status`.
    pub queues: Vec<(String, Arc<dyn QueueClient>)>,
    /// Present when this stage supports a manual trigger.
    pub trigger: Option<mpsc::Sender<TriggerRequest>>,
}

/// Build the admin router. `trigger_route` names the POST path when the
/// stage has one (e.g. "/collect").
pub fn build_router(state: Arc<AdminState>, trigger_route: Option<&str>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/status", get(status));

    if let Some(path) = trigger_route {
        app = app.route(path, post(trigger));
    }

    app.layer(CorsLayer::permissive()).with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(
    router: Router,
    server: &ServerConfig,
    shutdown: Shutdown,
) -> std::io::Result<()> {
    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "admin server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await
}

async fn health(State(state): State<Arc<AdminState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": state.service,
    }))
}

async fn status(State(state): State<Arc<AdminState>>) -> Json<serde_json::Value> {
    let mut queues = serde_json::Map::new();
    for (name, client) in &state.queues {
        let depth = match client.peek_depth().await {
            Ok(d) => serde_json::json!(d),
            Err(e) => {
                warn!(queue = %name, error = %e, "queue depth check failed");
                serde_json::json!(null)
            }
        };
        queues.insert(name.clone(), depth);
    }

    Json(serde_json::json!({
        "service": state.service,
        "counters": state.counters.snapshot(),
        "queues": queues,
    }))
}

async fn trigger(
    State(state): State<Arc<AdminState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let sender = match &state.trigger {
        Some(s) => s,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "no manual trigger on this stage"})),
            )
        }
    };

    let request = TriggerRequest {
        correlation_id: Uuid::new_v4(),
        reason: "manual".to_string(),
    };
    let correlation_id = request.correlation_id;

    // A full channel means a run is already pending; the trigger is
    // idempotent with respect to in-flight work.
    let in_flight = match sender.try_send(request) {
        Ok(()) => false,
        Err(mpsc::error::TrySendError::Full(_)) => true,
        Err(mpsc::error::TrySendError::Closed(_)) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": "worker is shutting down"})),
            )
        }
    };

    info!(%correlation_id, in_flight, "manual trigger accepted");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "correlation_id": correlation_id,
            "already_in_flight": in_flight,
        })),
    )
}
