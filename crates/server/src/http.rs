//! HTTP endpoints
//!
//! REST surface for the conversational core. Authentication and RBAC
//! live in the gateway in front of this service; the `full_access`
//! capability arrives as a header it sets after authorization.

use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use converge_agent::Viewer;
use converge_core::{Error, InboundMessage, PriorityQueueEntry, ReviewStatus, SlaRisk};

use crate::metrics::metrics_handler;
use crate::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors_layer = if state.settings.server.cors_enabled {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        // Conversation
        .route("/api/v1/messages", post(handle_message))
        .route("/api/v1/sessions/:id/turns", get(session_turns))
        // Operations review
        .route("/api/v1/review-queue", get(list_review_queue))
        .route("/api/v1/review-queue/:id/review", post(review_entry))
        // Probes
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> impl IntoResponse {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// One conversation turn.
async fn handle_message(
    State(state): State<AppState>,
    Json(inbound): Json<InboundMessage>,
) -> impl IntoResponse {
    if let Err(e) = inbound.validate() {
        return error_response(StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    let session_id = inbound
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // Strict serialization per session: reject a second in-flight turn
    let guard = state.turn_guard(&session_id);
    let Ok(_permit) = guard.try_lock() else {
        return error_response(
            StatusCode::CONFLICT,
            "a turn for this session is still in progress",
        )
        .into_response();
    };

    let inbound = InboundMessage {
        session_id: Some(session_id),
        ..inbound
    };

    let started = Instant::now();
    match state.coordinator.handle(inbound).await {
        Ok(reply) => {
            metrics::counter!(
                "converge_turns_total",
                "intent" => reply.intent.as_str(),
                "method" => reply.metadata.classification_method.as_str(),
            )
            .increment(1);
            metrics::histogram!("converge_turn_duration_ms")
                .record(started.elapsed().as_millis() as f64);
            Json(reply).into_response()
        }
        Err(Error::InvalidRequest(message)) => {
            error_response(StatusCode::BAD_REQUEST, message).into_response()
        }
        Err(e) => {
            // Failure to persist the turn is retryable by the caller
            tracing::error!(error = %e, "turn failed");
            metrics::counter!("converge_turn_errors_total", "kind" => e.kind()).increment(1);
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "could not record the turn; please retry",
            )
            .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct TurnsQuery {
    #[serde(default = "default_turn_limit")]
    limit: usize,
}

fn default_turn_limit() -> usize {
    50
}

/// Recent turns for a session.
async fn session_turns(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<TurnsQuery>,
) -> impl IntoResponse {
    match state.turns.recent(&session_id, query.limit.min(200)).await {
        Ok(turns) => {
            let count = turns.len();
            Json(serde_json::json!({
                "session_id": session_id,
                "turns": turns,
                "count": count,
            }))
            .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to list turns");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "store unavailable").into_response()
        }
    }
}

fn viewer_from_headers(headers: &HeaderMap) -> Viewer {
    let id = headers
        .get("x-reviewer-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();
    let full_access = headers
        .get("x-full-access")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "true")
        .unwrap_or(false);
    Viewer { id, full_access }
}

#[derive(Debug, Deserialize)]
struct ReviewQueueQuery {
    status: Option<String>,
    #[serde(default = "default_queue_limit")]
    limit: usize,
}

fn default_queue_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
struct ReviewQueueItem {
    #[serde(flatten)]
    entry: PriorityQueueEntry,
    sla_risk: SlaRisk,
}

/// Pending work for operations staff, highest priority first.
async fn list_review_queue(
    State(state): State<AppState>,
    Query(query): Query<ReviewQueueQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let viewer = viewer_from_headers(&headers);
    let status_name = query
        .status
        .clone()
        .unwrap_or_else(|| state.settings.review.default_status_filter.clone());
    let status = ReviewStatus::parse(&status_name);
    if status.is_none() && status_name != "all" {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("unknown status filter: {}", status_name),
        )
        .into_response();
    }

    match state.review.list(status, query.limit.min(200), &viewer).await {
        Ok(entries) => {
            let items: Vec<ReviewQueueItem> = entries
                .into_iter()
                .map(|entry| ReviewQueueItem {
                    sla_risk: state.review.risk(&entry),
                    entry,
                })
                .collect();
            Json(serde_json::json!({
                "entries": items,
                "count": items.len(),
            }))
            .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to list review queue");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "store unavailable").into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReviewAction {
    action: String,
    #[serde(default)]
    escalate: bool,
}

/// Record a review decision.
async fn review_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<ReviewAction>,
) -> impl IntoResponse {
    let viewer = viewer_from_headers(&headers);
    match state
        .review
        .review(id, &viewer, &body.action, body.escalate)
        .await
    {
        Ok(entry) => Json(entry).into_response(),
        Err(Error::InvalidRequest(message)) => {
            error_response(StatusCode::NOT_FOUND, message).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "review action failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "store unavailable").into_response()
        }
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    // The turn store is the hard dependency; everything else degrades
    match state.turns.recent("readiness-probe", 1).await {
        Ok(_) => Json(serde_json::json!({"status": "ready"})).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "readiness probe failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "stores unavailable").into_response()
        }
    }
}
