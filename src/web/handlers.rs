//! HTTP request handlers.

use super::AppState;
use crate::db::{DbError, ResultStore, Target};
use crate::probe::TargetAddress;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_ALERT_LIMIT: usize = 100;

pub async fn handle_health() -> impl IntoResponse {
    "ok"
}

// ============================================================================
// Notification endpoint
// ============================================================================

/// Target of an incoming alert: a bare URL or an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AlertTarget {
    Url(String),
    Detailed {
        url: String,
        #[serde(default)]
        id: Option<i64>,
    },
}

impl AlertTarget {
    fn into_target(self) -> Target {
        match self {
            AlertTarget::Url(url) => Target::new(0, url),
            AlertTarget::Detailed { url, id } => Target::new(id.unwrap_or(0), url),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendAlertRequest {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub message: String,
    pub target: AlertTarget,
}

pub async fn handle_send_alert(
    State(state): State<AppState>,
    Json(req): Json<SendAlertRequest>,
) -> impl IntoResponse {
    let target = req.target.into_target();

    match state.channels.notify(&req.alert_type, &req.message, &target).await {
        Ok(()) => (StatusCode::OK, "Alerts sent!").into_response(),
        Err(e) => {
            tracing::error!("Failed to send {} alert for {}: {}", req.alert_type, target.url, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to send alerts").into_response()
        }
    }
}

// ============================================================================
// API: Targets
// ============================================================================

pub async fn handle_get_targets(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_targets() {
        Ok(targets) => Json(targets).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTargetRequest {
    pub url: String,
}

pub async fn handle_create_target(
    State(state): State<AppState>,
    Json(req): Json<CreateTargetRequest>,
) -> impl IntoResponse {
    let url = req.url.trim();
    if let Err(e) = TargetAddress::parse(url) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    match state.store.add_target(url) {
        Ok(target) => {
            tracing::info!("Added target {} ({})", target.url, target.id);
            (StatusCode::CREATED, Json(target)).into_response()
        }
        Err(DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            (StatusCode::CONFLICT, "Target already exists").into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_delete_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.store.delete_target(id) {
        Ok(()) => {
            tracing::info!("Deleted target {}", id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(DbError::NotFound) => (StatusCode::NOT_FOUND, "Target not found").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// API: Results
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn handle_get_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    if let Err(e) = state.store.get_target(id) {
        return not_found_or_error(e);
    }

    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    match state.store.recent_history(id, limit) {
        Ok(history) => Json(history).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_get_checks(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if let Err(e) = state.store.get_target(id) {
        return not_found_or_error(e);
    }

    match state.store.latest_checks(id) {
        Ok(checks) => Json(checks).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub target_id: Option<i64>,
    pub limit: Option<usize>,
}

pub async fn handle_get_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
    match state.store.list_alerts(query.target_id, limit) {
        Ok(alerts) => Json(alerts).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// API: Cycles
// ============================================================================

pub async fn handle_run_cycle(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.try_run_cycle().await {
        Some(Ok(report)) => Json(report).into_response(),
        Some(Err(e)) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        None => (StatusCode::CONFLICT, "Check cycle already running").into_response(),
    }
}

fn not_found_or_error(e: DbError) -> axum::response::Response {
    match e {
        DbError::NotFound => (StatusCode::NOT_FOUND, "Target not found").into_response(),
        e => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
