//! Health and status handlers

use crate::api::rest::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use warden_monitor::MonitorStatus;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
    })
}

/// Daemon status response
#[derive(Debug, Serialize)]
pub struct DaemonStatusResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub monitor: MonitorStatus,
    pub ledger: LedgerStats,
}

/// Ledger statistics
#[derive(Debug, Serialize)]
pub struct LedgerStats {
    pub offenders: usize,
    pub total_errors: u64,
}

/// Daemon status endpoint
pub async fn daemon_status(State(state): State<AppState>) -> Json<DaemonStatusResponse> {
    let monitor = state.monitor.status().await;
    // Several failed cycles in a row means the canvas is unreachable.
    let status = if monitor.consecutive_failures >= 3 {
        "degraded"
    } else {
        "healthy"
    };

    Json(DaemonStatusResponse {
        status: status.to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        started_at: state.started_at,
        monitor,
        ledger: LedgerStats {
            offenders: state.stats.len().await,
            total_errors: state.stats.total_errors().await,
        },
    })
}
