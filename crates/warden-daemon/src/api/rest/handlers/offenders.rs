//! Ledger and error pixel handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use warden_monitor::PardonOutcome;
use warden_types::{ErrorPixelSet, UserId};

/// One leaderboard row
#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: UserId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alliance: Option<String>,
    pub count: u64,
}

/// Lifetime leaderboard, worst offender first
pub async fn leaderboard(State(state): State<AppState>) -> Json<Vec<LeaderboardEntry>> {
    let entries = state
        .stats
        .leaderboard()
        .await
        .into_iter()
        .enumerate()
        .map(|(i, (user_id, record))| LeaderboardEntry {
            rank: i + 1,
            user_id,
            name: record.info.display_name().to_string(),
            alliance: record.info.alliance().map(str::to_string),
            count: record.count,
        })
        .collect();

    Json(entries)
}

/// Current error pixels
#[derive(Debug, Serialize)]
pub struct ErrorPixelsResponse {
    pub count: usize,
    pub pixels: ErrorPixelSet,
}

/// Mismatches from the latest completed cycle
pub async fn error_pixels(State(state): State<AppState>) -> Json<ErrorPixelsResponse> {
    let pixels = state.monitor.mismatches().snapshot().await;
    Json(ErrorPixelsResponse {
        count: pixels.len(),
        pixels,
    })
}

/// Pardon response
#[derive(Debug, Serialize)]
pub struct PardonResponse {
    pub user_id: UserId,
    pub name: String,
    pub count: u64,
}

/// Remove a user's record from the ledger
pub async fn pardon_offender(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PardonResponse>> {
    let user_id = UserId::new(id.trim());
    if user_id.as_str().is_empty() {
        return Err(ApiError::BadRequest("user id is empty".to_string()));
    }

    match state.stats.pardon(&user_id).await? {
        PardonOutcome::Pardoned(record) => {
            tracing::info!(user = %user_id, count = record.count, "Pardoned offender");
            Ok(Json(PardonResponse {
                name: record.info.display_name().to_string(),
                count: record.count,
                user_id,
            }))
        }
        PardonOutcome::NotFound => Err(ApiError::NotFound(format!(
            "No offender record for user {}",
            user_id
        ))),
    }
}
