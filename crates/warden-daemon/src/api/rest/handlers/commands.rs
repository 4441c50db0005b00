//! Chat command handler

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

/// Command request
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub text: String,
}

/// Command response
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub reply: String,
}

/// Run a chat command as if it had been posted in a channel
pub async fn run_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<Json<CommandResponse>> {
    let reply = state.commands.handle(&request.text).await.ok_or_else(|| {
        ApiError::BadRequest(format!(
            "not a command (expected {}rank, {}errorPixels or {}rm <userId>)",
            state.commands.prefix(),
            state.commands.prefix(),
            state.commands.prefix()
        ))
    })?;

    Ok(Json(CommandResponse { reply }))
}
