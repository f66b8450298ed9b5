//! Conversation session management

use axum::{
    extract::{Path, State},
    http::StatusCode,
};

use crate::conversation::DEFAULT_SESSION_ID;
use crate::error::{Error, Result};
use crate::server::state::AppState;

/// DELETE /api/sessions/:id - Clear and forget one conversation
pub async fn clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if id == DEFAULT_SESSION_ID {
        state.engine().conversation().clear().await;
        tracing::info!("Cleared default conversation");
        return Ok(StatusCode::NO_CONTENT);
    }

    let conversation = state
        .sessions()
        .remove(&id)
        .ok_or_else(|| Error::NotFound(format!("session '{}'", id)))?;
    conversation.clear().await;

    tracing::info!("Cleared session {}", id);
    Ok(StatusCode::NO_CONTENT)
}
