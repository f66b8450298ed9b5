//! Stored document download and removal

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::error::{Error, Result};
use crate::server::state::AppState;

/// GET /api/documents/:key - Download an uploaded original
pub async fn download_document(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse> {
    let data = state
        .documents()
        .download(&key)
        .await?
        .ok_or_else(|| Error::NotFound(format!("document '{}'", key)))?;

    let content_type = mime_guess::from_path(&key)
        .first_or_octet_stream()
        .to_string();

    Ok(([(header::CONTENT_TYPE, content_type)], data))
}

/// DELETE /api/documents/:key - Remove a document and its chunks
pub async fn delete_document(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if !state.documents().exists(&key).await? {
        return Err(Error::NotFound(format!("document '{}'", key)));
    }
    let chunks_removed = state.pipeline().remove(&key).await?;
    tracing::info!("Removed {} ({} chunks)", key, chunks_removed);

    Ok(Json(json!({
        "source_id": key,
        "chunks_removed": chunks_removed,
    })))
}
