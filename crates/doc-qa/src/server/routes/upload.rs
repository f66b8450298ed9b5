//! Document upload endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::UploadResponse;

/// POST /api/upload - Upload and index one file (multipart field `file`)
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::invalid_input(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().trim().to_string();
        if filename.is_empty() {
            return Err(Error::invalid_input("No file selected"));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::invalid_input(format!("Failed to read file: {}", e)))?;

        let response = state.pipeline().upload(&filename, data.to_vec()).await?;
        return Ok(Json(response));
    }

    Err(Error::invalid_input("No file provided"))
}
