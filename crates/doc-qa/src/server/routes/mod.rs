//! API routes for the document Q&A server

pub mod documents;
pub mod query;
pub mod sessions;
pub mod upload;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{delete, get, post},
    Json, Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Upload - with larger body limit for file uploads
        .route(
            "/upload",
            post(upload::upload_file).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/query", post(query::query))
        .route(
            "/documents/:key",
            get(documents::download_document).delete(documents::delete_document),
        )
        .route("/sessions/:id", delete(sessions::clear_session))
        .route("/info", get(info))
}

/// API info endpoint
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let chunks = match state.index().len().await {
        Ok(len) => Some(len),
        Err(e) => {
            tracing::warn!("Could not count indexed chunks: {}", e);
            None
        }
    };

    Json(serde_json::json!({
        "name": "doc-qa",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Document question answering with retrieval-augmented generation",
        "backend": state.config().llm.backend,
        "generation_model": state.engine().llm().model(),
        "indexed_chunks": chunks,
        "endpoints": {
            "POST /api/upload": "Upload a .pdf or .txt file (multipart field 'file')",
            "POST /api/query": "Ask a question: {question, session_id?}",
            "GET /api/documents/:key": "Download an uploaded original",
            "DELETE /api/documents/:key": "Remove a document and its chunks",
            "DELETE /api/sessions/:id": "Clear a conversation ('default' for the shared one)"
        }
    }))
}
