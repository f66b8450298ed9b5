//! Question answering endpoint

use axum::{extract::State, Json};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{QueryRequest, QueryResponse};

/// POST /api/query - Answer a question from the uploaded documents
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    if request.question.trim().is_empty() {
        return Err(Error::invalid_input("No question provided"));
    }

    let start = Instant::now();
    tracing::info!("Query: \"{}\"", request.question);

    let conversation = state.sessions().get_or_create(request.session_id.as_deref());
    let response = state
        .engine()
        .answer_with(&conversation, &request.question)
        .await?;

    tracing::info!("Answered in {}ms", start.elapsed().as_millis());
    Ok(Json(QueryResponse { response }))
}
