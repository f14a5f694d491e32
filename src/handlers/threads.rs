use crate::dtos::CreateMessageRequest;
use crate::error::AppError;
use crate::startup::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};

/// Append a user message to the thread, then start a streaming run with
/// file search enabled and relay the provider's byte stream untouched.
pub async fn create_message(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(request): Json<CreateMessageRequest>,
) -> Result<Response, AppError> {
    if request.content.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Message content must not be empty"
        )));
    }

    state
        .openai
        .create_thread_message(&thread_id, &request.content)
        .await
        .map_err(|e| {
            tracing::error!(thread_id = %thread_id, error = %e, "Failed to append thread message");
            AppError::Upstream(anyhow::Error::new(e))
        })?;

    let stream = state.openai.stream_run(&thread_id).await.map_err(|e| {
        tracing::error!(thread_id = %thread_id, error = %e, "Failed to start streaming run");
        AppError::Upstream(anyhow::Error::new(e))
    })?;

    tracing::info!(thread_id = %thread_id, "Relaying run stream");

    Ok((
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(stream),
    )
        .into_response())
}
