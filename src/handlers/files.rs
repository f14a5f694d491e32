use crate::dtos::{
    DeleteFileRequest, DeleteFileResponse, FileRecord, FileStatusResponse, ListParams,
    UploadParams, UploadResponse,
};
use crate::error::AppError;
use crate::services::openai::FileObject;
use crate::services::OpenAiError;
use crate::startup::AppState;
use axum::{
    extract::{multipart::Field, Multipart, Query, State},
    http::{header::CONTENT_LENGTH, HeaderMap},
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Transfer strategy for one upload, chosen before any provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadPlan {
    /// Image payloads are replaced by a vision-extracted transcript.
    ImageTranscript,
    /// Forward field chunks to the provider without buffering.
    Streamed,
    /// Read fully into memory, then upload.
    Buffered,
}

fn classify_upload(
    content_type: &str,
    stream_requested: bool,
    size_hint: Option<u64>,
    threshold: u64,
) -> UploadPlan {
    if content_type.starts_with("image/") {
        return UploadPlan::ImageTranscript;
    }
    if stream_requested || size_hint.map_or(false, |size| size > threshold) {
        return UploadPlan::Streamed;
    }
    UploadPlan::Buffered
}

/// Replace the filename's extension with `.txt` for transcript uploads.
fn transcript_filename(original: &str) -> String {
    match std::path::Path::new(original).file_stem().and_then(|s| s.to_str()) {
        Some(stem) if !stem.is_empty() => format!("{}.txt", stem),
        _ => "transcript.txt".to_string(),
    }
}

pub async fn upload_file(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let field = loop {
        match multipart.next_field().await.map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
        })? {
            Some(field) if field.name() == Some("file") => break field,
            Some(_) => continue,
            None => {
                return Err(AppError::BadRequest(anyhow::anyhow!("No file uploaded")))
            }
        }
    };

    let filename = field.file_name().unwrap_or("unnamed").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    // Multipart does not reveal the field size before consumption; the
    // request Content-Length is the best available hint.
    let size_hint: Option<u64> = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    let plan = classify_upload(
        &content_type,
        params.stream.unwrap_or(false),
        size_hint,
        state.config.assistant.stream_threshold_bytes,
    );

    tracing::info!(
        filename = %filename,
        content_type = %content_type,
        plan = ?plan,
        "File upload started"
    );

    let file = match plan {
        UploadPlan::ImageTranscript => upload_image_transcript(&state, field, &filename).await?,
        UploadPlan::Buffered => upload_buffered(&state, field, &filename, &content_type).await?,
        UploadPlan::Streamed => upload_streamed(&state, field, &filename, &content_type).await?,
    };

    let vector_file = state
        .openai
        .create_vector_store_file(&file.id)
        .await
        .map_err(upstream("Failed to add file to vector store"))?;

    tracing::info!(
        file_id = %file.id,
        vector_store_id = %state.openai.vector_store_id(),
        "File added to vector store"
    );

    Ok(Json(UploadResponse {
        message: "File uploaded successfully".to_string(),
        file_id: file.id,
        filename: file.filename,
        vector_file_id: vector_file.id,
        status: vector_file.status,
    }))
}

/// Extract text from an image and upload the transcript instead of the
/// raw bytes, so the index only ever holds searchable text.
async fn upload_image_transcript(
    state: &AppState,
    field: Field<'_>,
    filename: &str,
) -> Result<FileObject, AppError> {
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read file bytes: {}", e)))?;

    let transcript = state
        .openai
        .extract_image_text(&content_type, &data)
        .await
        .map_err(upstream("Failed to extract text from image"))?;

    let upload_name = transcript_filename(filename);
    tracing::info!(
        filename = %filename,
        transcript_name = %upload_name,
        transcript_len = transcript.len(),
        "Image converted to transcript"
    );

    state
        .openai
        .create_file_bytes(&upload_name, "text/plain", transcript.into_bytes())
        .await
        .map_err(upstream("Failed to upload transcript"))
}

async fn upload_buffered(
    state: &AppState,
    field: Field<'_>,
    filename: &str,
    content_type: &str,
) -> Result<FileObject, AppError> {
    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read file bytes: {}", e)))?;

    state
        .openai
        .create_file_bytes(filename, content_type, data.to_vec())
        .await
        .map_err(upstream("Failed to upload file"))
}

/// Bridge the inbound multipart field into the outbound request body via
/// a channel, so the payload is never held in memory whole. Feeding and
/// sending run concurrently in this task.
async fn upload_streamed(
    state: &AppState,
    mut field: Field<'_>,
    filename: &str,
    content_type: &str,
) -> Result<FileObject, AppError> {
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(16);
    let body = reqwest::Body::wrap_stream(ReceiverStream::new(rx));

    let upload = state.openai.create_file_stream(filename, content_type, body);

    let feed = async move {
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if tx.send(Ok(chunk)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx
                        .send(Err(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            e.to_string(),
                        )))
                        .await;
                    break;
                }
            }
        }
    };

    let (result, _) = tokio::join!(upload, feed);
    result.map_err(upstream("Failed to stream file upload"))
}

pub async fn list_files(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, AppError> {
    if let Some(file_id) = params.file_id {
        return file_status(&state, &file_id).await;
    }

    let vector_files = match state.openai.list_vector_store_files().await {
        Ok(list) => list,
        Err(OpenAiError::NotFound) => {
            tracing::warn!(
                vector_store_id = %state.openai.vector_store_id(),
                "Vector store does not exist; returning empty list"
            );
            return Ok(Json(Vec::<FileRecord>::new()).into_response());
        }
        Err(e) => return Err(upstream("Failed to list vector store files")(e)),
    };

    let mut records = Vec::new();
    for vector_file in vector_files {
        let file = match state.openai.retrieve_file(&vector_file.id).await {
            Ok(file) => file,
            Err(OpenAiError::NotFound) => {
                // Self-heal: the backing file is gone, so the stale
                // association is removed instead of being reported.
                tracing::info!(
                    file_id = %vector_file.id,
                    "Backing file no longer exists; removing stale vector store entry"
                );
                if let Err(e) = state.openai.delete_vector_store_file(&vector_file.id).await {
                    tracing::warn!(
                        file_id = %vector_file.id,
                        error = %e,
                        "Failed to remove stale vector store entry"
                    );
                }
                continue;
            }
            Err(e) => {
                tracing::warn!(
                    file_id = %vector_file.id,
                    error = %e,
                    "Failed to fetch file details; skipping entry"
                );
                continue;
            }
        };

        let status = match state.openai.retrieve_vector_store_file(&vector_file.id).await {
            Ok(v) => v.status,
            Err(OpenAiError::NotFound) => continue,
            Err(e) => {
                tracing::warn!(
                    file_id = %vector_file.id,
                    error = %e,
                    "Failed to fetch vector store entry; skipping"
                );
                continue;
            }
        };

        records.push(FileRecord {
            file_id: vector_file.id,
            filename: file.filename,
            status,
        });
    }

    Ok(Json(records).into_response())
}

async fn file_status(state: &AppState, file_id: &str) -> Result<Response, AppError> {
    let vector_file = match state.openai.retrieve_vector_store_file(file_id).await {
        Ok(v) => v,
        Err(OpenAiError::NotFound) => {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "File {} is not in the vector store",
                file_id
            )))
        }
        Err(e) => return Err(upstream("Failed to fetch vector store entry")(e)),
    };

    let file = match state.openai.retrieve_file(file_id).await {
        Ok(file) => file,
        Err(OpenAiError::NotFound) => {
            tracing::info!(
                file_id = %file_id,
                "Backing file no longer exists; removing stale vector store entry"
            );
            if let Err(e) = state.openai.delete_vector_store_file(file_id).await {
                tracing::warn!(file_id = %file_id, error = %e, "Failed to remove stale entry");
            }
            return Err(AppError::NotFound(anyhow::anyhow!(
                "File {} no longer exists",
                file_id
            )));
        }
        Err(e) => return Err(upstream("Failed to fetch file details")(e)),
    };

    Ok(Json(FileStatusResponse {
        file_id: file_id.to_string(),
        filename: file.filename,
        status: vector_file.status,
        last_error: vector_file.last_error.map(|e| e.message),
    })
    .into_response())
}

pub async fn delete_file(
    State(state): State<AppState>,
    Json(request): Json<DeleteFileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let file_id = request
        .file_id
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing fileId")))?;

    match state.openai.delete_vector_store_file(&file_id).await {
        Ok(()) => {
            tracing::info!(
                file_id = %file_id,
                vector_store_id = %state.openai.vector_store_id(),
                "File removed from vector store"
            );
        }
        // Idempotent delete: already-absent entries are a success.
        Err(OpenAiError::NotFound) => {
            tracing::warn!(file_id = %file_id, "File already absent from vector store");
        }
        Err(e) => return Err(upstream("Failed to delete vector store file")(e)),
    }

    Ok(Json(DeleteFileResponse {
        message: "File removed from vector store".to_string(),
        file_id,
    }))
}

fn upstream(context: &'static str) -> impl FnOnce(OpenAiError) -> AppError {
    move |e| {
        tracing::error!(error = %e, "{}", context);
        AppError::Upstream(anyhow::Error::new(e))
    }
}
