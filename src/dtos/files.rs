use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub file_id: String,
    pub filename: String,
    pub vector_file_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct FileRecord {
    pub file_id: String,
    pub filename: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct FileStatusResponse {
    pub file_id: String,
    pub filename: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    /// Force the streamed transfer path regardless of size.
    pub stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(rename = "fileId")]
    pub file_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteFileRequest {
    #[serde(rename = "fileId")]
    pub file_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteFileResponse {
    pub message: String,
    pub file_id: String,
}
