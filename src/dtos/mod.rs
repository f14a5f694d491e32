pub mod files;
pub mod threads;

pub use files::{
    DeleteFileRequest, DeleteFileResponse, FileRecord, FileStatusResponse, ListParams,
    UploadParams, UploadResponse,
};
pub use threads::CreateMessageRequest;
