//! OpenAI API client.
//!
//! Covers the subset of the provider surface the gateway fronts: file
//! storage, vector store membership, thread messages, streaming runs,
//! and a vision completion used for image transcript extraction.

use crate::config::{AssistantConfig, OpenAiConfig};
use base64::Engine as _;
use bytes::Bytes;
use futures::Stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

/// Beta header required by the vector store and threads endpoints.
const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Purpose tag attached to every uploaded file.
const FILE_PURPOSE: &str = "assistants";

/// Prompt used to turn an image into an indexable transcript.
const VISION_PROMPT: &str =
    "Extract all visible text from this image and return it as plain text, with no commentary.";

/// Error type for provider operations.
#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("resource not found")]
    NotFound,

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Type alias for the raw byte stream of a run.
pub type RunStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: Secret<String>,
    vision_model: String,
    assistant_id: String,
    vector_store_id: String,
}

impl OpenAiClient {
    pub fn new(openai: OpenAiConfig, assistant: AssistantConfig) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: openai.base_url,
            api_key: openai.api_key,
            vision_model: openai.vision_model,
            assistant_id: assistant.assistant_id,
            vector_store_id: assistant.vector_store_id,
        }
    }

    pub fn vector_store_id(&self) -> &str {
        &self.vector_store_id
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(self.api_key.expose_secret())
    }

    /// Request builder for endpoints behind the assistants beta flag.
    fn beta_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, path)
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
    }

    /// Upload a fully-buffered payload to file storage.
    pub async fn create_file_bytes(
        &self,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<FileObject, OpenAiError> {
        let part = Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|e| OpenAiError::InvalidRequest(e.to_string()))?;

        self.create_file(part).await
    }

    /// Upload a payload from a byte stream without materializing it.
    pub async fn create_file_stream(
        &self,
        filename: &str,
        content_type: &str,
        body: reqwest::Body,
    ) -> Result<FileObject, OpenAiError> {
        let part = Part::stream(body)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|e| OpenAiError::InvalidRequest(e.to_string()))?;

        self.create_file(part).await
    }

    async fn create_file(&self, part: Part) -> Result<FileObject, OpenAiError> {
        let form = Form::new().text("purpose", FILE_PURPOSE).part("file", part);

        let response = self
            .request(Method::POST, "/files")
            .multipart(form)
            .send()
            .await
            .map_err(|e| OpenAiError::Network(e.to_string()))?;

        decode(check(response).await?).await
    }

    /// Fetch file metadata by id.
    pub async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, OpenAiError> {
        let response = self
            .request(Method::GET, &format!("/files/{}", file_id))
            .send()
            .await
            .map_err(|e| OpenAiError::Network(e.to_string()))?;

        decode(check(response).await?).await
    }

    /// Associate a stored file with the fixed vector store. Indexing is
    /// asynchronous on the provider side; the returned status is usually
    /// `in_progress`.
    pub async fn create_vector_store_file(
        &self,
        file_id: &str,
    ) -> Result<VectorStoreFile, OpenAiError> {
        let response = self
            .beta_request(
                Method::POST,
                &format!("/vector_stores/{}/files", self.vector_store_id),
            )
            .json(&CreateVectorStoreFileRequest { file_id })
            .send()
            .await
            .map_err(|e| OpenAiError::Network(e.to_string()))?;

        decode(check(response).await?).await
    }

    /// List all files associated with the fixed vector store.
    pub async fn list_vector_store_files(&self) -> Result<Vec<VectorStoreFile>, OpenAiError> {
        let response = self
            .beta_request(
                Method::GET,
                &format!("/vector_stores/{}/files", self.vector_store_id),
            )
            .send()
            .await
            .map_err(|e| OpenAiError::Network(e.to_string()))?;

        let list: ListResponse<VectorStoreFile> = decode(check(response).await?).await?;
        Ok(list.data)
    }

    /// Fetch the association record for one file.
    pub async fn retrieve_vector_store_file(
        &self,
        file_id: &str,
    ) -> Result<VectorStoreFile, OpenAiError> {
        let response = self
            .beta_request(
                Method::GET,
                &format!("/vector_stores/{}/files/{}", self.vector_store_id, file_id),
            )
            .send()
            .await
            .map_err(|e| OpenAiError::Network(e.to_string()))?;

        decode(check(response).await?).await
    }

    /// Remove a file's association from the fixed vector store.
    pub async fn delete_vector_store_file(&self, file_id: &str) -> Result<(), OpenAiError> {
        let response = self
            .beta_request(
                Method::DELETE,
                &format!("/vector_stores/{}/files/{}", self.vector_store_id, file_id),
            )
            .send()
            .await
            .map_err(|e| OpenAiError::Network(e.to_string()))?;

        check(response).await?;
        Ok(())
    }

    /// Append a user message to a conversation thread.
    pub async fn create_thread_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<(), OpenAiError> {
        let response = self
            .beta_request(Method::POST, &format!("/threads/{}/messages", thread_id))
            .json(&CreateMessageRequest {
                role: "user",
                content,
            })
            .send()
            .await
            .map_err(|e| OpenAiError::Network(e.to_string()))?;

        check(response).await?;
        Ok(())
    }

    /// Start a streaming run against the thread with file search enabled
    /// and return the provider's raw byte stream.
    pub async fn stream_run(&self, thread_id: &str) -> Result<RunStream, OpenAiError> {
        let response = self
            .beta_request(Method::POST, &format!("/threads/{}/runs", thread_id))
            .json(&CreateRunRequest {
                assistant_id: &self.assistant_id,
                stream: true,
                tools: vec![RunTool {
                    tool_type: "file_search",
                }],
            })
            .send()
            .await
            .map_err(|e| OpenAiError::Network(e.to_string()))?;

        let response = check(response).await?;
        Ok(Box::pin(response.bytes_stream()))
    }

    /// Extract all visible text from an image via a vision completion.
    pub async fn extract_image_text(
        &self,
        content_type: &str,
        data: &[u8],
    ) -> Result<String, OpenAiError> {
        let data_url = format!(
            "data:{};base64,{}",
            content_type,
            base64::engine::general_purpose::STANDARD.encode(data)
        );

        let request = ChatCompletionRequest {
            model: &self.vision_model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ChatContentPart::Text {
                        text: VISION_PROMPT.to_string(),
                    },
                    ChatContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
        };

        let response = self
            .request(Method::POST, "/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| OpenAiError::Network(e.to_string()))?;

        let completion: ChatCompletionResponse = decode(check(response).await?).await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| OpenAiError::Decode("vision response contained no text".to_string()))
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, OpenAiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(OpenAiError::NotFound);
    }

    let message = response.text().await.unwrap_or_default();
    Err(OpenAiError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, OpenAiError> {
    response
        .json()
        .await
        .map_err(|e| OpenAiError::Decode(e.to_string()))
}

// ============================================================================
// OpenAI API Request/Response Types
// ============================================================================

/// Stored file metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub bytes: Option<i64>,
}

/// Vector store association record. Its id is the backing file's id; the
/// indexing status lives here, independent of the file's existence.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreFile {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub last_error: Option<VectorStoreFileError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreFileError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Serialize)]
struct CreateVectorStoreFileRequest<'a> {
    file_id: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
    stream: bool,
    tools: Vec<RunTool>,
}

#[derive(Debug, Serialize)]
struct RunTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ChatContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}
