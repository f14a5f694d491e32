use assistant_gateway::config::GatewayConfig;
use assistant_gateway::startup::Application;
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Transcript the mock vision endpoint returns for any image.
pub const MOCK_TRANSCRIPT: &str = "Invoice 1042: total due 42.00";

/// Byte-for-byte body the mock run endpoint streams back.
pub const MOCK_RUN_STREAM: &str =
    "event: thread.message.delta\ndata: {\"delta\":\"Hello\"}\n\nevent: done\ndata: [DONE]\n\n";

pub const TEST_VECTOR_STORE_ID: &str = "vs_test";

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub status: String,
    pub last_error: Option<Value>,
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<String, StoredFile>,
    vector_files: HashMap<String, VectorEntry>,
    vector_store_missing: bool,
    messages: Vec<(String, String)>,
    next_id: u64,
}

/// In-process stand-in for the OpenAI API, backed by in-memory state the
/// tests can seed and inspect.
#[derive(Clone)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn next_file_id(&self) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        format!("file-{:04}", state.next_id)
    }

    /// Store a file without a vector store association.
    pub fn seed_file(&self, filename: &str, content: &[u8]) -> String {
        let id = self.next_file_id();
        self.state.lock().unwrap().files.insert(
            id.clone(),
            StoredFile {
                filename: filename.to_string(),
                content: content.to_vec(),
            },
        );
        id
    }

    /// Add a vector store association, with or without a backing file.
    pub fn seed_vector_file(&self, file_id: &str, status: &str, last_error: Option<&str>) {
        self.state.lock().unwrap().vector_files.insert(
            file_id.to_string(),
            VectorEntry {
                status: status.to_string(),
                last_error: last_error
                    .map(|message| json!({ "code": "internal_error", "message": message })),
            },
        );
    }

    pub fn set_vector_store_missing(&self, missing: bool) {
        self.state.lock().unwrap().vector_store_missing = missing;
    }

    pub fn stored_file(&self, file_id: &str) -> Option<StoredFile> {
        self.state.lock().unwrap().files.get(file_id).cloned()
    }

    pub fn has_vector_file(&self, file_id: &str) -> bool {
        self.state.lock().unwrap().vector_files.contains_key(file_id)
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().messages.clone()
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/files", post(create_file))
            .route("/files/:file_id", get(retrieve_file))
            .route(
                "/vector_stores/:vs_id/files",
                post(create_vector_file).get(list_vector_files),
            )
            .route(
                "/vector_stores/:vs_id/files/:file_id",
                get(retrieve_vector_file).delete(delete_vector_file),
            )
            .route("/chat/completions", post(chat_completion))
            .route("/threads/:thread_id/messages", post(create_thread_message))
            .route("/threads/:thread_id/runs", post(create_run))
            .layer(axum::extract::DefaultBodyLimit::max(100 * 1024 * 1024))
            .with_state(self.clone())
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": { "message": "No such resource", "type": "invalid_request_error" } })),
    )
        .into_response()
}

async fn create_file(State(mock): State<MockProvider>, mut multipart: Multipart) -> Response {
    let mut stored = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("unnamed").to_string();
            let content = field.bytes().await.unwrap_or_default().to_vec();
            stored = Some(StoredFile { filename, content });
        }
    }

    let Some(stored) = stored else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "missing file part" } })),
        )
            .into_response();
    };

    let id = mock.next_file_id();
    let response = json!({
        "id": id,
        "object": "file",
        "filename": stored.filename,
        "bytes": stored.content.len(),
        "purpose": "assistants"
    });
    mock.state.lock().unwrap().files.insert(id.clone(), stored);

    Json(response).into_response()
}

async fn retrieve_file(
    State(mock): State<MockProvider>,
    Path(file_id): Path<String>,
) -> Response {
    let state = mock.state.lock().unwrap();
    match state.files.get(&file_id) {
        Some(file) => Json(json!({
            "id": file_id,
            "object": "file",
            "filename": file.filename,
            "bytes": file.content.len(),
            "purpose": "assistants"
        }))
        .into_response(),
        None => not_found(),
    }
}

async fn create_vector_file(
    State(mock): State<MockProvider>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = mock.state.lock().unwrap();
    if state.vector_store_missing {
        return not_found();
    }

    let Some(file_id) = body["file_id"].as_str().map(str::to_string) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "missing file_id" } })),
        )
            .into_response();
    };

    state.vector_files.insert(
        file_id.clone(),
        VectorEntry {
            status: "in_progress".to_string(),
            last_error: None,
        },
    );

    Json(json!({
        "id": file_id,
        "object": "vector_store.file",
        "status": "in_progress",
        "last_error": null
    }))
    .into_response()
}

async fn list_vector_files(State(mock): State<MockProvider>) -> Response {
    let state = mock.state.lock().unwrap();
    if state.vector_store_missing {
        return not_found();
    }

    let mut data: Vec<Value> = state
        .vector_files
        .iter()
        .map(|(id, entry)| {
            json!({
                "id": id,
                "object": "vector_store.file",
                "status": entry.status,
                "last_error": entry.last_error
            })
        })
        .collect();
    data.sort_by_key(|v| v["id"].as_str().unwrap_or_default().to_string());

    Json(json!({ "object": "list", "data": data })).into_response()
}

async fn retrieve_vector_file(
    State(mock): State<MockProvider>,
    Path((_vs_id, file_id)): Path<(String, String)>,
) -> Response {
    let state = mock.state.lock().unwrap();
    if state.vector_store_missing {
        return not_found();
    }
    match state.vector_files.get(&file_id) {
        Some(entry) => Json(json!({
            "id": file_id,
            "object": "vector_store.file",
            "status": entry.status,
            "last_error": entry.last_error
        }))
        .into_response(),
        None => not_found(),
    }
}

async fn delete_vector_file(
    State(mock): State<MockProvider>,
    Path((_vs_id, file_id)): Path<(String, String)>,
) -> Response {
    let mut state = mock.state.lock().unwrap();
    match state.vector_files.remove(&file_id) {
        Some(_) => Json(json!({
            "id": file_id,
            "object": "vector_store.file.deleted",
            "deleted": true
        }))
        .into_response(),
        None => not_found(),
    }
}

async fn chat_completion(State(_mock): State<MockProvider>, Json(_body): Json<Value>) -> Response {
    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": MOCK_TRANSCRIPT },
            "finish_reason": "stop"
        }]
    }))
    .into_response()
}

async fn create_thread_message(
    State(mock): State<MockProvider>,
    Path(thread_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let content = body["content"].as_str().unwrap_or_default().to_string();
    mock.state.lock().unwrap().messages.push((thread_id, content));
    Json(json!({ "id": "msg_mock", "object": "thread.message" })).into_response()
}

async fn create_run(
    State(_mock): State<MockProvider>,
    Path(_thread_id): Path<String>,
) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from(MOCK_RUN_STREAM))
        .unwrap()
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub mock: MockProvider,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn the gateway against a fresh mock provider, letting the test
    /// adjust the loaded configuration first.
    pub async fn spawn_with(customize: impl FnOnce(&mut GatewayConfig)) -> Self {
        let mock = MockProvider::new();

        let mock_listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("Failed to bind mock provider listener");
        let mock_port = mock_listener.local_addr().unwrap().port();
        let mock_router = mock.router();
        tokio::spawn(async move {
            axum::serve(mock_listener, mock_router).await.ok();
        });

        std::env::set_var("OPENAI_API_KEY", "test-key");
        std::env::set_var("ASSISTANT_ID", "asst_test");
        std::env::set_var("VECTOR_STORE_ID", TEST_VECTOR_STORE_ID);

        let mut config = GatewayConfig::load().expect("Failed to load configuration");
        config.common.port = 0; // Random port for testing
        config.openai.base_url = format!("http://127.0.0.1:{}", mock_port);
        customize(&mut config);

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to come up by polling the health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            mock,
        }
    }

    pub fn files_url(&self) -> String {
        format!("{}/api/assistants/files", self.address)
    }

    pub fn messages_url(&self, thread_id: &str) -> String {
        format!(
            "{}/api/assistants/threads/{}/messages",
            self.address, thread_id
        )
    }
}
