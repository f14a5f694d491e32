use crate::config::GatewayConfig;
use crate::error::AppError;
use crate::handlers;
use crate::services::OpenAiClient;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Cap on inbound upload request bodies (100 MiB). The streamed path
/// never materializes this much; the cap bounds the buffered path.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub openai: Arc<OpenAiClient>,
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    pub async fn build(config: GatewayConfig) -> Result<Self, AppError> {
        let openai = Arc::new(OpenAiClient::new(
            config.openai.clone(),
            config.assistant.clone(),
        ));

        let state = AppState {
            config: config.clone(),
            openai,
        };

        let app = Router::new()
            .route("/health", get(handlers::health_check))
            .route(
                "/api/assistants/files",
                post(handlers::upload_file)
                    .get(handlers::list_files)
                    .delete(handlers::delete_file),
            )
            .route(
                "/api/assistants/threads/:thread_id/messages",
                post(handlers::create_message),
            )
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app);

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
