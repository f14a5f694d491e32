use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub content: String,
}
