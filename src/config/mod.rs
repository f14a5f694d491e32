use crate::error::AppError;
use config::{Config as Cfg, File};
use secrecy::Secret;
use serde::Deserialize;
use std::env;

/// Default buffered/streamed cutoff for uploads (5 MiB).
const DEFAULT_STREAM_THRESHOLD_BYTES: u64 = 5 * 1024 * 1024;

/// Default OpenAI API base URL. Overridable so tests can point the
/// gateway at a local stand-in.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Deserialize)]
pub struct CommonConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub common: CommonConfig,
    pub openai: OpenAiConfig,
    pub assistant: AssistantConfig,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Secret<String>,
    pub base_url: String,
    /// Vision-capable model used for image transcript extraction.
    pub vision_model: String,
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub assistant_id: String,
    pub vector_store_id: String,
    /// Uploads with a size hint above this are streamed to the provider.
    pub stream_threshold_bytes: u64,
}

impl GatewayConfig {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let common = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(GatewayConfig {
            common,
            openai: OpenAiConfig {
                api_key: Secret::new(get_env("OPENAI_API_KEY", None, is_prod)?),
                base_url: get_env("OPENAI_BASE_URL", Some(DEFAULT_BASE_URL), is_prod)?,
                vision_model: get_env("VISION_MODEL", Some("gpt-4o-mini"), is_prod)?,
            },
            assistant: AssistantConfig {
                assistant_id: get_env("ASSISTANT_ID", None, is_prod)?,
                vector_store_id: get_env("VECTOR_STORE_ID", None, is_prod)?,
                stream_threshold_bytes: get_env(
                    "UPLOAD_STREAM_THRESHOLD_BYTES",
                    Some(&DEFAULT_STREAM_THRESHOLD_BYTES.to_string()),
                    is_prod,
                )?
                .parse()
                .unwrap_or(DEFAULT_STREAM_THRESHOLD_BYTES),
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
