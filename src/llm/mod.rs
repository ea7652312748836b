pub mod openai;

use crate::http::{Transient, is_transient_status};
use async_trait::async_trait;
use thiserror::Error;

pub use openai::OpenAiClient;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing api key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Transient for LlmError {
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(_) => true,
            LlmError::Status(status) => is_transient_status(*status),
            LlmError::MissingApiKey | LlmError::InvalidResponse(_) => false,
        }
    }
}

/// A single-turn text plus image prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionRequest {
    pub prompt: String,
    pub image_base64: String,
    pub image_mime: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl VisionRequest {
    pub fn image_data_url(&self) -> String {
        format!("data:{};base64,{}", self.image_mime, self.image_base64)
    }
}

/// A vision-capable chat model that answers with free text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(&self, request: &VisionRequest) -> Result<String, LlmError>;
}
