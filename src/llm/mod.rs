//! LLM backends that turn a prompt into generated text.
//!
//! [`LlmBackend`] is the seam between the review service and the model
//! server. [`OllamaClient`] talks to a local Ollama instance;
//! [`DisabledBackend`] stands in when `USE_OLLAMA` is off so the API still
//! starts and reports why reviews fail.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

mod ollama;

pub use ollama::OllamaClient;

/// Why a generation call failed.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("the LLM backend is disabled; set USE_OLLAMA=true and restart")]
    Disabled,

    #[error("no response from the LLM backend within {0:?}")]
    Timeout(Duration),

    #[error("could not reach the LLM backend: {0}")]
    Connect(String),

    #[error("LLM backend returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("unreadable reply from the LLM backend: {0}")]
    Decode(String),

    #[error("failed to set up the HTTP client: {0}")]
    Client(String),
}

impl LlmError {
    /// `true` when the backend answered, but not usefully (`502`), as opposed
    /// to not answering at all (`503`).
    pub fn is_bad_response(&self) -> bool {
        matches!(self, Self::Status { .. } | Self::Decode(_))
    }
}

/// One generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub system: String,
    pub prompt: String,
}

/// Static facts about a backend, reported by `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub provider: &'static str,
    pub model: Option<String>,
    pub enabled: bool,
}

/// Boxed generation future.
pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;

/// A text-generation backend.
///
/// Implementations hold no per-request state and are shared across
/// connection tasks.
pub trait LlmBackend: Send + Sync {
    fn info(&self) -> BackendInfo;

    /// Generates text for `request`. Makes at most one outbound call.
    fn generate<'a>(&'a self, request: &'a GenerateRequest) -> GenerateFuture<'a>;
}

/// Backend used when the model server is switched off.
#[derive(Debug, Default)]
pub struct DisabledBackend;

impl LlmBackend for DisabledBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            provider: "none",
            model: None,
            enabled: false,
        }
    }

    fn generate<'a>(&'a self, _request: &'a GenerateRequest) -> GenerateFuture<'a> {
        Box::pin(async { Err(LlmError::Disabled) })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_backend_refuses() {
        let backend = DisabledBackend;
        let request = GenerateRequest {
            system: String::new(),
            prompt: "review".into(),
        };
        assert!(matches!(
            backend.generate(&request).await,
            Err(LlmError::Disabled)
        ));
        assert!(!backend.info().enabled);
        assert_eq!(backend.info().provider, "none");
    }

    #[test]
    fn bad_response_classification() {
        assert!(LlmError::Decode("eof".into()).is_bad_response());
        assert!(LlmError::Status { status: 404, detail: String::new() }.is_bad_response());
        assert!(!LlmError::Disabled.is_bad_response());
        assert!(!LlmError::Connect("refused".into()).is_bad_response());
        assert!(!LlmError::Timeout(Duration::from_millis(5)).is_bad_response());
    }
}
