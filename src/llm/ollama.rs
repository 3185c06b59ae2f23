//! Client for Ollama's `/api/generate` endpoint.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{BackendInfo, GenerateFuture, GenerateRequest, LlmBackend, LlmError};
use crate::config::OllamaConfig;

const TEMPERATURE: f32 = 0.2;
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    response: String,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    total_duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: String,
}

/// Non-streaming Ollama generation client.
///
/// The whole call, connect through last byte, is bounded by the configured
/// timeout. There are no retries.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(MAX_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| LlmError::Client(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/api/generate", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            timeout: config.timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout)
        } else if e.is_decode() {
            LlmError::Decode(e.to_string())
        } else {
            LlmError::Connect(e.to_string())
        }
    }

    async fn call(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let body = GenerateBody {
            model: &self.model,
            system: &request.system,
            prompt: &request.prompt,
            stream: false,
            options: GenerateOptions {
                temperature: TEMPERATURE,
            },
        };

        let started = Instant::now();
        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorReply>(&text)
                .map(|reply| reply.error)
                .unwrap_or(text);
            return Err(LlmError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let reply: GenerateReply =
            serde_json::from_str(&text).map_err(|e| LlmError::Decode(e.to_string()))?;

        debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            eval_count = ?reply.eval_count,
            total_duration_ns = ?reply.total_duration,
            "generation finished"
        );
        Ok(reply.response.trim().to_owned())
    }
}

impl LlmBackend for OllamaClient {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            provider: "ollama",
            model: Some(self.model.clone()),
            enabled: true,
        }
    }

    fn generate<'a>(&'a self, request: &'a GenerateRequest) -> GenerateFuture<'a> {
        Box::pin(async move {
            let result = self.call(request).await;
            if let Err(e) = &result {
                error!(endpoint = %self.endpoint, model = %self.model, error = %e, "generation failed");
            }
            result
        })
    }
}
