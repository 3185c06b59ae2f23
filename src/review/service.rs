use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::parse::parse_review;
use super::prompt::{SYSTEM_PROMPT, build_prompt, select_chunk};
use super::{FocusArea, ReviewError, ReviewResult};
use crate::config::DEFAULT_MAX_INPUT_CHARS;
use crate::llm::{BackendInfo, GenerateRequest, LlmBackend};

/// Runs reviews against a shared [`LlmBackend`].
///
/// Each call is independent: validate, build one prompt, make one backend
/// call, parse. Nothing is kept between calls.
#[derive(Clone)]
pub struct ReviewService {
    backend: Arc<dyn LlmBackend>,
    max_input_chars: usize,
}

impl ReviewService {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    pub fn with_max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = max;
        self
    }

    pub fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    pub fn info(&self) -> BackendInfo {
        self.backend.info()
    }

    /// Reviews `text` with emphasis on `focus`.
    ///
    /// Input is validated before the backend is contacted. Output that
    /// cannot be structured still succeeds, with the raw text as summary.
    pub async fn review(
        &self,
        text: &str,
        focus: &BTreeSet<FocusArea>,
    ) -> Result<ReviewResult, ReviewError> {
        if text.trim().is_empty() {
            return Err(ReviewError::InvalidRequest(
                "text must not be empty".into(),
            ));
        }
        if focus.is_empty() {
            return Err(ReviewError::InvalidRequest(
                "focus must name at least one of security, performance, style".into(),
            ));
        }
        let len = text.chars().count();
        if len > self.max_input_chars {
            return Err(ReviewError::PayloadTooLarge {
                len,
                max: self.max_input_chars,
            });
        }

        let chunk = select_chunk(text);
        if chunk.len() < text.len() {
            info!(
                input_chars = len,
                reviewed_chars = chunk.chars().count(),
                "input exceeds one chunk; reviewing the first chunk only"
            );
        }

        let request = GenerateRequest {
            system: SYSTEM_PROMPT.to_owned(),
            prompt: build_prompt(chunk, focus),
        };

        let started = Instant::now();
        let raw = self.backend.generate(&request).await?;
        let parsed = parse_review(&raw);

        if parsed.degraded {
            warn!(
                output_chars = raw.chars().count(),
                "model output had no recognizable structure; returning it as the summary"
            );
        }
        debug!(
            findings = parsed.result.findings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "review finished"
        );

        Ok(parsed.result)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::http::StatusCode;
    use crate::llm::LlmError;
    use crate::llm::testing::ScriptedBackend;
    use crate::review::prompt::CHUNK_MAX_CHARS;
    use crate::review::{Finding, Severity};

    const REPLY: &str = r#"{"summary": ["Adds add()"], "findings": [
        {"category": "style", "severity": "Low", "message": "Add type hints."}
    ]}"#;

    fn service(backend: &Arc<ScriptedBackend>) -> ReviewService {
        ReviewService::new(backend.clone())
    }

    #[tokio::test]
    async fn review_builds_prompt_and_parses() {
        let backend = Arc::new(ScriptedBackend::replying(REPLY));
        let result = service(&backend)
            .review("def add(a,b): return a+b", &FocusArea::all())
            .await
            .unwrap();

        assert_eq!(result.summary, "- Adds add()");
        assert_eq!(
            result.findings,
            vec![Finding {
                category: FocusArea::Style,
                severity: Severity::Low,
                message: "Add type hints.".into(),
            }]
        );

        let request = backend.last_request().unwrap();
        assert_eq!(request.system, SYSTEM_PROMPT);
        assert!(request.prompt.contains("def add(a,b): return a+b"));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_backend() {
        let backend = Arc::new(ScriptedBackend::replying(REPLY));
        let svc = service(&backend).with_max_input_chars(10);

        for (text, focus) in [
            ("", FocusArea::all()),
            ("  \n\t", FocusArea::all()),
            ("x = 1", BTreeSet::new()),
        ] {
            let err = svc.review(text, &focus).await.unwrap_err();
            assert_eq!(err.status_code(), StatusCode::BadRequest);
        }

        let err = svc.review("0123456789abc", &FocusArea::all()).await.unwrap_err();
        assert!(matches!(err, ReviewError::PayloadTooLarge { len: 13, max: 10 }));

        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn upstream_errors_map_to_gateway_statuses() {
        let timeout = Arc::new(ScriptedBackend::with(|| {
            Err(LlmError::Timeout(Duration::from_secs(60)))
        }));
        let err = service(&timeout).review("x", &FocusArea::all()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::ServiceUnavailable);

        let bad = Arc::new(ScriptedBackend::with(|| {
            Err(LlmError::Status {
                status: 404,
                detail: "model 'phi3' not found".into(),
            })
        }));
        let err = service(&bad).review("x", &FocusArea::all()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BadGateway);
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn unstructured_output_is_returned_as_summary() {
        let backend = Arc::new(ScriptedBackend::replying("Looks good to me."));
        let result = service(&backend).review("x", &FocusArea::all()).await.unwrap();
        assert_eq!(result.summary, "Looks good to me.");
        assert!(result.findings.is_empty());
    }

    #[tokio::test]
    async fn long_input_sends_only_first_chunk() {
        let backend = Arc::new(ScriptedBackend::replying(REPLY));
        let text = "a".repeat(CHUNK_MAX_CHARS + 500);
        service(&backend).review(&text, &FocusArea::all()).await.unwrap();

        let prompt = backend.last_request().unwrap().prompt;
        assert!(prompt.contains(&"a".repeat(CHUNK_MAX_CHARS)));
        assert!(!prompt.contains(&"a".repeat(CHUNK_MAX_CHARS + 1)));
    }
}
