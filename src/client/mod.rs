//! Terminal client for a running review server.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::review::{FocusArea, ReviewResult, Severity};

pub const DEFAULT_API: &str = "http://127.0.0.1:8000/review";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("nothing to review: the input is empty")]
    EmptyInput,

    #[error("request to the review API failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("review API returned {status}: {detail}")]
    Api { status: u16, detail: String },
}

#[derive(Serialize)]
struct ReviewPayload<'a> {
    text: &'a str,
    focus: Vec<FocusArea>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    detail: String,
}

/// Posts code to `POST /review`.
#[derive(Debug, Clone)]
pub struct ReviewClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ReviewClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Reviews `text`. Empty input is rejected without a request.
    pub async fn review(
        &self,
        text: &str,
        focus: &BTreeSet<FocusArea>,
    ) -> Result<ReviewResult, ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyInput);
        }

        let response = self
            .http
            .post(&self.endpoint)
            .json(&ReviewPayload {
                text,
                focus: focus.iter().copied().collect(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            let detail = serde_json::from_str::<ErrorPayload>(&body)
                .map(|e| e.detail)
                .unwrap_or(body);
            return Err(ClientError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(response.json().await?)
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Human-readable report: the summary, then findings from High to Low.
pub fn render(result: &ReviewResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Summary\n{}\n", result.summary.trim());

    if result.findings.is_empty() {
        out.push_str("Findings\n(none)\n");
        return out;
    }

    out.push_str("Findings\n");
    for severity in [Severity::High, Severity::Medium, Severity::Low] {
        for finding in result.findings.iter().filter(|f| f.severity == severity) {
            let _ = writeln!(
                out,
                "- {} / {} — {}",
                title_case(finding.category.as_str()),
                finding.severity,
                finding.message
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::Finding;

    #[test]
    fn render_groups_by_severity() {
        let result = ReviewResult {
            summary: "- Adds add()".into(),
            findings: vec![
                Finding {
                    category: FocusArea::Style,
                    severity: Severity::Low,
                    message: "Add type hints.".into(),
                },
                Finding {
                    category: FocusArea::Security,
                    severity: Severity::High,
                    message: "Validate inputs.".into(),
                },
                Finding {
                    category: FocusArea::Performance,
                    severity: Severity::Medium,
                    message: "Avoid the copy.".into(),
                },
            ],
        };

        assert_eq!(
            render(&result),
            "Summary\n- Adds add()\n\nFindings\n\
             - Security / High — Validate inputs.\n\
             - Performance / Medium — Avoid the copy.\n\
             - Style / Low — Add type hints.\n"
        );
    }

    #[test]
    fn render_without_findings() {
        let result = ReviewResult {
            summary: "Looks fine.".into(),
            findings: Vec::new(),
        };
        assert!(render(&result).ends_with("Findings\n(none)\n"));
    }

    #[tokio::test]
    async fn empty_input_is_rejected_locally() {
        // Nothing listens on port 9; the request must never be attempted.
        let client = ReviewClient::new("http://127.0.0.1:9/review", Duration::from_secs(1)).unwrap();
        let err = client.review(" \n", &FocusArea::all()).await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyInput));
    }
}
