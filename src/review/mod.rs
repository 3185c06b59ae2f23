//! Code review: domain types, prompt construction, model-output parsing and
//! the [`ReviewService`] that ties them to an LLM backend.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::StatusCode;
use crate::llm::LlmError;

pub mod parse;
pub mod prompt;
mod service;

pub use parse::{ParsedReview, parse_review};
pub use service::ReviewService;

/// A category the reviewer is asked to emphasize.
///
/// Declaration order is the canonical order used in prompts and sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusArea {
    Security,
    Performance,
    Style,
}

impl FocusArea {
    pub const ALL: [FocusArea; 3] = [Self::Security, Self::Performance, Self::Style];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Style => "style",
        }
    }

    /// Maps free-form model text such as `"Security / Auth"` or
    /// `"perf-performance"` onto a focus area by substring.
    pub fn classify(text: &str) -> Option<Self> {
        let text = text.to_ascii_lowercase();
        Self::ALL.into_iter().find(|area| text.contains(area.as_str()))
    }

    /// Every area, as a set.
    pub fn all() -> BTreeSet<FocusArea> {
        Self::ALL.into_iter().collect()
    }
}

impl fmt::Display for FocusArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown focus area {0:?}; expected security, performance or style")]
pub struct UnknownFocusArea(pub String);

impl FromStr for FocusArea {
    type Err = UnknownFocusArea;

    /// Strict, case-insensitive parse used for client input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|area| area.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownFocusArea(s.to_owned()))
    }
}

/// How much a finding matters. `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    /// Exact label, ignoring case and surrounding whitespace.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Finds a severity word inside a short label, accepting the synonyms
    /// models tend to use (`critical`, `moderate`, `minor`).
    pub fn classify(text: &str) -> Option<Self> {
        let text = text.to_ascii_lowercase();
        let has = |word: &str| {
            text.split(|c: char| !c.is_ascii_alphabetic())
                .any(|token| token == word)
        };
        if has("critical") || has("high") {
            Some(Self::High)
        } else if has("medium") || has("moderate") {
            Some(Self::Medium)
        } else if has("low") || has("minor") {
            Some(Self::Low)
        } else {
            None
        }
    }

    /// Best guess from a finding's message when no usable label was given.
    pub fn infer_from_message(message: &str) -> Self {
        let message = message.to_ascii_lowercase();
        if ["critical", "high", "dos"].iter().any(|w| message.contains(w)) {
            Self::High
        } else if message.contains("medium") || message.contains("moderate") {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One categorized observation about the reviewed code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub category: FocusArea,
    pub severity: Severity,
    pub message: String,
}

/// What a review returns: a summary and findings in extraction order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub summary: String,
    pub findings: Vec<Finding>,
}

/// Why a review could not be produced.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("input is {len} characters; the limit is {max}. Try a smaller chunk")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("model backend unavailable: {0}")]
    UpstreamUnavailable(#[from] LlmError),
}

impl ReviewError {
    /// HTTP status reported to API callers.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BadRequest,
            Self::PayloadTooLarge { .. } => StatusCode::PayloadTooLarge,
            Self::UpstreamUnavailable(e) if e.is_bad_response() => StatusCode::BadGateway,
            Self::UpstreamUnavailable(_) => StatusCode::ServiceUnavailable,
        }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }
}
