//! Lenient extraction of a [`ReviewResult`] from free-form model output.
//!
//! Two strategies run in order:
//!
//! 1. **JSON.** Code fences are dropped and the first `{` .. last `}` span is
//!    decoded. `summary` may be a string or a list of bullets; `findings`
//!    entries are normalized one by one.
//! 2. **Finding lines.** Bullet or numbered lines whose label names a category
//!    and a severity, e.g. `- [security][High] ...`, `- **Style / Low** — ...`
//!    or `2. Performance (medium): ...`.
//!
//! Whatever is not turned into a finding is folded into the summary. When no
//! finding can be extracted the raw output becomes the summary and the result
//! is marked degraded.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use super::{Finding, FocusArea, ReviewResult, Severity};

/// Findings kept per review.
pub const MAX_FINDINGS: usize = 12;

/// Summary used when the model gave nothing usable.
pub const EMPTY_SUMMARY: &str = "No summary provided.";

const MAX_SUMMARY_BULLETS: usize = 5;
const MAX_LABEL_CHARS: usize = 40;
const MAX_SEVERITY_LABEL_CHARS: usize = 12;

static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•+]|\d{1,3}[.)])\s+").expect("bullet regex"));

static BRACKET_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:\[[^\]]{1,24}\]\s*){1,3})(.*)$").expect("bracket label regex")
});

const SEPARATORS: [&str; 4] = ["—", "–", " - ", ":"];

/// Outcome of parsing one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReview {
    pub result: ReviewResult,
    /// No finding could be extracted; `summary` holds the raw output.
    pub degraded: bool,
}

/// Parses `raw` model output. Never fails.
///
/// # Examples
///
/// ```
/// use revu::review::{parse_review, FocusArea, Severity};
///
/// let parsed = parse_review(r#"{"summary": ["Adds a helper"],
///     "findings": [{"category": "style", "severity": "low", "message": "Add type hints."}]}"#);
///
/// assert!(!parsed.degraded);
/// assert_eq!(parsed.result.summary, "- Adds a helper");
/// assert_eq!(parsed.result.findings[0].category, FocusArea::Style);
/// assert_eq!(parsed.result.findings[0].severity, Severity::Low);
/// ```
pub fn parse_review(raw: &str) -> ParsedReview {
    let raw = raw.trim();
    if raw.is_empty() {
        return degraded(raw);
    }

    let parsed = match extract_json(raw) {
        Some((object, framing)) => from_json(&object, &framing),
        None => from_lines(raw),
    };

    if parsed.findings.is_empty() {
        return degraded(raw);
    }

    ParsedReview {
        result: ReviewResult {
            summary: if parsed.summary.is_empty() {
                EMPTY_SUMMARY.to_owned()
            } else {
                parsed.summary
            },
            findings: parsed.findings,
        },
        degraded: false,
    }
}

fn degraded(raw: &str) -> ParsedReview {
    ParsedReview {
        result: ReviewResult {
            summary: if raw.is_empty() {
                EMPTY_SUMMARY.to_owned()
            } else {
                raw.to_owned()
            },
            findings: Vec::new(),
        },
        degraded: true,
    }
}

// Intermediate result before the degraded-output check.
struct Extracted {
    summary: String,
    findings: Vec<Finding>,
}

/// Deduplicating, capped finding list.
#[derive(Default)]
struct Findings {
    items: Vec<Finding>,
    seen: HashSet<(FocusArea, Severity, String)>,
}

impl Findings {
    fn push(&mut self, finding: Finding) {
        let key = (
            finding.category,
            finding.severity,
            finding.message.to_lowercase(),
        );
        if !self.seen.insert(key) {
            return;
        }
        if self.items.len() >= MAX_FINDINGS {
            debug!(message = %finding.message, "finding dropped past the cap");
            return;
        }
        self.items.push(finding);
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// Finds a JSON object in `raw`, returning it with any prose around it.
fn extract_json(raw: &str) -> Option<(Map<String, Value>, String)> {
    let unfenced = raw
        .lines()
        .filter(|line| !is_fence(line))
        .collect::<Vec<_>>()
        .join("\n");
    let text = unfenced.trim();

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(object)) => {
            let framing = [text[..start].trim(), text[end + 1..].trim()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            Some((object, framing))
        }
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "model output is not valid JSON; scanning lines");
            None
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => collapse_whitespace(s),
        Value::Null => String::new(),
        other => collapse_whitespace(&other.to_string()),
    }
}

fn summary_from_json(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_owned(),
        Some(Value::Array(items)) => items
            .iter()
            .map(value_text)
            .filter(|bullet| !bullet.is_empty())
            .take(MAX_SUMMARY_BULLETS)
            .map(|bullet| format!("- {bullet}"))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => value_text(other),
        None => String::new(),
    }
}

/// Normalizes one `findings` entry. Returns the message as `Err` when the
/// category cannot be mapped to a focus area, so it can be folded into the
/// summary.
fn finding_from_object(entry: &Map<String, Value>) -> Option<Result<Finding, String>> {
    let field = |name: &str| entry.get(name).map(value_text).unwrap_or_default();

    let message = field("message");
    if message.is_empty() {
        return None;
    }

    let Some(category) = FocusArea::classify(&field("category")) else {
        return Some(Err(message));
    };

    let label = field("severity");
    let severity = Severity::from_label(&label)
        .or_else(|| Severity::classify(&label))
        .unwrap_or_else(|| Severity::infer_from_message(&message));

    Some(Ok(Finding {
        category,
        severity,
        message,
    }))
}

fn from_json(object: &Map<String, Value>, framing: &str) -> Extracted {
    let mut findings = Findings::default();
    let mut folded: Vec<String> = Vec::new();

    if let Some(Value::Array(entries)) = object.get("findings") {
        for entry in entries {
            match entry {
                Value::Object(fields) => match finding_from_object(fields) {
                    Some(Ok(finding)) => findings.push(finding),
                    Some(Err(message)) => folded.push(message),
                    None => {}
                },
                Value::String(line) => match parse_line(line) {
                    Some(finding) => findings.push(finding),
                    None => folded.push(collapse_whitespace(line)),
                },
                other => folded.push(value_text(other)),
            }
        }
    }

    let mut parts = Vec::new();
    let summary = summary_from_json(object.get("summary"));
    if !summary.is_empty() {
        parts.push(summary);
    }
    let folded: Vec<String> = folded
        .into_iter()
        .filter(|note| !note.is_empty())
        .map(|note| format!("- {note}"))
        .collect();
    if !folded.is_empty() {
        parts.push(folded.join("\n"));
    }
    if !framing.is_empty() {
        parts.push(framing.to_owned());
    }

    Extracted {
        summary: parts.join("\n"),
        findings: findings.items,
    }
}

fn from_lines(raw: &str) -> Extracted {
    let mut findings = Findings::default();
    let mut rest: Vec<&str> = Vec::new();

    for line in raw.lines() {
        match parse_line(line) {
            Some(finding) => findings.push(finding),
            None if line.trim().is_empty() || is_fence(line) => {}
            None => rest.push(line.trim_end()),
        }
    }

    Extracted {
        summary: rest.join("\n").trim().to_owned(),
        findings: findings.items,
    }
}

/// Splits `- <label><sep> <message>` into label and message.
fn split_label(text: &str) -> Option<(&str, &str)> {
    if let Some(caps) = BRACKET_LABEL.captures(text) {
        let label = caps.get(1)?.as_str();
        let message = caps.get(2)?.as_str();
        return Some((label, message));
    }

    SEPARATORS
        .iter()
        .filter_map(|sep| text.find(sep).map(|at| (at, sep.len())))
        .min_by_key(|&(at, _)| at)
        .map(|(at, len)| (&text[..at], &text[at + len..]))
}

/// Parses a single finding line, if it is one.
pub fn parse_line(line: &str) -> Option<Finding> {
    let body = match BULLET.find(line) {
        Some(bullet) => &line[bullet.end()..],
        None => line,
    };
    let (label, message) = split_label(body.trim())?;
    if label.chars().count() > MAX_LABEL_CHARS {
        return None;
    }

    let category = FocusArea::classify(label)?;
    let (severity, message) = match Severity::classify(label) {
        Some(severity) => (severity, message),
        // "Style: Low - rename x" puts the severity after the first separator.
        None => {
            let (inner, message) = split_label(message.trim())?;
            if inner.chars().count() > MAX_SEVERITY_LABEL_CHARS {
                return None;
            }
            (Severity::classify(inner)?, message)
        }
    };

    let message = collapse_whitespace(
        message.trim_start_matches(|c: char| c == '*' || c == '_' || c.is_whitespace()),
    );
    if message.is_empty() {
        return None;
    }

    Some(Finding {
        category,
        severity,
        message,
    })
}
