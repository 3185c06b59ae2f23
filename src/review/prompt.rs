//! Prompt construction and input chunking.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::FocusArea;

/// Largest input, in characters, sent to the model in one call.
pub const CHUNK_MAX_CHARS: usize = 8_000;

pub const SYSTEM_PROMPT: &str = "You are a senior software reviewer. Be precise, cite concrete \
lines or snippets from the input, and focus on actionable, minimal-change suggestions.";

/// Focus areas to list in the prompt: the requested ones first, then the
/// rest, each group in canonical order.
pub fn focus_order(focus: &BTreeSet<FocusArea>) -> Vec<FocusArea> {
    let (mut requested, rest): (Vec<_>, Vec<_>) =
        FocusArea::ALL.into_iter().partition(|area| focus.contains(area));
    requested.extend(rest);
    requested
}

/// Byte offset of the `n`th character, or `s.len()` when `s` is shorter.
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

static HUNK_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^@@.*@@").expect("hunk header regex"));

// Byte offsets of lines that open a unified-diff hunk (`@@ -a,b +c,d @@`).
fn hunk_starts(text: &str) -> Vec<usize> {
    HUNK_HEADER.find_iter(text).map(|m| m.start()).collect()
}

/// Splits `text` into chunks of at most [`CHUNK_MAX_CHARS`] characters.
///
/// Diffs are cut at hunk boundaries and neighbouring hunks packed together;
/// a single hunk larger than the limit stays whole. File headers before the
/// first hunk travel with it. Text without hunks is cut into fixed windows.
pub fn split_chunks(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }

    let starts = hunk_starts(text);
    if starts.is_empty() {
        let mut chunks = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let cut = char_offset(rest, CHUNK_MAX_CHARS);
            chunks.push(&rest[..cut]);
            rest = &rest[cut..];
        }
        return chunks;
    }

    // One piece per hunk; the first also carries the preamble.
    let mut bounds: Vec<usize> = Vec::with_capacity(starts.len() + 1);
    bounds.push(0);
    bounds.extend(starts.into_iter().skip(1));
    bounds.push(text.len());

    let mut chunks = Vec::new();
    let mut chunk_start = 0;
    let mut chunk_chars = 0;
    for window in bounds.windows(2) {
        let (start, end) = (window[0], window[1]);
        let piece_chars = text[start..end].chars().count();
        if chunk_chars > 0 && chunk_chars + piece_chars > CHUNK_MAX_CHARS {
            chunks.push(&text[chunk_start..start]);
            chunk_start = start;
            chunk_chars = 0;
        }
        chunk_chars += piece_chars;
    }
    chunks.push(&text[chunk_start..]);
    chunks
}

/// The part of `text` that gets reviewed: all of it when it fits, otherwise
/// the first chunk, trimmed to the limit if a single hunk overflows it.
pub fn select_chunk(text: &str) -> &str {
    if text.chars().count() <= CHUNK_MAX_CHARS {
        return text;
    }
    let first = split_chunks(text).into_iter().next().unwrap_or(text);
    &first[..char_offset(first, CHUNK_MAX_CHARS)]
}

/// The user prompt asking for a strict JSON review of `chunk`.
pub fn build_prompt(chunk: &str, focus: &BTreeSet<FocusArea>) -> String {
    let order = focus_order(focus)
        .iter()
        .map(|area| area.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Analyze the following code change (diff or source). Focus on: {order}.
Return ONLY valid JSON with this exact schema (no prose, no markdown):

{{
  "summary": [
    "bullet 1",
    "bullet 2",
    "bullet 3"
  ],
  "findings": [
    {{
      "category": "security|performance|style",
      "severity": "High|Medium|Low",
      "message": "short actionable point"
    }}
  ]
}}

Rules:
- summary: 3-5 crisp bullets.
- findings: 3-12 items total; distribute across categories as appropriate.
- message: 1-2 sentences, no headings or code blocks.
- Do NOT include anything outside the JSON object.

INPUT:
{chunk}
"#
    )
}
