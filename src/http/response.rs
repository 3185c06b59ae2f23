//! HTTP/1.1 response builder and wire serialization.

use bytes::{BufMut, BytesMut};
use serde::Serialize;

use super::{Headers, StatusCode};

const JSON_CONTENT_TYPE: &str = "application/json";

/// An outgoing response.
///
/// # Examples
///
/// ```
/// use revu::http::{Response, StatusCode};
///
/// let response = Response::json(StatusCode::Ok, &serde_json::json!({"ok": true}));
/// let wire = response.into_bytes();
/// let text = std::str::from_utf8(&wire).unwrap();
///
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Type: application/json\r\n"));
/// assert!(text.ends_with("{\"ok\":true}"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
    // Set when the body was stripped for a HEAD request.
    stripped_len: Option<usize>,
}

impl Response {
    /// Empty-bodied response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
            stripped_len: None,
        }
    }

    /// Serializes `value` as the JSON body.
    ///
    /// A value that fails to serialize becomes a bare `500`; with the plain
    /// data types used by the service this does not happen in practice.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .header("Content-Type", JSON_CONTENT_TYPE)
                .body_bytes(body),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response body");
                Self::new(StatusCode::InternalServerError)
            }
        }
    }

    /// JSON error body of the form `{"error": kind, "detail": detail}`.
    pub fn error(status: StatusCode, kind: &str, detail: impl Into<String>) -> Self {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            error: &'a str,
            detail: String,
        }

        Self::json(
            status,
            &ErrorBody {
                error: kind,
                detail: detail.into(),
            },
        )
    }

    /// Sets a header, replacing any earlier value.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// In-place variant of [`header`](Self::header) for middleware that
    /// decorates a downstream response.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Appends a header without touching existing values.
    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.append(name, value);
    }

    /// Sets a UTF-8 text body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Drops the body for a `HEAD` request, keeping its length and type in
    /// the headers.
    pub(crate) fn strip_body(&mut self) {
        if self.stripped_len.is_none() {
            if !self.body.is_empty() && !self.headers.contains("content-type") {
                self.headers.set("Content-Type", "text/plain; charset=utf-8");
            }
            self.stripped_len = Some(self.body.len());
            self.body.clear();
        }
    }

    /// Writes the response in HTTP/1.1 wire format.
    ///
    /// `Content-Length` and `Connection` are always emitted; a non-empty body
    /// without a content type is labelled `text/plain`.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.stripped_len.unwrap_or(self.body.len());

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers.set("Content-Type", "text/plain; charset=utf-8");
        }
        self.headers.set(
            "Connection",
            if self.keep_alive { "keep-alive" } else { "close" },
        );

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 48 + self.body.len());
        buf.put(format!("HTTP/1.1 {}\r\n", self.status).as_bytes());
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.put(format!("Content-Length: {content_length}\r\n\r\n").as_bytes());
        buf.put(self.body.as_slice());
        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
