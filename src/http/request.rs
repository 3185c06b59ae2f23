//! HTTP/1.1 request head parsing on top of [`httparse`].

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors raised while reading a request off the wire.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request head is incomplete")]
    Incomplete,

    #[error("malformed request head: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("header {name} is not valid UTF-8")]
    InvalidHeaderValue { name: String },

    #[error("invalid Content-Length header: {value:?}")]
    InvalidContentLength { value: String },

    #[error("Transfer-Encoding is not supported; send a Content-Length body")]
    UnsupportedTransferEncoding,
}

/// A parsed HTTP/1.1 request.
///
/// [`Request::parse`] reads only the head; the connection loop attaches the
/// body with [`Request::with_body`] once `Content-Length` bytes have arrived.
///
/// # Examples
///
/// ```
/// use revu::http::request::Request;
///
/// let raw = b"POST /review?verbose=1 HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}";
/// let (request, head_len) = Request::parse(raw).unwrap();
/// let request = request.with_body(raw[head_len..].to_vec().into());
///
/// assert_eq!(request.path(), "/review");
/// assert_eq!(request.content_length().unwrap(), Some(2));
/// assert_eq!(&request.body()[..], b"{}");
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// Minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Request {
    const MAX_HEADERS: usize = 64;

    /// Parses the request head from `buf`.
    ///
    /// Returns the request (with an empty body) and the length of the head,
    /// i.e. the offset at which the body starts.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] when the blank line ending the head has
    ///   not arrived yet.
    /// - [`RequestError::Parse`] for malformed input.
    /// - [`RequestError::InvalidHeaderValue`] for header values that are not
    ///   UTF-8.
    /// - [`RequestError::UnsupportedTransferEncoding`] for chunked uploads.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut raw_headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Request::new(&mut raw_headers);

        let head_len = match raw.parse(buf)? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = Method::from(raw.method.ok_or(RequestError::MissingField { field: "method" })?);
        let target = raw.path.ok_or(RequestError::MissingField { field: "path" })?;
        // The service has no query-driven behavior; drop it.
        let path = target.split_once('?').map_or(target, |(p, _)| p).to_owned();
        let version = raw
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut headers = Headers::with_capacity(raw.headers.len());
        for field in raw.headers.iter() {
            let value = std::str::from_utf8(field.value).map_err(|_| {
                RequestError::InvalidHeaderValue {
                    name: field.name.to_owned(),
                }
            })?;
            headers.append(field.name, value.trim());
        }

        if headers.contains("transfer-encoding") {
            return Err(RequestError::UnsupportedTransferEncoding);
        }

        Ok((
            Self {
                method,
                path,
                version,
                headers,
                body: Bytes::new(),
            },
            head_len,
        ))
    }

    /// Attaches the request body.
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the peer expects the connection to stay open.
    ///
    /// HTTP/1.1 keeps it open unless told otherwise; HTTP/1.0 closes unless
    /// `Connection: keep-alive` is sent.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) if conn.eq_ignore_ascii_case("close") => false,
            Some(conn) if conn.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version == 1,
        }
    }

    /// Declared body length, `None` when the header is absent.
    pub fn content_length(&self) -> Result<Option<usize>, RequestError> {
        match self.headers.get("content-length") {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| RequestError::InvalidContentLength {
                    value: value.to_owned(),
                }),
        }
    }
}
