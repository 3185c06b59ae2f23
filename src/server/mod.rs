//! Async TCP server using Tokio.
//!
//! Accepts connections, reads HTTP/1.1 requests off each one and hands them to
//! a handler. Connections are persistent unless either side asks to close.
//! Every connection runs on its own task; requests on one connection are
//! served in order.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::request::{Request, RequestError};
use crate::http::{Response, StatusCode};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Largest request (head plus body) buffered before answering `413` (8 MiB).
pub const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// The HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use revu::server::Server;
/// use revu::http::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8000").await?;
///     server
///         .run_until(
///             |_req| async { Response::new(StatusCode::Ok).body("up") },
///             async { let _ = tokio::signal::ctrl_c().await; },
///         )
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds to `addr`. Port `0` picks a free port; see [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until the process exits.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then stops accepting connections.
    ///
    /// Connections already accepted keep running on their own tasks until
    /// their peers disconnect or the runtime shuts down.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()> + Send,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "listening");
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                () = &mut shutdown => {
                    info!("shutdown signal received; no longer accepting connections");
                    return Ok(());
                }
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

async fn reject(stream: &mut TcpStream, response: Response) -> Result<(), std::io::Error> {
    stream.write_all(&response.keep_alive(false).into_bytes()).await?;
    stream.flush().await
}

async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        // Bytes of a pipelined request may already be buffered.
        let (request, head_len) = loop {
            match Request::parse(&buf) {
                Ok(parsed) => break parsed,
                Err(RequestError::Incomplete) => {}
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "bad request");
                    return reject(
                        &mut stream,
                        Response::error(StatusCode::BadRequest, "bad_request", e.to_string()),
                    )
                    .await;
                }
            }
            if buf.len() > MAX_REQUEST_SIZE {
                warn!(peer = %peer_addr, "request head too large");
                return reject(
                    &mut stream,
                    Response::error(StatusCode::PayloadTooLarge, "payload_too_large", "request head too large"),
                )
                .await;
            }
            if stream.read_buf(&mut buf).await? == 0 {
                if !buf.is_empty() {
                    debug!(peer = %peer_addr, "peer closed mid-request");
                }
                return Ok(());
            }
        };

        let content_length = match request.content_length() {
            Ok(len) => len.unwrap_or(0),
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request");
                return reject(
                    &mut stream,
                    Response::error(StatusCode::BadRequest, "bad_request", e.to_string()),
                )
                .await;
            }
        };

        if content_length > MAX_REQUEST_SIZE.saturating_sub(head_len) {
            warn!(peer = %peer_addr, content_length, "request body too large");
            return reject(
                &mut stream,
                Response::error(
                    StatusCode::PayloadTooLarge,
                    "payload_too_large",
                    format!("request exceeds {MAX_REQUEST_SIZE} bytes"),
                ),
            )
            .await;
        }

        let total = head_len + content_length;
        while buf.len() < total {
            if stream.read_buf(&mut buf).await? == 0 {
                debug!(peer = %peer_addr, "peer closed before sending the full body");
                return Ok(());
            }
        }

        let frame = buf.split_to(total).freeze();
        let request = request.with_body(frame.slice(head_len..));
        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = handler(request).await.keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        if !keep_alive {
            debug!(peer = %peer_addr, "closing connection");
            return Ok(());
        }
    }
}
