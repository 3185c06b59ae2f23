//! # revu
//!
//! A small code-review service. `POST /review` sends a code snippet or diff
//! to a local Ollama model and answers with a summary plus findings
//! categorized by security, performance and style.
//!
//! The HTTP layer is a from-scratch async HTTP/1.1 server: [`server`] reads
//! requests off TCP connections, [`middleware`] runs logging and CORS layers,
//! and [`router`] dispatches to the handlers in [`api`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use revu::config::Config;
//! use revu::llm::OllamaClient;
//! use revu::review::ReviewService;
//! use revu::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let backend = Arc::new(OllamaClient::new(&config.ollama)?);
//!     let app = revu::api::app(Arc::new(ReviewService::new(backend)));
//!
//!     let server = Server::bind(&config.bind_addr).await?;
//!     server
//!         .run(move |req| {
//!             let app = app.clone();
//!             async move { app.handle(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod context;
pub mod http;
pub mod llm;
pub mod middleware;
pub mod review;
pub mod router;
pub mod security;
pub mod server;

pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
