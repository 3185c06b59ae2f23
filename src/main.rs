//! `revu` server entry point.

use std::sync::Arc;

use anyhow::Context as _;
use tracing::{info, warn};

use revu::Server;
use revu::config::Config;
use revu::llm::{DisabledBackend, LlmBackend, OllamaClient};
use revu::review::ReviewService;
use revu::security::CorsMiddleware;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    let backend: Arc<dyn LlmBackend> = if config.ollama.enabled {
        info!(
            model = %config.ollama.model,
            base_url = %config.ollama.base_url,
            timeout_secs = config.ollama.timeout.as_secs(),
            "using Ollama backend"
        );
        Arc::new(OllamaClient::new(&config.ollama)?)
    } else {
        warn!("USE_OLLAMA is off; /review will answer 503 until it is enabled");
        Arc::new(DisabledBackend)
    };

    let service = ReviewService::new(backend).with_max_input_chars(config.max_input_chars);
    if !config.allowed_origins.is_empty() {
        info!(origins = ?config.allowed_origins, "CORS restricted to listed origins");
    }
    let cors = CorsMiddleware::with_origins(config.allowed_origins.iter().cloned());
    let app = revu::api::app_with_cors(Arc::new(service), cors);

    let server = Server::bind(&config.bind_addr).await?;
    info!(address = %server.local_addr(), "review API ready");

    server
        .run_until(
            move |request| {
                let app = app.clone();
                async move { app.handle(request).await }
            },
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "could not listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            },
        )
        .await?;

    info!("server stopped");
    Ok(())
}
