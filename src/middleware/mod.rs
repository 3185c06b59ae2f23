//! Middleware pipeline in front of the [`Router`].
//!
//! A [`Pipeline`] runs its layers in registration order; each layer receives
//! the [`Context`] and a [`Next`] cursor and may short-circuit, pass through or
//! decorate the downstream response. The router is always the innermost step.
//!
//! Built-in layers:
//!
//! - [`RequestLogger`] assigns a [`RequestId`], echoes it as `X-Request-Id`
//!   and logs one line per request.
//! - [`crate::security::CorsMiddleware`] handles cross-origin access.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

use crate::context::{Context, RequestId};
use crate::router::{ResponseFuture, Router};
use crate::{Request, Response};

/// Type-erased middleware function.
pub type MiddlewareHandler =
    Arc<dyn Fn(Context, Next) -> ResponseFuture + Send + Sync + 'static>;

/// Wraps a [`Middleware`] implementation as a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Cursor over the rest of the chain for one request.
///
/// Consumed by [`Next::run`], so a layer can forward a request at most once.
pub struct Next {
    layers: Arc<[MiddlewareHandler]>,
    index: usize,
    router: Arc<Router>,
}

impl Next {
    /// Runs the next layer, or the router once the layers are exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.layers.get(self.index).cloned() {
            Some(layer) => {
                self.index += 1;
                layer(ctx, self).await
            }
            None => self.router.dispatch(ctx).await,
        }
    }
}

/// A request-processing layer.
///
/// Implementations are shared across connection tasks, so they must be
/// `Send + Sync` and return `Send` futures.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Layers plus the router they guard; the value the server runs.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use revu::middleware::{Pipeline, RequestLogger};
/// use revu::security::CorsMiddleware;
/// use revu::Router;
///
/// let pipeline = Pipeline::new(Router::new())
///     .layer(Arc::new(RequestLogger::new()))
///     .layer(Arc::new(CorsMiddleware::new()));
/// ```
pub struct Pipeline {
    layers: Vec<MiddlewareHandler>,
    router: Arc<Router>,
}

impl Pipeline {
    pub fn new(router: Router) -> Self {
        Self {
            layers: Vec::new(),
            router: Arc::new(router),
        }
    }

    /// Appends a layer. Earlier layers wrap later ones.
    #[must_use]
    pub fn layer<M: Middleware + 'static>(mut self, middleware: Arc<M>) -> Self {
        self.layers.push(from_middleware(middleware));
        self
    }

    /// Freezes the layer list for serving.
    pub fn build(self) -> Service {
        Service {
            layers: self.layers.into(),
            router: self.router,
        }
    }
}

/// Immutable, cheaply cloneable request handler produced by [`Pipeline::build`].
#[derive(Clone)]
pub struct Service {
    layers: Arc<[MiddlewareHandler]>,
    router: Arc<Router>,
}

impl Service {
    pub async fn handle(&self, request: Request) -> Response {
        let ctx = self.router.context(request);
        let next = Next {
            layers: Arc::clone(&self.layers),
            index: 0,
            router: Arc::clone(&self.router),
        };
        next.run(ctx).await
    }
}

/// Assigns request ids and logs each request once it completes.
///
/// Ids come from a per-logger counter. Server errors log at `warn`, everything
/// else at `info`.
#[derive(Debug, Default)]
pub struct RequestLogger {
    next_id: AtomicU64,
}

impl RequestLogger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Middleware for RequestLogger {
    fn handle(
        &self,
        mut ctx: Context,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);

        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();
            ctx.extensions_mut().insert(id);

            let mut response = next.run(ctx).await;
            response.set_header("X-Request-Id", id.to_string());

            let status = response.status();
            let elapsed_ms = start.elapsed().as_millis() as u64;
            if status.is_server_error() {
                tracing::warn!(request_id = %id, %method, %path, status = status.as_u16(), elapsed_ms, "request failed");
            } else {
                tracing::info!(request_id = %id, %method, %path, status = status.as_u16(), elapsed_ms, "request served");
            }
            response
        })
    }
}
