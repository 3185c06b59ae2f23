//! Request routing by method and exact path.
//!
//! The review API has a handful of fixed endpoints, so routes are literal
//! paths. Trailing slashes are ignored on both sides (`/review/` hits
//! `/review`). Dispatch rules:
//!
//! | Situation                                   | Result                         |
//! |---------------------------------------------|--------------------------------|
//! | method and path registered                  | the handler runs               |
//! | `HEAD` on a path with a `GET` route         | `GET` handler, body stripped   |
//! | path registered, method not                 | `405` with an `Allow` header   |
//! | path unknown                                | `404`                          |

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, Extensions};
use crate::{Method, Request, Response, StatusCode};

/// Boxed future resolving to a [`Response`].
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type-erased async route handler.
pub type Handler = Arc<dyn Fn(Context) -> ResponseFuture + Send + Sync + 'static>;

/// Anything callable as `async fn(Context) -> Response`.
///
/// Blanket-implemented for closures and functions, so route registration takes
/// `impl IntoHandler` without repeating the future bounds.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> ResponseFuture;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> ResponseFuture {
        Box::pin((self)(ctx))
    }
}

fn normalize(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

/// Method + path dispatcher holding the application's shared state.
///
/// # Examples
///
/// ```rust,no_run
/// use revu::context::{Context, Extensions};
/// use revu::{Response, Router, StatusCode};
///
/// let mut state = Extensions::new();
/// state.insert(String::from("phi3:3.8b"));
///
/// let mut router = Router::with_state(state);
/// router.get("/model", |ctx: Context| async move {
///     let model = ctx.state::<String>().cloned().unwrap_or_default();
///     Response::new(StatusCode::Ok).body(model)
/// });
/// ```
pub struct Router {
    routes: Vec<Route>,
    state: Arc<Extensions>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Router without shared state.
    pub fn new() -> Self {
        Self::with_state(Extensions::new())
    }

    /// Router whose handlers can read `state` through [`Context::state`].
    pub fn with_state(state: Extensions) -> Self {
        Self {
            routes: Vec::new(),
            state: Arc::new(state),
        }
    }

    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            path: normalize(path).to_owned(),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Wraps `request` in a [`Context`] carrying this router's state.
    pub fn context(&self, request: Request) -> Context {
        Context::with_state(request, Arc::clone(&self.state))
    }

    /// Builds the context and dispatches in one step.
    pub async fn route(&self, request: Request) -> Response {
        self.dispatch(self.context(request)).await
    }

    /// Dispatches an already-built context. Middleware pipelines end here.
    pub async fn dispatch(&self, ctx: Context) -> Response {
        let path = normalize(ctx.request().path()).to_owned();
        let method = ctx.request().method().clone();

        let on_path: Vec<&Route> = self.routes.iter().filter(|r| r.path == path).collect();
        if on_path.is_empty() {
            return Response::error(
                StatusCode::NotFound,
                "not_found",
                format!("no route for {path}"),
            );
        }

        if let Some(route) = on_path.iter().find(|r| r.method == method) {
            return (route.handler)(ctx).await;
        }

        if method == Method::Head {
            if let Some(route) = on_path.iter().find(|r| r.method == Method::Get) {
                let mut response = (route.handler)(ctx).await;
                response.strip_body();
                return response;
            }
        }

        let mut allowed: Vec<&str> = on_path.iter().map(|r| r.method.as_str()).collect();
        if allowed.contains(&"GET") {
            allowed.push("HEAD");
        }
        Response::error(
            StatusCode::MethodNotAllowed,
            "method_not_allowed",
            format!("{method} is not supported on {path}"),
        )
        .header("Allow", allowed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    fn ok_router() -> Router {
        let mut router = Router::new();
        router.get("/health", |_ctx| async {
            Response::new(StatusCode::Ok).body("up")
        });
        router.post("/review", |_ctx| async { Response::new(StatusCode::Ok) });
        router
    }

    #[test]
    fn normalize_trailing_slash() {
        assert_eq!(normalize("/review/"), "/review");
        assert_eq!(normalize("/review"), "/review");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn len_counts_routes() {
        assert!(Router::default().is_empty());
        assert_eq!(ok_router().len(), 2);
    }

    #[tokio::test]
    async fn registered_route_runs() {
        let res = ok_router().route(make_request("POST", "/review")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn trailing_slash_matches() {
        let res = ok_router().route(make_request("GET", "/health/")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let res = ok_router().route(make_request("GET", "/metrics")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        let body: serde_json::Value = serde_json::from_slice(res.body_ref()).unwrap();
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let router = ok_router();

        let res = router.route(make_request("GET", "/review")).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
        assert_eq!(res.headers().get("allow"), Some("POST"));

        let res = router.route(make_request("DELETE", "/health")).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
        assert_eq!(res.headers().get("allow"), Some("GET, HEAD"));
    }

    #[tokio::test]
    async fn head_uses_get_without_body() {
        let res = ok_router().route(make_request("HEAD", "/health")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert!(res.body_ref().is_empty());
        let wire = String::from_utf8(res.into_bytes().to_vec()).unwrap();
        assert!(wire.contains("Content-Length: 2\r\n"));
    }

    #[tokio::test]
    async fn handlers_read_shared_state() {
        let mut state = Extensions::new();
        state.insert(String::from("phi3:3.8b"));
        let mut router = Router::with_state(state);
        router.get("/model", |ctx: Context| async move {
            let model = ctx.state::<String>().cloned().unwrap_or_default();
            Response::new(StatusCode::Ok).body(model)
        });

        let res = router.route(make_request("GET", "/model")).await;
        assert_eq!(res.body_ref(), b"phi3:3.8b");
    }

    #[tokio::test]
    async fn first_registration_wins() {
        let mut router = Router::new();
        router.get("/dup", |_ctx| async { Response::new(StatusCode::Ok) });
        router.get("/dup", |_ctx| async { Response::new(StatusCode::NoContent) });
        let res = router.route(make_request("GET", "/dup")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }
}
