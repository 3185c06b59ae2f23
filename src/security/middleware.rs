//! Cross-origin access for browser front ends.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::middleware::{Middleware, Next};
use crate::{Method, Response, StatusCode};

/// Which origins may call the API from a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    // The value to echo in `Access-Control-Allow-Origin`, if `origin` passes.
    fn resolve(&self, origin: &str) -> Option<String> {
        match self {
            Self::Any => Some("*".to_owned()),
            Self::List(list) => list.iter().any(|o| o == origin).then(|| origin.to_owned()),
        }
    }
}

/// CORS layer.
///
/// Requests without an `Origin` header, or from an origin outside the
/// allow-list, pass through untouched. `OPTIONS` preflights from an allowed
/// origin are answered with `204 No Content` without reaching the router.
///
/// # Examples
///
/// ```rust
/// use revu::security::CorsMiddleware;
///
/// let open = CorsMiddleware::new();
/// let locked = CorsMiddleware::new().allow_origin("http://localhost:8501");
/// ```
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    origins: AllowedOrigins,
    methods: Arc<str>,
    headers: Arc<str>,
    max_age_secs: u32,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsMiddleware {
    /// Any origin; `GET, POST, OPTIONS`; `Content-Type` and `Authorization`.
    pub fn new() -> Self {
        Self {
            origins: AllowedOrigins::Any,
            methods: Arc::from("GET, POST, OPTIONS"),
            headers: Arc::from("Content-Type, Authorization"),
            max_age_secs: 3600,
        }
    }

    /// Restricts access to an explicit list; the first call replaces `Any`.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        if let AllowedOrigins::List(list) = &mut self.origins {
            list.push(origin);
        } else {
            self.origins = AllowedOrigins::List(vec![origin]);
        }
        self
    }

    /// Allows exactly `origins`, or any origin when the list is empty.
    pub fn with_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        origins
            .into_iter()
            .fold(Self::new(), |cors, origin| cors.allow_origin(origin))
    }

    pub fn origins(&self) -> &AllowedOrigins {
        &self.origins
    }

    fn decorate(&self, response: &mut Response, allow_origin: &str) {
        response.set_header("Access-Control-Allow-Origin", allow_origin);
        response.set_header("Access-Control-Allow-Methods", self.methods.as_ref());
        response.set_header("Access-Control-Allow-Headers", self.headers.as_ref());
        if allow_origin != "*" {
            response.append_header("Vary", "Origin");
        }
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let cors = self.clone();

        Box::pin(async move {
            let Some(allow_origin) = ctx
                .request()
                .headers()
                .get("origin")
                .and_then(|origin| cors.origins.resolve(origin))
            else {
                return next.run(ctx).await;
            };

            let preflight = ctx.request().method() == &Method::Options
                && ctx.request().headers().contains("access-control-request-method");

            if preflight {
                let mut response = Response::new(StatusCode::NoContent)
                    .header("Access-Control-Max-Age", cors.max_age_secs.to_string());
                cors.decorate(&mut response, &allow_origin);
                return response;
            }

            let mut response = next.run(ctx).await;
            cors.decorate(&mut response, &allow_origin);
            response
        })
    }
}
