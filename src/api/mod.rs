//! HTTP surface of the review service: `GET /health` and `POST /review`.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::{Context, Extensions};
use crate::middleware::{Pipeline, RequestLogger, Service};
use crate::review::{FocusArea, ReviewService};
use crate::security::CorsMiddleware;
use crate::{Response, Router, StatusCode};

/// Body of `POST /review`.
///
/// `diff` is accepted as an alias of `text` and wins when both are set. A
/// missing `focus` means every area.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequestBody {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub diff: Option<String>,
    #[serde(default)]
    pub focus: Option<Vec<String>>,
}

impl ReviewRequestBody {
    pub fn input(&self) -> &str {
        self.diff
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or_default()
    }

    /// The requested focus set. Duplicates collapse; unknown names fail.
    pub fn focus_set(&self) -> Result<BTreeSet<FocusArea>, String> {
        match &self.focus {
            None => Ok(FocusArea::all()),
            Some(names) => names
                .iter()
                .map(|name| name.parse::<FocusArea>().map_err(|e| e.to_string()))
                .collect(),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthBody {
    pub ok: bool,
    pub provider: String,
    pub model: Option<String>,
    pub llm_enabled: bool,
}

fn service(ctx: &Context) -> Option<Arc<ReviewService>> {
    ctx.state::<Arc<ReviewService>>().cloned()
}

fn missing_state() -> Response {
    Response::error(
        StatusCode::InternalServerError,
        "internal",
        "review service is not configured",
    )
}

/// `GET /health`. Reports configuration only; the backend is not contacted.
pub async fn health(ctx: Context) -> Response {
    let Some(service) = service(&ctx) else {
        return missing_state();
    };
    let info = service.info();
    Response::json(
        StatusCode::Ok,
        &HealthBody {
            ok: true,
            provider: info.provider.to_owned(),
            model: info.model,
            llm_enabled: info.enabled,
        },
    )
}

/// `POST /review`. The body is decoded as JSON whatever its declared
/// content type, so `curl -d` works without extra headers.
pub async fn review(ctx: Context) -> Response {
    let Some(service) = service(&ctx) else {
        return missing_state();
    };

    let body: ReviewRequestBody = match ctx.json() {
        Ok(body) => body,
        Err(e) => {
            debug!(request_id = ?ctx.request_id(), error = %e, "malformed review request");
            return Response::error(
                StatusCode::BadRequest,
                "invalid_request",
                format!("malformed JSON body: {e}"),
            );
        }
    };

    let focus = match body.focus_set() {
        Ok(focus) => focus,
        Err(detail) => return Response::error(StatusCode::BadRequest, "invalid_request", detail),
    };

    match service.review(body.input(), &focus).await {
        Ok(result) => Response::json(StatusCode::Ok, &result),
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                warn!(request_id = ?ctx.request_id(), error = %e, "review failed");
            }
            Response::error(status, e.kind(), e.to_string())
        }
    }
}

/// Routes for the review API, with `service` as shared state.
pub fn router(service: Arc<ReviewService>) -> Router {
    let mut state = Extensions::new();
    state.insert(service);

    let mut router = Router::with_state(state);
    router.get("/health", health);
    router.post("/review", review);
    router
}

/// The full application, open to any browser origin.
pub fn app(service: Arc<ReviewService>) -> Service {
    app_with_cors(service, CorsMiddleware::new())
}

/// The full application: request logging, `cors`, then the routes.
pub fn app_with_cors(service: Arc<ReviewService>, cors: CorsMiddleware) -> Service {
    Pipeline::new(router(service))
        .layer(Arc::new(RequestLogger::new()))
        .layer(Arc::new(cors))
        .build()
}
