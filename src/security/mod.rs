//! Browser-facing access control.

mod middleware;

pub use middleware::{AllowedOrigins, CorsMiddleware};
