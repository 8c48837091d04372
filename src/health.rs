//! Built-in health-check handlers.
//!
//! Register them as public routes so probes never need credentials:
//!
//! ```rust,no_run
//! use portico::{health, Method, Router};
//!
//! let app = Router::new()
//!     .public(Method::Get, "/healthz", health::liveness)
//!     .public(Method::Get, "/readyz", health::readiness);
//! ```
//!
//! Override `readiness` with your own handler if the pod must verify
//! dependency availability before accepting traffic.

use serde_json::{json, Value};

use crate::error::ApiError;
use crate::request::Request;

/// Liveness probe handler.
///
/// Always returns `200` with `{"status":"ok"}`. If the process can respond
/// to HTTP at all, it is alive — this handler intentionally has no
/// dependencies.
pub async fn liveness(_req: Request) -> Result<Value, ApiError> {
    Ok(json!({ "status": "ok" }))
}

/// Readiness probe handler (default implementation).
///
/// Returns `200` with `{"status":"ready"}`. Replace with your own handler if
/// the application needs a warm-up period.
pub async fn readiness(_req: Request) -> Result<Value, ApiError> {
    Ok(json!({ "status": "ready" }))
}
