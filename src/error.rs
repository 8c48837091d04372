//! Error taxonomy and response mapping.
//!
//! Two error types live here. [`ApiError`] is the request-level taxonomy:
//! every failure a handler or the pipeline can produce, each carrying its
//! HTTP status. [`ServerError`] surfaces infrastructure failures — binding a
//! port, bad configuration — and never crosses the request path.
//!
//! The response body shape is always `{"error":{"message":...,"stack":...}}`,
//! where `stack` (the source-chain detail) is included only outside
//! production so internals never leak to real clients.

use http::StatusCode;
use serde_json::{json, Value};

use crate::config::ConfigError;

/// A classified request failure with an attached HTTP status.
///
/// Constructed statuses are always in the 4xx/5xx range; 500 is reserved for
/// `Internal`, the catch-all for failures no one classified.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request parameters → 400.
    #[error("{0}")]
    BadRequest(String),

    /// Missing, invalid, or expired session credential → 401.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not permitted → 403.
    #[error("{0}")]
    Forbidden(String),

    /// No matching route or resource → 404.
    #[error("{0}")]
    NotFound(String),

    /// Handler exceeded its deadline → 503. Synthesized by the pipeline,
    /// never constructed by handler code.
    #[error("Request timed out")]
    Timeout,

    /// Everything else → 500, diagnostic detail preserved for non-production
    /// visibility only.
    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// An internal error with a bare message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an unclassified error, keeping it as the source for diagnostics.
    pub fn internal_from(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        let source = err.into();
        Self::Internal {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// The HTTP status this error maps to. Always in `[400, 599]`.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Builds the `{"error": {...}}` response body.
    ///
    /// `include_detail` attaches the debug representation and source chain as
    /// `stack` — set only outside production mode.
    pub(crate) fn body(&self, include_detail: bool) -> Value {
        let mut error = json!({ "message": self.to_string() });
        if include_detail {
            error["stack"] = Value::String(self.detail());
        }
        json!({ "error": error })
    }

    /// Debug representation plus the flattened source chain.
    fn detail(&self) -> String {
        let mut out = format!("{self:?}");
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            out.push_str("\ncaused by: ");
            out.push_str(&err.to_string());
            source = err.source();
        }
        out
    }
}

/// Infrastructure failures surfaced by [`Server::serve`](crate::Server::serve).
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_stay_in_error_range() {
        let errors = [
            ApiError::bad_request("x"),
            ApiError::unauthorized("x"),
            ApiError::forbidden("x"),
            ApiError::not_found("x"),
            ApiError::Timeout,
            ApiError::internal("x"),
        ];
        for err in errors {
            let code = err.status().as_u16();
            assert!((400..=599).contains(&code), "{err}: {code}");
        }
    }

    #[test]
    fn body_includes_stack_only_on_request() {
        let err = ApiError::unauthorized("User is not authenticated");

        let public = err.body(false);
        assert_eq!(public["error"]["message"], "User is not authenticated");
        assert!(public["error"].get("stack").is_none());

        let detailed = err.body(true);
        assert!(detailed["error"]["stack"]
            .as_str()
            .unwrap()
            .contains("Unauthorized"));
    }

    #[test]
    fn internal_from_preserves_the_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "store went away");
        let err = ApiError::internal_from(io);

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = err.body(true);
        assert!(detail["error"]["stack"]
            .as_str()
            .unwrap()
            .contains("store went away"));
    }
}
