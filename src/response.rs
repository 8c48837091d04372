//! Handler reply type and HTTP response assembly.
//!
//! Handlers return JSON values; the pipeline owns serialization and status
//! selection. [`Reply`] exists for the handlers that need more than a bare
//! value — today that means extra response headers, e.g. the `set-cookie`
//! issued at login.
//!
//! Every response this crate emits is `content-type: application/json`.
//! Serialization is pretty-printed outside production and compact in
//! production — a formatting-only distinction.

use bytes::Bytes;
use http::{header, StatusCode};
use http_body_util::Full;
use serde_json::Value;
use tracing::error;

use crate::config::Mode;

pub(crate) type HttpResponse = http::Response<Full<Bytes>>;

/// A successful handler result: a JSON value plus optional extra headers.
///
/// Most handlers return a bare [`Value`] and never name this type — the
/// conversion is automatic.
#[derive(Debug)]
pub struct Reply {
    pub(crate) value: Value,
    pub(crate) headers: Vec<(String, String)>,
}

impl Reply {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            headers: Vec::new(),
        }
    }

    /// Adds a response header. Chainable.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// Serializes a JSON value per deployment mode.
pub(crate) fn stringify(value: &Value, mode: Mode) -> Vec<u8> {
    let encoded = if mode.is_production() {
        serde_json::to_vec(value)
    } else {
        serde_json::to_vec_pretty(value)
    };
    // Value-to-bytes encoding cannot fail for values built from valid JSON.
    encoded.unwrap_or_else(|err| {
        error!("failed to serialize response body: {err}");
        b"{}".to_vec()
    })
}

/// Assembles a JSON response with the given status and extra headers.
pub(crate) fn json_response(
    status: StatusCode,
    body: Vec<u8>,
    extra_headers: &[(String, String)],
) -> HttpResponse {
    let mut builder = http::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in extra_headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|err| {
            // Only reachable with an invalid handler-supplied header.
            error!("failed to build response: {err}");
            http::Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from_static(
                    br#"{"error":{"message":"Internal server error"}}"#,
                )))
                .expect("static fallback response is valid")
        })
}
