//! Incoming HTTP request type.
//!
//! A [`Request`] is fully materialized before the handler runs: the body is
//! collected into memory at dispatch (streaming bodies are out of scope) and
//! the resolved session, if any, is attached by the pipeline.

use bytes::Bytes;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::method::Method;
use crate::session::Session;

/// An incoming HTTP request.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) session: Option<Session>,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        path: String,
        query: Vec<(String, String)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self {
            method,
            path,
            query,
            headers,
            body,
            session: None,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The session resolved by the auth gate. Always `None` on public routes.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value for a query-string key.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values for a query-string key, in order of appearance.
    pub fn query_all(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// A cookie value from the `cookie` header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.header("cookie")?
            .split(';')
            .map(str::trim)
            .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
    }

    /// Deserializes the request body as JSON.
    ///
    /// Malformed bodies map to [`ApiError::BadRequest`], so handlers can
    /// propagate the failure with `?` and the client sees a 400.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
    }

    /// Query pairs as a JSON object (later duplicates win), used as telemetry
    /// marker data.
    pub(crate) fn query_json(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.query {
            map.insert(key.clone(), Value::String(value.clone()));
        }
        Value::Object(map)
    }
}

/// Splits a raw query string into key/value pairs. No percent-decoding —
/// exact-match routing never inspects values, and handlers that need decoding
/// own that choice.
pub(crate) fn parse_query(raw: Option<&str>) -> Vec<(String, String)> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_owned(), value.to_owned()),
            None => (pair.to_owned(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_headers(pairs: &[(&str, &str)]) -> Request {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                http::header::HeaderName::try_from(*name).unwrap(),
                value.parse().unwrap(),
            );
        }
        Request::new(Method::Get, "/".into(), Vec::new(), headers, Bytes::new())
    }

    #[test]
    fn query_parsing_handles_flags_and_repeats() {
        let pairs = parse_query(Some("a=1&b&a=2&=x"));
        assert_eq!(
            pairs,
            vec![
                ("a".to_owned(), "1".to_owned()),
                ("b".to_owned(), String::new()),
                ("a".to_owned(), "2".to_owned()),
                (String::new(), "x".to_owned()),
            ]
        );
        assert!(parse_query(None).is_empty());
        assert!(parse_query(Some("")).is_empty());
    }

    #[test]
    fn cookie_lookup_trims_and_matches_exact_names() {
        let req = request_with_headers(&[("cookie", "theme=dark; sid=abc.def; sidecar=x")]);
        assert_eq!(req.cookie("sid"), Some("abc.def"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.cookie("side"), None);
    }

    #[test]
    fn json_body_errors_map_to_bad_request() {
        let mut req = request_with_headers(&[]);
        req.body = Bytes::from_static(b"{not json");
        let err = req.json::<serde_json::Value>().unwrap_err();
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
    }
}
