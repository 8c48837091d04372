//! Exact-match request router.
//!
//! One `HashMap` keyed by the composite string `"METHOD /path"`. O(1)
//! dispatch, no wildcards, no path parameters, no middleware stack. You
//! register a path, you get a handler. That is all.
//!
//! Registering the same `(method, path)` twice keeps the last handler — the
//! table is a plain mapping and overwrite is its natural semantics.

use std::collections::HashMap;

use tracing::debug;

use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;

/// Per-route configuration.
///
/// Extend by adding named fields; routes are configured through this struct,
/// never through ad-hoc key/value options.
#[derive(Clone, Copy, Debug, Default)]
pub struct RouteOptions {
    /// Public routes skip the session auth gate entirely.
    pub public: bool,
}

impl RouteOptions {
    /// Options for a route exempt from authentication.
    pub fn public() -> Self {
        Self { public: true }
    }
}

/// A registered route: the erased handler plus its options.
pub(crate) struct Route {
    pub(crate) handler: BoxedHandler,
    pub(crate) public: bool,
}

/// The application router.
///
/// Build it once at startup, pass it to [`Server::serve`](crate::Server::serve);
/// it is read-only from then on, so concurrent requests share it without
/// locking. Each registration method returns `self` so routes chain.
pub struct Router {
    routes: HashMap<String, Route>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Registers an authenticated route (the default).
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.on_with(method, path, handler, RouteOptions::default())
    }

    /// Registers a route exempt from the session auth gate.
    pub fn public(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.on_with(method, path, handler, RouteOptions::public())
    }

    /// Registers a route with explicit [`RouteOptions`].
    pub fn on_with(
        mut self,
        method: Method,
        path: &str,
        handler: impl Handler,
        options: RouteOptions,
    ) -> Self {
        debug!(%method, path, public = options.public, "adding route");
        let replaced = self.routes.insert(
            route_key(method, path),
            Route {
                handler: handler.into_boxed_handler(),
                public: options.public,
            },
        );
        if replaced.is_some() {
            debug!(%method, path, "route re-registered, previous handler replaced");
        }
        self
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> Option<&Route> {
        self.routes.get(&route_key(method, path))
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn route_key(method: Method, path: &str) -> String {
    format!("{method} {path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::request::Request;
    use serde_json::{json, Value};

    async fn noop(_req: Request) -> Result<Value, ApiError> {
        Ok(json!(null))
    }

    #[test]
    fn exact_match_only() {
        let router = Router::new().public(Method::Get, "/test", noop);

        assert!(router.lookup(Method::Get, "/test").is_some());
        assert!(router.lookup(Method::Post, "/test").is_none());
        assert!(router.lookup(Method::Get, "/test/").is_none());
        assert!(router.lookup(Method::Get, "/").is_none());
    }

    #[test]
    fn duplicate_registration_overwrites() {
        let router = Router::new()
            .on(Method::Get, "/dup", noop)
            .public(Method::Get, "/dup", noop);

        assert_eq!(router.len(), 1);
        // The second registration's options win along with its handler.
        assert!(router.lookup(Method::Get, "/dup").unwrap().public);
    }

    #[test]
    fn public_flag_defaults_to_false() {
        let router = Router::new().on(Method::Post, "/guarded", noop);
        assert!(!router.lookup(Method::Post, "/guarded").unwrap().public);
    }
}
