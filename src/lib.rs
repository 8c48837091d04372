//! # portico
//!
//! A minimal HTTP router with session-based authentication, per-request
//! timeout enforcement, structured JSON error responses, and lightweight
//! request-lifecycle telemetry. Nothing more. Nothing less.
//!
//! ## The contract
//!
//! portico routes on exact `(method, path)` pairs and wraps every handler in
//! the same pipeline: an auth gate (unless the route is public), a timeout
//! race, error-to-status mapping, and duration telemetry markers. Session
//! storage and telemetry transport stay behind traits — the core never knows
//! whether sessions live in Redis or a `HashMap`, or where events go.
//!
//! What portico intentionally skips: middleware chains, path parameters,
//! streaming bodies. A route is a function; a response is a JSON value.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use portico::{ApiError, Config, Method, Request, Router, Server};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("invalid configuration");
//!
//!     let app = Router::new()
//!         .public(Method::Get, "/ping", ping)
//!         .on(Method::Get, "/me", me);
//!
//!     Server::new(config).serve(app).await.unwrap();
//! }
//!
//! async fn ping(_req: Request) -> Result<Value, ApiError> {
//!     Ok(json!({ "pong": true }))
//! }
//!
//! // Non-public routes only run with a resolved session.
//! async fn me(req: Request) -> Result<Value, ApiError> {
//!     let session = req.session().expect("auth gate ran");
//!     Ok(json!({ "subject_id": session.subject_id }))
//! }
//! ```
//!
//! ## Failure shapes
//!
//! Every response carries a JSON body. Errors are
//! `{"error":{"message":...}}` with a `stack` diagnostic field outside
//! production; a handler that outruns its deadline yields
//! `503 {"error":"Request timed out"}` exactly once, and the handler itself
//! is abandoned, never aborted.

mod config;
mod error;
mod handler;
mod method;
mod pipeline;
mod request;
mod response;
mod router;
mod server;
mod session;
mod store;
mod telemetry;

pub mod health;

pub use config::{Config, ConfigError, Mode};
pub use error::{ApiError, ServerError};
pub use handler::Handler;
pub use method::Method;
pub use request::Request;
pub use response::Reply;
pub use router::{RouteOptions, Router};
pub use server::{App, Server};
pub use session::{Session, SessionGrant, SessionManager};
pub use store::{MemoryStore, SessionStore, StoreError};
pub use telemetry::{Event, EventKind, LogSink, TelemetryError, TelemetrySink};
