//! Request pipeline state machine.
//!
//! Per request: `Received → Authorizing → Executing → (TimedOut | Completed)
//! → Responded`.
//!
//! - Public routes skip `Authorizing`; an auth failure responds immediately
//!   with no handler invocation and no timer.
//! - The handler is spawned and raced against the timeout clock. On timeout
//!   the handler is **abandoned, not aborted** — it runs to completion in the
//!   background and its eventual outcome is logged and discarded, because the
//!   response channel is already closed. Forceful interruption would risk
//!   partial side effects; wasted work is the accepted cost.
//! - Exactly one response is written per request. The `finished` flag records
//!   the single winner of the timer-vs-completion race.
//! - Telemetry duration markers bracket handling for authenticated requests
//!   only, keyed by request path. Publishing never blocks the response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;
use serde_json::json;
use tokio::time;
use tracing::{debug, error, warn};

use crate::config::{Config, Mode};
use crate::error::ApiError;
use crate::request::Request;
use crate::response::{json_response, stringify, HttpResponse};
use crate::router::Route;
use crate::session::{Session, SessionManager};
use crate::telemetry::{self, Event, TelemetrySink};

/// Timeout body, preserved as a plain-string shape distinct from the
/// structured `{"error":{...}}` form.
const TIMEOUT_BODY: &[u8] = br#"{"error":"Request timed out"}"#;

/// Process-wide collaborators shared by every request.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) sessions: SessionManager,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
}

/// Per-request transient state, dropped when the response is emitted.
struct RequestContext {
    session: Option<Session>,
    finished: AtomicBool,
    started_at: Instant,
}

/// Runs one request through the pipeline and produces exactly one response.
pub(crate) async fn run(shared: &Shared, route: &Route, mut req: Request) -> HttpResponse {
    let mut ctx = RequestContext {
        session: None,
        finished: AtomicBool::new(false),
        started_at: Instant::now(),
    };
    let mode = shared.config.mode;

    // Received → Authorizing (skipped for public routes).
    if !route.public {
        match shared.sessions.resolve_session(&req).await {
            Ok(session) => ctx.session = Some(session),
            // No handler call, no timer, no start marker.
            Err(err) => return error_response(&err, mode),
        }
    }
    req.session = ctx.session.clone();

    let path = req.path().to_owned();
    let query = req.query_json();

    // Authorizing → Executing.
    if let Some(session) = &ctx.session {
        telemetry::emit(
            &*shared.telemetry,
            Event::start(
                path.clone(),
                json!({ "subject_id": &session.subject_id, "query": &query }),
            ),
        );
    }

    let mut handle = tokio::spawn(route.handler.call(req));

    let response = match time::timeout(shared.config.request_timeout, &mut handle).await {
        Err(_elapsed) => {
            // Executing → TimedOut. The timer is the terminal event for the
            // response; the handler keeps running in the background.
            let already = ctx.finished.swap(true, Ordering::SeqCst);
            debug_assert!(!already, "response written twice");

            let watched_path = path.clone();
            tokio::spawn(async move {
                match handle.await {
                    Ok(Ok(reply)) => warn!(
                        path = %watched_path,
                        "request timed out and then resolved with response: {}",
                        reply.value()
                    ),
                    Ok(Err(err)) => error!(
                        path = %watched_path,
                        "timed out request errored out later: {err}"
                    ),
                    Err(join_err) => error!(
                        path = %watched_path,
                        "timed out request panicked later: {join_err}"
                    ),
                }
            });

            json_response(StatusCode::SERVICE_UNAVAILABLE, TIMEOUT_BODY.to_vec(), &[])
        }
        Ok(outcome) => {
            // Executing → Completed; the timer is disarmed with the race.
            let already = ctx.finished.swap(true, Ordering::SeqCst);
            debug_assert!(!already, "response written twice");

            match outcome {
                Ok(Ok(reply)) => {
                    let body = stringify(reply.value(), mode);
                    json_response(StatusCode::OK, body, &reply.headers)
                }
                Ok(Err(err)) => error_response(&err, mode),
                Err(join_err) => {
                    error!(path = %path, "handler panicked: {join_err}");
                    error_response(&ApiError::internal("Internal server error"), mode)
                }
            }
        }
    };

    // (TimedOut | Completed) → Responded.
    if let Some(session) = &ctx.session {
        telemetry::emit(
            &*shared.telemetry,
            Event::end(
                path.clone(),
                json!({ "subject_id": &session.subject_id, "query": &query }),
            ),
        );
    }
    debug!(
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = ctx.started_at.elapsed().as_millis() as u64,
        "request responded"
    );
    response
}

/// Maps a classified failure to its response: status from the taxonomy, body
/// `{"error":{"message","stack"?}}` with `stack` withheld in production.
pub(crate) fn error_response(err: &ApiError, mode: Mode) -> HttpResponse {
    let body = stringify(&err.body(!mode.is_production()), mode);
    json_response(err.status(), body, &[])
}
