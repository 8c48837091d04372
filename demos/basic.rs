//! Minimal portico example — login, an authenticated endpoint, and health
//! checks.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -X POST http://localhost:8080/login
//!   curl http://localhost:8080/me -H "authorization: <token from /login>"
//!   curl http://localhost:8080/healthz

use std::sync::Arc;

use portico::{
    health, ApiError, Config, LogSink, MemoryStore, Method, Reply, Request, Router, Server,
    SessionManager,
};
use serde_json::{json, Value};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::from_env().expect("invalid configuration");
    let sessions = SessionManager::new(&config, Arc::new(MemoryStore::new()), Arc::new(LogSink));

    let login_sessions = sessions.clone();
    let app = Router::new()
        .public(Method::Post, "/login", move |req: Request| {
            let sessions = login_sessions.clone();
            async move { login(sessions, req).await }
        })
        .on(Method::Get, "/me", me)
        .public(Method::Get, "/healthz", health::liveness)
        .public(Method::Get, "/readyz", health::readiness);

    Server::new(config)
        .sessions(sessions)
        .serve(app)
        .await
        .expect("server error");
}

// POST /login
//
// A real application would check credentials from the request body first.
async fn login(sessions: SessionManager, _req: Request) -> Result<Reply, ApiError> {
    let grant = sessions.create_session("demo-user").await?;
    let mut reply = Reply::new(json!({ "token": grant.session.token }));
    if let Some(cookie) = grant.set_cookie {
        reply = reply.header("set-cookie", cookie);
    }
    Ok(reply)
}

// GET /me — only reachable with a valid session.
async fn me(req: Request) -> Result<Value, ApiError> {
    let session = req
        .session()
        .ok_or_else(|| ApiError::internal("auth gate did not run"))?;
    Ok(json!({
        "subject_id": session.subject_id,
        "created_at": session.created_at,
    }))
}
