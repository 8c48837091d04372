//! End-to-end pipeline tests, driven through the in-process [`App`] — the
//! same seam `Server::serve` puts behind a TCP listener.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use serde_json::{json, Value};

use portico::{
    ApiError, App, Config, Event, EventKind, Method, Mode, Reply, Request, Router, Server,
    SessionManager, TelemetryError, TelemetrySink,
};

/// Sink that records every published event for assertions.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, kind: EventKind, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.kind == kind && e.name == name)
            .count()
    }
}

impl TelemetrySink for RecordingSink {
    fn publish(&self, event: Event) -> Result<(), TelemetryError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

fn test_config() -> Config {
    Config {
        mode: Mode::Test,
        ..Config::default()
    }
}

async fn send(
    app: &App,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, Vec<u8>, http::HeaderMap) {
    let mut builder = http::Request::builder().method(method).uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Full::new(Bytes::new())).unwrap();
    let response = app.handle(request).await;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec();
    (status, body, headers)
}

async fn get(app: &App, path: &str, headers: &[(&str, &str)]) -> (StatusCode, Vec<u8>, http::HeaderMap) {
    send(app, "GET", path, headers).await
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn routing_auth_and_error_mapping() {
    let router = Router::new()
        .public(Method::Get, "/test", |_req: Request| async {
            Ok::<_, ApiError>(json!({ "blah": "shizblah" }))
        })
        .on(Method::Get, "/protected", |_req: Request| async {
            Ok::<_, ApiError>(json!({ "blah": "shizblah" }))
        })
        .public(Method::Get, "/internal-error", |_req: Request| async {
            Err::<Value, _>(ApiError::internal("blahshizblah"))
        });
    let app = Server::new(test_config()).build(router);

    // Unregistered path.
    let (status, _, _) = get(&app, "/", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Unknown method string can never match.
    let (status, _, _) = send(&app, "BREW", "/test", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Public route needs no credentials.
    let (status, body, headers) = get(&app, "/test", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(json_body(&body), json!({ "blah": "shizblah" }));

    // Protected route without credentials: handler never runs.
    let (status, body, _) = get(&app, "/protected", &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let message = json_body(&body)["error"]["message"]
        .as_str()
        .unwrap()
        .to_owned();
    assert!(message.contains("not authenticated"), "{message}");

    // Handler failure maps through the taxonomy.
    let (status, body, _) = get(&app, "/internal-error", &[]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let parsed = json_body(&body);
    assert!(parsed["error"]["message"]
        .as_str()
        .unwrap()
        .contains("blahshizblah"));
    // Diagnostic detail is present outside production.
    assert!(parsed["error"]["stack"].is_string());
}

#[tokio::test]
async fn production_responses_are_compact_and_undetailed() {
    let config = Config {
        mode: Mode::Production,
        ..Config::default()
    };
    let router = Router::new().public(Method::Get, "/boom", |_req: Request| async {
        Err::<Value, _>(ApiError::internal("blahshizblah"))
    });
    let app = Server::new(config).build(router);

    let (status, body, _) = get(&app, "/boom", &[]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.contains(&b'\n'), "production bodies are compact");
    let parsed = json_body(&body);
    assert_eq!(parsed["error"]["message"], "blahshizblah");
    assert!(parsed["error"].get("stack").is_none());
}

#[tokio::test]
async fn duplicate_registration_keeps_the_last_handler() {
    let router = Router::new()
        .public(Method::Get, "/dup", |_req: Request| async {
            Ok::<_, ApiError>(json!({ "version": 1 }))
        })
        .public(Method::Get, "/dup", |_req: Request| async {
            Ok::<_, ApiError>(json!({ "version": 2 }))
        });
    let app = Server::new(test_config()).build(router);

    let (status, body, _) = get(&app, "/dup", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({ "version": 2 }));
}

#[tokio::test]
async fn slow_handler_yields_exactly_one_503_within_the_deadline() {
    let config = Config {
        mode: Mode::Test,
        request_timeout: Duration::from_millis(50),
        ..Config::default()
    };
    let router = Router::new().public(Method::Get, "/slow", |_req: Request| async {
        tokio::time::sleep(Duration::from_millis(400)).await;
        Ok::<_, ApiError>(json!({ "late": true }))
    });
    let app = Server::new(config).build(router);

    let started = Instant::now();
    let (status, body, headers) = get(&app, "/slow", &[]).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    // The divergent plain-string shape, byte for byte.
    assert_eq!(body, br#"{"error":"Request timed out"}"#);
    assert_eq!(headers["content-type"], "application/json");
    // Responded at the deadline, not when the handler finished.
    assert!(started.elapsed() < Duration::from_millis(300));

    // The abandoned handler finishing later must not disturb anything.
    tokio::time::sleep(Duration::from_millis(450)).await;
}

#[tokio::test]
async fn fast_handler_beats_the_clock() {
    let config = Config {
        mode: Mode::Test,
        request_timeout: Duration::from_millis(200),
        ..Config::default()
    };
    let router = Router::new().public(Method::Get, "/quick", |_req: Request| async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<_, ApiError>(json!({ "quick": true }))
    });
    let app = Server::new(config).build(router);

    let (status, body, _) = get(&app, "/quick", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({ "quick": true }));
}

#[tokio::test]
async fn authenticated_requests_emit_duration_markers() {
    let sink = Arc::new(RecordingSink::default());
    let router = Router::new()
        .on(Method::Get, "/guarded", |req: Request| async move {
            let session = req
                .session()
                .cloned()
                .ok_or_else(|| ApiError::internal("auth gate did not run"))?;
            Ok(json!({ "subject_id": session.subject_id }))
        })
        .public(Method::Get, "/open", |_req: Request| async {
            Ok::<_, ApiError>(json!({}))
        });
    let app = Server::new(test_config())
        .telemetry(sink.clone())
        .build(router);

    let grant = app.sessions().create_session("user-9").await.unwrap();
    assert_eq!(sink.count(EventKind::SingleEvent, "user_login"), 1);

    let auth = [("authorization", grant.session.token.as_str())];
    let (status, body, _) = get(&app, "/guarded?x=1", &auth).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["subject_id"], "user-9");

    assert_eq!(sink.count(EventKind::DurationStart, "/guarded"), 1);
    assert_eq!(sink.count(EventKind::DurationEnd, "/guarded"), 1);
    let start = sink
        .events()
        .into_iter()
        .find(|e| e.kind == EventKind::DurationStart)
        .unwrap();
    assert_eq!(start.data["subject_id"], "user-9");
    assert_eq!(start.data["query"]["x"], "1");

    // Public and unauthenticated requests emit no duration markers.
    get(&app, "/open", &[]).await;
    let (status, _, _) = get(&app, "/guarded", &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(sink.count(EventKind::DurationStart, "/open"), 0);
    assert_eq!(sink.count(EventKind::DurationStart, "/guarded"), 1); // unchanged
    assert_eq!(sink.count(EventKind::DurationEnd, "/guarded"), 1); // unchanged
}

#[tokio::test]
async fn timed_out_authenticated_request_still_closes_its_marker_pair() {
    let sink = Arc::new(RecordingSink::default());
    let config = Config {
        mode: Mode::Test,
        request_timeout: Duration::from_millis(50),
        ..Config::default()
    };
    let router = Router::new().on(Method::Get, "/slow-auth", |_req: Request| async {
        tokio::time::sleep(Duration::from_millis(400)).await;
        Ok::<_, ApiError>(json!({}))
    });
    let app = Server::new(config).telemetry(sink.clone()).build(router);

    let grant = app.sessions().create_session("user-2").await.unwrap();
    let auth = [("authorization", grant.session.token.as_str())];
    let (status, _, _) = get(&app, "/slow-auth", &auth).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(sink.count(EventKind::DurationStart, "/slow-auth"), 1);
    assert_eq!(sink.count(EventKind::DurationEnd, "/slow-auth"), 1);
}

#[tokio::test]
async fn cookie_mode_login_round_trip() {
    let config = Config {
        mode: Mode::Test,
        cookie_sessions: true,
        cookie_secret: "0123456789abcdef0123456789abcdef".to_owned(),
        ..Config::default()
    };
    let sessions = SessionManager::new(
        &config,
        Arc::new(portico::MemoryStore::new()),
        Arc::new(portico::LogSink),
    );

    let login_sessions = sessions.clone();
    let router = Router::new()
        .public(Method::Post, "/login", move |_req: Request| {
            let sessions = login_sessions.clone();
            async move {
                let grant = sessions.create_session("user-7").await?;
                let mut reply = Reply::new(json!({ "token": grant.session.token }));
                if let Some(cookie) = grant.set_cookie {
                    reply = reply.header("set-cookie", cookie);
                }
                Ok(reply)
            }
        })
        .on(Method::Get, "/me", |req: Request| async move {
            let session = req
                .session()
                .cloned()
                .ok_or_else(|| ApiError::internal("auth gate did not run"))?;
            Ok(json!({ "subject_id": session.subject_id }))
        });
    let app = Server::new(config).sessions(sessions).build(router);

    let (status, body, headers) = send(&app, "POST", "/login", &[]).await;
    assert_eq!(status, StatusCode::OK);
    let token = json_body(&body)["token"].as_str().unwrap().to_owned();
    let set_cookie = headers["set-cookie"].to_str().unwrap().to_owned();
    assert!(set_cookie.starts_with("sid="));
    let sid_pair = set_cookie.split(';').next().unwrap().to_owned();

    // Both credentials present: authenticated.
    let (status, body, _) = get(
        &app,
        "/me",
        &[("authorization", token.as_str()), ("cookie", sid_pair.as_str())],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["subject_id"], "user-7");

    // Bearer token alone is not enough in cookie mode.
    let (status, _, _) = get(&app, "/me", &[("authorization", token.as_str())]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A tampered cookie signature is rejected.
    let tampered = format!("{sid_pair}0");
    let (status, _, _) = get(
        &app,
        "/me",
        &[("authorization", token.as_str()), ("cookie", tampered.as_str())],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
