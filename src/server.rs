//! HTTP server, dispatch boundary, and graceful shutdown.
//!
//! [`Server`] wires the process-wide collaborators together: configuration,
//! the session store client (constructed once, passed by handle — no ambient
//! global), and the telemetry sink. [`Server::build`] produces an [`App`]
//! that handles requests in-process, which is also the seam the integration
//! tests drive; [`Server::serve`] puts the same `App` behind a TCP listener.
//!
//! Shutdown: on SIGTERM or Ctrl-C the accept loop stops immediately and
//! every in-flight connection task is drained before `serve` returns.

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{ApiError, ServerError};
use crate::method::Method;
use crate::pipeline::{self, Shared};
use crate::request::{parse_query, Request};
use crate::response::HttpResponse;
use crate::router::Router;
use crate::session::SessionManager;
use crate::store::{MemoryStore, SessionStore};
use crate::telemetry::{LogSink, TelemetrySink};

/// The HTTP server builder.
///
/// Defaults to an in-memory session store and the log-only telemetry sink;
/// production deployments swap both in before serving.
pub struct Server {
    config: Config,
    store: Arc<dyn SessionStore>,
    telemetry: Arc<dyn TelemetrySink>,
    sessions: Option<SessionManager>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: Arc::new(MemoryStore::new()),
            telemetry: Arc::new(LogSink),
            sessions: None,
        }
    }

    /// Replaces the session store client.
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    /// Replaces the telemetry sink.
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    /// Uses an externally constructed [`SessionManager`] — for applications
    /// whose login handlers hold a clone of the same manager.
    pub fn sessions(mut self, sessions: SessionManager) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Assembles the in-process application without binding a socket.
    pub fn build(self, router: Router) -> App {
        let sessions = self.sessions.unwrap_or_else(|| {
            SessionManager::new(&self.config, Arc::clone(&self.store), Arc::clone(&self.telemetry))
        });
        App {
            inner: Arc::new(AppInner {
                router,
                shared: Shared {
                    config: self.config,
                    sessions,
                    telemetry: self.telemetry,
                },
            }),
        }
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), ServerError> {
        let port = self.config.port;
        self.build(router).listen(port).await
    }
}

struct AppInner {
    router: Router,
    shared: Shared,
}

/// The assembled application: router plus shared pipeline state.
///
/// Cloning is cheap (one `Arc`); every connection task holds a clone.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    /// The session manager this app authenticates against.
    pub fn sessions(&self) -> &SessionManager {
        &self.inner.shared.sessions
    }

    /// Handles one request in-process: resolves the route, collects the
    /// body, and runs the pipeline. Unmatched `(method, path)` pairs — and
    /// unknown method strings — map to 404 here, at the dispatch boundary.
    ///
    /// All failures become responses; callers never see an error.
    pub async fn handle<B>(&self, req: http::Request<B>) -> HttpResponse
    where
        B: hyper::body::Body + Send,
        B::Data: Send,
        B::Error: std::fmt::Display,
    {
        let mode = self.inner.shared.config.mode;
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_owned();

        let route = parts
            .method
            .as_str()
            .parse::<Method>()
            .ok()
            .and_then(|method| self.inner.router.lookup(method, &path).map(|r| (method, r)));
        let Some((method, route)) = route else {
            return pipeline::error_response(&ApiError::not_found("Not found"), mode);
        };

        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                warn!(path = %path, "failed to read request body: {err}");
                return pipeline::error_response(
                    &ApiError::bad_request("failed to read request body"),
                    mode,
                );
            }
        };

        let request = Request::new(
            method,
            path,
            parse_query(parts.uri.query()),
            parts.headers,
            bytes,
        );
        pipeline::run(&self.inner.shared, route, request).await
    }

    async fn listen(self, port: u16) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;

        info!(
            addr = %addr,
            public_url = %self.inner.shared.config.public_url,
            routes = self.inner.router.len(),
            "portico listening"
        );

        // JoinSet tracks every spawned connection task so shutdown can wait
        // for them all to finish.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // `biased` checks shutdown first so a SIGTERM immediately
                // stops accepting new connections, even if more are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = self.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // The closure runs once per request on the
                        // connection, not once per connection.
                        let svc = service_fn(move |req| {
                            let app = app.clone();
                            async move {
                                Ok::<HttpResponse, std::convert::Infallible>(app.handle(req).await)
                            }
                        });

                        // The auto builder handles HTTP/1.1 and HTTP/2,
                        // whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Drain: wait for every in-flight connection before returning.
        while tasks.join_next().await.is_some() {}

        info!("portico stopped");
        Ok(())
    }
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both SIGTERM (sent by orchestrators) and SIGINT
/// (Ctrl-C, for local dev). On other platforms only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
