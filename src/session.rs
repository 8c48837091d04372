//! Session issuance and validation.
//!
//! A session binds an opaque bearer token (and, in cookie mode, a secondary
//! `sid` delivered via a signed cookie) to a subject identity. The payload
//! lives in the [`SessionStore`] under a key derived from the credentials;
//! the store's TTL is the only expiry mechanism.
//!
//! The two identifiers are independent so bearer-only clients (mobile/API)
//! and cookie-based browser clients share the same backing store and key
//! derivation, toggled by one configuration flag.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;
use crate::request::Request;
use crate::store::SessionStore;
use crate::telemetry::{self, Event, TelemetrySink};

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie used in cookie mode.
const SESSION_COOKIE: &str = "sid";

/// A resolved session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// The bearer token presented in the `authorization` header.
    pub token: String,
    pub subject_id: String,
    /// Milliseconds since the Unix epoch at issuance.
    pub created_at: u64,
}

/// The stored payload. The token is part of the key, never the payload.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    subject_id: String,
    created_at: u64,
}

/// Result of [`SessionManager::create_session`].
#[derive(Clone, Debug)]
pub struct SessionGrant {
    pub session: Session,
    /// A `set-cookie` header value carrying the signed `sid`. `None` outside
    /// cookie mode.
    pub set_cookie: Option<String>,
}

/// Issues and validates sessions against the backing store.
///
/// Cheap to clone; handlers that issue sessions (login) capture a clone at
/// registration time.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    telemetry: Arc<dyn TelemetrySink>,
    cookie_sessions: bool,
    cookie_secret: String,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(
        config: &Config,
        store: Arc<dyn SessionStore>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            store,
            telemetry,
            cookie_sessions: config.cookie_sessions,
            cookie_secret: config.cookie_secret.clone(),
            ttl: config.session_ttl,
        }
    }

    /// Issues a new session for `subject_id`.
    ///
    /// Generates two independent random identifiers and stores the payload
    /// with create-if-absent semantics. A key collision (already present)
    /// fails with an internal error — with UUIDv4 identifiers this is
    /// vanishingly rare and not worth a retry loop.
    pub async fn create_session(&self, subject_id: &str) -> Result<SessionGrant, ApiError> {
        let token = Uuid::new_v4().to_string();
        let sid = Uuid::new_v4().to_string();
        let created_at = unix_millis();

        let payload = serde_json::to_string(&StoredSession {
            subject_id: subject_id.to_owned(),
            created_at,
        })
        .map_err(ApiError::internal_from)?;

        let key = self.session_key(&token, &sid);
        let created = self
            .store
            .set_if_absent(&key, &payload, self.ttl)
            .await
            .map_err(ApiError::internal_from)?;
        if !created {
            return Err(ApiError::internal("Internal server error"));
        }

        telemetry::emit(
            &*self.telemetry,
            Event::single("user_login", json!({ "subject_id": subject_id })),
        );

        let set_cookie = self.cookie_sessions.then(|| {
            let signed = sign_value(&sid, &self.cookie_secret);
            format!(
                "{SESSION_COOKIE}={signed}; HttpOnly; Path=/; Max-Age={}",
                self.ttl.as_secs()
            )
        });

        Ok(SessionGrant {
            session: Session {
                token,
                subject_id: subject_id.to_owned(),
                created_at,
            },
            set_cookie,
        })
    }

    /// Validates the credentials on `req` and returns the stored session.
    ///
    /// Any missing or unverifiable credential, store miss, or corrupt stored
    /// payload resolves to the same `401 Unauthorized` — a corrupt session is
    /// logged as a warning but never surfaced as a distinct failure kind.
    pub async fn resolve_session(&self, req: &Request) -> Result<Session, ApiError> {
        let token = match req.header("authorization") {
            Some(token) if !token.is_empty() => token.to_owned(),
            _ => return Err(not_authenticated()),
        };

        let sid = if self.cookie_sessions {
            match req
                .cookie(SESSION_COOKIE)
                .and_then(|raw| verify_value(raw, &self.cookie_secret))
            {
                Some(sid) => sid,
                None => return Err(not_authenticated()),
            }
        } else {
            String::new()
        };

        debug!(path = req.path(), "received auth request");

        let key = self.session_key(&token, &sid);
        let stored = self
            .store
            .get(&key)
            .await
            .map_err(ApiError::internal_from)?;
        let Some(raw) = stored else {
            return Err(not_authenticated());
        };

        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(payload) => Ok(Session {
                token,
                subject_id: payload.subject_id,
                created_at: payload.created_at,
            }),
            Err(err) => {
                warn!("got non-JSON session from store: {err}");
                Err(not_authenticated())
            }
        }
    }

    /// Derives the store lookup key. Cookie mode mixes in the secondary id so
    /// both credentials are required to locate the payload.
    fn session_key(&self, token: &str, sid: &str) -> String {
        if self.cookie_sessions {
            format!("user({token}:{sid})")
        } else {
            format!("user({token})")
        }
    }
}

fn not_authenticated() -> ApiError {
    ApiError::unauthorized("User is not authenticated")
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Cookie signing ────────────────────────────────────────────────────────────

/// Appends a base64url HMAC-SHA256 tag: `{value}.{signature}`.
fn sign_value(value: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(value.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{value}.{signature}")
}

/// Verifies a signed cookie value, returning the inner value.
///
/// Signature comparison is constant-time via `Mac::verify_slice`.
fn verify_value(raw: &str, secret: &str) -> Option<String> {
    let (value, signature) = raw.rsplit_once('.')?;
    let tag = URL_SAFE_NO_PAD.decode(signature).ok()?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(value.as_bytes());
    mac.verify_slice(&tag).ok()?;
    Some(value.to_owned())
}
