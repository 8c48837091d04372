//! Request-lifecycle telemetry.
//!
//! Events are fire-and-forget observability markers: a `single_event` for
//! point-in-time facts (a login), and `duration_start`/`duration_end` pairs
//! bracketing authenticated request handling, keyed by request path.
//!
//! Publishing must never block or fail the response path. The pipeline routes
//! every publish through [`emit`], which logs and swallows sink errors.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Lifecycle marker kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SingleEvent,
    DurationStart,
    DurationEnd,
}

/// One published telemetry event.
#[derive(Clone, Debug, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Marker name — the request path for duration pairs.
    pub name: String,
    pub data: Value,
    /// Milliseconds since the Unix epoch, stamped at construction.
    pub timestamp: u64,
}

impl Event {
    pub fn single(name: impl Into<String>, data: Value) -> Self {
        Self::new(EventKind::SingleEvent, name, data)
    }

    pub fn start(name: impl Into<String>, data: Value) -> Self {
        Self::new(EventKind::DurationStart, name, data)
    }

    pub fn end(name: impl Into<String>, data: Value) -> Self {
        Self::new(EventKind::DurationEnd, name, data)
    }

    fn new(kind: EventKind, name: impl Into<String>, data: Value) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            kind,
            name: name.into(),
            data,
            timestamp,
        }
    }
}

/// Error returned by a sink that could not publish.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("publish failed: {0}")]
    Publish(String),
}

/// A best-effort event publisher.
///
/// Implementations must not block: buffer, forward to a channel, or drop.
/// Errors are reported to the caller so they can be logged, but the pipeline
/// never propagates them to the client.
pub trait TelemetrySink: Send + Sync + 'static {
    fn publish(&self, event: Event) -> Result<(), TelemetryError>;
}

/// Default sink: writes each event to the debug log and nothing else.
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn publish(&self, event: Event) -> Result<(), TelemetryError> {
        debug!(
            kind = ?event.kind,
            name = %event.name,
            data = %event.data,
            "telemetry event"
        );
        Ok(())
    }
}

/// Publishes an event, swallowing (but logging) sink failures.
pub(crate) fn emit(sink: &dyn TelemetrySink, event: Event) {
    let name = event.name.clone();
    if let Err(err) = sink.publish(event) {
        warn!(name = %name, "dropping telemetry event: {err}");
    }
}
