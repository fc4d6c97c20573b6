// Event Emission
// Observer seam between the recording core and whatever front-end hosts it

use serde::Serialize;
use serde_json::{json, Value};

/// Encoder diagnostics forwarded line-by-line; payload `{ "line": .. }`.
pub const EVENT_LOG: &str = "recorder://log";
/// State and progress messages; payload is a [`StatusEvent`].
pub const EVENT_STATUS: &str = "recorder://status";
/// Encoder process finished; payload is a [`SessionEnded`].
pub const EVENT_SESSION_ENDED: &str = "recorder://ended";

/// User-visible weight of a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEnded {
    /// Final encoder exit code; -1 when the process left no status.
    pub exit_code: i32,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}

pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &str, _payload: Value) {}
}

pub fn emit_event<T: Serialize>(sink: &dyn EventSink, event: &str, payload: &T) {
    if let Ok(value) = serde_json::to_value(payload) {
        sink.emit(event, value);
    }
}

pub fn emit_status(sink: &dyn EventSink, severity: Severity, message: impl Into<String>) {
    emit_event(
        sink,
        EVENT_STATUS,
        &StatusEvent {
            message: message.into(),
            severity,
        },
    );
}

pub fn emit_log_line(sink: &dyn EventSink, line: &str) {
    sink.emit(EVENT_LOG, json!({ "line": line }));
}

/// Test sink that records every emission in order.
#[cfg(test)]
pub struct CollectingSink {
    events: std::sync::Mutex<Vec<(String, Value)>>,
}

#[cfg(test)]
impl CollectingSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    pub fn statuses(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter(|(name, _)| name == EVENT_STATUS)
            .map(|(_, payload)| {
                (
                    payload["severity"].as_str().unwrap_or_default().to_string(),
                    payload["message"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(name, _)| name == EVENT_LOG)
            .map(|(_, payload)| payload["line"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

#[cfg(test)]
impl EventSink for CollectingSink {
    fn emit(&self, event: &str, payload: Value) {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), payload));
    }
}
