//! The JSON envelope the Router wraps every dispatched event in before
//! handing it to the Forwarder.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

const SOURCE: &str = "discord-bridge";

/// The wire body POSTed to each configured endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Envelope {
    pub event_type: String,
    pub data: Value,
    pub timestamp: String,
    pub source: &'static str,
}

impl Envelope {
    /// Build an envelope for `event_name`/`payload`, stamping the current
    /// time — never the Gateway's own timestamp, since DISPATCH frames
    /// carry none.
    pub fn new(event_name: &str, payload: Value) -> Self {
        Self {
            event_type: event_name.to_string(),
            data: payload,
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            source: SOURCE,
        }
    }
}
