//! Gateway payload structures.
//!
//! These represent the JSON payloads sent and received over the Gateway
//! WebSocket. `d` is always carried as an untyped [`serde_json::Value`] — the
//! bridge never constructs typed Discord entities from dispatch payloads.

use crate::opcode::OpCode;
use bridge_model::Intents;
use serde::{Deserialize, Serialize};

/// A raw Gateway payload, used for the first-pass opcode/sequence read of
/// every inbound frame.
#[derive(Debug, Deserialize)]
pub struct RawGatewayPayload {
    /// Opcode for the payload.
    pub op: OpCode,

    /// Event data, left unparsed until the opcode is known.
    pub d: Option<serde_json::Value>,

    /// Sequence number (present only on opcode 0 DISPATCH).
    pub s: Option<u64>,

    /// Event name (present only on opcode 0 DISPATCH).
    pub t: Option<String>,
}

/// A fully typed outbound Gateway payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload<D> {
    /// Opcode for the payload.
    pub op: OpCode,

    /// Event data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<D>,

    /// Sequence number (for Dispatch events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name (for Dispatch events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl<D: Serialize> GatewayPayload<D> {
    /// Create a new payload with only opcode and data.
    pub fn new(op: OpCode, data: D) -> Self {
        Self {
            op,
            d: Some(data),
            s: None,
            t: None,
        }
    }
}

/// Payload for the Hello opcode (op 10).
#[derive(Debug, Clone, Deserialize)]
pub struct HelloPayload {
    /// Interval (in milliseconds) at which to send heartbeats.
    pub heartbeat_interval: u64,
}

/// Payload for the Identify opcode (op 2). Sent exactly once per
/// non-resume connection.
#[derive(Debug, Clone, Serialize)]
pub struct IdentifyPayload<'a> {
    /// Authentication token, including the literal `Bot ` prefix.
    pub token: std::borrow::Cow<'a, str>,

    /// Gateway intents.
    pub intents: Intents,

    /// Connection properties.
    pub properties: ConnectionProperties<'a>,
}

impl<'a> IdentifyPayload<'a> {
    pub fn new(token: impl Into<std::borrow::Cow<'a, str>>, intents: Intents) -> Self {
        Self {
            token: token.into(),
            intents,
            properties: ConnectionProperties::default(),
        }
    }
}

/// Connection properties sent with Identify (`browser`/`device` name the
/// product, per Discord's documented convention).
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionProperties<'a> {
    pub os: std::borrow::Cow<'a, str>,
    pub browser: std::borrow::Cow<'a, str>,
    pub device: std::borrow::Cow<'a, str>,
}

impl<'a> Default for ConnectionProperties<'a> {
    fn default() -> Self {
        Self {
            os: std::borrow::Cow::Owned(std::env::consts::OS.to_string()),
            browser: std::borrow::Cow::Borrowed("discord-bridge"),
            device: std::borrow::Cow::Borrowed("discord-bridge"),
        }
    }
}

/// Payload for the Resume opcode (op 6).
#[derive(Debug, Clone, Serialize)]
pub struct ResumePayload<'a> {
    pub token: std::borrow::Cow<'a, str>,
    pub session_id: std::borrow::Cow<'a, str>,
    pub seq: u64,
}

/// The subset of the READY dispatch payload the session machine cares
/// about. Everything else in the payload is forwarded to the Router
/// untouched as part of the ordinary `DispatchEvent`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadySessionData {
    pub session_id: String,
    pub resume_gateway_url: String,
}

/// Build the heartbeat payload (`{"op":1,"d":<seq or null>}`) as a string,
/// avoiding an intermediate struct allocation for this hot-path send.
pub fn create_heartbeat_payload(sequence: Option<u64>) -> String {
    match sequence {
        Some(seq) => format!(r#"{{"op":1,"d":{}}}"#, seq),
        None => r#"{"op":1,"d":null}"#.to_string(),
    }
}
