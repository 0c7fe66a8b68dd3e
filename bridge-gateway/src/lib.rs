//! Discord Gateway session state machine for the event bridge.
#![deny(unsafe_code)]
//!
//! Maintains a single Gateway session — connect, identify, heartbeat,
//! resume, reconnect — and yields dispatched events to the Router. Event
//! payloads are never parsed into typed Discord entities; `d` is carried as
//! an opaque [`serde_json::Value`] from the wire to the Router.

mod client;
mod error;
mod event;
mod heartbeat;
mod opcode;
mod payload;
mod ratelimit;

pub use client::{GatewayClient, GatewayConfig, Phase};
pub use error::GatewayError;
pub use event::DispatchEvent;
pub use opcode::OpCode;
pub use payload::{ConnectionProperties, GatewayPayload, HelloPayload, IdentifyPayload, ResumePayload};
pub use ratelimit::IdentifyRateLimiter;

/// Discord Gateway API version used by this library.
pub const GATEWAY_VERSION: u8 = 10;

/// Default gateway URL used for the first connection of the process.
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";
