//! HTTP forwarding for the Discord event bridge.
//!
//! Delivers one JSON POST per configured endpoint, retrying transient
//! failures with linear backoff and honoring `Retry-After` on 429s. Failures
//! are absorbed here and never propagated to callers.

mod error;
mod forwarder;

pub use error::ForwardError;
pub use forwarder::{ForwardJob, ForwardOutcome, Forwarder, ForwarderConfig};
