//! Wire-level types shared between the gateway client, router, and
//! forwarder crates of the Discord bridge.
#![deny(unsafe_code)]

pub mod intents;

pub use intents::Intents;
