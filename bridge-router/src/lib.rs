//! Routes dispatched Gateway events to configured HTTP endpoints.
//!
//! The route table is built once from configuration and never mutates.
//! `Router::dispatch` looks up the event, builds an envelope, and hands one
//! [`bridge_http::ForwardJob`] per endpoint to the forwarder without
//! waiting — a slow or dead sink never backs up the Gateway's read loop.

mod dispatch;
mod envelope;
mod route;

pub use dispatch::{Router, DEFAULT_MAX_CONCURRENT_FORWARDS};
pub use envelope::Envelope;
pub use route::{build_route_table, Route, RouteTable};
