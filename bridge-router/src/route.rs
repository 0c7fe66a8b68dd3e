//! The route table: a read-only mapping from Gateway event name to the
//! endpoints that should receive it.

use std::collections::HashMap;
use std::sync::Arc;

/// A single routing rule for one Gateway event name.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// The Gateway `t` field this route matches, e.g. `"MESSAGE_CREATE"`.
    pub event_name: String,
    /// Whether dispatches to this event should be forwarded at all.
    pub enabled: bool,
    /// Destination URLs. Delivered to independently and concurrently.
    pub endpoints: Vec<String>,
}

/// Built once from configuration and shared read-only for the life of the
/// process. Absent keys mean "drop"; there is no default route.
pub type RouteTable = Arc<HashMap<String, Route>>;

/// Build a [`RouteTable`] from a list of routes, keyed by event name.
///
/// Later entries for the same event name overwrite earlier ones — this
/// mirrors how a config file's list is folded into a map.
pub fn build_route_table(routes: impl IntoIterator<Item = Route>) -> RouteTable {
    let mut table = HashMap::new();
    for route in routes {
        table.insert(route.event_name.clone(), route);
    }
    Arc::new(table)
}
