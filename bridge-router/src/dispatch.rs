//! Fan-out dispatch: looks up a dispatched event's route and fires one
//! forward per enabled endpoint without waiting on any of them.

use std::sync::Arc;
use std::time::Duration;

use bridge_gateway::DispatchEvent;
use bridge_http::{ForwardJob, Forwarder};
use flume::Receiver;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::envelope::Envelope;
use crate::route::RouteTable;

/// Default cap on concurrently in-flight forwards, matching `http.
/// max_concurrent_forwards` in the configuration schema.
pub const DEFAULT_MAX_CONCURRENT_FORWARDS: usize = 100;

/// Owns the route table and forwarder, and performs non-blocking dispatch.
///
/// `dispatch` never awaits a forward to completion — it spawns one task per
/// endpoint and returns immediately, so a slow or dead sink never backs up
/// the Gateway's read loop. Every spawned task is tracked in `forward_tasks`
/// so a caller can later wait for them to drain (see [`Router::drain`])
/// instead of only waiting on the dispatch loop itself.
pub struct Router {
    routes: RouteTable,
    forwarder: Arc<Forwarder>,
    /// Bounds concurrent in-flight forwards. `None` means unbounded.
    concurrency_limit: Option<Arc<Semaphore>>,
    forward_tasks: Mutex<JoinSet<()>>,
}

impl Router {
    pub fn new(routes: RouteTable, forwarder: Forwarder) -> Self {
        Self::with_concurrency_limit(routes, forwarder, Some(DEFAULT_MAX_CONCURRENT_FORWARDS))
    }

    /// Build a Router with an explicit (or disabled, via `None`) concurrency
    /// bound on simultaneously in-flight forwards.
    pub fn with_concurrency_limit(
        routes: RouteTable,
        forwarder: Forwarder,
        max_concurrent_forwards: Option<usize>,
    ) -> Self {
        Self {
            routes,
            forwarder: Arc::new(forwarder),
            concurrency_limit: max_concurrent_forwards.map(|n| Arc::new(Semaphore::new(n))),
            forward_tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Route a dispatched event. Returns immediately after spawning zero or
    /// more forwarding tasks; never awaits their completion.
    pub fn dispatch(&self, event_name: &str, payload: Value) {
        let Some(route) = self.routes.get(event_name) else {
            trace!(event = event_name, "no route configured, dropping");
            return;
        };

        if !route.enabled {
            trace!(event = event_name, "route disabled, dropping");
            return;
        }

        if route.endpoints.is_empty() {
            return;
        }

        let envelope = Envelope::new(event_name, payload);

        for url in &route.endpoints {
            let job = ForwardJob {
                event_name: event_name.to_string(),
                url: url.clone(),
                body: envelope.clone(),
            };
            self.spawn_forward(job);
        }
    }

    /// Drain dispatched events from the Gateway Client and route each one,
    /// until `cancel` fires or the channel closes (the Gateway Client has
    /// stopped for good).
    ///
    /// Events are handled one at a time in the order received — `dispatch`
    /// itself never blocks, so this loop stays far ahead of any slow sink.
    pub async fn run(&self, events: Receiver<DispatchEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("router loop cancelled");
                    break;
                }
                event = events.recv_async() => {
                    match event {
                        Ok(event) => self.dispatch(&event.name, event.data),
                        Err(_) => {
                            info!("dispatch channel closed, stopping router loop");
                            break;
                        }
                    }
                }
            }
        }
    }

    fn spawn_forward(&self, job: ForwardJob<Envelope>) {
        let forwarder = Arc::clone(&self.forwarder);
        let limit = self.concurrency_limit.clone();

        self.forward_tasks.lock().spawn(async move {
            let _permit = match &limit {
                Some(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        warn!(
                            event = %job.event_name,
                            url = %job.url,
                            "concurrent forward limit reached, dropping dispatch"
                        );
                        return;
                    }
                },
                None => None,
            };

            let outcome = forwarder.forward(job).await;
            debug!(?outcome, "forward complete");
        });
    }

    /// Wait for every spawned forward task to finish, up to `timeout`.
    ///
    /// The tracked [`JoinSet`] is swapped out for an empty one up front so
    /// this never holds `forward_tasks`'s lock across an await point — the
    /// caller is expected to have already stopped [`Router::run`], so no new
    /// task is spawned into the set while this drains it. Any task still
    /// outstanding when `timeout` elapses is aborted; the number aborted is
    /// returned (`0` means everything drained cleanly).
    pub async fn drain(&self, timeout: Duration) -> usize {
        let mut tasks = std::mem::take(&mut *self.forward_tasks.lock());
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if tasks.is_empty() {
                return 0;
            }

            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return 0,
                Err(_) => {
                    let outstanding = tasks.len();
                    tasks.abort_all();
                    return outstanding;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{build_route_table, Route};
    use bridge_http::ForwarderConfig;
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn forwarder() -> Forwarder {
        Forwarder::new(Client::new(), ForwarderConfig::default())
    }

    #[tokio::test]
    async fn test_dispatch_drops_unconfigured_event() {
        let routes = build_route_table([]);
        let router = Router::new(routes, forwarder());
        router.dispatch("MESSAGE_CREATE", json!({"id": "1"}));
        // No endpoint configured: nothing to await, nothing should panic.
    }

    #[tokio::test]
    async fn test_dispatch_drops_disabled_route() {
        let routes = build_route_table([Route {
            event_name: "MESSAGE_CREATE".into(),
            enabled: false,
            endpoints: vec!["https://example.invalid/sink".into()],
        }]);
        let router = Router::new(routes, forwarder());
        router.dispatch("MESSAGE_CREATE", json!({"id": "1"}));
    }

    #[tokio::test]
    async fn test_dispatch_posts_envelope_to_enabled_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sink"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let routes = build_route_table([Route {
            event_name: "MESSAGE_CREATE".into(),
            enabled: true,
            endpoints: vec![format!("{}/sink", server.uri())],
        }]);
        let router = Router::new(routes, forwarder());
        router.dispatch("MESSAGE_CREATE", json!({"id": "42"}));

        assert_eq!(router.drain(Duration::from_secs(2)).await, 0);
    }

    #[tokio::test]
    async fn test_dispatch_fans_out_to_every_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let routes = build_route_table([Route {
            event_name: "MESSAGE_CREATE".into(),
            enabled: true,
            endpoints: vec![format!("{}/a", server.uri()), format!("{}/b", server.uri())],
        }]);
        let router = Router::new(routes, forwarder());
        router.dispatch("MESSAGE_CREATE", json!({"id": "1"}));

        assert_eq!(router.drain(Duration::from_secs(2)).await, 0);
    }

    #[tokio::test]
    async fn test_drain_waits_for_outstanding_forward() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
            .expect(1)
            .mount(&server)
            .await;

        let routes = build_route_table([Route {
            event_name: "MESSAGE_CREATE".into(),
            enabled: true,
            endpoints: vec![format!("{}/slow", server.uri())],
        }]);
        let router = Router::new(routes, forwarder());
        router.dispatch("MESSAGE_CREATE", json!({"id": "1"}));

        assert_eq!(router.drain(Duration::from_secs(2)).await, 0);
    }

    #[tokio::test]
    async fn test_drain_aborts_outstanding_forward_after_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hangs"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let routes = build_route_table([Route {
            event_name: "MESSAGE_CREATE".into(),
            enabled: true,
            endpoints: vec![format!("{}/hangs", server.uri())],
        }]);
        let router = Router::new(routes, forwarder());
        router.dispatch("MESSAGE_CREATE", json!({"id": "1"}));

        assert_eq!(router.drain(Duration::from_millis(100)).await, 1);
    }
}
