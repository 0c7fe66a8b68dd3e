//! Wires Config → Router → Gateway Client and owns the process-level
//! cancellation signal.

use std::sync::Arc;
use std::time::Duration;

use bridge_gateway::{GatewayClient, GatewayConfig};
use bridge_http::{Forwarder, ForwarderConfig};
use bridge_router::{build_route_table, Router};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::BridgeError;

/// Bounded wait for in-flight forwards to drain after cancellation, before
/// the process exits regardless.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Runs the bridge to completion: connects the Gateway Client, routes every
/// dispatched event, and returns once `cancel` fires or a fatal Gateway
/// error escapes.
pub async fn run(config: Config, cancel: CancellationToken) -> Result<(), BridgeError> {
    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|e| BridgeError::Config(format!("building HTTP client: {e}")))?;

    let forwarder = Forwarder::new(
        http_client,
        ForwarderConfig {
            timeout: config.http_timeout,
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay,
        },
    );

    let routes = build_route_table(config.routes.clone());
    let router = Arc::new(Router::with_concurrency_limit(
        routes,
        forwarder,
        config.max_concurrent_forwards,
    ));

    let gateway_config = GatewayConfig {
        token: config.token.clone(),
        intents: config.intents,
        gateway_url: bridge_gateway::DEFAULT_GATEWAY_URL.to_string(),
    };
    let (gateway, events) = GatewayClient::new(gateway_config);

    let router_cancel = cancel.clone();
    let router_task = tokio::spawn({
        let router = Arc::clone(&router);
        async move {
            router.run(events, router_cancel).await;
        }
    });

    let gateway_result = gateway.run(cancel.clone()).await;
    cancel.cancel();

    // The dispatch loop itself stops as soon as `cancel` fires; the forwards
    // it already spawned are a separate matter and may still be in flight.
    if let Err(err) = router_task.await {
        warn!(?err, "router dispatch loop panicked");
    }

    let outstanding = router.drain(SHUTDOWN_GRACE_PERIOD).await;
    if outstanding > 0 {
        warn!(
            outstanding,
            "forwards still in flight after the shutdown grace period, aborting"
        );
    }

    match gateway_result {
        Ok(()) => {
            info!("gateway session ended cleanly");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "gateway terminated with a fatal error");
            Err(BridgeError::Gateway(err))
        }
    }
}

/// Install a `CancellationToken` that fires on SIGINT (all platforms) or
/// SIGTERM (unix).
pub fn install_shutdown_signal() -> CancellationToken {
    let token = CancellationToken::new();

    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received SIGINT, shutting down");
                token.cancel();
            }
        });
    }

    #[cfg(unix)]
    {
        let token = token.clone();
        tokio::spawn(async move {
            let Ok(mut sigterm) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            else {
                return;
            };
            sigterm.recv().await;
            info!("received SIGTERM, shutting down");
            token.cancel();
        });
    }

    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_install_shutdown_signal_starts_uncancelled() {
        let token = install_shutdown_signal();
        assert!(!token.is_cancelled());
    }
}
