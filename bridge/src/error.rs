use thiserror::Error;

/// Unified error type for the bridge binary.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration invalid: missing token, malformed URL, unknown log
    /// level/format. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// A fatal Gateway error (close codes 4004, 4010-4014, or an
    /// unrecoverable I/O fault) escaped the Gateway Client's internal
    /// reconnect handling.
    #[error("gateway error: {0}")]
    Gateway(#[from] bridge_gateway::GatewayError),
}
