//! Gateway error types using thiserror.
//!
//! All errors raised by `bridge-gateway` are represented by [`GatewayError`].
//! No `.unwrap()` calls are used outside of tests.

use thiserror::Error;

/// Errors that can occur during Gateway Client operation.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// WebSocket connection or protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to parse a JSON payload.
    #[error("JSON decode error: {0}")]
    JsonDecode(String),

    /// Session was invalidated by Discord.
    /// The boolean indicates if the session is resumable.
    #[error("Session invalidated, resumable: {resumable}")]
    InvalidSession {
        /// Whether the session can be resumed.
        resumable: bool,
    },

    /// Connection was closed by Discord or the underlying transport.
    #[error("Connection closed: code={code}, reason={reason}")]
    Closed {
        /// WebSocket close code (0 when the transport gave none, e.g. abnormal
        /// closure or a locally detected protocol violation).
        code: u16,
        /// Close reason.
        reason: String,
    },

    /// Heartbeat acknowledgment was not received before the next heartbeat
    /// was due. The connection is considered zombied.
    #[error("Heartbeat acknowledgment timeout")]
    HeartbeatTimeout,

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to send a decoded event to the Router.
    #[error("channel send error: {0}")]
    ChannelSend(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::JsonDecode(err.to_string())
    }
}

impl<T> From<flume::SendError<T>> for GatewayError {
    fn from(err: flume::SendError<T>) -> Self {
        GatewayError::ChannelSend(err.to_string())
    }
}

/// Discord Gateway close codes.
///
/// See: <https://discord.com/developers/docs/topics/opcodes-and-status-codes#gateway-gateway-close-event-codes>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    /// Unknown error occurred.
    UnknownError = 4000,
    /// Invalid opcode sent.
    UnknownOpcode = 4001,
    /// Invalid payload (decode error).
    DecodeError = 4002,
    /// Payload sent before identifying.
    NotAuthenticated = 4003,
    /// Invalid token.
    AuthenticationFailed = 4004,
    /// Already authenticated.
    AlreadyAuthenticated = 4005,
    /// Invalid sequence number for resume.
    InvalidSeq = 4007,
    /// Rate limited.
    RateLimited = 4008,
    /// Session timed out.
    SessionTimedOut = 4009,
    /// Invalid shard configuration.
    InvalidShard = 4010,
    /// Too many guilds (sharding required).
    ShardingRequired = 4011,
    /// Invalid API version.
    InvalidApiVersion = 4012,
    /// Invalid intents.
    InvalidIntents = 4013,
    /// Disallowed intents (privileged intent not enabled).
    DisallowedIntents = 4014,
}

impl CloseCode {
    /// Try to convert a raw close code into this enum. Returns `None` for
    /// codes Discord has not documented (e.g. transport-level 1006), which
    /// are treated as reconnectable and resumable by the caller.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            4000 => Some(CloseCode::UnknownError),
            4001 => Some(CloseCode::UnknownOpcode),
            4002 => Some(CloseCode::DecodeError),
            4003 => Some(CloseCode::NotAuthenticated),
            4004 => Some(CloseCode::AuthenticationFailed),
            4005 => Some(CloseCode::AlreadyAuthenticated),
            4007 => Some(CloseCode::InvalidSeq),
            4008 => Some(CloseCode::RateLimited),
            4009 => Some(CloseCode::SessionTimedOut),
            4010 => Some(CloseCode::InvalidShard),
            4011 => Some(CloseCode::ShardingRequired),
            4012 => Some(CloseCode::InvalidApiVersion),
            4013 => Some(CloseCode::InvalidIntents),
            4014 => Some(CloseCode::DisallowedIntents),
            _ => None,
        }
    }

    /// Returns whether this close code is fatal: the Gateway Client must
    /// stop and surface the error to the Supervisor rather than reconnect.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            CloseCode::AuthenticationFailed
                | CloseCode::InvalidShard
                | CloseCode::ShardingRequired
                | CloseCode::InvalidApiVersion
                | CloseCode::InvalidIntents
                | CloseCode::DisallowedIntents
        )
    }
}

/// Returns whether a raw close code is fatal (non-reconnectable).
///
/// Codes Discord has not documented — including the transport-level 1006
/// abnormal closure a client sees on a bare TCP drop — are never fatal; the
/// client reconnects and resumes if session state survived the drop.
pub fn is_fatal_close_code(code: u16) -> bool {
    CloseCode::from_code(code).is_some_and(CloseCode::is_fatal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_fatal() {
        assert!(is_fatal_close_code(4004));
        assert!(is_fatal_close_code(4013));
        assert!(is_fatal_close_code(4014));
        assert!(!is_fatal_close_code(4000));
        assert!(!is_fatal_close_code(1006));
        assert!(!is_fatal_close_code(1000));
    }

    #[test]
    fn test_close_code_from_code() {
        assert_eq!(CloseCode::from_code(4013), Some(CloseCode::InvalidIntents));
        assert_eq!(CloseCode::from_code(1006), None);
    }
}
