//! Discord Gateway opcodes.
//!
//! Opcodes define the type of payload being sent or received over the Gateway WebSocket.
//! Only the opcodes this bridge actually sends or receives are represented; presence,
//! voice-state, and member-request opcodes have no counterpart here.

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Discord Gateway operation codes relevant to a plain event-forwarding client.
///
/// See: <https://discord.com/developers/docs/topics/opcodes-and-status-codes#gateway-gateway-opcodes>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum OpCode {
    /// Dispatch - an event was dispatched.
    /// Direction: Receive
    Dispatch = 0,

    /// Heartbeat - keep the connection alive.
    /// Direction: Send/Receive
    Heartbeat = 1,

    /// Identify - start a new session.
    /// Direction: Send
    Identify = 2,

    /// Resume - resume a previous session.
    /// Direction: Send
    Resume = 6,

    /// Reconnect - server requested a reconnect.
    /// Direction: Receive
    Reconnect = 7,

    /// Invalid Session - session has been invalidated.
    /// Direction: Receive
    InvalidSession = 9,

    /// Hello - sent after connecting, contains heartbeat interval.
    /// Direction: Receive
    Hello = 10,

    /// Heartbeat ACK - acknowledgment of heartbeat received.
    /// Direction: Receive
    HeartbeatAck = 11,
}

impl OpCode {
    /// Returns whether this opcode is only received (never sent by this client).
    pub const fn is_receive_only(self) -> bool {
        matches!(
            self,
            OpCode::Dispatch
                | OpCode::Reconnect
                | OpCode::InvalidSession
                | OpCode::Hello
                | OpCode::HeartbeatAck
        )
    }

    /// Returns whether this opcode is only sent (never received by this client).
    pub const fn is_send_only(self) -> bool {
        matches!(self, OpCode::Identify | OpCode::Resume)
    }

    /// Returns whether this opcode can be both sent and received.
    pub const fn is_bidirectional(self) -> bool {
        matches!(self, OpCode::Heartbeat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_serialization() {
        let json = serde_json::to_string(&OpCode::Hello).unwrap();
        assert_eq!(json, "10");

        let opcode: OpCode = serde_json::from_str("10").unwrap();
        assert_eq!(opcode, OpCode::Hello);
    }

    #[test]
    fn test_opcode_direction() {
        assert!(OpCode::Dispatch.is_receive_only());
        assert!(OpCode::Identify.is_send_only());
        assert!(OpCode::Heartbeat.is_bidirectional());
    }
}
