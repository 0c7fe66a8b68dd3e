//! Dispatch events handed from the Gateway Client to the Router.
//!
//! Discord's DISPATCH payloads are heterogeneous JSON; this crate does not
//! parse them into typed entities (see the crate-level docs). `t` and `s`
//! are the only fields the Gateway Client itself inspects.

use serde_json::Value;

/// One opcode-0 DISPATCH frame, ready to hand to the Router.
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    /// The Gateway `t` field, e.g. `"MESSAGE_CREATE"`.
    pub name: String,

    /// The Gateway `s` field at the time this event was received.
    pub sequence: u64,

    /// The Gateway `d` field, preserved structurally.
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_event_preserves_payload() {
        let data = serde_json::json!({"id": "42"});
        let event = DispatchEvent {
            name: "MESSAGE_CREATE".to_string(),
            sequence: 1,
            data: data.clone(),
        };
        assert_eq!(event.name, "MESSAGE_CREATE");
        assert_eq!(event.sequence, 1);
        assert_eq!(event.data, data);
    }
}
