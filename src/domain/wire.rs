//! Wire Message: the framed record the Wire Codec encodes and decodes.
//! Field layout only; encoding itself lives in `codec.rs`.

use serde::{Deserialize, Serialize};

use super::Value;

/// The binary protocol's version byte. Currently always `1`.
pub const PROTOCOL_VERSION: u8 = 1;

/// Message-type tag, per `spec.md` §3/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// A single atom submission.
    Submit = 1,
    /// A successful Atom Result.
    Result = 2,
    /// A failed Atom Result.
    Error = 3,
    /// Liveness probe.
    Ping = 4,
    /// Reactor self-registration.
    Register = 5,
    /// Multiple atoms in one frame.
    BatchSubmit = 6,
}

impl MessageType {
    /// Map a raw tag byte to a `MessageType`, or `None` if unrecognized.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MessageType::Submit),
            2 => Some(MessageType::Result),
            3 => Some(MessageType::Error),
            4 => Some(MessageType::Ping),
            5 => Some(MessageType::Register),
            6 => Some(MessageType::BatchSubmit),
            _ => None,
        }
    }

    /// This type's wire tag byte.
    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// The framed record exchanged over the binary protocol. Optional fields
/// default-omitted at their conventional defaults (`priority == 5`,
/// `ttl_secs == 30`) to keep frames short; the codec restores the default
/// on decode when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Protocol version byte.
    pub version: u8,
    /// Message-type tag.
    pub message_type: MessageType,
    /// Per-connection, monotonically increasing sequence number.
    pub sequence: u64,
    /// Epoch milliseconds at creation.
    pub timestamp_ms: u64,
    /// Sending endpoint's identifier.
    pub source: String,
    /// Receiving endpoint's identifier.
    pub destination: String,
    /// The message-type-specific payload.
    pub payload: Value,
    /// 1-10, default 5.
    pub priority: Option<u8>,
    /// Time-to-live in seconds, default 30.
    pub ttl_secs: Option<u32>,
    /// Ties a response to its request regardless of completion order.
    pub correlation_id: Option<String>,
}

impl WireMessage {
    /// The effective priority: the declared value, or the conventional
    /// default of 5.
    #[must_use]
    pub fn effective_priority(&self) -> u8 {
        self.priority.unwrap_or(5)
    }

    /// The effective time-to-live: the declared value, or the
    /// conventional default of 30s.
    #[must_use]
    pub fn effective_ttl_secs(&self) -> u32 {
        self.ttl_secs.unwrap_or(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_round_trips_through_tag() {
        for mt in [
            MessageType::Submit,
            MessageType::Result,
            MessageType::Error,
            MessageType::Ping,
            MessageType::Register,
            MessageType::BatchSubmit,
        ] {
            assert_eq!(MessageType::from_tag(mt.tag()), Some(mt));
        }
    }

    #[test]
    fn unrecognized_tag_is_none() {
        assert_eq!(MessageType::from_tag(0), None);
        assert_eq!(MessageType::from_tag(7), None);
    }

    #[test]
    fn defaults_apply_when_omitted() {
        let msg = WireMessage {
            version: PROTOCOL_VERSION,
            message_type: MessageType::Ping,
            sequence: 1,
            timestamp_ms: 0,
            source: "a".into(),
            destination: "b".into(),
            payload: Value::empty_map(),
            priority: None,
            ttl_secs: None,
            correlation_id: None,
        };
        assert_eq!(msg.effective_priority(), 5);
        assert_eq!(msg.effective_ttl_secs(), 30);
    }
}
