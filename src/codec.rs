//! Wire Codec: bidirectional translation between framed byte sequences
//! and Wire Messages. Never touches runtime state.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::domain::wire::{MessageType, PROTOCOL_VERSION};
use crate::domain::{Value, WireMessage};

/// All Wire Codec failures collapse to this single kind
/// (`CODEC_INVALID`); the codec never retries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// `bincode` rejected the byte sequence outright.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// The version byte did not match a version this codec understands.
    #[error("unknown protocol version {0}")]
    UnknownVersion(u8),
    /// The type tag did not match any known `MessageType`.
    #[error("unrecognized message type tag {0}")]
    UnrecognizedType(u8),
}

impl From<CodecError> for crate::error::PacketFlowError {
    fn from(err: CodecError) -> Self {
        crate::error::PacketFlowError::CodecInvalid(err.to_string())
    }
}

/// On-wire representation of a `WireMessage`, with the type tag kept as
/// a raw byte so an unrecognized tag is a decode error rather than a
/// deserialization panic, and optional fields omitted when they match
/// the conventional default (`priority == 5`, `ttl_secs == 30`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Frame {
    version: u8,
    type_tag: u8,
    sequence: u64,
    timestamp_ms: u64,
    source: String,
    destination: String,
    payload: Value,
    priority: Option<u8>,
    ttl_secs: Option<u32>,
    correlation_id: Option<String>,
}

/// Encode `message` into a compact binary frame.
pub fn encode(message: &WireMessage) -> Result<Vec<u8>, CodecError> {
    let frame = Frame {
        version: message.version,
        type_tag: message.message_type.tag(),
        sequence: message.sequence,
        timestamp_ms: message.timestamp_ms,
        source: message.source.clone(),
        destination: message.destination.clone(),
        payload: message.payload.clone(),
        priority: message.priority.filter(|p| *p != 5),
        ttl_secs: message.ttl_secs.filter(|t| *t != 30),
        correlation_id: message.correlation_id.clone(),
    };
    bincode::serialize(&frame).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Decode a binary frame into a `WireMessage`, or fail with
/// `CodecError` when the frame is malformed, version-unknown, or the
/// type tag is unrecognized. Unknown *optional* fields in a newer
/// version never fail decode.
pub fn decode(bytes: &[u8]) -> Result<WireMessage, CodecError> {
    let frame: Frame = bincode::deserialize(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;

    if frame.version != PROTOCOL_VERSION {
        return Err(CodecError::UnknownVersion(frame.version));
    }

    let message_type =
        MessageType::from_tag(frame.type_tag).ok_or(CodecError::UnrecognizedType(frame.type_tag))?;

    Ok(WireMessage {
        version: frame.version,
        message_type,
        sequence: frame.sequence,
        timestamp_ms: frame.timestamp_ms,
        source: frame.source,
        destination: frame.destination,
        payload: frame.payload,
        priority: frame.priority,
        ttl_secs: frame.ttl_secs,
        correlation_id: frame.correlation_id,
    })
}

/// Per-connection, monotonically increasing sequence counter. Owned
/// exclusively by the connection's writer (see the concurrency model).
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    /// A counter starting at 0; the first call to `next` returns 1.
    #[must_use]
    pub fn new() -> Self {
        SequenceCounter(AtomicU64::new(0))
    }

    /// The next sequence number for this connection.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample(message_type: MessageType) -> WireMessage {
        WireMessage {
            version: PROTOCOL_VERSION,
            message_type,
            sequence: 42,
            timestamp_ms: 1_700_000_000_000,
            source: "client-1".to_string(),
            destination: "reactor-1".to_string(),
            payload: Value::Map(BTreeMap::from([("echo".to_string(), Value::Str("x".to_string()))])),
            priority: None,
            ttl_secs: None,
            correlation_id: Some("corr-1".to_string()),
        }
    }

    #[test]
    fn round_trips_every_message_type() {
        for mt in [
            MessageType::Submit,
            MessageType::Result,
            MessageType::Error,
            MessageType::Ping,
            MessageType::Register,
            MessageType::BatchSubmit,
        ] {
            let original = sample(mt);
            let bytes = encode(&original).unwrap();
            let decoded = decode(&bytes).unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn unknown_version_is_codec_invalid() {
        let mut message = sample(MessageType::Ping);
        message.version = 99;
        let bytes = encode(&message).unwrap();
        // encode() doesn't validate the version; corrupt it post-encode
        // to exercise decode's check directly would require re-encoding
        // with the bad version, which we just did.
        assert!(matches!(decode(&bytes), Err(CodecError::UnknownVersion(99))));
    }

    #[test]
    fn malformed_bytes_fail_decode() {
        let garbage = vec![0xff, 0x00, 0x01];
        assert!(decode(&garbage).is_err());
    }

    #[test]
    fn sequence_counter_is_monotonic_per_instance() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.next(), 3);
    }

    #[test]
    fn default_priority_and_ttl_are_omitted_from_the_frame_but_restored_on_decode() {
        let mut message = sample(MessageType::Submit);
        message.priority = Some(5);
        message.ttl_secs = Some(30);
        let bytes = encode(&message).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.effective_priority(), 5);
        assert_eq!(decoded.effective_ttl_secs(), 30);
    }
}
