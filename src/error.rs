//! Crate-wide error taxonomy.
//!
//! A single enum covers every outbound error kind. Each variant knows its
//! stable wire code and whether it is retryable, in the style of the
//! teacher's `CaxtonError` / `message_router::traits::RouterError` families.

use thiserror::Error;

use crate::domain::PacketKey;

/// The crate-wide error type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PacketFlowError {
    /// Malformed atom or missing required field.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Reserved for a policy layer this crate does not implement.
    #[error("authorization denied: {0}")]
    Auth(String),

    /// No handler registered for the packet key.
    #[error("unsupported packet key: {0}")]
    Unsupported(PacketKey),

    /// Handler, pipeline, or ping deadline expired.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Payload exceeded the handler's declared maximum.
    #[error("payload too large: {actual} bytes (max {max})")]
    PayloadTooLarge {
        /// Size of the offending payload in bytes.
        actual: usize,
        /// The handler's declared maximum payload size.
        max: usize,
    },

    /// Unclassified handler exception.
    #[error("internal error: {0}")]
    Internal(String),

    /// Known type not served by this reactor.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Router found no eligible candidate.
    #[error("no reactor available for packet {0}")]
    NoReactorAvailable(PacketKey),

    /// Inter-packet call chain exceeded the configured depth.
    #[error("call depth exceeded (max {max})")]
    CallDepthExceeded {
        /// The configured maximum call depth.
        max: usize,
    },

    /// Framed bytes failed to decode.
    #[error("invalid wire frame: {0}")]
    CodecInvalid(String),
}

impl PacketFlowError {
    /// The stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            PacketFlowError::Validation(_) => "E400",
            PacketFlowError::Auth(_) => "E401",
            PacketFlowError::Unsupported(_) => "E404",
            PacketFlowError::Timeout(_) => "E408",
            PacketFlowError::PayloadTooLarge { .. } => "E413",
            PacketFlowError::Internal(_) => "E500",
            PacketFlowError::NotImplemented(_) => "E501",
            PacketFlowError::NoReactorAvailable(_) => "E503",
            PacketFlowError::CallDepthExceeded { .. } => "E508",
            PacketFlowError::CodecInvalid(_) => "E600",
        }
    }

    /// Whether a client may retry this error. Clients should consult this
    /// accessor rather than branch on `code()` strings.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !matches!(
            self,
            PacketFlowError::Timeout(_)
                | PacketFlowError::Internal(_)
                | PacketFlowError::NoReactorAvailable(_)
        )
    }

    /// Reconstruct an error from a wire-level code and message, for
    /// contexts (like an inter-packet call result) that only have the
    /// `ErrorRecord` and not the original typed error. Falls back to
    /// `Internal` for codes with no string-only representation.
    #[must_use]
    pub fn from_code(code: &str, message: String) -> Self {
        match code {
            "E400" => PacketFlowError::Validation(message),
            "E401" | "E403" => PacketFlowError::Auth(message),
            "E408" => PacketFlowError::Timeout(message),
            "E501" => PacketFlowError::NotImplemented(message),
            "E508" => PacketFlowError::CallDepthExceeded { max: 32 },
            "E600" => PacketFlowError::CodecInvalid(message),
            _ => PacketFlowError::Internal(message),
        }
    }
}

/// Wire-ready representation of a `PacketFlowError`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorPayload {
    /// Stable error code, e.g. `"E408"`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Whether the client may retry.
    pub permanent: bool,
}

impl From<&PacketFlowError> for ErrorPayload {
    fn from(error: &PacketFlowError) -> Self {
        ErrorPayload {
            code: error.code().to_string(),
            message: error.to_string(),
            permanent: error.is_permanent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retryable() {
        let err = PacketFlowError::Timeout("handler".into());
        assert_eq!(err.code(), "E408");
        assert!(!err.is_permanent());
    }

    #[test]
    fn validation_is_permanent() {
        let err = PacketFlowError::Validation("bad group".into());
        assert_eq!(err.code(), "E400");
        assert!(err.is_permanent());
    }

    #[test]
    fn no_reactor_available_is_retryable() {
        let key = PacketKey::new("cf", "ping", None).unwrap();
        let err = PacketFlowError::NoReactorAvailable(key);
        assert_eq!(err.code(), "E503");
        assert!(!err.is_permanent());
    }
}
