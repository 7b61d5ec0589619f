//! The unit of work (Atom) and its packet key, plus the outcome types the
//! Execution Engine produces for it.

use std::fmt;

use nutype::nutype;
use serde::{Deserialize, Serialize};

use super::Value;

/// An atom's priority, 1 (lowest) to 10 (highest), default 5.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 5
)]
pub struct Priority(u8);

impl Priority {
    /// The priority as a fraction of the maximum (used by router scoring).
    #[must_use]
    pub fn as_fraction(self) -> f64 {
        f64::from(self.into_inner()) / 10.0
    }
}

/// Canonical `group:element[:variant]` identifying a handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketKey {
    group: String,
    element: String,
    variant: Option<String>,
}

/// An atom or packet key failed the two-letter group / non-empty element
/// invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketKeyError {
    /// Group was not exactly two lowercase letters.
    #[error("group must be exactly two lowercase letters, got {0:?}")]
    InvalidGroup(String),
    /// Element was empty.
    #[error("element must not be empty")]
    EmptyElement,
}

impl PacketKey {
    /// Construct a packet key, validating the group/element invariants
    /// (see the Atom invariants).
    pub fn new(
        group: impl Into<String>,
        element: impl Into<String>,
        variant: Option<String>,
    ) -> Result<Self, PacketKeyError> {
        let group = group.into();
        let element = element.into();
        if group.chars().count() != 2 || !group.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(PacketKeyError::InvalidGroup(group));
        }
        if element.is_empty() {
            return Err(PacketKeyError::EmptyElement);
        }
        Ok(PacketKey {
            group,
            element,
            variant,
        })
    }

    /// The two-letter group.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The element name.
    #[must_use]
    pub fn element(&self) -> &str {
        &self.element
    }

    /// The optional variant.
    #[must_use]
    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }
}

impl fmt::Display for PacketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}:{}:{}", self.group, self.element, variant),
            None => write!(f, "{}:{}", self.group, self.element),
        }
    }
}

/// The unit of work submitted to a reactor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    /// Unique identifier for this atom.
    pub identifier: String,
    /// Two-letter category.
    pub group: String,
    /// Short action name within the group.
    pub element: String,
    /// Further specialization within the element.
    pub variant: Option<String>,
    /// Structured payload, arbitrarily nested.
    pub payload: Value,
    /// 1-10, default 5.
    pub priority: Priority,
    /// Per-call timeout override, in seconds.
    pub timeout_secs: Option<u64>,
    /// Metadata map, including the caller chain for inter-packet calls.
    pub metadata: Value,
}

impl Atom {
    /// Build an atom with default priority and no per-call timeout or
    /// metadata.
    #[must_use]
    pub fn new(
        identifier: impl Into<String>,
        group: impl Into<String>,
        element: impl Into<String>,
        payload: Value,
    ) -> Self {
        Atom {
            identifier: identifier.into(),
            group: group.into(),
            element: element.into(),
            variant: None,
            payload,
            priority: Priority::default(),
            timeout_secs: None,
            metadata: Value::empty_map(),
        }
    }

    /// Validate the structural invariants from the Atom data model:
    /// non-empty identifier, two-letter group, non-empty element.
    pub fn validate(&self) -> Result<(), PacketKeyError> {
        if self.identifier.is_empty() {
            return Err(PacketKeyError::EmptyElement);
        }
        PacketKey::new(self.group.clone(), self.element.clone(), self.variant.clone())
            .map(|_| ())
    }

    /// The canonical packet key for this atom, if it is well-formed.
    pub fn packet_key(&self) -> Result<PacketKey, PacketKeyError> {
        PacketKey::new(self.group.clone(), self.element.clone(), self.variant.clone())
    }

    /// The caller chain recorded in metadata, oldest first, used to detect
    /// inter-packet call cycles.
    #[must_use]
    pub fn caller_chain(&self) -> Vec<String> {
        self.metadata
            .get("caller_chain")
            .and_then(Value::as_seq)
            .map(|seq| seq.iter().filter_map(Value::as_str).map(str::to_owned).collect())
            .unwrap_or_default()
    }
}

/// A failed Atom Result's error content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Stable error code, e.g. `"E408"`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Whether the client may retry.
    pub permanent: bool,
    /// Optional structured details.
    pub details: Option<Value>,
}

impl ErrorRecord {
    /// Build an error record from a crate error, with no extra details.
    #[must_use]
    pub fn from_error(error: &crate::error::PacketFlowError) -> Self {
        ErrorRecord {
            code: error.code().to_string(),
            message: error.to_string(),
            permanent: error.is_permanent(),
            details: None,
        }
    }
}

/// Response metadata attached to every Atom Result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Wall-clock duration of the dispatch, in milliseconds.
    pub duration_ms: u64,
    /// Identifier of the reactor that served this atom.
    pub reactor_id: String,
    /// Unix epoch timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// The packet key this atom was dispatched to.
    pub packet_key: String,
}

/// The outcome of dispatching an atom: success value, or error record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AtomOutcome {
    /// The handler ran to completion within its deadline.
    Success(Value),
    /// The handler failed, timed out, or the atom was rejected before
    /// dispatch.
    Failure(ErrorRecord),
}

/// The complete result of dispatching an atom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomResult {
    /// Success value or error record.
    pub outcome: AtomOutcome,
    /// Duration, reactor id, timestamp, echoed packet key.
    pub meta: ResponseMeta,
}

impl AtomResult {
    /// Build a successful result.
    #[must_use]
    pub fn success(value: Value, meta: ResponseMeta) -> Self {
        AtomResult {
            outcome: AtomOutcome::Success(value),
            meta,
        }
    }

    /// Build a failed result.
    #[must_use]
    pub fn failure(error: ErrorRecord, meta: ResponseMeta) -> Self {
        AtomResult {
            outcome: AtomOutcome::Failure(error),
            meta,
        }
    }

    /// Whether this result is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AtomOutcome::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_key_requires_two_letter_group() {
        assert!(PacketKey::new("cff", "ping", None).is_err());
        assert!(PacketKey::new("cf", "ping", None).is_ok());
    }

    #[test]
    fn packet_key_display_includes_variant() {
        let key = PacketKey::new("df", "validate", Some("email".to_string())).unwrap();
        assert_eq!(key.to_string(), "df:validate:email");
        let key = PacketKey::new("df", "validate", None).unwrap();
        assert_eq!(key.to_string(), "df:validate");
    }

    #[test]
    fn atom_validate_rejects_bad_group() {
        let atom = Atom::new("a1", "cff", "ping", Value::empty_map());
        assert!(atom.validate().is_err());
    }

    #[test]
    fn atom_caller_chain_defaults_empty() {
        let atom = Atom::new("a1", "cf", "ping", Value::empty_map());
        assert!(atom.caller_chain().is_empty());
    }

    #[test]
    fn priority_as_fraction() {
        let p = Priority::try_new(5).unwrap();
        assert!((p.as_fraction() - 0.5).abs() < f64::EPSILON);
    }
}
