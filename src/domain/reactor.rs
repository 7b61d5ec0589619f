//! Reactor Descriptor, owned exclusively by the Router.

use serde::{Deserialize, Serialize};

use super::affinity::Specialization;

/// A reactor known to the Router: identity, declared capabilities, and the
/// mutable load/health fields the Health Tracker updates.
///
/// Mutations are published via snapshot replacement (see the concurrency
/// model): callers `clone()`, mutate the clone, and hand it back to the
/// Router rather than mutating a shared descriptor in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactorDescriptor {
    /// Unique identifier, e.g. `REACTOR_ID`.
    pub identifier: String,
    /// Address the Health Tracker and Gateway dial.
    pub endpoint: String,
    /// One or more declared specializations.
    pub specializations: Vec<Specialization>,
    /// Maximum concurrent atoms this reactor accepts.
    pub max_capacity: u32,
    /// Current load, 0.0 (idle) to 1.0 (saturated).
    pub load_factor: f64,
    /// Whether the Health Tracker considers this reactor live.
    pub healthy: bool,
    /// Epoch milliseconds of the last health check.
    pub last_health_check_ms: u64,
    /// Consecutive health-check failures since the last success.
    pub consecutive_failures: u32,
}

impl ReactorDescriptor {
    /// Build a new descriptor, healthy by default with zero load.
    #[must_use]
    pub fn new(
        identifier: impl Into<String>,
        endpoint: impl Into<String>,
        specializations: Vec<Specialization>,
        max_capacity: u32,
    ) -> Self {
        ReactorDescriptor {
            identifier: identifier.into(),
            endpoint: endpoint.into(),
            specializations,
            max_capacity,
            load_factor: 0.0,
            healthy: true,
            last_health_check_ms: 0,
            consecutive_failures: 0,
        }
    }

    /// Whether any declared specialization intersects `wanted`.
    #[must_use]
    pub fn matches_any(&self, wanted: &[Specialization]) -> bool {
        self.specializations.iter().any(|s| wanted.contains(s))
    }

    /// Whether this descriptor declares the `general` specialization.
    #[must_use]
    pub fn is_general(&self) -> bool {
        self.specializations.contains(&Specialization::General)
    }
}
