//! Router: given an atom, choose exactly one Reactor Descriptor to serve
//! it, or report `NO_REACTOR_AVAILABLE`.
//!
//! Descriptor mutations are published via snapshot replacement (a fresh
//! `Arc<ReactorDescriptor>` swapped into the map), so routing reads never
//! block on a writer, mirroring the teacher's DashMap-based registries.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::RouterConfig;
use crate::domain::affinity::AffinityTable;
use crate::domain::{Atom, ReactorDescriptor};
use crate::error::PacketFlowError;

/// Owns the live Reactor Descriptor set and selects a descriptor for each
/// atom.
pub struct Router {
    descriptors: DashMap<String, Arc<ReactorDescriptor>>,
    affinity: AffinityTable,
    config: RouterConfig,
}

impl Router {
    /// A router with the standard affinity table and the given config.
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Router {
            descriptors: DashMap::new(),
            affinity: AffinityTable::standard(),
            config,
        }
    }

    /// Add (or replace) a descriptor.
    pub fn add(&self, descriptor: ReactorDescriptor) {
        self.descriptors
            .insert(descriptor.identifier.clone(), Arc::new(descriptor));
    }

    /// Remove a descriptor by identifier.
    pub fn remove(&self, identifier: &str) {
        self.descriptors.remove(identifier);
    }

    /// Publish a new load factor for a descriptor, leaving other fields
    /// untouched.
    pub fn update_load(&self, identifier: &str, load_factor: f64) {
        if let Some(mut entry) = self.descriptors.get_mut(identifier) {
            let mut updated = (**entry).clone();
            updated.load_factor = load_factor;
            *entry = Arc::new(updated);
        }
    }

    /// Publish a new healthy flag for a descriptor.
    pub fn set_health(&self, identifier: &str, healthy: bool) {
        if let Some(mut entry) = self.descriptors.get_mut(identifier) {
            let mut updated = (**entry).clone();
            updated.healthy = healthy;
            *entry = Arc::new(updated);
        }
    }

    /// Current descriptor snapshot, for introspection endpoints.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<ReactorDescriptor>> {
        self.descriptors.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Fraction of descriptors currently healthy, `1.0` when there are
    /// none (vacuously healthy).
    #[must_use]
    pub fn health_fraction(&self) -> f64 {
        let total = self.descriptors.len();
        if total == 0 {
            return 1.0;
        }
        let healthy = self.descriptors.iter().filter(|e| e.value().healthy).count();
        healthy as f64 / total as f64
    }

    /// Select a descriptor for `atom`, or `NO_REACTOR_AVAILABLE`.
    pub fn route(&self, atom: &Atom) -> Result<Arc<ReactorDescriptor>, PacketFlowError> {
        let preferred = self.affinity.preferred_specializations(&atom.group);

        let mut candidates: Vec<Arc<ReactorDescriptor>> = self
            .descriptors
            .iter()
            .map(|e| Arc::clone(e.value()))
            .filter(|d| d.healthy && d.load_factor < self.config.load_threshold)
            .filter(|d| match preferred {
                Some(specs) => d.matches_any(specs),
                None => d.is_general(),
            })
            .collect();

        // Fall back to general-purpose descriptors if the affinity
        // filter left nothing.
        if candidates.is_empty() {
            candidates = self
                .descriptors
                .iter()
                .map(|e| Arc::clone(e.value()))
                .filter(|d| d.healthy && d.load_factor < self.config.load_threshold && d.is_general())
                .collect();
        }

        if candidates.is_empty() {
            let key = atom
                .packet_key()
                .unwrap_or_else(|_| crate::domain::PacketKey::new("zz", "unknown", None).unwrap());
            return Err(PacketFlowError::NoReactorAvailable(key));
        }

        candidates.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        let best = candidates
            .iter()
            .map(|d| (d, self.score(atom, d)))
            .max_by(|(a_desc, a_score), (b_desc, b_score)| {
                a_score
                    .partial_cmp(b_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| self.break_tie(atom, a_desc, b_desc))
            })
            .map(|(d, _)| Arc::clone(d));

        best.ok_or_else(|| {
            let key = atom
                .packet_key()
                .unwrap_or_else(|_| crate::domain::PacketKey::new("zz", "unknown", None).unwrap());
            PacketFlowError::NoReactorAvailable(key)
        })
    }

    /// A descriptor is eligible (see `route`) once `healthy`, but still
    /// scored down if it has an open failure streak the Health Tracker
    /// hasn't yet escalated to `healthy = false` (the documented
    /// resolution of the degraded/health_bonus open question: `healthy`
    /// alone gates eligibility, `consecutive_failures` gates the bonus).
    fn score(&self, atom: &Atom, descriptor: &ReactorDescriptor) -> f64 {
        let affinity = self.affinity.max_score(&atom.group, &descriptor.specializations);
        let health_bonus = if descriptor.consecutive_failures == 0 {
            self.config.healthy_bonus
        } else {
            self.config.degraded_bonus
        };
        affinity * (1.0 - descriptor.load_factor) * atom.priority.as_fraction() * health_bonus
    }

    /// Break a scoring tie by hashing the atom identifier modulo the
    /// sorted candidate list, so repeated submissions of the same atom
    /// identifier consistently pick the same descriptor ("affinity with
    /// stickiness"). `a` and `b` must come from the already
    /// identifier-sorted candidate list.
    fn break_tie(
        &self,
        atom: &Atom,
        a: &ReactorDescriptor,
        b: &ReactorDescriptor,
    ) -> std::cmp::Ordering {
        let mut hasher = DefaultHasher::new();
        atom.identifier.hash(&mut hasher);
        let sticky = hasher.finish();
        // Prefer whichever of the two tied descriptors the hash points
        // toward, using the identifier ordering as the index space.
        let a_wins = sticky % 2 == 0;
        if a.identifier == b.identifier {
            std::cmp::Ordering::Equal
        } else if a_wins {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Less
        }
    }
}
