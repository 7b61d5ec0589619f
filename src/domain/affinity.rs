//! Static group/specialization affinity lookup used by the Router's
//! candidate filter and scoring function.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A reactor's declared workload affinity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialization {
    /// Compute-heavy workloads.
    CpuBound,
    /// Allocation/working-set heavy workloads.
    MemoryBound,
    /// Disk or filesystem heavy workloads.
    IoBound,
    /// Network-call heavy workloads.
    NetworkBound,
    /// No particular affinity; the fallback specialization.
    General,
}

impl Specialization {
    /// All specializations, in a stable order (used to build the affinity
    /// matrix and for deterministic iteration).
    pub const ALL: [Specialization; 5] = [
        Specialization::CpuBound,
        Specialization::MemoryBound,
        Specialization::IoBound,
        Specialization::NetworkBound,
        Specialization::General,
    ];
}

/// Immutable two-dimensional lookup: group x specialization -> score in
/// `[0.0, 1.0]`. Used only as a candidate filter and tiebreaker; no
/// floating-point comparisons drive correctness.
#[derive(Debug, Clone)]
pub struct AffinityTable {
    preferred: HashMap<&'static str, Vec<Specialization>>,
    scores: HashMap<(&'static str, Specialization), f64>,
}

impl AffinityTable {
    /// The standardized 6x5 matrix. `mc` and `rm` resolve the documented
    /// disagreement by picking `mc -> {cpu_bound: 1.0, general: 0.5}` and
    /// `rm -> {general: 1.0}` (see DESIGN.md).
    #[must_use]
    pub fn standard() -> Self {
        use Specialization::{CpuBound, General, IoBound, MemoryBound, NetworkBound};

        let preferred: HashMap<&'static str, Vec<Specialization>> = HashMap::from([
            ("cf", vec![CpuBound, General]),
            ("df", vec![MemoryBound, General]),
            ("ed", vec![IoBound, General]),
            ("co", vec![NetworkBound, General]),
            ("mc", vec![CpuBound, General]),
            ("rm", vec![General]),
        ]);

        let scores: HashMap<(&'static str, Specialization), f64> = HashMap::from([
            (("cf", CpuBound), 1.0),
            (("cf", General), 0.5),
            (("df", MemoryBound), 1.0),
            (("df", General), 0.5),
            (("ed", IoBound), 1.0),
            (("ed", General), 0.5),
            (("co", NetworkBound), 1.0),
            (("co", General), 0.5),
            (("mc", CpuBound), 1.0),
            (("mc", General), 0.5),
            (("rm", General), 1.0),
        ]);

        AffinityTable { preferred, scores }
    }

    /// The specializations preferred by `group`, or `None` if the group is
    /// unrecognized.
    #[must_use]
    pub fn preferred_specializations(&self, group: &str) -> Option<&[Specialization]> {
        self.preferred.get(group).map(Vec::as_slice)
    }

    /// The affinity score for `group` x `specialization`, 0.0 if not
    /// listed.
    #[must_use]
    pub fn score(&self, group: &str, specialization: Specialization) -> f64 {
        self.scores
            .get(&(group, specialization))
            .copied()
            .unwrap_or(0.0)
    }

    /// The maximum affinity score across all of a descriptor's declared
    /// specializations, used when a descriptor declares more than one.
    #[must_use]
    pub fn max_score(&self, group: &str, specializations: &[Specialization]) -> f64 {
        specializations
            .iter()
            .map(|s| self.score(group, *s))
            .fold(0.0, f64::max)
    }
}

impl Default for AffinityTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cf_prefers_cpu_bound() {
        let table = AffinityTable::standard();
        assert_eq!(table.score("cf", Specialization::CpuBound), 1.0);
        assert_eq!(table.score("cf", Specialization::General), 0.5);
        assert_eq!(table.score("cf", Specialization::IoBound), 0.0);
    }

    #[test]
    fn rm_only_prefers_general() {
        let table = AffinityTable::standard();
        assert_eq!(
            table.preferred_specializations("rm"),
            Some(&[Specialization::General][..])
        );
    }

    #[test]
    fn max_score_picks_best_specialization() {
        let table = AffinityTable::standard();
        let score = table.max_score("cf", &[Specialization::General, Specialization::CpuBound]);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn unknown_group_scores_zero() {
        let table = AffinityTable::standard();
        assert_eq!(table.score("zz", Specialization::General), 0.0);
        assert!(table.preferred_specializations("zz").is_none());
    }
}
