//! Capacity-aware admission of jobs into cluster partitions.

use crate::server::dispatch::probe::ResourceSnapshot;

/// Category a job competes in, derived from its sequence count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    /// Fits the general-purpose partition.
    Standard,
    /// Heavy enough to require the accelerator partition.
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admit(ResourceClass),
    Defer,
}

/// Partition names and spare-capacity minimums that admission is decided
/// against. Built from the deployment configuration and passed per call; the
/// decision never reads ambient settings.
#[derive(Debug, Clone)]
pub struct AdmissionLimits {
    pub standard_partition: String,
    pub accel_partition: String,
    pub standard_min_idle: u64,
    pub accel_min_idle: u64,
}

/// Classify a job by its sequence count. Counts strictly above the cutoff
/// are `Large`; the cutoff itself is still `Standard`.
pub fn classify(seqs_count: u64, large_job_cutoff: u64) -> ResourceClass {
    if seqs_count > large_job_cutoff {
        ResourceClass::Large
    } else {
        ResourceClass::Standard
    }
}

/// Decide whether a job of the given class may be dispatched under the
/// observed capacity.
///
/// The comparison is strictly greater-than: the configured minimum is a
/// spare margin that has to remain available, not a bare minimum, so a tie
/// defers.
pub fn decide(
    class: ResourceClass,
    snapshot: &ResourceSnapshot,
    limits: &AdmissionLimits,
) -> AdmissionDecision {
    let admitted = match class {
        ResourceClass::Large => snapshot.idle(&limits.accel_partition) > limits.accel_min_idle,
        ResourceClass::Standard => {
            snapshot.idle(&limits.standard_partition) > limits.standard_min_idle
        }
    };
    if admitted {
        AdmissionDecision::Admit(class)
    } else {
        AdmissionDecision::Defer
    }
}

#[cfg(test)]
mod tests {
    use crate::server::dispatch::admission::{
        AdmissionDecision, AdmissionLimits, ResourceClass, classify, decide,
    };
    use crate::server::dispatch::probe::ResourceSnapshot;

    fn limits() -> AdmissionLimits {
        AdmissionLimits {
            standard_partition: "long".to_string(),
            accel_partition: "accel".to_string(),
            standard_min_idle: 30,
            accel_min_idle: 5,
        }
    }

    fn snapshot(standard_idle: u64, accel_idle: u64) -> ResourceSnapshot {
        ResourceSnapshot::from_report(&format!(
            "PARTITION AVAIL TIMELIMIT NODES STATE NODELIST\n\
             long* up infinite {standard_idle} idle n[001-100]\n\
             accel up infinite {accel_idle} idle p[01-20]\n"
        ))
    }

    #[test]
    fn classify_uses_strict_cutoff() {
        assert_eq!(classify(499_999, 500_000), ResourceClass::Standard);
        assert_eq!(classify(500_000, 500_000), ResourceClass::Standard);
        assert_eq!(classify(500_001, 500_000), ResourceClass::Large);
    }

    #[test]
    fn large_job_admitted_when_accel_idle_exceeds_minimum() {
        // accel minimum 5, accel idle 6
        let decision = decide(ResourceClass::Large, &snapshot(0, 6), &limits());
        assert_eq!(decision, AdmissionDecision::Admit(ResourceClass::Large));
    }

    #[test]
    fn standard_job_deferred_on_tie() {
        // standard minimum 30, standard idle exactly 30
        let decision = decide(ResourceClass::Standard, &snapshot(30, 0), &limits());
        assert_eq!(decision, AdmissionDecision::Defer);
    }

    #[test]
    fn large_job_deferred_on_tie() {
        let decision = decide(ResourceClass::Large, &snapshot(100, 5), &limits());
        assert_eq!(decision, AdmissionDecision::Defer);
    }

    #[test]
    fn large_job_ignores_standard_capacity() {
        let decision = decide(ResourceClass::Large, &snapshot(100, 0), &limits());
        assert_eq!(decision, AdmissionDecision::Defer);
    }

    #[test]
    fn standard_job_admitted_above_minimum() {
        let decision = decide(ResourceClass::Standard, &snapshot(31, 0), &limits());
        assert_eq!(decision, AdmissionDecision::Admit(ResourceClass::Standard));
    }
}
