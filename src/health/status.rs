// src/health/status.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse health of a probe or of a set of probes.
///
/// Variants are declared from best to worst so the derived ordering makes
/// the aggregate of several results simply their maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        self.max(other)
    }

    /// Worst status across `statuses`; `Healthy` when there are none.
    pub fn aggregate<I>(statuses: I) -> HealthStatus
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        statuses
            .into_iter()
            .fold(HealthStatus::Healthy, HealthStatus::worst)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "Healthy",
            HealthStatus::Degraded => "Degraded",
            HealthStatus::Unhealthy => "Unhealthy",
        }
    }

    /// Gauge encoding used by the self metrics (0=healthy, 1=degraded, 2=unhealthy).
    pub fn as_gauge(&self) -> i64 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use HealthStatus::*;

    fn any_status() -> impl Strategy<Value = HealthStatus> {
        prop_oneof![Just(Healthy), Just(Degraded), Just(Unhealthy)]
    }

    #[test]
    fn test_aggregate_of_nothing_is_healthy() {
        assert_eq!(HealthStatus::aggregate(Vec::new()), Healthy);
    }

    #[test]
    fn test_aggregate_picks_worst() {
        assert_eq!(HealthStatus::aggregate([Healthy, Healthy]), Healthy);
        assert_eq!(HealthStatus::aggregate([Healthy, Degraded]), Degraded);
        assert_eq!(HealthStatus::aggregate([Degraded, Unhealthy, Healthy]), Unhealthy);
    }

    #[test]
    fn test_serializes_as_variant_name() {
        assert_eq!(serde_json::to_string(&Degraded).unwrap(), "\"Degraded\"");
    }

    proptest! {
        #[test]
        fn prop_aggregate_is_order_independent(
            mut statuses in prop::collection::vec(any_status(), 0..16)
        ) {
            let forward = HealthStatus::aggregate(statuses.clone());
            statuses.reverse();
            prop_assert_eq!(forward, HealthStatus::aggregate(statuses.clone()));
            prop_assert!(statuses.iter().all(|s| *s <= forward));
        }
    }
}
