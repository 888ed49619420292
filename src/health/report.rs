// src/health/report.rs
use super::HealthStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of one registry evaluation, serialized as
/// `{"status":"Healthy","probes":{"name":"Healthy"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub probes: BTreeMap<String, HealthStatus>,
}

impl HealthReport {
    pub fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = (String, HealthStatus)>,
    {
        let probes: BTreeMap<String, HealthStatus> = results.into_iter().collect();
        let status = HealthStatus::aggregate(probes.values().copied());
        Self { status, probes }
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json_shape() {
        let report = HealthReport::from_results([
            ("db".to_string(), HealthStatus::Healthy),
            ("cache".to_string(), HealthStatus::Degraded),
        ]);

        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"status":"Degraded","probes":{"cache":"Degraded","db":"Healthy"}}"#
        );
    }

    #[test]
    fn test_empty_report_is_healthy() {
        let report = HealthReport::from_results(Vec::new());
        assert!(report.is_healthy());
        assert!(report.probes.is_empty());
    }
}
