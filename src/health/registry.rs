// src/health/registry.rs
use super::{HealthProbe, HealthReport, HealthStatus, TagSet};
use crate::metrics::MetricsCollector;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("health probe '{0}' is already registered")]
    DuplicateProbe(String),

    #[error("health probe '{name}' did not complete within {timeout:?}")]
    ProbeTimeout { name: String, timeout: Duration },
}

/// Aborts the wrapped task when dropped, so a check never outlives the
/// evaluation that spawned it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Named probes, evaluated on demand.
pub struct HealthRegistry {
    probes: DashMap<String, Arc<HealthProbe>>,
    probe_timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl HealthRegistry {
    pub fn new(probe_timeout: Duration, metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self {
            probes: DashMap::new(),
            probe_timeout,
            metrics,
        }
    }

    /// Adds a probe. Fails without touching the registry if the name is taken.
    pub fn register(&self, probe: HealthProbe) -> Result<(), HealthError> {
        match self.probes.entry(probe.name().to_string()) {
            Entry::Occupied(entry) => Err(HealthError::DuplicateProbe(entry.key().clone())),
            Entry::Vacant(entry) => {
                info!(probe = %probe.name(), tags = ?probe.tags(), "Registered health probe");
                entry.insert(Arc::new(probe));
                Ok(())
            }
        }
    }

    pub fn register_fn<I, T, F>(
        &self,
        name: impl Into<String>,
        tags: I,
        check: F,
    ) -> Result<(), HealthError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
        F: Fn() -> HealthStatus + Send + Sync + 'static,
    {
        self.register(HealthProbe::from_fn(name, tags, check))
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.probes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Runs every probe selected by `filter` concurrently and aggregates the
    /// results. `None` or an empty filter selects all probes.
    pub async fn evaluate(&self, filter: Option<&TagSet>) -> HealthReport {
        // Snapshot first so no map guard is held across an await point.
        let selected: Vec<Arc<HealthProbe>> = self
            .probes
            .iter()
            .filter(|entry| filter.map_or(true, |tags| entry.value().matches(tags)))
            .map(|entry| entry.value().clone())
            .collect();

        let checks = selected.into_iter().map(|probe| self.run_probe(probe));
        let results = futures::future::join_all(checks).await;

        let report = HealthReport::from_results(results);

        if let Some(metrics) = &self.metrics {
            metrics.record_health_evaluation(report.status);
        }

        debug!(
            status = %report.status,
            probes = report.probes.len(),
            "Health evaluation complete"
        );

        report
    }

    async fn run_probe(&self, probe: Arc<HealthProbe>) -> (String, HealthStatus) {
        let start = Instant::now();
        let check = probe.check();

        // A dedicated task isolates panics and lets a timed-out check be cancelled.
        let mut task = AbortOnDrop(tokio::spawn(async move { check.check().await }));

        let status = match timeout(self.probe_timeout, &mut task.0).await {
            Ok(Ok(Ok(status))) => status,
            Ok(Ok(Err(e))) => {
                warn!(probe = %probe.name(), error = %e, "Health probe failed");
                HealthStatus::Unhealthy
            }
            Ok(Err(e)) => {
                warn!(probe = %probe.name(), error = %e, "Health probe task aborted");
                HealthStatus::Unhealthy
            }
            Err(_) => {
                task.0.abort();
                let err = HealthError::ProbeTimeout {
                    name: probe.name().to_string(),
                    timeout: self.probe_timeout,
                };
                warn!("{}", err);
                HealthStatus::Unhealthy
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_probe(probe.name(), status, start.elapsed());
        }

        (probe.name().to_string(), status)
    }
}
