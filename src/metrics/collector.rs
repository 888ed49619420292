// src/metrics/collector.rs
use crate::health::HealthStatus;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Prometheus text exposition of everything registered.
    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

/// The service's own counters, independent of whether an exporter is active.
#[derive(Debug)]
pub struct MetricsCollector {
    // Health metrics
    pub health_evaluations_total: IntCounterVec,
    pub probe_status: IntGaugeVec,
    pub probe_duration_seconds: HistogramVec,

    // Telemetry pipeline metrics
    pub telemetry_signals_total: IntCounterVec,
    pub exporters_active: IntGauge,

    // HTTP metrics
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let health_evaluations_total = IntCounterVec::new(
            Opts::new(
                "svc_health_evaluations_total",
                "Health registry evaluations by aggregate status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(health_evaluations_total.clone()))?;

        let probe_status = IntGaugeVec::new(
            Opts::new(
                "svc_health_probe_status",
                "Last probe result (0=healthy, 1=degraded, 2=unhealthy)",
            ),
            &["probe"],
        )?;
        registry.register(Box::new(probe_status.clone()))?;

        let probe_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "svc_health_probe_duration_seconds",
                "Health probe check duration in seconds",
            ),
            &["probe"],
        )?;
        registry.register(Box::new(probe_duration_seconds.clone()))?;

        let telemetry_signals_total = IntCounterVec::new(
            Opts::new(
                "svc_telemetry_signals_total",
                "Telemetry signals by kind and outcome (recorded, exported, failed)",
            ),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(telemetry_signals_total.clone()))?;

        let exporters_active =
            IntGauge::new("svc_telemetry_exporters_active", "Number of active exporters")?;
        registry.register(Box::new(exporters_active.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("svc_http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status_code"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "svc_http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            health_evaluations_total,
            probe_status,
            probe_duration_seconds,
            telemetry_signals_total,
            exporters_active,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    pub fn record_health_evaluation(&self, status: HealthStatus) {
        self.health_evaluations_total
            .with_label_values(&[status.as_str()])
            .inc();
    }

    pub fn record_probe(&self, probe: &str, status: HealthStatus, duration: Duration) {
        self.probe_status
            .with_label_values(&[probe])
            .set(status.as_gauge());

        self.probe_duration_seconds
            .with_label_values(&[probe])
            .observe(duration.as_secs_f64());
    }

    pub fn record_signals(&self, kind: &str, outcome: &str, count: usize) {
        self.telemetry_signals_total
            .with_label_values(&[kind, outcome])
            .inc_by(count as u64);
    }

    pub fn set_exporters_active(&self, count: usize) {
        self.exporters_active.set(count as i64);
    }

    pub fn record_request(&self, method: &str, path: &str, status_code: u16, duration: Duration) {
        let status = status_code.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status])
            .inc();

        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration.as_secs_f64());
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
