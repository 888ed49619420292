// src/telemetry/exporter.rs
use super::ExporterConfig;
use crate::config::TelemetryConfig;
use crate::metrics::MetricsCollector;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::logs::{
    BatchConfigBuilder as LogBatchConfigBuilder, BatchLogProcessor, LogBatch, LogExporter,
    LoggerProviderBuilder, SdkLoggerProvider,
};
use opentelemetry_sdk::metrics::data::ResourceMetrics;
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::{
    MeterProviderBuilder, PeriodicReader, SdkMeterProvider, Temporality,
};
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, SdkTracerProvider, SpanData, SpanExporter,
    TracerProviderBuilder,
};
use opentelemetry_sdk::Resource;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The endpoint could not be reached at all. The gate in front of the
    /// exporter closes for the rest of the process when it sees this.
    #[error("failed to connect to exporter endpoint {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("export timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid exporter endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("failed to build exporter: {0}")]
    Build(String),
}

impl ExportError {
    pub fn is_connect(&self) -> bool {
        matches!(self, ExportError::Connect { .. })
    }

    /// Classifies an SDK export failure. Transport clients only report
    /// unreachable collectors through their messages, so the connect case is
    /// recognised by text.
    pub(crate) fn from_sdk(endpoint: &str, error: &OTelSdkError) -> Self {
        match error {
            OTelSdkError::Timeout(after) => ExportError::Timeout(*after),
            OTelSdkError::InternalFailure(reason) if is_connect_failure(reason) => {
                ExportError::Connect {
                    endpoint: endpoint.to_string(),
                    reason: reason.clone(),
                }
            }
            other => ExportError::Transport(other.to_string()),
        }
    }
}

fn is_connect_failure(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    ["unavailable", "connect", "dns error"]
        .iter()
        .any(|marker| reason.contains(marker))
}

/// Installs the exporters for one selected [`ExporterConfig`] into `sink`.
pub trait ExporterFactory: Send + Sync {
    fn install(&self, config: &ExporterConfig, sink: &mut ExporterSink)
        -> Result<(), ExportError>;
}

/// Tracks which exporters are still open. The pipeline records nothing once
/// every gate has closed.
#[derive(Debug)]
pub(crate) struct GateSet {
    open: AtomicUsize,
    metrics: Option<Arc<MetricsCollector>>,
}

impl GateSet {
    pub(crate) fn new(metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self {
            open: AtomicUsize::new(0),
            metrics,
        }
    }

    pub(crate) fn any_open(&self) -> bool {
        self.open.load(Ordering::Acquire) > 0
    }

    pub(crate) fn open_count(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn count(&self, kind: &str, outcome: &str, count: usize) {
        if count == 0 {
            return;
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_signals(kind, outcome, count);
        }
    }

    fn opened(&self) {
        let open = self.open.fetch_add(1, Ordering::AcqRel) + 1;
        self.publish(open);
    }

    fn closed(&self) {
        let open = self.open.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        self.publish(open);
    }

    pub(crate) fn publish(&self, open: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.set_exporters_active(open);
        }
    }
}

/// One named exporter. Shared by its span, metric and log wrappers so a
/// connect failure on any signal stops all three.
#[derive(Debug)]
pub(crate) struct ExporterGate {
    name: String,
    endpoint: String,
    disabled: AtomicBool,
    set: Arc<GateSet>,
}

impl ExporterGate {
    fn new(name: &str, endpoint: &str, set: Arc<GateSet>) -> Self {
        set.opened();
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            disabled: AtomicBool::new(false),
            set,
        }
    }

    fn is_open(&self) -> bool {
        !self.disabled.load(Ordering::Acquire)
    }

    fn observe(&self, kind: &str, count: usize, result: OTelSdkResult) -> OTelSdkResult {
        match &result {
            Ok(()) => self.set.count(kind, "exported", count),
            Err(e) => {
                self.set.count(kind, "failed", count);
                let error = ExportError::from_sdk(&self.endpoint, e);
                if error.is_connect() {
                    self.close(&error);
                } else {
                    warn!(
                        exporter = %self.name,
                        kind,
                        error = %error,
                        "Telemetry export failed, batch dropped"
                    );
                }
            }
        }
        result
    }

    fn close(&self, error: &ExportError) {
        if self.disabled.swap(true, Ordering::AcqRel) {
            return;
        }
        error!(
            exporter = %self.name,
            error = %error,
            "Exporter unreachable, disabling it for the rest of the process"
        );
        self.set.closed();
        if !self.set.any_open() {
            warn!("All telemetry exporters disabled, pipeline continues as a no-op");
        }
    }
}

/// Puts an [`ExporterGate`] in front of an SDK exporter.
#[derive(Debug)]
pub(crate) struct Gated<E> {
    inner: E,
    gate: Arc<ExporterGate>,
}

impl<E: SpanExporter> SpanExporter for Gated<E> {
    async fn export(&self, batch: Vec<SpanData>) -> OTelSdkResult {
        if !self.gate.is_open() {
            return Ok(());
        }
        let count = batch.len();
        let result = self.inner.export(batch).await;
        self.gate.observe("span", count, result)
    }

    fn shutdown(&mut self) -> OTelSdkResult {
        self.inner.shutdown()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

impl<E: LogExporter> LogExporter for Gated<E> {
    async fn export(&self, batch: LogBatch<'_>) -> OTelSdkResult {
        if !self.gate.is_open() {
            return Ok(());
        }
        let count = batch.iter().count();
        let result = self.inner.export(batch).await;
        self.gate.observe("log", count, result)
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

impl<E: PushMetricExporter> PushMetricExporter for Gated<E> {
    // Metrics leave in collections, so each export counts once.
    async fn export(&self, metrics: &ResourceMetrics) -> OTelSdkResult {
        if !self.gate.is_open() {
            return Ok(());
        }
        let result = self.inner.export(metrics).await;
        self.gate.observe("metric", 1, result)
    }

    fn force_flush(&self) -> OTelSdkResult {
        self.inner.force_flush()
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        self.inner.shutdown_with_timeout(timeout)
    }

    fn temporality(&self) -> Temporality {
        self.inner.temporality()
    }
}

/// Collects the processors and readers exporter factories install, then
/// builds the three SDK providers from them.
pub struct ExporterSink {
    traces: Option<TracerProviderBuilder>,
    metrics: Option<MeterProviderBuilder>,
    logs: Option<LoggerProviderBuilder>,
    gates: Arc<GateSet>,
    installed: usize,
    max_queue_size: usize,
    max_batch_size: usize,
    flush_interval: Duration,
}

/// Providers built from an [`ExporterSink`].
pub(crate) struct Providers {
    pub(crate) tracer: SdkTracerProvider,
    pub(crate) meter: SdkMeterProvider,
    pub(crate) logger: SdkLoggerProvider,
}

impl ExporterSink {
    pub(crate) fn new(config: &TelemetryConfig, gates: Arc<GateSet>) -> Self {
        Self {
            traces: Some(SdkTracerProvider::builder()),
            metrics: Some(SdkMeterProvider::builder()),
            logs: Some(SdkLoggerProvider::builder()),
            gates,
            installed: 0,
            max_queue_size: config.buffer_capacity,
            max_batch_size: config.max_batch_size.min(config.buffer_capacity),
            flush_interval: config.flush_interval(),
        }
    }

    /// Starts a named exporter; attach its per-signal exporters to the
    /// returned handle.
    pub fn exporter(&mut self, name: &str, endpoint: &str) -> InstalledExporter<'_> {
        self.installed += 1;
        let gate = Arc::new(ExporterGate::new(name, endpoint, self.gates.clone()));
        InstalledExporter { sink: self, gate }
    }

    pub fn is_empty(&self) -> bool {
        self.installed == 0
    }

    pub(crate) fn build(mut self, resource: Resource) -> Providers {
        let tracer = self
            .traces
            .take()
            .unwrap_or_else(SdkTracerProvider::builder)
            .with_resource(resource.clone())
            .build();
        let meter = self
            .metrics
            .take()
            .unwrap_or_else(SdkMeterProvider::builder)
            .with_resource(resource.clone())
            .build();
        let logger = self
            .logs
            .take()
            .unwrap_or_else(SdkLoggerProvider::builder)
            .with_resource(resource)
            .build();

        Providers {
            tracer,
            meter,
            logger,
        }
    }
}

/// Handle for attaching one exporter's signal exporters to an
/// [`ExporterSink`]. Signals with no exporter attached are not sent.
pub struct InstalledExporter<'a> {
    sink: &'a mut ExporterSink,
    gate: Arc<ExporterGate>,
}

impl InstalledExporter<'_> {
    pub fn spans<E: SpanExporter + 'static>(self, exporter: E) -> Self {
        let gated = Gated {
            inner: exporter,
            gate: self.gate.clone(),
        };
        let processor = BatchSpanProcessor::builder(gated)
            .with_batch_config(
                BatchConfigBuilder::default()
                    .with_max_queue_size(self.sink.max_queue_size)
                    .with_max_export_batch_size(self.sink.max_batch_size)
                    .with_scheduled_delay(self.sink.flush_interval)
                    .build(),
            )
            .build();
        self.sink.traces = self
            .sink
            .traces
            .take()
            .map(|builder| builder.with_span_processor(processor));
        self
    }

    pub fn metrics<E: PushMetricExporter>(self, exporter: E) -> Self {
        let gated = Gated {
            inner: exporter,
            gate: self.gate.clone(),
        };
        let reader = PeriodicReader::builder(gated)
            .with_interval(self.sink.flush_interval)
            .build();
        self.sink.metrics = self
            .sink
            .metrics
            .take()
            .map(|builder| builder.with_reader(reader));
        self
    }

    pub fn logs<E: LogExporter + 'static>(self, exporter: E) -> Self {
        let gated = Gated {
            inner: exporter,
            gate: self.gate.clone(),
        };
        let processor = BatchLogProcessor::builder(gated)
            .with_batch_config(
                LogBatchConfigBuilder::default()
                    .with_max_queue_size(self.sink.max_queue_size)
                    .with_max_export_batch_size(self.sink.max_batch_size)
                    .with_scheduled_delay(self.sink.flush_interval)
                    .build(),
            )
            .build();
        self.sink.logs = self
            .sink
            .logs
            .take()
            .map(|builder| builder.with_log_processor(processor));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_collector_is_a_connect_error() {
        let refused = OTelSdkError::InternalFailure(
            "tonic status: Unavailable, message: \"tcp connect error: Connection refused\"".into(),
        );
        assert!(ExportError::from_sdk("http://127.0.0.1:1", &refused).is_connect());

        let rejected = OTelSdkError::InternalFailure("HTTP export failed with status 400".into());
        assert!(!ExportError::from_sdk("http://collector:4318", &rejected).is_connect());

        let timeout = OTelSdkError::Timeout(Duration::from_secs(1));
        assert!(matches!(
            ExportError::from_sdk("http://collector:4317", &timeout),
            ExportError::Timeout(_)
        ));
    }

    #[test]
    fn test_connect_failure_closes_gate_once() {
        let set = Arc::new(GateSet::new(None));
        let gate = ExporterGate::new("otlp", "http://127.0.0.1:1", set.clone());
        assert_eq!(set.open_count(), 1);

        let refused = || Err(OTelSdkError::InternalFailure("connection refused".into()));
        assert!(gate.observe("span", 3, refused()).is_err());
        assert!(gate.observe("log", 1, refused()).is_err());

        assert!(!gate.is_open());
        assert_eq!(set.open_count(), 0);
        assert!(!set.any_open());
    }

    #[test]
    fn test_other_failures_keep_gate_open() {
        let set = Arc::new(GateSet::new(None));
        let gate = ExporterGate::new("otlp", "http://collector:4318", set.clone());

        let result = gate.observe(
            "span",
            2,
            Err(OTelSdkError::InternalFailure("status 500".into())),
        );

        assert!(result.is_err());
        assert!(gate.is_open());
        assert!(set.any_open());
    }
}
