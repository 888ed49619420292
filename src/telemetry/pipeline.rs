// src/telemetry/pipeline.rs
use super::exporter::{ExporterSink, GateSet, Providers};
use super::runtime::{self, RuntimeInstruments, RUNTIME_SCOPE};
use super::{
    Attributes, ExportError, ExporterConfig, ExporterFactory, LogBridge, SpanHandle,
    TelemetrySource,
};
use crate::config::TelemetryConfig;
use crate::metrics::MetricsCollector;
use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use opentelemetry::metrics::{Histogram, MeterProvider as _};
use opentelemetry::trace::{Tracer as _, TracerProvider as _};
use opentelemetry::{InstrumentationScope, KeyValue};
use opentelemetry_sdk::Resource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry pipeline has already been started")]
    AlreadyStarted,

    #[error(transparent)]
    Exporter(#[from] ExportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No exporter was running.
    Idle,
    Flushed,
    /// The grace period elapsed and unflushed telemetry was discarded.
    Abandoned,
}

type HistogramKey = (Arc<str>, String);

/// Everything that exists only while at least one exporter was installed.
struct Active {
    providers: Providers,
    gates: Arc<GateSet>,
    histograms: DashMap<HistogramKey, Histogram<f64>>,
    _runtime: Option<RuntimeInstruments>,
}

impl Active {
    fn is_open(&self) -> bool {
        self.gates.any_open()
    }

    fn histogram(&self, source: &TelemetrySource, name: &str) -> Histogram<f64> {
        let key = (source.name.clone(), name.to_string());
        if let Some(histogram) = self.histograms.get(&key) {
            return histogram.value().clone();
        }

        self.histograms
            .entry(key)
            .or_insert_with(|| {
                let scope = InstrumentationScope::builder(source.name().to_string()).build();
                self.providers
                    .meter
                    .meter_with_scope(scope)
                    .f64_histogram(name.to_string())
                    .build()
            })
            .value()
            .clone()
    }

    /// Flushes and stops every provider. Blocks until the exporters finish.
    fn shutdown(&self) -> Result<(), String> {
        let errors: Vec<String> = [
            ("traces", self.providers.tracer.shutdown()),
            ("metrics", self.providers.meter.shutdown()),
            ("logs", self.providers.logger.shutdown()),
        ]
        .into_iter()
        .filter_map(|(signal, result)| result.err().map(|e| format!("{}: {}", signal, e)))
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

/// Process-scoped telemetry over the OpenTelemetry SDK.
///
/// Recording never blocks and never fails. Spans and log records are queued
/// for a batch processor per exporter and leave in the order each thread
/// recorded them, split into batches of at most `max_batch_size`. Metric
/// recordings feed histograms that are aggregated and read every
/// `flush_interval`, so only their totals are exported. With no active
/// exporter every recording call returns immediately.
pub struct TelemetryPipeline {
    service_name: String,
    config: TelemetryConfig,
    active: ArcSwapOption<Active>,
    metrics: Option<Arc<MetricsCollector>>,
    log_bridge: LogBridge,
    started: AtomicBool,
}

impl TelemetryPipeline {
    pub fn new(
        service_name: &str,
        config: &TelemetryConfig,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            service_name: service_name.to_string(),
            config: config.clone(),
            active: ArcSwapOption::empty(),
            metrics,
            log_bridge: LogBridge::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Routes `tracing` events through `bridge` to the log exporters while
    /// the pipeline runs.
    pub fn with_log_bridge(mut self, bridge: LogBridge) -> Self {
        self.log_bridge = bridge;
        self
    }

    pub fn register_source(&self, name: &str) -> TelemetrySource {
        debug!(source = name, "Registered telemetry source");
        TelemetrySource::new(name)
    }

    /// False before start, with no exporters, after shutdown, or once every
    /// exporter has been disabled.
    pub fn is_active(&self) -> bool {
        self.active.load().as_deref().is_some_and(Active::is_open)
    }

    /// Installs an exporter per entry of `exporters` through `factory` and
    /// starts the providers. An empty list keeps the pipeline a no-op.
    pub fn start(
        &self,
        factory: &dyn ExporterFactory,
        exporters: &[ExporterConfig],
    ) -> Result<(), TelemetryError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TelemetryError::AlreadyStarted);
        }

        if exporters.is_empty() {
            info!("No telemetry exporter configured, telemetry stays local");
            return Ok(());
        }

        let gates = Arc::new(GateSet::new(self.metrics.clone()));
        let mut sink = ExporterSink::new(&self.config, gates.clone());
        for exporter in exporters {
            factory.install(exporter, &mut sink)?;
        }

        if sink.is_empty() {
            info!("Exporter factory installed nothing, telemetry stays local");
            return Ok(());
        }

        let resource = Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attribute(KeyValue::new(
                "service.instance.id",
                uuid::Uuid::new_v4().to_string(),
            ))
            .build();
        let providers = sink.build(resource);

        let runtime = self
            .config
            .runtime_metrics
            .then(|| runtime::register(&providers.meter.meter(RUNTIME_SCOPE)));

        self.log_bridge.attach(&providers.logger);
        self.active.store(Some(Arc::new(Active {
            providers,
            gates: gates.clone(),
            histograms: DashMap::new(),
            _runtime: runtime,
        })));

        info!(
            exporters = gates.open_count(),
            service = %self.service_name,
            "Telemetry pipeline started"
        );
        Ok(())
    }

    pub fn record_metric(
        &self,
        source: &TelemetrySource,
        name: &str,
        value: f64,
        attributes: Attributes,
    ) {
        let guard = self.active.load();
        let Some(active) = guard.as_deref().filter(|active| active.is_open()) else {
            return;
        };

        active
            .histogram(source, name)
            .record(value, &attributes.to_key_values());
        active.gates.count("metric", "recorded", 1);
    }

    pub fn start_span(
        &self,
        source: &TelemetrySource,
        name: &str,
        attributes: Attributes,
    ) -> SpanHandle {
        let guard = self.active.load();
        let Some(active) = guard.as_deref().filter(|active| active.is_open()) else {
            return SpanHandle::noop(name);
        };

        let tracer = active.providers.tracer.tracer(source.name().to_string());
        let span = tracer
            .span_builder(name.to_string())
            .with_attributes(attributes.to_key_values())
            .start(&tracer);

        SpanHandle::recording(name, span)
    }

    pub fn end_span(&self, span: SpanHandle) {
        if span.is_recording() {
            if let Some(active) = self.active.load().as_deref() {
                active.gates.count("span", "recorded", 1);
            }
        }
        span.end();
    }

    /// Stops accepting telemetry, flushes what is queued and shuts the
    /// exporters down. Gives up after `grace`, discarding anything unflushed.
    pub async fn shutdown(&self, grace: Duration) -> FlushOutcome {
        self.log_bridge.detach();

        let Some(active) = self.active.swap(None) else {
            return FlushOutcome::Idle;
        };

        // The SDK flushes synchronously. A plain thread keeps a stuck exporter
        // from holding up runtime shutdown once the grace period has passed.
        let (done, finished) = oneshot::channel();
        let spawned = std::thread::Builder::new()
            .name("telemetry-shutdown".into())
            .spawn(move || {
                let _ = done.send(active.shutdown());
            });

        let outcome = match spawned {
            Err(e) => {
                error!(error = %e, "Failed to start telemetry shutdown");
                FlushOutcome::Abandoned
            }
            Ok(_) => match timeout(grace, finished).await {
                Ok(Ok(Ok(()))) => {
                    info!("Telemetry pipeline flushed and stopped");
                    FlushOutcome::Flushed
                }
                Ok(Ok(Err(errors))) => {
                    warn!(%errors, "Telemetry providers failed to shut down cleanly");
                    FlushOutcome::Abandoned
                }
                Ok(Err(_)) => {
                    error!("Telemetry shutdown ended without reporting");
                    FlushOutcome::Abandoned
                }
                Err(_) => {
                    warn!(
                        ?grace,
                        "Telemetry flush exceeded the grace period, discarding unflushed telemetry"
                    );
                    FlushOutcome::Abandoned
                }
            },
        };

        if let Some(metrics) = &self.metrics {
            metrics.set_exporters_active(0);
        }
        outcome
    }
}
