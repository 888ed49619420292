// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::InMemoryLogExporter;
use opentelemetry_sdk::metrics::InMemoryMetricExporter;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SpanData, SpanExporter};
use service_defaults::persistence::{
    Connection, ConnectionDescriptor, PersistenceError, PersistenceProvider, SchemaDescriptor,
};
use service_defaults::telemetry::{ExportError, ExporterConfig, ExporterFactory, ExporterSink};
use service_defaults::Settings;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A span exporter whose exports never finish.
#[derive(Debug)]
pub struct HangingExporter;

impl SpanExporter for HangingExporter {
    async fn export(&self, _batch: Vec<SpanData>) -> OTelSdkResult {
        futures::future::pending::<()>().await;
        Ok(())
    }
}

/// Installs in-memory exporters for every signal and counts how often it
/// was asked. `hang` swaps the span exporter for [`HangingExporter`].
#[derive(Default)]
pub struct StubFactory {
    pub created: AtomicU32,
    pub spans: InMemorySpanExporter,
    pub metrics: InMemoryMetricExporter,
    pub logs: InMemoryLogExporter,
    pub hang: bool,
}

impl StubFactory {
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn created(&self) -> u32 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn span_names(&self) -> Vec<String> {
        self.spans
            .get_finished_spans()
            .unwrap()
            .into_iter()
            .map(|span| span.name.to_string())
            .collect()
    }

    /// Distinct metric names across every collection, sorted.
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .metrics
            .get_finished_metrics()
            .unwrap()
            .iter()
            .flat_map(|resource| resource.scope_metrics())
            .flat_map(|scope| scope.metrics())
            .map(|metric| metric.name().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl ExporterFactory for StubFactory {
    fn install(&self, config: &ExporterConfig, sink: &mut ExporterSink) -> Result<(), ExportError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let exporter = sink.exporter("stub", config.endpoint().unwrap_or_default());
        let exporter = if self.hang {
            exporter.spans(HangingExporter)
        } else {
            exporter.spans(self.spans.clone())
        };
        exporter.metrics(self.metrics.clone()).logs(self.logs.clone());
        Ok(())
    }
}

pub struct StubConnection {
    healthy: bool,
}

#[async_trait]
impl Connection for StubConnection {
    async fn ping(&self) -> Result<(), PersistenceError> {
        if self.healthy {
            Ok(())
        } else {
            Err(PersistenceError::Connection("ping failed".into()))
        }
    }
}

/// Fails `apply_model` with a connection error `unavailable_for` times
/// before it succeeds, or with a model error on every call when `broken`.
#[derive(Default)]
pub struct StubProvider {
    pub unhealthy: AtomicBool,
    pub unavailable_for: AtomicU32,
    pub broken: AtomicBool,
    pub attempts: AtomicU32,
    pub applied: Mutex<Vec<SchemaDescriptor>>,
}

#[async_trait]
impl PersistenceProvider for StubProvider {
    async fn open_connection(
        &self,
        _descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn Connection>, PersistenceError> {
        Ok(Box::new(StubConnection {
            healthy: !self.unhealthy.load(Ordering::SeqCst),
        }))
    }

    async fn apply_model(&self, schema: &SchemaDescriptor) -> Result<(), PersistenceError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) {
            return Err(PersistenceError::Model("bad migration".into()));
        }
        if attempt < self.unavailable_for.load(Ordering::SeqCst) {
            return Err(PersistenceError::Connection("database starting up".into()));
        }
        self.applied.lock().unwrap().push(schema.clone());
        Ok(())
    }
}

/// Defaults with fast flushes so tests don't wait on the interval.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.service.name = "orders".to_string();
    settings.telemetry.flush_interval_ms = 20;
    settings.telemetry.shutdown_grace_ms = 2_000;
    settings.telemetry.runtime_metrics = false;
    settings.health.probe_timeout_ms = 500;
    settings.retry.backoff_base_ms = 5;
    settings.retry.backoff_max_ms = 20;
    settings
}

pub fn with_endpoint(endpoint: &str) -> Settings {
    let mut settings = test_settings();
    settings.telemetry.otlp_endpoint = Some(endpoint.to_string());
    settings
}

pub const SHORT: Duration = Duration::from_millis(200);
