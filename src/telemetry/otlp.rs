// src/telemetry/otlp.rs
//
// OTLP exporters for all three signals, over gRPC (the default) or
// protobuf over HTTP.

use super::{ExportError, ExporterConfig, ExporterFactory, ExporterSink};
use crate::config::OtlpProtocol;
use opentelemetry_otlp::{LogExporter, MetricExporter, Protocol, SpanExporter, WithExportConfig};
use std::time::Duration;
use tracing::info;
use url::Url;

pub const OTLP_EXPORTER: &str = "otlp";

const TRACES_PATH: &str = "v1/traces";
const METRICS_PATH: &str = "v1/metrics";
const LOGS_PATH: &str = "v1/logs";

/// Builds the OTLP span, metric and log exporters for a selected endpoint.
#[derive(Debug, Clone)]
pub struct OtlpExporterFactory {
    protocol: OtlpProtocol,
    timeout: Duration,
}

impl OtlpExporterFactory {
    pub fn new(protocol: OtlpProtocol, timeout: Duration) -> Self {
        Self { protocol, timeout }
    }

    fn install_grpc(&self, endpoint: &str, sink: &mut ExporterSink) -> Result<(), ExportError> {
        let spans = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .with_timeout(self.timeout)
            .build()
            .map_err(build_error)?;
        let metrics = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .with_timeout(self.timeout)
            .build()
            .map_err(build_error)?;
        let logs = LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .with_timeout(self.timeout)
            .build()
            .map_err(build_error)?;

        sink.exporter(OTLP_EXPORTER, endpoint)
            .spans(spans)
            .metrics(metrics)
            .logs(logs);
        Ok(())
    }

    fn install_http(&self, endpoint: &Url, sink: &mut ExporterSink) -> Result<(), ExportError> {
        let spans = SpanExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .with_endpoint(signal_url(endpoint, TRACES_PATH)?)
            .with_timeout(self.timeout)
            .build()
            .map_err(build_error)?;
        let metrics = MetricExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .with_endpoint(signal_url(endpoint, METRICS_PATH)?)
            .with_timeout(self.timeout)
            .build()
            .map_err(build_error)?;
        let logs = LogExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .with_endpoint(signal_url(endpoint, LOGS_PATH)?)
            .with_timeout(self.timeout)
            .build()
            .map_err(build_error)?;

        sink.exporter(OTLP_EXPORTER, endpoint.as_str())
            .spans(spans)
            .metrics(metrics)
            .logs(logs);
        Ok(())
    }
}

impl ExporterFactory for OtlpExporterFactory {
    fn install(&self, config: &ExporterConfig, sink: &mut ExporterSink) -> Result<(), ExportError> {
        let endpoint = config
            .endpoint()
            .ok_or_else(|| ExportError::InvalidEndpoint("exporter has no endpoint".into()))?;
        let url = parse_endpoint(endpoint)?;

        match self.protocol {
            OtlpProtocol::Grpc => self.install_grpc(endpoint, sink)?,
            OtlpProtocol::HttpProtobuf => self.install_http(&url, sink)?,
        }

        info!(endpoint = %url, protocol = ?self.protocol, "OTLP exporter installed");
        Ok(())
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ExportError> {
    let url = Url::parse(endpoint)
        .map_err(|e| ExportError::InvalidEndpoint(format!("'{}': {}", endpoint, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ExportError::InvalidEndpoint(format!(
            "unsupported scheme '{}' in {}",
            url.scheme(),
            url
        )));
    }

    Ok(url)
}

/// The HTTP exporters post to the exact URL they are given, so the per-signal
/// path is appended to whatever base path the endpoint carries.
fn signal_url(endpoint: &Url, path: &str) -> Result<String, ExportError> {
    // `Url::join` replaces the last segment unless the base ends in '/'.
    let mut base = endpoint.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }

    base.join(path)
        .map(String::from)
        .map_err(|e| ExportError::InvalidEndpoint(e.to_string()))
}

fn build_error(error: impl std::fmt::Display) -> ExportError {
    ExportError::Build(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryConfig;
    use crate::telemetry::{Attributes, FlushOutcome, TelemetryPipeline};

    fn config(endpoint: &str, protocol: OtlpProtocol) -> TelemetryConfig {
        TelemetryConfig {
            otlp_endpoint: Some(endpoint.to_string()),
            otlp_protocol: protocol,
            runtime_metrics: false,
            flush_interval_ms: 20,
            ..TelemetryConfig::default()
        }
    }

    #[test]
    fn test_signal_urls_keep_endpoint_path() {
        let endpoint = Url::parse("http://collector:4318/otlp").unwrap();

        assert_eq!(
            signal_url(&endpoint, TRACES_PATH).unwrap(),
            "http://collector:4318/otlp/v1/traces"
        );
        assert_eq!(
            signal_url(&endpoint, METRICS_PATH).unwrap(),
            "http://collector:4318/otlp/v1/metrics"
        );

        let root = Url::parse("http://collector:4318").unwrap();
        assert_eq!(signal_url(&root, LOGS_PATH).unwrap(), "http://collector:4318/v1/logs");
    }

    #[test]
    fn test_invalid_endpoints_are_rejected() {
        assert!(matches!(
            parse_endpoint("not a url"),
            Err(ExportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            parse_endpoint("ftp://collector"),
            Err(ExportError::InvalidEndpoint(_))
        ));
        assert!(parse_endpoint("https://collector:4317").is_ok());
    }

    #[tokio::test]
    async fn test_grpc_exporter_installs_for_default_port() {
        let telemetry = config("http://127.0.0.1:4317", OtlpProtocol::Grpc);
        let pipeline = TelemetryPipeline::new("svc", &telemetry, None);
        let factory = OtlpExporterFactory::new(OtlpProtocol::Grpc, Duration::from_secs(1));

        pipeline
            .start(&factory, &[ExporterConfig::from_endpoint(Some("http://127.0.0.1:4317"))])
            .unwrap();

        assert!(pipeline.is_active());
        pipeline.shutdown(Duration::from_millis(200)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spans_are_posted_as_otlp_protobuf() {
        let mut server = mockito::Server::new_async().await;
        let traces = server
            .mock("POST", "/v1/traces")
            .match_header("content-type", "application/x-protobuf")
            .with_status(200)
            .expect_at_least(1)
            .create_async()
            .await;
        let _metrics = server.mock("POST", "/v1/metrics").with_status(200).create_async().await;
        let _logs = server.mock("POST", "/v1/logs").with_status(200).create_async().await;

        let telemetry = config(&server.url(), OtlpProtocol::HttpProtobuf);
        let pipeline = TelemetryPipeline::new("svc", &telemetry, None);
        let factory = OtlpExporterFactory::new(OtlpProtocol::HttpProtobuf, Duration::from_secs(2));
        pipeline
            .start(&factory, &[ExporterConfig::from_endpoint(Some(&server.url()))])
            .unwrap();

        let source = pipeline.register_source("orders");
        let span = pipeline.start_span(&source, "place-order", Attributes::from([("k", "v")]));
        assert!(span.is_recording());
        pipeline.end_span(span);

        let outcome = pipeline.shutdown(Duration::from_secs(5)).await;

        assert_eq!(outcome, FlushOutcome::Flushed);
        traces.assert_async().await;
    }
}
