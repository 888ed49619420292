// src/telemetry/mod.rs
mod exporter;
mod logs;
mod otlp;
mod pipeline;
mod runtime;
mod selector;
mod signal;

pub use exporter::{ExportError, ExporterFactory, ExporterSink, InstalledExporter};
pub use logs::LogBridge;
pub use otlp::{OtlpExporterFactory, OTLP_EXPORTER};
pub use pipeline::{FlushOutcome, TelemetryError, TelemetryPipeline};
pub use runtime::RUNTIME_SCOPE;
pub use selector::{select_exporters, ExporterConfig};
pub use signal::{Attributes, SpanHandle, TelemetrySource};
