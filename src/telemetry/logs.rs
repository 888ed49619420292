// src/telemetry/logs.rs
use arc_swap::ArcSwapOption;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::{SdkLogger, SdkLoggerProvider};
use std::sync::Arc;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

type Bridge = OpenTelemetryTracingBridge<SdkLoggerProvider, SdkLogger>;

// Exporting a log record logs through these crates; forwarding their events
// would feed the exporter its own output.
const EXPORT_TARGETS: &[&str] = &["opentelemetry", "tonic", "h2", "hyper", "tower", "reqwest"];

/// A `tracing` layer that forwards events to the log exporters once the
/// telemetry pipeline has started, and drops them before that and after
/// shutdown.
///
/// Install it in the subscriber at process start, then hand a clone to the
/// bootstrapper. Each record carries the formatted message as its body and
/// the event's fields as attributes.
#[derive(Clone, Default)]
pub struct LogBridge {
    bridge: Arc<ArcSwapOption<Bridge>>,
}

impl LogBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.bridge.load().is_some()
    }

    pub(crate) fn attach(&self, provider: &SdkLoggerProvider) {
        self.bridge
            .store(Some(Arc::new(OpenTelemetryTracingBridge::new(provider))));
    }

    pub(crate) fn detach(&self) {
        self.bridge.store(None);
    }
}

fn is_export_internal(target: &str) -> bool {
    EXPORT_TARGETS.iter().any(|prefix| {
        target
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::") || rest.starts_with('_'))
    })
}

impl<S> Layer<S> for LogBridge
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if is_export_internal(event.metadata().target()) {
            return;
        }

        if let Some(bridge) = self.bridge.load_full() {
            bridge.on_event(event, ctx);
        }
    }
}
