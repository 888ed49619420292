// src/telemetry/runtime.rs
use opentelemetry::metrics::{Meter, ObservableGauge};
use std::time::Instant;
use tokio::runtime::{Handle, RuntimeMetrics};

/// Instrumentation scope of the runtime and process gauges.
pub const RUNTIME_SCOPE: &str = "service_defaults.runtime";

/// Observable gauges sampled on every metric collection, held for as long
/// as their meter provider runs.
pub(crate) struct RuntimeInstruments {
    _uptime: ObservableGauge<f64>,
    _tokio: Vec<ObservableGauge<u64>>,
}

/// Registers `process.uptime` and, when called inside a Tokio runtime, the
/// runtime's worker count, alive task count and global queue depth.
pub(crate) fn register(meter: &Meter) -> RuntimeInstruments {
    let started = Instant::now();
    let uptime = meter
        .f64_observable_gauge("process.uptime")
        .with_unit("s")
        .with_description("Time since telemetry started")
        .with_callback(move |observer| observer.observe(started.elapsed().as_secs_f64(), &[]))
        .build();

    let tokio = match Handle::try_current() {
        Ok(handle) => vec![
            tokio_gauge(
                meter,
                "tokio.runtime.workers",
                "Worker threads used by the runtime",
                handle.clone(),
                RuntimeMetrics::num_workers,
            ),
            tokio_gauge(
                meter,
                "tokio.runtime.alive_tasks",
                "Tasks spawned and not yet completed",
                handle.clone(),
                RuntimeMetrics::num_alive_tasks,
            ),
            tokio_gauge(
                meter,
                "tokio.runtime.global_queue_depth",
                "Tasks waiting in the runtime's global queue",
                handle,
                RuntimeMetrics::global_queue_depth,
            ),
        ],
        Err(_) => Vec::new(),
    };

    RuntimeInstruments {
        _uptime: uptime,
        _tokio: tokio,
    }
}

fn tokio_gauge(
    meter: &Meter,
    name: &'static str,
    description: &'static str,
    handle: Handle,
    read: fn(&RuntimeMetrics) -> usize,
) -> ObservableGauge<u64> {
    meter
        .u64_observable_gauge(name)
        .with_description(description)
        .with_callback(move |observer| observer.observe(read(&handle.metrics()) as u64, &[]))
        .build()
}
