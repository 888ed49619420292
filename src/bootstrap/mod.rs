// src/bootstrap/mod.rs
mod endpoints;
mod state;

pub use endpoints::{
    health_response, map_health_endpoints, map_metrics_endpoint, ALIVE_PATH, HEALTH_PATH,
};
pub use state::BootstrapState;

use crate::config::Settings;
use crate::health::{HealthError, HealthRegistry, HealthStatus, LIVE_TAG};
use crate::metrics::{MetricsCollector, MetricsRegistry};
use crate::persistence::{
    ConnectionDescriptor, PersistenceError, PersistenceProbe, PersistenceProvider,
    SchemaDescriptor,
};
use crate::retry::{RetryDecision, RetryStrategy};
use crate::server::{RequestHandler, RouteError, Router};
use crate::telemetry::{
    select_exporters, Attributes, ExporterFactory, FlushOutcome, LogBridge, OtlpExporterFactory,
    TelemetryError, TelemetryPipeline, TelemetrySource,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Name of the built-in liveness probe.
pub const SELF_PROBE: &str = "self";

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Fatal: the process should exit non-zero.
    #[error("startup configuration error: {0}")]
    StartupConfiguration(String),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: BootstrapState,
    },

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("failed to set up metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

struct Components {
    registry: Arc<HealthRegistry>,
    telemetry: Arc<TelemetryPipeline>,
    metrics_registry: Arc<MetricsRegistry>,
    metrics: Arc<MetricsCollector>,
    app_source: TelemetrySource,
}

/// Composes the health registry, telemetry pipeline and exporter selection
/// at startup and hands out the pieces request handling needs.
pub struct Bootstrapper {
    settings: Settings,
    state: BootstrapState,
    exporter_factory: Arc<dyn ExporterFactory>,
    persistence: Option<Arc<dyn PersistenceProvider>>,
    log_bridge: LogBridge,
    components: Option<Components>,
}

impl Bootstrapper {
    pub fn new(settings: Settings) -> Self {
        let exporter_factory = Arc::new(OtlpExporterFactory::new(
            settings.telemetry.otlp_protocol,
            settings.telemetry.export_timeout(),
        ));

        Self {
            settings,
            state: BootstrapState::Uninitialized,
            exporter_factory,
            persistence: None,
            log_bridge: LogBridge::new(),
            components: None,
        }
    }

    pub fn with_exporter_factory(mut self, factory: Arc<dyn ExporterFactory>) -> Self {
        self.exporter_factory = factory;
        self
    }

    pub fn with_persistence(mut self, provider: Arc<dyn PersistenceProvider>) -> Self {
        self.persistence = Some(provider);
        self
    }

    /// Forwards `tracing` events to the log exporters once telemetry starts.
    /// `bridge` must already be installed in the process subscriber.
    pub fn with_log_bridge(mut self, bridge: LogBridge) -> Self {
        self.log_bridge = bridge;
        self
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Wires the health registry, the telemetry pipeline and the selected
    /// exporters, in that order. Any failure leaves the bootstrapper
    /// `Stopped` with nothing exposed.
    pub async fn initialize(&mut self) -> Result<(), BootstrapError> {
        self.transition("initialize", BootstrapState::Initializing)?;
        info!(service = %self.settings.service.name, "Bootstrapping service");

        match self.build_components().await {
            Ok(components) => {
                self.components = Some(components);
                self.state = BootstrapState::Ready;
                info!("Service ready");
                Ok(())
            }
            Err(e) => {
                self.state = BootstrapState::Stopped;
                error!(error = %e, "Bootstrap failed");
                Err(e)
            }
        }
    }

    async fn build_components(&self) -> Result<Components, BootstrapError> {
        let started = Instant::now();
        let metrics_registry = Arc::new(MetricsRegistry::new()?);
        let metrics = metrics_registry.collector();

        let registry = Arc::new(HealthRegistry::new(
            self.settings.health.probe_timeout(),
            Some(metrics.clone()),
        ));
        registry.register_fn(SELF_PROBE, [LIVE_TAG], || HealthStatus::Healthy)?;
        self.wire_persistence(&registry).await?;

        let telemetry = Arc::new(
            TelemetryPipeline::new(
                &self.settings.service.name,
                &self.settings.telemetry,
                Some(metrics.clone()),
            )
            .with_log_bridge(self.log_bridge.clone()),
        );
        let app_source = telemetry.register_source(&self.settings.service.name);

        let exporters = select_exporters(&self.settings.telemetry);
        telemetry
            .start(self.exporter_factory.as_ref(), &exporters)
            .map_err(|e| match e {
                TelemetryError::Exporter(e) => BootstrapError::StartupConfiguration(e.to_string()),
                other => other.into(),
            })?;

        telemetry.record_metric(
            &app_source,
            "service.startup.duration",
            started.elapsed().as_secs_f64(),
            Attributes::new(),
        );

        Ok(Components {
            registry,
            telemetry,
            metrics_registry,
            metrics,
            app_source,
        })
    }

    async fn wire_persistence(&self, registry: &HealthRegistry) -> Result<(), BootstrapError> {
        let config = match (&self.settings.persistence, &self.persistence) {
            (None, None) => return Ok(()),
            (None, Some(_)) => {
                return Err(BootstrapError::StartupConfiguration(
                    "persistence provider supplied without persistence.connection_string".into(),
                ))
            }
            (Some(config), _) => config,
        };

        let descriptor = ConnectionDescriptor::parse(&config.connection_string)
            .map_err(|e| BootstrapError::StartupConfiguration(format!("persistence: {}", e)))?;

        let Some(provider) = &self.persistence else {
            warn!(%descriptor, "Persistence configured without a provider, skipping probe");
            return Ok(());
        };

        let schema_name = if config.schema.trim().is_empty() {
            self.settings.service.name.clone()
        } else {
            config.schema.clone()
        };
        let schema = SchemaDescriptor::new(schema_name, config.schema_version);

        RetryStrategy::new(self.settings.retry.clone())
            .execute(
                || provider.apply_model(&schema),
                |e: &PersistenceError| {
                    if e.is_transient() {
                        RetryDecision::Retry
                    } else {
                        RetryDecision::NoRetry
                    }
                },
            )
            .await
            .map_err(|e| BootstrapError::StartupConfiguration(format!("persistence: {}", e)))?;

        registry.register(PersistenceProbe::new(provider.clone(), descriptor).into_probe())?;

        info!(
            schema = %schema.name,
            version = schema.version,
            "Persistence provider wired"
        );
        Ok(())
    }

    /// Adds `/health` and `/alive` to `router`.
    pub fn map_endpoints(&self, router: &mut Router) -> Result<(), BootstrapError> {
        let components = self.ready("map endpoints")?;
        map_health_endpoints(router, components.registry.clone())?;
        Ok(())
    }

    /// Adds the Prometheus endpoint when enabled. Returns whether it did.
    pub fn map_metrics_endpoint(&self, router: &mut Router) -> Result<bool, BootstrapError> {
        let components = self.ready("map metrics endpoint")?;

        if !self.settings.metrics.enabled {
            return Ok(false);
        }

        map_metrics_endpoint(
            router,
            &self.settings.metrics.path,
            components.metrics_registry.clone(),
        )?;
        Ok(true)
    }

    pub fn request_handler(&self, router: Router) -> Result<RequestHandler, BootstrapError> {
        let components = self.ready("build request handler")?;
        Ok(RequestHandler::new(
            router,
            components.telemetry.clone(),
            Some(components.metrics.clone()),
        ))
    }

    pub fn health_registry(&self) -> Option<Arc<HealthRegistry>> {
        self.components.as_ref().map(|c| c.registry.clone())
    }

    pub fn telemetry(&self) -> Option<Arc<TelemetryPipeline>> {
        self.components.as_ref().map(|c| c.telemetry.clone())
    }

    pub fn app_source(&self) -> Option<&TelemetrySource> {
        self.components.as_ref().map(|c| &c.app_source)
    }

    /// Stops telemetry intake and flushes within `telemetry.shutdown_grace_ms`.
    pub async fn shutdown(&mut self) -> Result<FlushOutcome, BootstrapError> {
        self.transition("shut down", BootstrapState::ShuttingDown)?;
        info!("Shutting down");

        let outcome = match &self.components {
            Some(components) => {
                components
                    .telemetry
                    .shutdown(self.settings.telemetry.shutdown_grace())
                    .await
            }
            None => FlushOutcome::Idle,
        };

        self.state = BootstrapState::Stopped;
        info!(?outcome, "Service stopped");
        Ok(outcome)
    }

    fn ready(&self, operation: &'static str) -> Result<&Components, BootstrapError> {
        match (&self.state, &self.components) {
            (BootstrapState::Ready, Some(components)) => Ok(components),
            _ => Err(BootstrapError::InvalidState {
                operation,
                state: self.state,
            }),
        }
    }

    fn transition(
        &mut self,
        operation: &'static str,
        next: BootstrapState,
    ) -> Result<(), BootstrapError> {
        if !self.state.can_transition_to(next) {
            return Err(BootstrapError::InvalidState {
                operation,
                state: self.state,
            });
        }
        self.state = next;
        Ok(())
    }
}
