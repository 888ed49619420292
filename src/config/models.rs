// src/config/models.rs
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use super::SettingsError;

/// Top-level service settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub health: HealthConfig,
    pub telemetry: TelemetryConfig,
    pub metrics: MetricsConfig,
    pub retry: RetryConfig,
    pub persistence: Option<PersistenceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name used for the application telemetry source and the OTLP resource.
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "service-defaults".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub probe_timeout_ms: u64,
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 5_000,
        }
    }
}

/// Wire protocol for the OTLP exporters, as in `OTEL_EXPORTER_OTLP_PROTOCOL`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum OtlpProtocol {
    /// gRPC, conventionally on port 4317.
    #[default]
    #[serde(rename = "grpc")]
    Grpc,
    /// Protobuf over HTTP, conventionally on port 4318.
    #[serde(rename = "http/protobuf")]
    HttpProtobuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Mirrors `OTEL_EXPORTER_OTLP_ENDPOINT`. Blank means "no exporter".
    pub otlp_endpoint: Option<String>,
    pub otlp_protocol: OtlpProtocol,
    /// Publish tokio runtime and process gauges alongside application metrics.
    pub runtime_metrics: bool,
    pub buffer_capacity: usize,
    pub max_batch_size: usize,
    pub flush_interval_ms: u64,
    pub export_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl TelemetryConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_millis(self.export_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            otlp_protocol: OtlpProtocol::Grpc,
            runtime_metrics: true,
            buffer_capacity: 4_096,
            max_batch_size: 512,
            flush_interval_ms: 1_000,
            export_timeout_ms: 10_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl RetryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 2_000,
        }
    }
}

/// Connection settings handed to an external persistence provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub connection_string: String,
    pub schema: String,
    pub schema_version: u32,
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.service.name.trim().is_empty() {
            return Err(SettingsError::Invalid("service.name must not be blank".into()));
        }

        if self.health.probe_timeout_ms == 0 {
            return Err(SettingsError::Invalid(
                "health.probe_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.telemetry.buffer_capacity == 0 || self.telemetry.max_batch_size == 0 {
            return Err(SettingsError::Invalid(
                "telemetry.buffer_capacity and telemetry.max_batch_size must be greater than zero"
                    .into(),
            ));
        }

        if self.telemetry.flush_interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "telemetry.flush_interval_ms must be greater than zero".into(),
            ));
        }

        if self.telemetry.export_timeout_ms == 0 {
            return Err(SettingsError::Invalid(
                "telemetry.export_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(SettingsError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            return Err(SettingsError::Invalid(format!(
                "metrics.path must start with '/', got '{}'",
                self.metrics.path
            )));
        }

        Ok(())
    }
}
