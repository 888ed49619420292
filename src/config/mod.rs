// src/config/mod.rs
mod models;

pub use models::*;

use ::config::{Config, Environment, File};
use std::path::Path;

/// The one key that decides whether telemetry leaves the process.
pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Prefix for environment overrides, e.g. `SERVICE_DEFAULTS__SERVER__BIND_ADDRESS`.
pub const ENV_PREFIX: &str = "SERVICE_DEFAULTS";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Load settings from defaults, an optional file (YAML or JSON, by extension),
/// `SERVICE_DEFAULTS__*` environment variables and `OTEL_EXPORTER_OTLP_ENDPOINT`.
pub fn load_config(path: Option<&Path>) -> Result<Settings, SettingsError> {
    load_config_with_endpoint(path, std::env::var(OTLP_ENDPOINT_ENV).ok())
}

/// Same as [`load_config`] with the exporter endpoint supplied by the caller
/// instead of read from the process environment.
pub fn load_config_with_endpoint(
    path: Option<&Path>,
    otlp_endpoint: Option<String>,
) -> Result<Settings, SettingsError> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let settings: Settings = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("telemetry.otlp_endpoint", otlp_endpoint)?
        .build()?
        .try_deserialize()?;

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_temp(extension: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "service-defaults-{}.{}",
            uuid::Uuid::new_v4().simple(),
            extension
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = load_config_with_endpoint(None, None).unwrap();

        assert_eq!(settings.health.probe_timeout_ms, 5_000);
        assert_eq!(settings.server.bind_address.port(), 8080);
        assert!(settings.telemetry.otlp_endpoint.is_none());
        assert!(settings.persistence.is_none());
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let path = write_temp(
            "yaml",
            "service:\n  name: orders\nhealth:\n  probe_timeout_ms: 250\nmetrics:\n  enabled: false\n",
        );

        let settings = load_config_with_endpoint(Some(&path), None).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.service.name, "orders");
        assert_eq!(settings.health.probe_timeout_ms, 250);
        assert!(!settings.metrics.enabled);
        assert_eq!(settings.telemetry.max_batch_size, 512);
    }

    #[test]
    fn test_json_file_with_persistence_section() {
        let path = write_temp(
            "json",
            r#"{"persistence": {"connection_string": "Data Source=db;Initial Catalog=app", "schema": "app", "schema_version": 2}}"#,
        );

        let settings = load_config_with_endpoint(Some(&path), None).unwrap();
        std::fs::remove_file(&path).ok();

        let persistence = settings.persistence.unwrap();
        assert_eq!(persistence.schema, "app");
        assert_eq!(persistence.schema_version, 2);
    }

    #[test]
    fn test_endpoint_override_is_applied() {
        let settings =
            load_config_with_endpoint(None, Some("http://collector:4317".to_string())).unwrap();

        assert_eq!(
            settings.telemetry.otlp_endpoint.as_deref(),
            Some("http://collector:4317")
        );
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let path = write_temp("yaml", "health:\n  probe_timeout_ms: 0\n");

        let result = load_config_with_endpoint(Some(&path), None);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_zero_export_timeout_is_rejected() {
        let mut settings = Settings::default();
        settings.telemetry.export_timeout_ms = 0;

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("export_timeout_ms"));
    }

    #[test]
    fn test_protocol_defaults_to_grpc() {
        let settings = load_config_with_endpoint(None, None).unwrap();
        assert_eq!(settings.telemetry.otlp_protocol, OtlpProtocol::Grpc);
        assert!(settings.telemetry.runtime_metrics);

        let path = write_temp("yaml", "telemetry:\n  otlp_protocol: http/protobuf\n");
        let settings = load_config_with_endpoint(Some(&path), None).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.telemetry.otlp_protocol, OtlpProtocol::HttpProtobuf);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = load_config_with_endpoint(Some(Path::new("/nonexistent/settings.yaml")), None);
        assert!(matches!(result, Err(SettingsError::Load(_))));
    }
}
