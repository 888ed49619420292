// src/telemetry/selector.rs
use crate::config::TelemetryConfig;

/// One exporter the pipeline should activate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    endpoint: Option<String>,
    enabled: bool,
}

impl ExporterConfig {
    /// `enabled` holds exactly when the trimmed endpoint is non-empty.
    pub fn from_endpoint(endpoint: Option<&str>) -> Self {
        let endpoint = endpoint
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .map(str::to_owned);

        Self {
            enabled: endpoint.is_some(),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Decides which exporters to activate. Pure: reads only `otlp_endpoint`
/// and never touches the network.
pub fn select_exporters(config: &TelemetryConfig) -> Vec<ExporterConfig> {
    let otlp = ExporterConfig::from_endpoint(config.otlp_endpoint.as_deref());

    if otlp.is_enabled() {
        vec![otlp]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(endpoint: Option<&str>) -> TelemetryConfig {
        TelemetryConfig {
            otlp_endpoint: endpoint.map(str::to_owned),
            ..TelemetryConfig::default()
        }
    }

    #[test]
    fn test_unset_endpoint_selects_nothing() {
        assert!(select_exporters(&config(None)).is_empty());
    }

    #[test]
    fn test_blank_endpoint_selects_nothing() {
        assert!(select_exporters(&config(Some(" "))).is_empty());
        assert!(select_exporters(&config(Some(""))).is_empty());
        assert!(select_exporters(&config(Some("\t\n"))).is_empty());
    }

    #[test]
    fn test_endpoint_selects_one_enabled_exporter() {
        let selected = select_exporters(&config(Some("http://collector:4317")));

        assert_eq!(selected.len(), 1);
        assert!(selected[0].is_enabled());
        assert_eq!(selected[0].endpoint(), Some("http://collector:4317"));
    }

    #[test]
    fn test_endpoint_is_trimmed() {
        let selected = select_exporters(&config(Some("  http://collector:4318 ")));
        assert_eq!(selected[0].endpoint(), Some("http://collector:4318"));
    }

    #[test]
    fn test_selection_is_deterministic() {
        let config = config(Some("http://collector:4317"));
        assert_eq!(select_exporters(&config), select_exporters(&config));
    }

    proptest! {
        #[test]
        fn prop_enabled_iff_trimmed_endpoint_non_empty(
            endpoint in "[ \\t]{0,3}[a-z:/0-9]{0,12}[ \\t]{0,3}"
        ) {
            let exporter = ExporterConfig::from_endpoint(Some(&endpoint));
            let trimmed = endpoint.trim();

            prop_assert_eq!(exporter.is_enabled(), !trimmed.is_empty());
            if exporter.is_enabled() {
                prop_assert_eq!(exporter.endpoint(), Some(trimmed));
            }
        }
    }
}
