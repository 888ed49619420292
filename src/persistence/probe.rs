// src/persistence/probe.rs
use super::{ConnectionDescriptor, PersistenceProvider};
use crate::health::{HealthCheck, HealthProbe, HealthStatus, READY_TAG};
use async_trait::async_trait;
use std::sync::Arc;

pub const PERSISTENCE_PROBE: &str = "persistence";

/// Healthy when a connection can be opened and answers a ping.
pub struct PersistenceProbe {
    provider: Arc<dyn PersistenceProvider>,
    descriptor: ConnectionDescriptor,
}

impl PersistenceProbe {
    pub fn new(provider: Arc<dyn PersistenceProvider>, descriptor: ConnectionDescriptor) -> Self {
        Self {
            provider,
            descriptor,
        }
    }

    pub fn into_probe(self) -> HealthProbe {
        HealthProbe::new(PERSISTENCE_PROBE, [READY_TAG], Arc::new(self))
    }
}

#[async_trait]
impl HealthCheck for PersistenceProbe {
    async fn check(&self) -> anyhow::Result<HealthStatus> {
        let connection = self.provider.open_connection(&self.descriptor).await?;
        connection.ping().await?;
        Ok(HealthStatus::Healthy)
    }
}
