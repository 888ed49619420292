// src/persistence/mod.rs
//
// The seam to an external data store. Mapping, migrations and queries live
// behind `PersistenceProvider`; this crate only opens connections for health
// checks and asks the provider to apply its model once at startup.

mod descriptor;
mod probe;

pub use descriptor::ConnectionDescriptor;
pub use probe::{PersistenceProbe, PERSISTENCE_PROBE};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("connection string is not configured")]
    NotConfigured,

    #[error("malformed connection string: {0}")]
    Malformed(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("failed to apply model: {0}")]
    Model(String),
}

impl PersistenceError {
    /// Connection failures may clear up on their own; the rest will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, PersistenceError::Connection(_))
    }
}

/// Identifies the model a provider should make available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub name: String,
    pub version: u32,
}

impl SchemaDescriptor {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

#[async_trait]
pub trait Connection: Send + Sync {
    async fn ping(&self) -> Result<(), PersistenceError>;
}

#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    async fn open_connection(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn Connection>, PersistenceError>;

    async fn apply_model(&self, schema: &SchemaDescriptor) -> Result<(), PersistenceError>;
}
