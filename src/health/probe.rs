// src/health/probe.rs
use super::HealthStatus;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

pub type TagSet = BTreeSet<String>;

/// Tag for checks cheap enough to gate restart decisions.
pub const LIVE_TAG: &str = "live";

/// Tag for checks that gate traffic (e.g. a reachable database).
pub const READY_TAG: &str = "ready";

/// A single subsystem health check.
///
/// An `Err` is treated the same as `Unhealthy` by the registry.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> anyhow::Result<HealthStatus>;
}

/// Adapts a synchronous closure into a [`HealthCheck`].
pub struct FnCheck<F>(F);

#[async_trait]
impl<F> HealthCheck for FnCheck<F>
where
    F: Fn() -> HealthStatus + Send + Sync,
{
    async fn check(&self) -> anyhow::Result<HealthStatus> {
        Ok((self.0)())
    }
}

#[derive(Clone)]
pub struct HealthProbe {
    name: String,
    tags: TagSet,
    check: Arc<dyn HealthCheck>,
}

impl HealthProbe {
    pub fn new<I, T>(name: impl Into<String>, tags: I, check: Arc<dyn HealthCheck>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            tags: tags.into_iter().map(Into::into).collect(),
            check,
        }
    }

    pub fn from_fn<I, T, F>(name: impl Into<String>, tags: I, check: F) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
        F: Fn() -> HealthStatus + Send + Sync + 'static,
    {
        Self::new(name, tags, Arc::new(FnCheck(check)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub(crate) fn check(&self) -> Arc<dyn HealthCheck> {
        self.check.clone()
    }

    /// An empty filter selects every probe.
    pub fn matches(&self, filter: &TagSet) -> bool {
        filter.is_empty() || !self.tags.is_disjoint(filter)
    }
}

impl std::fmt::Debug for HealthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProbe")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}
