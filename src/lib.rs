// src/lib.rs
pub mod bootstrap;
pub mod config;
pub mod health;
pub mod metrics;
pub mod persistence;
pub mod retry;
pub mod server;
pub mod telemetry;

pub use bootstrap::{BootstrapError, BootstrapState, Bootstrapper};
pub use config::{load_config, Settings};
