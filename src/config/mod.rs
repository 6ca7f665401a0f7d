//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Top-level config struct and loading (Config, DatabaseConfig, MetricsConfig)
//! - [`admission`]: Admission tunables (AdmissionConfig)
//! - [`validation`]: Startup validation of a loaded config

mod admission;
mod types;
pub mod validation;

pub use admission::AdmissionConfig;
pub use types::{Config, ConfigError, DatabaseConfig, MetricsConfig};
