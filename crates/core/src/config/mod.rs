//! Configuration for the container service and storage contract.

pub mod error;
pub mod loader;
pub mod models;

pub use error::{ConfigError, ConfigResult};
pub use loader::load_config;
pub use models::{AnalysisConfig, HyperConfig, StorageConfig};
