//! Configuration models.

use serde::Deserialize;

/// Storage connection settings forwarded to the analysis container.
///
/// These become the `STORAGE_*` environment variables of the spawn
/// contract.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    pub host: String,
    pub port: u16,
    pub engine: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

/// Credentials and sizing for the `hyper` remote backend.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HyperConfig {
    pub access_key: String,
    pub secret_key: String,

    /// Optional container size flag passed as `--size`.
    #[serde(default)]
    pub size: Option<String>,
}

/// Top-level configuration for running analysis containers.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Instance identifier; prefixes the deterministic container name.
    pub instance_id: String,

    /// Container service backend: `docker` or `hyper`.
    pub service: String,

    /// Image reference for the analysis container.
    pub container: String,

    /// Database URI handed to the container as `DB_URI`.
    pub db_uri: String,

    /// Override for the service binary. Defaults to the service name
    /// resolved on `PATH`.
    #[serde(default)]
    pub binary: Option<String>,

    pub storage: StorageConfig,

    /// Required when `service` is `hyper`.
    #[serde(default)]
    pub hyper: Option<HyperConfig>,
}

impl AnalysisConfig {
    /// The binary invoked for pull/run/rm, honoring the override.
    pub fn service_binary(&self) -> &str {
        self.binary.as_deref().unwrap_or(&self.service)
    }
}
