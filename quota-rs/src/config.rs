use crate::error::{QuotaError, Result};
use crate::quota::{QuotaLimits, ReconcilePolicy, RemediationRoutes};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment overrides, e.g. `QUOTA_LIMITS__ANONYMOUS_CAP=5`
pub const ENV_PREFIX: &str = "QUOTA";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    #[serde(default)]
    pub remediation: RemediationRoutes,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub database_url: String,
    /// Local profile used by the CLI (client id + cached counts)
    pub profile_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    pub anonymous_cap: u32,
    pub authenticated_cap: u32,
    #[serde(default)]
    pub reconcile: ReconcilePolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl LimitsConfig {
    pub fn quota_limits(&self) -> QuotaLimits {
        QuotaLimits {
            anonymous_cap: self.anonymous_cap,
            authenticated_cap: self.authenticated_cap,
        }
    }
}

impl Config {
    /// Parse a TOML file on its own
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| QuotaError::Config(e.to_string()))?;

        toml::from_str(&content).map_err(|e| QuotaError::Config(e.to_string()))
    }

    /// Defaults, overlaid by an optional TOML file, overlaid by `QUOTA_*`
    /// environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Config::default())
            .map_err(|e| QuotaError::Config(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| QuotaError::Config(e.to_string()))
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig {
                listen_addr: "0.0.0.0:8090".to_string(),
            },
            storage: StorageConfig {
                database_url: "sqlite://quota.db".to_string(),
                profile_path: "quota-profile.json".to_string(),
            },
            limits: LimitsConfig {
                anonymous_cap: 3,
                authenticated_cap: 6,
                reconcile: ReconcilePolicy::Max,
            },
            remediation: RemediationRoutes::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
