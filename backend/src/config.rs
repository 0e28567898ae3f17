use std::path::{Path, PathBuf};

use privacy_engine::{DpMechanism, PrivacyConfig};
use serde::{Deserialize, Serialize};
use zk_proofs::types::Address;

use crate::errors::ApiError;

/// Aggregation policy and noise calibration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Minimum distinct repositories before any statistic is released.
    pub min_repositories: usize,
    /// Epsilon charged per released statistic.
    pub epsilon_per_statistic: f64,
    pub commit_sensitivity: f64,
    pub loc_sensitivity: f64,
    pub score_sensitivity: f64,
    pub mechanism: DpMechanism,
    /// Required when `mechanism` is Gaussian.
    pub delta: Option<f64>,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            min_repositories: 3,
            epsilon_per_statistic: 0.1,
            commit_sensitivity: 100.0,
            loc_sensitivity: 10_000.0,
            score_sensitivity: 5.0,
            mechanism: DpMechanism::Laplace,
            delta: None,
            seed: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub aggregator: AggregatorConfig,
    pub privacy: PrivacyConfig,
}

impl BackendConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "failed to read config file");
            ApiError::Internal
        })?;
        Self::from_toml_str(&raw).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "invalid config file");
            ApiError::Internal
        })
    }
}

/// Process settings read from the environment.
#[derive(Clone, Debug)]
pub struct Settings {
    pub addr: String,
    pub api_key: String,
    pub data_dir: PathBuf,
    /// Ledger administrator; authorized as a verifier at genesis.
    pub owner: Address,
    pub backend: BackendConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self, ApiError> {
        let addr = std::env::var("BACKEND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        // In production, this should be a strong secret from environment.
        let api_key = std::env::var("API_KEY").unwrap_or_else(|_| "dev-secret-key".to_string());
        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));

        let owner = match std::env::var("LEDGER_OWNER") {
            Ok(raw) => raw.parse().map_err(|e| {
                tracing::error!(error = %e, "LEDGER_OWNER is not a valid address");
                ApiError::Internal
            })?,
            Err(_) => {
                tracing::warn!("LEDGER_OWNER not set; using the zero address as ledger owner");
                Address::ZERO
            }
        };

        let backend = match std::env::var("CONFIG_PATH") {
            Ok(path) => BackendConfig::load(Path::new(&path))?,
            Err(_) => BackendConfig::default(),
        };

        Ok(Self { addr, api_key, data_dir, owner, backend })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = BackendConfig::from_toml_str(
            r#"
[aggregator]
min_repositories = 5
mechanism = "gaussian"
delta = 1e-6

[privacy]
epsilon_ceiling = 2.0
"#,
        )
        .unwrap();
        assert_eq!(cfg.aggregator.min_repositories, 5);
        assert_eq!(cfg.aggregator.mechanism, DpMechanism::Gaussian);
        assert_eq!(cfg.aggregator.epsilon_per_statistic, 0.1);
        assert_eq!(cfg.privacy.epsilon_ceiling, 2.0);
        assert_eq!(cfg.privacy.default_k, 5);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(BackendConfig::from_toml_str("").unwrap(), BackendConfig::default());
    }
}
