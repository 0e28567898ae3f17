use serde::{Deserialize, Serialize};

use crate::dp::DpMechanism;

/// Engine-wide privacy limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Global ceiling on the summed epsilon a subject may spend.
    pub epsilon_ceiling: f64,
    /// Ceiling on the summed delta (only approximate-DP mechanisms spend delta).
    pub delta_ceiling: f64,
    /// Default `k` for k-anonymity checks when a request omits it.
    pub default_k: u64,
    /// Default l-diversity level.
    pub diversity_level: u64,
    pub default_mechanism: DpMechanism,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            epsilon_ceiling: 1.0,
            delta_ceiling: 1e-5,
            default_k: 5,
            diversity_level: 2,
            default_mechanism: DpMechanism::Laplace,
        }
    }
}
