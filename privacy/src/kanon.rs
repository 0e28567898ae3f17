//! K-anonymity and l-diversity validation of an equivalence-class claim.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KAnonymityError {
    #[error("k must be at least 1")]
    InvalidK,

    #[error("at least one quasi-identifier is required")]
    NoQuasiIdentifiers,
}

/// One quasi-identifying attribute and how it was protected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuasiIdentifier {
    pub name: String,
    pub raw_value: String,
    #[serde(default)]
    pub generalized_value: Option<String>,
    #[serde(default)]
    pub suppressed: bool,
}

impl QuasiIdentifier {
    /// Suppressed, or generalized to a value that differs from the raw one.
    pub fn is_protected(&self) -> bool {
        self.suppressed || self.generalized_value.as_deref().is_some_and(|g| g != self.raw_value)
    }

    /// Value as released.
    pub fn released_value(&self) -> &str {
        if self.suppressed {
            crate::generalize::SUPPRESSED
        } else {
            self.generalized_value.as_deref().unwrap_or(&self.raw_value)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KAnonymityRequest {
    pub group_size: u64,
    pub k: u64,
    pub equivalence_class_size: u64,
    pub attributes: Vec<QuasiIdentifier>,
    /// Sensitive values observed inside the equivalence class.
    #[serde(default)]
    pub sensitive_values: Vec<String>,
    pub diversity_level: u64,
}

/// Equivalence class as released: quasi-identifier names with their generalized values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivalenceClass {
    pub group_size: u64,
    pub k: u64,
    pub quasi_identifiers: Vec<String>,
    pub generalized_values: Vec<String>,
    pub suppression_flags: Vec<bool>,
    pub diversity_level: u64,
}

impl EquivalenceClass {
    pub fn from_request(request: &KAnonymityRequest) -> Self {
        Self {
            group_size: request.group_size,
            k: request.k,
            quasi_identifiers: request.attributes.iter().map(|a| a.name.clone()).collect(),
            generalized_values: request.attributes.iter().map(|a| a.released_value().to_string()).collect(),
            suppression_flags: request.attributes.iter().map(|a| a.suppressed).collect(),
            diversity_level: request.diversity_level,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KAnonymityReport {
    pub group_size_valid: bool,
    pub equivalence_class_valid: bool,
    pub protected_attributes: usize,
    pub attribute_count: usize,
    pub is_k_anonymous: bool,
    pub distinct_sensitive_values: usize,
    pub diversity_achieved: bool,
    /// Weighted score in `[0, 100]`.
    pub privacy_score: f64,
    pub equivalence_class: EquivalenceClass,
}

const GROUP_SIZE_WEIGHT: f64 = 40.0;
const PROTECTION_WEIGHT: f64 = 30.0;
const EQUIVALENCE_WEIGHT: f64 = 20.0;
const DIVERSITY_WEIGHT: f64 = 10.0;

pub fn evaluate(request: &KAnonymityRequest) -> Result<KAnonymityReport, KAnonymityError> {
    if request.k == 0 {
        return Err(KAnonymityError::InvalidK);
    }
    if request.attributes.is_empty() {
        return Err(KAnonymityError::NoQuasiIdentifiers);
    }

    let group_size_valid = request.group_size >= request.k;
    let equivalence_class_valid = request.equivalence_class_size >= request.k;
    let attribute_count = request.attributes.len();
    let protected_attributes = request.attributes.iter().filter(|a| a.is_protected()).count();
    let half_protected = 2 * protected_attributes >= attribute_count;
    let is_k_anonymous = group_size_valid && equivalence_class_valid && half_protected;

    let distinct_sensitive_values = request.sensitive_values.iter().collect::<HashSet<_>>().len();
    let diversity_achieved = distinct_sensitive_values as u64 >= request.diversity_level;

    let bit = |b: bool| if b { 1.0 } else { 0.0 };
    let privacy_score = GROUP_SIZE_WEIGHT * bit(group_size_valid)
        + PROTECTION_WEIGHT * (protected_attributes as f64 / attribute_count as f64)
        + EQUIVALENCE_WEIGHT * bit(equivalence_class_valid)
        + DIVERSITY_WEIGHT * bit(diversity_achieved);

    if !is_k_anonymous {
        tracing::debug!(
            group_size_valid,
            equivalence_class_valid,
            protected_attributes,
            attribute_count,
            "equivalence class is not k-anonymous"
        );
    }

    Ok(KAnonymityReport {
        group_size_valid,
        equivalence_class_valid,
        protected_attributes,
        attribute_count,
        is_k_anonymous,
        distinct_sensitive_values,
        diversity_achieved,
        privacy_score,
        equivalence_class: EquivalenceClass::from_request(request),
    })
}
