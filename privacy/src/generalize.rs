//! Generalization helpers that turn raw quasi-identifiers into protected values.

use serde::{Deserialize, Serialize};

use crate::kanon::QuasiIdentifier;

/// Placeholder for a fully suppressed value.
pub const SUPPRESSED: &str = "*";

/// How a raw attribute value is protected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Generalization {
    /// Keep the raw value.
    None,
    /// Replace a number with its `[lo, hi]` bucket of the given width.
    Bucket { width: u64 },
    /// Keep the first `keep` characters and mask the rest.
    Prefix { keep: usize },
    Suppress,
}

/// Inclusive numeric range produced by bucketing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericBucket {
    pub lo: u64,
    pub hi: u64,
}

impl NumericBucket {
    pub fn containing(value: u64, width: u64) -> Self {
        let width = width.max(1);
        let lo = value - value % width;
        Self { lo, hi: lo.saturating_add(width - 1) }
    }

    pub fn contains(&self, value: u64) -> bool {
        self.lo <= value && value <= self.hi
    }
}

impl std::fmt::Display for NumericBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.lo == self.hi {
            write!(f, "{}", self.lo)
        } else {
            write!(f, "[{}, {}]", self.lo, self.hi)
        }
    }
}

/// Keep `keep` leading characters, masking every other character with `*`.
pub fn suppress_prefix(value: &str, keep: usize) -> String {
    value
        .chars()
        .enumerate()
        .map(|(i, c)| if i < keep { c } else { '*' })
        .collect()
}

/// Apply `rule` to a raw value, producing the quasi-identifier record the k-anonymity check
/// consumes. A bucket rule on a non-numeric value suppresses it.
pub fn generalize(name: &str, raw: &str, rule: Generalization) -> QuasiIdentifier {
    let (generalized_value, suppressed) = match rule {
        Generalization::None => (None, false),
        Generalization::Suppress => (Some(SUPPRESSED.to_string()), true),
        Generalization::Prefix { keep } => (Some(suppress_prefix(raw, keep)), false),
        Generalization::Bucket { width } => match raw.trim().parse::<u64>() {
            Ok(v) => (Some(NumericBucket::containing(v, width).to_string()), false),
            Err(_) => (Some(SUPPRESSED.to_string()), true),
        },
    };
    QuasiIdentifier { name: name.to_string(), raw_value: raw.to_string(), generalized_value, suppressed }
}
