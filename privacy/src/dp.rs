//! Differential-privacy mechanisms.
//!
//! Laplace noise is drawn by inverse-CDF sampling with scale `sensitivity / epsilon`.
//! Gaussian noise uses the Box–Muller transform with
//! `sigma = sensitivity * sqrt(2 ln(1.25 / delta)) / epsilon`.
//! The exponential mechanism selects a candidate index with probability proportional to
//! `exp(epsilon * score / (2 * sensitivity))`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::budget::QueryCost;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DpMechanism {
    Laplace,
    Gaussian,
    Exponential,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Count,
    Sum,
    Mean,
    Max,
    /// Data is a vector of bin counts; every bin is perturbed independently.
    Histogram,
}

#[derive(Debug, Error, PartialEq)]
pub enum DpError {
    #[error("epsilon must be > 0")]
    InvalidEpsilon,
    #[error("sensitivity must be positive")]
    InvalidSensitivity,
    #[error("delta must be within (0,1)")]
    InvalidDelta,
    #[error("exponential mechanism needs at least one candidate")]
    EmptyCandidates,
    #[error("candidate and score counts differ")]
    ScoreCountMismatch,
    #[error("{0:?} mechanism cannot perturb a numeric query")]
    UnsupportedMechanism(DpMechanism),
    #[error("candidate scores must be finite")]
    InvalidScore,
}

/// A single noisy statistic request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DpQuery {
    pub kind: QueryKind,
    pub epsilon: f64,
    pub delta: Option<f64>,
    pub sensitivity: f64,
    pub mechanism: DpMechanism,
}

impl DpQuery {
    pub fn laplace(kind: QueryKind, epsilon: f64, sensitivity: f64) -> Self {
        Self { kind, epsilon, delta: None, sensitivity, mechanism: DpMechanism::Laplace }
    }

    pub fn gaussian(kind: QueryKind, epsilon: f64, delta: f64, sensitivity: f64) -> Self {
        Self { kind, epsilon, delta: Some(delta), sensitivity, mechanism: DpMechanism::Gaussian }
    }

    pub fn validate(&self) -> Result<(), DpError> {
        if !(self.epsilon > 0.0) || !self.epsilon.is_finite() {
            return Err(DpError::InvalidEpsilon);
        }
        if !(self.sensitivity > 0.0) || !self.sensitivity.is_finite() {
            return Err(DpError::InvalidSensitivity);
        }
        match (self.mechanism, self.delta) {
            // Every query kind is numeric; selection goes through `DpEngine::select`.
            (DpMechanism::Exponential, _) => Err(DpError::UnsupportedMechanism(DpMechanism::Exponential)),
            (DpMechanism::Gaussian, Some(d)) if d > 0.0 && d < 1.0 => Ok(()),
            (DpMechanism::Gaussian, _) => Err(DpError::InvalidDelta),
            (_, Some(d)) if !(0.0..1.0).contains(&d) => Err(DpError::InvalidDelta),
            _ => Ok(()),
        }
    }

    /// Privacy cost charged to the budget when this query is answered.
    pub fn cost(&self) -> QueryCost {
        QueryCost { epsilon: self.epsilon, delta: self.delta.unwrap_or(0.0) }
    }

    fn clamps_to_non_negative(&self, data: &[f64]) -> bool {
        match self.kind {
            QueryKind::Count | QueryKind::Sum | QueryKind::Histogram => true,
            QueryKind::Max => data.iter().all(|v| *v >= 0.0),
            QueryKind::Mean => false,
        }
    }
}

/// Noisy answer to a [`DpQuery`]. The true statistic is never retained.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DpRelease {
    pub kind: QueryKind,
    pub mechanism: DpMechanism,
    /// One value, or one per bin for histograms.
    pub values: Vec<f64>,
    pub epsilon_spent: f64,
    pub delta_spent: f64,
}

impl DpRelease {
    pub fn value(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }
}

/// Gaussian-mechanism standard deviation for `(epsilon, delta)`-DP.
pub fn gaussian_sigma(sensitivity: f64, epsilon: f64, delta: f64) -> f64 {
    sensitivity * (2.0 * (1.25 / delta).ln()).sqrt() / epsilon
}

pub struct DpEngine {
    rng: ChaCha20Rng,
}

impl DpEngine {
    /// Seeded for reproducible runs, or from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };
        Self { rng }
    }

    /// Laplace(0, scale) via the inverse CDF.
    pub fn laplace_noise(&mut self, scale: f64) -> f64 {
        let u: f64 = self.rng.gen_range(-0.5..0.5);
        let magnitude = (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE);
        -scale * u.signum() * magnitude.ln()
    }

    /// N(0, sigma^2) via Box–Muller.
    pub fn gaussian_noise(&mut self, sigma: f64) -> f64 {
        // u1 in (0, 1] keeps the logarithm finite.
        let u1: f64 = 1.0 - self.rng.gen_range(0.0..1.0);
        let u2: f64 = self.rng.gen_range(0.0..1.0);
        sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Noise sample calibrated to `query`.
    pub fn noise(&mut self, query: &DpQuery) -> Result<f64, DpError> {
        query.validate()?;
        match query.mechanism {
            DpMechanism::Laplace => Ok(self.laplace_noise(query.sensitivity / query.epsilon)),
            DpMechanism::Gaussian => {
                let delta = query.delta.ok_or(DpError::InvalidDelta)?;
                Ok(self.gaussian_noise(gaussian_sigma(query.sensitivity, query.epsilon, delta)))
            }
            DpMechanism::Exponential => Err(DpError::UnsupportedMechanism(DpMechanism::Exponential)),
        }
    }

    /// Add calibrated noise to an already computed statistic.
    pub fn perturb(&mut self, query: &DpQuery, value: f64, clamp: bool) -> Result<f64, DpError> {
        let noisy = value + self.noise(query)?;
        Ok(if clamp { noisy.max(0.0) } else { noisy })
    }

    /// Compute the query's statistic over `data` and release it with noise.
    pub fn release(&mut self, query: &DpQuery, data: &[f64]) -> Result<DpRelease, DpError> {
        query.validate()?;
        let clamp = query.clamps_to_non_negative(data);

        let values = match query.kind {
            QueryKind::Histogram => data
                .iter()
                .map(|bin| self.perturb(query, *bin, clamp))
                .collect::<Result<Vec<_>, _>>()?,
            kind => vec![self.perturb(query, statistic(kind, data), clamp)?],
        };

        let cost = query.cost();
        tracing::debug!(kind = ?query.kind, epsilon = cost.epsilon, "released noisy statistic");
        Ok(DpRelease {
            kind: query.kind,
            mechanism: query.mechanism,
            values,
            epsilon_spent: cost.epsilon,
            delta_spent: cost.delta,
        })
    }

    /// Exponential mechanism: index of the selected candidate.
    pub fn exponential(&mut self, scores: &[f64], epsilon: f64, sensitivity: f64) -> Result<usize, DpError> {
        if !(epsilon > 0.0) {
            return Err(DpError::InvalidEpsilon);
        }
        if !(sensitivity > 0.0) {
            return Err(DpError::InvalidSensitivity);
        }
        if scores.is_empty() {
            return Err(DpError::EmptyCandidates);
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(DpError::InvalidScore);
        }

        // Shift by the best score so the exponentials cannot overflow.
        let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = scores
            .iter()
            .map(|s| (epsilon * (s - best) / (2.0 * sensitivity)).exp())
            .collect();
        let total: f64 = weights.iter().sum();

        let mut choice = self.rng.gen_range(0.0..total);
        for (i, w) in weights.iter().enumerate() {
            if choice < *w {
                return Ok(i);
            }
            choice -= w;
        }
        Ok(weights.len() - 1)
    }

    /// Exponential mechanism over explicit candidates.
    pub fn select<'a, T>(
        &mut self,
        candidates: &'a [T],
        scores: &[f64],
        epsilon: f64,
        sensitivity: f64,
    ) -> Result<&'a T, DpError> {
        if candidates.len() != scores.len() {
            return Err(DpError::ScoreCountMismatch);
        }
        let idx = self.exponential(scores, epsilon, sensitivity)?;
        Ok(&candidates[idx])
    }
}

fn statistic(kind: QueryKind, data: &[f64]) -> f64 {
    match kind {
        QueryKind::Count => data.len() as f64,
        QueryKind::Sum | QueryKind::Histogram => data.iter().sum(),
        QueryKind::Mean if data.is_empty() => 0.0,
        QueryKind::Mean => data.iter().sum::<f64>() / data.len() as f64,
        QueryKind::Max => data.iter().copied().reduce(f64::max).unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean_abs(samples: &[f64]) -> f64 {
        samples.iter().map(|x| x.abs()).sum::<f64>() / samples.len() as f64
    }

    #[test]
    fn laplace_noise_has_expected_scale() {
        let mut engine = DpEngine::new(Some(1));
        let samples: Vec<f64> = (0..20_000).map(|_| engine.laplace_noise(2.0)).collect();
        // E|X| = b for Laplace(0, b).
        let m = mean_abs(&samples);
        assert!((m - 2.0).abs() < 0.1, "mean |x| = {m}");
    }

    #[test]
    fn gaussian_noise_has_expected_sigma() {
        let mut engine = DpEngine::new(Some(2));
        let samples: Vec<f64> = (0..20_000).map(|_| engine.gaussian_noise(3.0)).collect();
        let var = samples.iter().map(|x| x * x).sum::<f64>() / samples.len() as f64;
        assert!((var.sqrt() - 3.0).abs() < 0.1, "sigma = {}", var.sqrt());
    }

    #[test]
    fn gaussian_sigma_formula() {
        let sigma = gaussian_sigma(1.0, 1.0, 1e-5);
        let expected = (2.0 * (1.25e5f64).ln()).sqrt();
        assert!((sigma - expected).abs() < 1e-12);
    }

    #[test]
    fn seeded_engines_are_reproducible() {
        let q = DpQuery::laplace(QueryKind::Sum, 0.5, 10.0);
        let a = DpEngine::new(Some(9)).release(&q, &[1.0, 2.0]).unwrap();
        let b = DpEngine::new(Some(9)).release(&q, &[1.0, 2.0]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn count_like_results_are_clamped() {
        let mut engine = DpEngine::new(Some(3));
        // Huge noise relative to the statistic.
        let q = DpQuery::laplace(QueryKind::Count, 0.01, 1_000.0);
        for _ in 0..200 {
            assert!(engine.release(&q, &[1.0]).unwrap().value() >= 0.0);
        }
        let hist = DpQuery::laplace(QueryKind::Histogram, 0.01, 1_000.0);
        let r = engine.release(&hist, &[0.0, 1.0, 2.0]).unwrap();
        assert_eq!(r.values.len(), 3);
        assert!(r.values.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn validation_rejects_bad_parameters() {
        assert_eq!(DpQuery::laplace(QueryKind::Sum, 0.0, 1.0).validate(), Err(DpError::InvalidEpsilon));
        assert_eq!(DpQuery::laplace(QueryKind::Sum, 1.0, -1.0).validate(), Err(DpError::InvalidSensitivity));
        assert_eq!(DpQuery::gaussian(QueryKind::Sum, 1.0, 1.0, 1.0).validate(), Err(DpError::InvalidDelta));
        let mut no_delta = DpQuery::gaussian(QueryKind::Sum, 1.0, 1e-5, 1.0);
        no_delta.delta = None;
        assert_eq!(no_delta.validate(), Err(DpError::InvalidDelta));
    }

    #[test]
    fn exponential_mechanism_prefers_high_scores() {
        let mut engine = DpEngine::new(Some(4));
        let candidates = ["low", "high"];
        let scores = [0.0, 10.0];
        let picks_high = (0..1_000)
            .filter(|_| *engine.select(&candidates, &scores, 2.0, 1.0).unwrap() == "high")
            .count();
        assert!(picks_high > 990, "picked high {picks_high} times");

        assert_eq!(engine.exponential(&[], 1.0, 1.0), Err(DpError::EmptyCandidates));
        assert_eq!(
            engine.select(&candidates, &[1.0], 1.0, 1.0).unwrap_err(),
            DpError::ScoreCountMismatch
        );
    }

    #[test]
    fn exponential_is_not_a_numeric_mechanism() {
        let mut engine = DpEngine::new(Some(5));
        let q = DpQuery { mechanism: DpMechanism::Exponential, ..DpQuery::laplace(QueryKind::Sum, 1.0, 1.0) };
        assert_eq!(q.validate(), Err(DpError::UnsupportedMechanism(DpMechanism::Exponential)));
        assert_eq!(
            engine.release(&q, &[1.0]).unwrap_err(),
            DpError::UnsupportedMechanism(DpMechanism::Exponential)
        );
    }

    #[test]
    fn exponential_rejects_non_finite_scores() {
        let mut engine = DpEngine::new(Some(6));
        assert_eq!(engine.exponential(&[1.0, f64::NAN], 1.0, 1.0), Err(DpError::InvalidScore));
        assert_eq!(engine.exponential(&[f64::INFINITY, 0.0], 1.0, 1.0), Err(DpError::InvalidScore));
        assert_eq!(
            engine.select(&["a", "b"], &[f64::NEG_INFINITY, 2.0], 1.0, 1.0).unwrap_err(),
            DpError::InvalidScore
        );
    }
}
