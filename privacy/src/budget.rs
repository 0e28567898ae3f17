//! Privacy budget accounting under basic sequential composition.
//!
//! Epsilons (and deltas) of composed queries add up. A [`BudgetLedger`] holds one
//! [`PrivacyBudget`] per subject and accepts a batch of queries only if the whole batch fits
//! under the ceiling; a rejected batch leaves the ledger untouched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PrivacyConfig;
use crate::dp::DpMechanism;

#[derive(Debug, Error, PartialEq)]
pub enum BudgetError {
    #[error("privacy budget exhausted: requested epsilon {requested}, remaining {remaining}")]
    Exhausted { requested: f64, remaining: f64 },

    #[error("delta budget exhausted")]
    DeltaExhausted,

    #[error("query cost must be finite and non-negative")]
    InvalidCost,
}

/// Epsilon/delta charged by one query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryCost {
    pub epsilon: f64,
    pub delta: f64,
}

impl QueryCost {
    fn is_valid(&self) -> bool {
        self.epsilon.is_finite() && self.delta.is_finite() && self.epsilon >= 0.0 && self.delta >= 0.0
    }
}

/// Result of composing a sequence of queries.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub total_epsilon: f64,
    pub total_delta: f64,
    pub budget_exhausted: bool,
}

/// Basic sequential composition: totals are plain sums, exhausted iff the epsilon total
/// exceeds `ceiling`.
pub fn compose(costs: &[QueryCost], ceiling: f64) -> Composition {
    let total_epsilon: f64 = costs.iter().map(|c| c.epsilon).sum();
    let total_delta: f64 = costs.iter().map(|c| c.delta).sum();
    Composition { total_epsilon, total_delta, budget_exhausted: total_epsilon > ceiling }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrivacyBudget {
    /// Epsilon ceiling for this budget.
    pub epsilon: f64,
    /// Delta ceiling; `None` for pure-DP budgets.
    pub delta: Option<f64>,
    pub sensitivity: f64,
    pub mechanism: DpMechanism,
    pub spent_epsilon: f64,
    pub spent_delta: Option<f64>,
}

impl PrivacyBudget {
    pub fn new(epsilon: f64, delta: Option<f64>, sensitivity: f64, mechanism: DpMechanism) -> Self {
        Self { epsilon, delta, sensitivity, mechanism, spent_epsilon: 0.0, spent_delta: delta.map(|_| 0.0) }
    }

    pub fn from_config(config: &PrivacyConfig) -> Self {
        Self::new(config.epsilon_ceiling, Some(config.delta_ceiling), 1.0, config.default_mechanism)
    }

    pub fn remaining_epsilon(&self) -> f64 {
        (self.epsilon - self.spent_epsilon).max(0.0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.spent_epsilon >= self.epsilon
    }

    /// Check that `costs` fit without mutating anything.
    pub fn check(&self, costs: &[QueryCost]) -> Result<QueryCost, BudgetError> {
        if costs.iter().any(|c| !c.is_valid()) {
            return Err(BudgetError::InvalidCost);
        }
        let batch = compose(costs, self.epsilon);
        if self.spent_epsilon + batch.total_epsilon > self.epsilon {
            return Err(BudgetError::Exhausted {
                requested: batch.total_epsilon,
                remaining: self.remaining_epsilon(),
            });
        }
        if batch.total_delta > 0.0 {
            let ceiling = self.delta.unwrap_or(0.0);
            if self.spent_delta.unwrap_or(0.0) + batch.total_delta > ceiling {
                return Err(BudgetError::DeltaExhausted);
            }
        }
        Ok(QueryCost { epsilon: batch.total_epsilon, delta: batch.total_delta })
    }

    /// Charge `costs` all at once or not at all.
    pub fn spend(&mut self, costs: &[QueryCost]) -> Result<QueryCost, BudgetError> {
        let total = self.check(costs)?;
        self.spent_epsilon += total.epsilon;
        if total.delta > 0.0 || self.spent_delta.is_some() {
            self.spent_delta = Some(self.spent_delta.unwrap_or(0.0) + total.delta);
        }
        Ok(total)
    }
}

/// Per-subject budget ledger.
#[derive(Clone, Debug)]
pub struct BudgetLedger {
    config: PrivacyConfig,
    budgets: HashMap<String, PrivacyBudget>,
}

impl BudgetLedger {
    pub fn new(config: PrivacyConfig) -> Self {
        Self { config, budgets: HashMap::new() }
    }

    pub fn config(&self) -> &PrivacyConfig {
        &self.config
    }

    /// Atomically reserve a batch of query costs for `subject`.
    pub fn reserve(&mut self, subject: &str, costs: &[QueryCost]) -> Result<QueryCost, BudgetError> {
        let budget = self
            .budgets
            .entry(subject.to_string())
            .or_insert_with(|| PrivacyBudget::from_config(&self.config));
        match budget.spend(costs) {
            Ok(total) => {
                tracing::debug!(
                    subject,
                    epsilon = total.epsilon,
                    spent = budget.spent_epsilon,
                    "reserved privacy budget"
                );
                Ok(total)
            }
            Err(e) => {
                tracing::warn!(subject, error = %e, "privacy budget reservation rejected");
                Err(e)
            }
        }
    }

    /// Re-apply a previously accepted spend, e.g. when rebuilding from an audit log.
    /// Ceilings are not re-checked.
    pub fn restore(&mut self, subject: &str, spent: QueryCost) {
        let budget = self
            .budgets
            .entry(subject.to_string())
            .or_insert_with(|| PrivacyBudget::from_config(&self.config));
        budget.spent_epsilon += spent.epsilon;
        budget.spent_delta = Some(budget.spent_delta.unwrap_or(0.0) + spent.delta);
    }

    pub fn snapshot(&self, subject: &str) -> PrivacyBudget {
        self.budgets
            .get(subject)
            .cloned()
            .unwrap_or_else(|| PrivacyBudget::from_config(&self.config))
    }
}
