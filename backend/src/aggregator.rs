//! Multi-repository aggregation.
//!
//! Per-repository metrics are folded into one user-level profile. Totals and the placeholder
//! scores go through the differential-privacy engine, and the whole privacy cost of a run is
//! reserved up front: a run either spends its full epsilon or nothing.

use std::collections::{BTreeMap, HashSet};

use ark_bn254::Fr;
use ark_ff::Zero;
use privacy_engine::{BudgetError, BudgetLedger, DpEngine, DpError, DpQuery, QueryCost, QueryKind};
use thiserror::Error;
use zk_proofs::circuit::AggregateWitness;
use zk_proofs::hash::{field_from_bytes, fr_to_be_bytes, hash_chain, language_id, repository_leaf, subject_hash};
use zk_proofs::merkle::MerkleTree;

use crate::config::AggregatorConfig;
use crate::models::{AggregateProfile, RepositoryMetric};

/// Statistics released with noise per run: total commits, total LOC, consistency, diversity.
pub const RELEASED_STATISTICS: usize = 4;

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("at least {required} distinct repositories are required, got {actual}")]
    InsufficientRepositories { required: usize, actual: usize },

    #[error("corpus exceeds {capacity} repositories")]
    CorpusTooLarge { capacity: usize },

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error(transparent)]
    Dp(#[from] DpError),
}

/// Everything one run produces: the profile, the Aggregate circuit witness and the corpus tree.
#[derive(Clone, Debug)]
pub struct AggregationOutput {
    pub profile: AggregateProfile,
    pub witness: AggregateWitness,
    pub corpus: MerkleTree,
    pub epsilon_spent: f64,
    pub delta_spent: f64,
}

/// Exact per-repository contributions, combined by a fold.
#[derive(Clone, Debug, Default)]
struct Totals {
    commits: u64,
    loc: u64,
    collaborators: u64,
    languages: BTreeMap<String, u64>,
    owned_by_subject: usize,
}

impl Totals {
    fn of(metric: &RepositoryMetric, subject: Fr) -> Self {
        let mut languages = BTreeMap::new();
        for (language, loc) in &metric.language_histogram {
            let total = languages.entry(language.to_ascii_lowercase()).or_insert(0u64);
            *total = total.saturating_add(*loc);
        }
        Self {
            commits: metric.commit_count,
            loc: metric.lines_of_code,
            collaborators: metric.collaborator_count,
            languages,
            owned_by_subject: (metric.owner_hash == subject) as usize,
        }
    }

    fn merge(mut self, other: Totals) -> Self {
        self.commits = self.commits.saturating_add(other.commits);
        self.loc = self.loc.saturating_add(other.loc);
        self.collaborators = self.collaborators.saturating_add(other.collaborators);
        for (language, loc) in other.languages {
            let total = self.languages.entry(language).or_insert(0);
            *total = total.saturating_add(loc);
        }
        self.owned_by_subject = self.owned_by_subject.saturating_add(other.owned_by_subject);
        self
    }
}

/// Corpus leaf and dedup key for a repository: `H(hash(name), ownerHash)`.
pub fn repository_key(metric: &RepositoryMetric) -> Fr {
    repository_leaf(field_from_bytes(metric.name.as_bytes()), metric.owner_hash)
}

/// `round(100 * loc(lang) / max_loc)` for every language across `metrics`.
pub fn language_proficiency(metrics: &[RepositoryMetric]) -> BTreeMap<String, u64> {
    let mut merged: BTreeMap<String, u64> = BTreeMap::new();
    for metric in metrics {
        for (language, loc) in &metric.language_histogram {
            let total = merged.entry(language.to_ascii_lowercase()).or_insert(0);
            *total = total.saturating_add(*loc);
        }
    }
    normalize(&merged)
}

fn normalize(languages: &BTreeMap<String, u64>) -> BTreeMap<String, u64> {
    let max = languages.values().copied().max().unwrap_or(0);
    languages
        .iter()
        .map(|(language, loc)| {
            let score = if max == 0 { 0 } else { (100.0 * *loc as f64 / max as f64).round() as u64 };
            (language.clone(), score)
        })
        .collect()
}

/// Digest over the proficiency map, bound into the credential hash.
pub fn language_digest(proficiency: &BTreeMap<String, u64>) -> Fr {
    let values: Vec<Fr> = proficiency
        .iter()
        .flat_map(|(language, score)| [language_id(language), Fr::from(*score)])
        .collect();
    hash_chain(Fr::zero(), &values)
}

/// Budget ledger key for a subject.
pub fn budget_key(subject_id: &str) -> String {
    hex::encode(fr_to_be_bytes(&subject_hash(subject_id)))
}

fn to_count(x: f64) -> u64 {
    x.round().max(0.0) as u64
}

fn to_score(x: f64) -> u64 {
    x.round().clamp(0.0, 100.0) as u64
}

pub struct MultiRepositoryAggregator {
    config: AggregatorConfig,
    repositories: Vec<RepositoryMetric>,
    seen: HashSet<[u8; 32]>,
    engine: DpEngine,
}

impl MultiRepositoryAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        let engine = DpEngine::new(config.seed);
        Self { config, repositories: Vec::new(), seen: HashSet::new(), engine }
    }

    /// Add one repository. Returns `false` if it was already added.
    pub fn add_repository(&mut self, metric: RepositoryMetric) -> bool {
        let key = fr_to_be_bytes(&repository_key(&metric));
        if !self.seen.insert(key) {
            tracing::debug!(repository = %metric.name, "skipping duplicate repository");
            return false;
        }
        self.repositories.push(metric);
        true
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    fn query(&self, kind: QueryKind, sensitivity: f64) -> DpQuery {
        DpQuery {
            kind,
            epsilon: self.config.epsilon_per_statistic,
            delta: self.config.delta,
            sensitivity,
            mechanism: self.config.mechanism,
        }
    }

    /// Corpus size policy: at least `min_repositories` distinct repositories, at most a full tree.
    pub fn check_corpus(&self) -> Result<(), AggregationError> {
        let actual = self.repositories.len();
        if actual < self.config.min_repositories {
            tracing::warn!(required = self.config.min_repositories, actual, "too few repositories to aggregate");
            return Err(AggregationError::InsufficientRepositories {
                required: self.config.min_repositories,
                actual,
            });
        }
        if actual > MerkleTree::CAPACITY {
            return Err(AggregationError::CorpusTooLarge { capacity: MerkleTree::CAPACITY });
        }
        Ok(())
    }

    /// Build the subject's aggregate profile.
    ///
    /// Corpus and query checks run before the budget is touched; once the reservation
    /// succeeds the run cannot fail.
    pub fn generate_aggregated_credentials(
        &mut self,
        subject_id: &str,
        budget: &mut BudgetLedger,
    ) -> Result<AggregationOutput, AggregationError> {
        self.check_corpus()?;
        let actual = self.repositories.len();

        let commits_q = self.query(QueryKind::Sum, self.config.commit_sensitivity);
        let loc_q = self.query(QueryKind::Sum, self.config.loc_sensitivity);
        let score_q = self.query(QueryKind::Count, self.config.score_sensitivity);
        for q in [&commits_q, &loc_q, &score_q] {
            q.validate()?;
        }

        let costs: Vec<QueryCost> = [&commits_q, &loc_q, &score_q, &score_q].iter().map(|q| q.cost()).collect();
        debug_assert_eq!(costs.len(), RELEASED_STATISTICS);
        let spent = budget.reserve(&budget_key(subject_id), &costs)?;

        let subject = subject_hash(subject_id);
        let totals = self
            .repositories
            .iter()
            .map(|m| Totals::of(m, subject))
            .fold(Totals::default(), Totals::merge);

        let commits: Vec<f64> = self.repositories.iter().map(|m| m.commit_count as f64).collect();
        let loc: Vec<f64> = self.repositories.iter().map(|m| m.lines_of_code as f64).collect();
        let total_commits = to_count(self.engine.release(&commits_q, &commits)?.value());
        let total_loc = to_count(self.engine.release(&loc_q, &loc)?.value());

        let n = actual as u64;
        let proficiency = normalize(&totals.languages);
        let mean_collaborators = totals.collaborators as f64 / actual as f64;
        let collaboration_score = (10.0 * mean_collaborators).round().min(100.0) as u64;

        let consistency_base = (10 * n).min(100) as f64;
        let diversity_base = (10 * totals.languages.len() as u64).min(100) as f64;
        let consistency_score = to_score(self.engine.perturb(&score_q, consistency_base, true)?);
        let diversity_score = to_score(self.engine.perturb(&score_q, diversity_base, true)?);

        let is_not_owner_of_all = totals.owned_by_subject < actual;

        let leaves: Vec<Fr> = self.repositories.iter().map(repository_key).collect();
        let corpus = MerkleTree::new(&leaves).ok_or(AggregationError::CorpusTooLarge { capacity: MerkleTree::CAPACITY })?;

        // Anchor on a foreign repository when one exists so non-ownership can be proven.
        let anchor_index = self.repositories.iter().position(|m| m.owner_hash != subject).unwrap_or(0);
        let anchor = &self.repositories[anchor_index];
        let anchor_path = corpus
            .path(anchor_index)
            .ok_or(AggregationError::CorpusTooLarge { capacity: MerkleTree::CAPACITY })?;

        let witness = AggregateWitness {
            subject_hash: subject,
            total_commits,
            total_loc,
            collaboration_score,
            consistency_score,
            diversity_score,
            repository_count: n,
            is_not_owner_of_all,
            corpus_root: corpus.root(),
            language_digest: language_digest(&proficiency),
            anchor_name_hash: field_from_bytes(anchor.name.as_bytes()),
            anchor_owner_hash: anchor.owner_hash,
            anchor_path,
        };

        let profile = AggregateProfile {
            subject_id: subject_id.to_string(),
            total_commits,
            total_loc,
            language_proficiency: proficiency,
            collaboration_score,
            consistency_score,
            diversity_score,
            repository_count: n,
            is_not_owner_of_all,
            credential_hash: witness.credential_hash(),
        };

        tracing::info!(
            repositories = actual,
            epsilon = spent.epsilon,
            is_not_owner_of_all,
            "aggregated repository metrics"
        );

        Ok(AggregationOutput { profile, witness, corpus, epsilon_spent: spent.epsilon, delta_spent: spent.delta })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use privacy_engine::PrivacyConfig;

    pub(crate) fn metric(name: &str, owner: &str, commits: u64, loc: u64, langs: &[(&str, u64)]) -> RepositoryMetric {
        RepositoryMetric {
            name: name.to_string(),
            commit_count: commits,
            lines_of_code: loc,
            language_histogram: langs.iter().map(|(l, n)| (l.to_string(), *n)).collect(),
            collaborator_count: 4,
            user_contribution_percent: 30,
            owner_hash: subject_hash(owner),
            created_at: Utc::now(),
        }
    }

    fn seeded() -> AggregatorConfig {
        AggregatorConfig { seed: Some(7), ..AggregatorConfig::default() }
    }

    #[test]
    fn two_repositories_are_rejected_three_accepted() {
        let mut budget = BudgetLedger::new(PrivacyConfig::default());
        let mut agg = MultiRepositoryAggregator::new(seeded());
        agg.add_repository(metric("a", "alice", 10, 1_000, &[("rust", 1_000)]));
        agg.add_repository(metric("b", "bob", 20, 2_000, &[("go", 2_000)]));

        let err = agg.generate_aggregated_credentials("alice", &mut budget).unwrap_err();
        assert!(matches!(err, AggregationError::InsufficientRepositories { required: 3, actual: 2 }));
        // Nothing was spent on the failed run.
        assert_eq!(budget.snapshot(&budget_key("alice")).spent_epsilon, 0.0);

        agg.add_repository(metric("c", "alice", 30, 3_000, &[("rust", 500), ("c", 2_500)]));
        let out = agg.generate_aggregated_credentials("alice", &mut budget).unwrap();
        assert_eq!(out.profile.repository_count, 3);
        assert!((out.epsilon_spent - 0.4).abs() < 1e-12);
        assert!(out.profile.is_not_owner_of_all);
        assert_eq!(out.corpus.len(), 3);
    }

    #[test]
    fn duplicates_do_not_count_toward_threshold() {
        let mut agg = MultiRepositoryAggregator::new(seeded());
        assert!(agg.add_repository(metric("a", "alice", 1, 1, &[])));
        assert!(!agg.add_repository(metric("a", "alice", 99, 99, &[])));
        // Same name, different owner is a different repository.
        assert!(agg.add_repository(metric("a", "bob", 1, 1, &[])));
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn proficiency_is_normalized_to_largest_language() {
        let metrics = vec![
            metric("a", "x", 1, 1, &[("Rust", 800), ("go", 200)]),
            metric("b", "x", 1, 1, &[("rust", 200), ("C", 333)]),
        ];
        let p = language_proficiency(&metrics);
        assert_eq!(p["rust"], 100);
        assert_eq!(p["go"], 20);
        assert_eq!(p["c"], 33);
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn self_owned_corpus_is_not_flagged() {
        let mut budget = BudgetLedger::new(PrivacyConfig::default());
        let mut agg = MultiRepositoryAggregator::new(seeded());
        for name in ["a", "b", "c"] {
            agg.add_repository(metric(name, "alice", 5, 500, &[("rust", 500)]));
        }
        let out = agg.generate_aggregated_credentials("alice", &mut budget).unwrap();
        assert!(!out.profile.is_not_owner_of_all);
        assert_eq!(out.profile.collaboration_score, 40);
        assert_eq!(out.profile.credential_hash, out.witness.credential_hash());
    }

    #[test]
    fn exhausted_budget_aborts_the_run() {
        let mut budget = BudgetLedger::new(PrivacyConfig { epsilon_ceiling: 0.5, ..PrivacyConfig::default() });
        let build = || {
            let mut agg = MultiRepositoryAggregator::new(seeded());
            for name in ["a", "b", "c"] {
                agg.add_repository(metric(name, "bob", 5, 500, &[("rust", 500)]));
            }
            agg
        };
        build().generate_aggregated_credentials("alice", &mut budget).unwrap();
        let err = build().generate_aggregated_credentials("alice", &mut budget).unwrap_err();
        assert!(matches!(err, AggregationError::Budget(BudgetError::Exhausted { .. })));
        assert!((budget.snapshot(&budget_key("alice")).spent_epsilon - 0.4).abs() < 1e-12);
    }

    #[test]
    fn scores_stay_in_percentage_range() {
        let mut budget = BudgetLedger::new(PrivacyConfig { epsilon_ceiling: 100.0, ..PrivacyConfig::default() });
        for seed in 0..20 {
            let mut agg = MultiRepositoryAggregator::new(AggregatorConfig { seed: Some(seed), ..AggregatorConfig::default() });
            for name in ["a", "b", "c"] {
                agg.add_repository(metric(name, "bob", 5, 500, &[("rust", 500)]));
            }
            let out = agg.generate_aggregated_credentials("alice", &mut budget).unwrap();
            assert!(out.profile.consistency_score <= 100);
            assert!(out.profile.diversity_score <= 100);
        }
    }

    #[test]
    fn non_numeric_mechanism_fails_before_spending() {
        let mut budget = BudgetLedger::new(PrivacyConfig::default());
        let mut agg = MultiRepositoryAggregator::new(AggregatorConfig {
            mechanism: privacy_engine::DpMechanism::Exponential,
            ..seeded()
        });
        for name in ["a", "b", "c"] {
            agg.add_repository(metric(name, "bob", 5, 500, &[("rust", 500)]));
        }
        let err = agg.generate_aggregated_credentials("alice", &mut budget).unwrap_err();
        assert!(matches!(err, AggregationError::Dp(DpError::UnsupportedMechanism(_))));
        assert_eq!(budget.snapshot(&budget_key("alice")).spent_epsilon, 0.0);
    }

    #[test]
    fn oversized_language_histograms_saturate() {
        let metrics = vec![
            metric("a", "x", 1, 1, &[("rust", u64::MAX), ("go", 1)]),
            metric("b", "x", 1, 1, &[("Rust", u64::MAX)]),
        ];
        let p = language_proficiency(&metrics);
        assert_eq!(p["rust"], 100);
        assert_eq!(p["go"], 0);

        let mut budget = BudgetLedger::new(PrivacyConfig::default());
        let mut agg = MultiRepositoryAggregator::new(seeded());
        agg.add_repository(metric("a", "bob", u64::MAX, u64::MAX, &[("rust", u64::MAX)]));
        agg.add_repository(metric("b", "bob", u64::MAX, u64::MAX, &[("rust", u64::MAX)]));
        agg.add_repository(metric("c", "bob", 1, 1, &[("rust", 1)]));
        let out = agg.generate_aggregated_credentials("alice", &mut budget).unwrap();
        assert_eq!(out.profile.language_proficiency["rust"], 100);
    }
}
