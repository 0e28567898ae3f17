use privacy_engine::generalize::{generalize, Generalization};
use privacy_engine::{
    compose, evaluate, BudgetLedger, DpEngine, DpQuery, KAnonymityRequest, PrivacyConfig, QueryCost, QueryKind,
};
use proptest::prelude::*;

fn request(group_size: u64, k: u64, class_size: u64, protected: usize, unprotected: usize) -> KAnonymityRequest {
    let mut attributes = Vec::new();
    for i in 0..protected {
        attributes.push(generalize(&format!("p{i}"), "12345", Generalization::Suppress));
    }
    for i in 0..unprotected {
        attributes.push(generalize(&format!("u{i}"), "12345", Generalization::None));
    }
    KAnonymityRequest {
        group_size,
        k,
        equivalence_class_size: class_size,
        attributes,
        sensitive_values: vec![],
        diversity_level: 1,
    }
}

proptest! {
    #[test]
    fn composition_is_additive(epsilons in prop::collection::vec(0.0f64..0.5, 0..20), ceiling in 0.1f64..5.0) {
        let costs: Vec<QueryCost> = epsilons.iter().map(|e| QueryCost { epsilon: *e, delta: 0.0 }).collect();
        let c = compose(&costs, ceiling);
        let expected: f64 = epsilons.iter().sum();
        prop_assert_eq!(c.total_epsilon, expected);
        prop_assert_eq!(c.budget_exhausted, expected > ceiling);
    }

    #[test]
    fn ledger_never_exceeds_ceiling(batches in prop::collection::vec(prop::collection::vec(0.0f64..0.4, 1..4), 1..10)) {
        let mut ledger = BudgetLedger::new(PrivacyConfig::default());
        for batch in &batches {
            let costs: Vec<QueryCost> = batch.iter().map(|e| QueryCost { epsilon: *e, delta: 0.0 }).collect();
            let before = ledger.snapshot("s").spent_epsilon;
            match ledger.reserve("s", &costs) {
                Ok(total) => prop_assert_eq!(ledger.snapshot("s").spent_epsilon, before + total.epsilon),
                Err(_) => prop_assert_eq!(ledger.snapshot("s").spent_epsilon, before),
            }
            prop_assert!(ledger.snapshot("s").spent_epsilon <= 1.0);
        }
    }

    #[test]
    fn undersized_groups_are_never_k_anonymous(
        k in 2u64..50,
        deficit in 1u64..50,
        class_size in 0u64..100,
        protected in 0usize..6,
        unprotected in 0usize..6,
    ) {
        prop_assume!(protected + unprotected > 0);
        let group_size = k.saturating_sub(deficit);
        let report = evaluate(&request(group_size, k, class_size, protected, unprotected)).unwrap();
        prop_assert!(!report.is_k_anonymous);
    }

    #[test]
    fn large_protected_groups_are_k_anonymous(
        k in 1u64..50,
        extra in 0u64..50,
        class_extra in 0u64..50,
        protected in 1usize..6,
        unprotected in 0usize..6,
    ) {
        prop_assume!(2 * protected >= protected + unprotected);
        let report = evaluate(&request(k + extra, k, k + class_extra, protected, unprotected)).unwrap();
        prop_assert!(report.is_k_anonymous);
        prop_assert!(report.privacy_score >= 75.0);
    }

    #[test]
    fn clamped_queries_stay_non_negative(seed in any::<u64>(), data in prop::collection::vec(0.0f64..10.0, 0..8)) {
        let mut engine = DpEngine::new(Some(seed));
        for kind in [QueryKind::Count, QueryKind::Sum, QueryKind::Max] {
            let release = engine.release(&DpQuery::laplace(kind, 0.05, 50.0), &data).unwrap();
            prop_assert!(release.value() >= 0.0);
        }
    }
}

#[test]
fn release_reports_its_cost() {
    let mut engine = DpEngine::new(Some(11));
    let q = DpQuery::gaussian(QueryKind::Mean, 0.5, 1e-6, 2.0);
    let r = engine.release(&q, &[1.0, 2.0, 3.0]).unwrap();
    assert_eq!(r.epsilon_spent, 0.5);
    assert_eq!(r.delta_spent, 1e-6);
    let json = serde_json::to_value(&r).unwrap();
    assert_eq!(json["mechanism"], "gaussian");
}
