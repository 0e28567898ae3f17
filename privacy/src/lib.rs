//! Privacy Transformation Engine.
//!
//! Two independent sub-protocols over numeric aggregates:
//! - differential privacy ([`dp`]) with sequential budget composition ([`budget`]);
//! - k-anonymity / l-diversity validation ([`kanon`]) over attributes prepared by the
//!   generalization helpers in [`generalize`].
//!
//! Everything here is synchronous and free of I/O. The only state is the RNG inside
//! [`dp::DpEngine`] and the per-subject spend in [`budget::BudgetLedger`].

pub mod budget;
pub mod config;
pub mod dp;
pub mod generalize;
pub mod kanon;

pub use budget::{compose, BudgetError, BudgetLedger, Composition, PrivacyBudget, QueryCost};
pub use config::PrivacyConfig;
pub use dp::{DpEngine, DpError, DpMechanism, DpQuery, DpRelease, QueryKind};
pub use kanon::{evaluate, EquivalenceClass, KAnonymityError, KAnonymityReport, KAnonymityRequest, QuasiIdentifier};
