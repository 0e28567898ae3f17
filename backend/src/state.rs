use std::sync::Arc;

use privacy_engine::BudgetLedger;
use tokio::sync::Mutex;

use crate::artifacts::ArtifactStore;
use crate::config::BackendConfig;
use crate::db::{self, Db};
use crate::errors::ApiError;
use crate::keys::KeyStore;
use crate::ledger::{CredentialLedger, LedgerError};
use crate::verifier::ProofVerifier;

pub type SharedLedger = CredentialLedger<Arc<dyn ProofVerifier>>;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub api_key: Arc<str>,
    pub config: Arc<BackendConfig>,
    pub keys: Arc<KeyStore>,
    pub artifacts: ArtifactStore,
    ledger: Arc<Mutex<SharedLedger>>,
    budget: Arc<Mutex<BudgetLedger>>,
}

impl AppState {
    pub fn new(
        db: Db,
        api_key: &str,
        config: BackendConfig,
        keys: KeyStore,
        artifacts: ArtifactStore,
        ledger: SharedLedger,
        budget: BudgetLedger,
    ) -> Self {
        Self {
            db,
            api_key: Arc::from(api_key),
            config: Arc::new(config),
            keys: Arc::new(keys),
            artifacts,
            ledger: Arc::new(Mutex::new(ledger)),
            budget: Arc::new(Mutex::new(budget)),
        }
    }

    /// Rebuild the ledger and the budget ledger from the database.
    pub async fn restore(
        db: Db,
        api_key: &str,
        config: BackendConfig,
        keys: KeyStore,
        artifacts: ArtifactStore,
        owner: zk_proofs::types::Address,
        verifier: Arc<dyn ProofVerifier>,
    ) -> Result<Self, ApiError> {
        let events = db::load_events(&db).await?;
        let ledger = CredentialLedger::replay(owner, verifier, events);

        let mut budget = BudgetLedger::new(config.privacy.clone());
        for (subject, spent) in db::load_budget_spend(&db).await? {
            budget.restore(&subject, spent);
        }

        Ok(Self::new(db, api_key, config, keys, artifacts, ledger, budget))
    }

    /// Read-only access to the ledger.
    pub async fn read<T>(&self, f: impl FnOnce(&SharedLedger) -> T) -> T {
        let ledger = self.ledger.lock().await;
        f(&ledger)
    }

    /// Run one ledger transaction against a staged copy and swap it in once its events are
    /// persisted. The event log keeps the same order as the in-memory state, and a failed write
    /// leaves the live ledger untouched.
    pub async fn transact<T>(
        &self,
        f: impl FnOnce(&mut SharedLedger) -> Result<T, LedgerError>,
    ) -> Result<T, ApiError> {
        let mut ledger = self.ledger.lock().await;
        let mut staged = ledger.clone();
        let out = f(&mut staged);
        let events = staged.drain_pending();
        if events.is_empty() {
            return Ok(out?);
        }
        if let Err(e) = db::append_events(&self.db, &events).await {
            tracing::error!(events = events.len(), "failed to persist ledger events; transaction discarded");
            return Err(e);
        }
        *ledger = staged;
        Ok(out?)
    }

    pub async fn with_budget<T>(&self, f: impl FnOnce(&mut BudgetLedger) -> T) -> T {
        let mut budget = self.budget.lock().await;
        f(&mut budget)
    }
}
