use std::path::Path;

use chrono::Utc;
use privacy_engine::QueryCost;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::ledger::LedgerEvent;

pub type Db = Pool<Sqlite>;

pub async fn connect(db_path: &Path) -> Result<Db, ApiError> {
    let options = SqliteConnectOptions::new().filename(db_path).create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| {
            tracing::error!(path = %db_path.display(), error = %e, "failed to open sqlite database");
            ApiError::Internal
        })
}

pub async fn init_schema(db: &Db) -> Result<(), ApiError> {
    // NOTE: `ledger_events` is append-only; the credential ledger is rebuilt from it in `seq` order.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS ledger_events (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  event_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS aggregation_runs (
  id TEXT PRIMARY KEY,
  created_at TEXT NOT NULL,
  subject_key TEXT NOT NULL,
  repository_count INTEGER NOT NULL,
  epsilon_spent REAL NOT NULL,
  delta_spent REAL NOT NULL,
  credential_hash_hex TEXT NOT NULL
);
"#,
    )
    .execute(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    Ok(())
}

/// Append ledger events in order, all or nothing.
pub async fn append_events(db: &Db, events: &[LedgerEvent]) -> Result<(), ApiError> {
    let created_at = Utc::now().to_rfc3339();
    let mut tx = db.begin().await.map_err(|_| ApiError::Internal)?;

    for event in events {
        let event_json = serde_json::to_string(event).map_err(|_| ApiError::Internal)?;
        sqlx::query(r#"INSERT INTO ledger_events (event_json, created_at) VALUES (?, ?)"#)
            .bind(event_json)
            .bind(&created_at)
            .execute(&mut *tx)
            .await
            .map_err(|_| ApiError::Internal)?;
    }

    tx.commit().await.map_err(|_| ApiError::Internal)?;
    Ok(())
}

pub async fn load_events(db: &Db) -> Result<Vec<LedgerEvent>, ApiError> {
    let rows = sqlx::query(r#"SELECT event_json FROM ledger_events ORDER BY seq"#)
        .fetch_all(db)
        .await
        .map_err(|_| ApiError::Internal)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let event_json: String = row.get(0);
        let event: LedgerEvent = serde_json::from_str(&event_json).map_err(|e| {
            tracing::error!(error = %e, "corrupt ledger event");
            ApiError::Internal
        })?;
        out.push(event);
    }
    Ok(out)
}

pub async fn insert_aggregation_run(
    db: &Db,
    run_id: Uuid,
    subject_key: &str,
    repository_count: u64,
    spent: QueryCost,
    credential_hash_hex: &str,
) -> Result<(), ApiError> {
    let created_at = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO aggregation_runs
           (id, created_at, subject_key, repository_count, epsilon_spent, delta_spent, credential_hash_hex)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(run_id.to_string())
    .bind(created_at)
    .bind(subject_key)
    .bind(repository_count as i64)
    .bind(spent.epsilon)
    .bind(spent.delta)
    .bind(credential_hash_hex)
    .execute(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    Ok(())
}

/// Total privacy spend per subject key across every recorded run.
pub async fn load_budget_spend(db: &Db) -> Result<Vec<(String, QueryCost)>, ApiError> {
    let rows = sqlx::query(
        r#"SELECT subject_key, SUM(epsilon_spent), SUM(delta_spent)
           FROM aggregation_runs
           GROUP BY subject_key
           ORDER BY subject_key"#,
    )
    .fetch_all(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let subject_key: String = row.get(0);
        let epsilon: f64 = row.get(1);
        let delta: f64 = row.get(2);
        out.push((subject_key, QueryCost { epsilon, delta }));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zk_proofs::types::Address;

    async fn temp_db() -> (tempfile::TempDir, Db) {
        let dir = tempfile::tempdir().unwrap();
        let db = connect(&dir.path().join("ledger.sqlite")).await.unwrap();
        init_schema(&db).await.unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn events_come_back_in_append_order() {
        let (_dir, db) = temp_db().await;
        let a = Address([1u8; 20]);
        let events = vec![
            LedgerEvent::Paused { by: a, at: 10 },
            LedgerEvent::Unpaused { by: a, at: 11 },
        ];
        append_events(&db, &events).await.unwrap();
        append_events(&db, &[LedgerEvent::VerifierAuthorizationChanged { verifier: a, authorized: false }])
            .await
            .unwrap();

        let loaded = load_events(&db).await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[..2], events[..]);
    }

    #[tokio::test]
    async fn budget_spend_is_summed_per_subject() {
        let (_dir, db) = temp_db().await;
        let cost = QueryCost { epsilon: 0.4, delta: 0.0 };
        insert_aggregation_run(&db, Uuid::new_v4(), "alice", 3, cost, "0x01").await.unwrap();
        insert_aggregation_run(&db, Uuid::new_v4(), "alice", 4, cost, "0x02").await.unwrap();
        insert_aggregation_run(&db, Uuid::new_v4(), "bob", 3, cost, "0x03").await.unwrap();

        let spend = load_budget_spend(&db).await.unwrap();
        assert_eq!(spend.len(), 2);
        assert_eq!(spend[0].0, "alice");
        assert!((spend[0].1.epsilon - 0.8).abs() < 1e-12);
        assert!((spend[1].1.epsilon - 0.4).abs() < 1e-12);
    }
}
