use std::sync::Arc;

use credential_backend::artifacts::ArtifactStore;
use credential_backend::config::Settings;
use credential_backend::db;
use credential_backend::errors::ApiError;
use credential_backend::keys::KeyStore;
use credential_backend::state::AppState;
use credential_backend::verifier::{Groth16Verifier, ProofVerifier};
use credential_backend::api;
use rand::rngs::OsRng;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Settings::from_env()?;

    // Local state lives under DATA_DIR (ignored by git).
    std::fs::create_dir_all(&settings.data_dir).map_err(|_| ApiError::Internal)?;

    let db = db::connect(&settings.data_dir.join("ledger.sqlite")).await?;
    db::init_schema(&db).await?;

    let keys_dir = settings.data_dir.join("keys");
    let keys = tokio::task::spawn_blocking(move || KeyStore::load_or_generate(&keys_dir, &mut OsRng))
        .await
        .map_err(|_| ApiError::Internal)??;

    let verifier: Arc<dyn ProofVerifier> = Arc::new(Groth16Verifier::from_keys(&keys));
    let artifacts = ArtifactStore::new(settings.data_dir.join("artifacts"));

    let state = AppState::restore(
        db,
        &settings.api_key,
        settings.backend.clone(),
        keys,
        artifacts,
        settings.owner,
        verifier,
    )
    .await?;

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&settings.addr)
        .await
        .map_err(|_| ApiError::Internal)?;

    tracing::info!(addr = %settings.addr, owner = %settings.owner, "backend listening");

    axum::serve(listener, app).await.map_err(|_| ApiError::Internal)?;

    Ok(())
}
