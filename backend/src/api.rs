use std::sync::Arc;

use ark_bn254::Fr;
use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use chrono::Utc;
use privacy_engine::generalize::generalize;
use privacy_engine::{KAnonymityReport, KAnonymityRequest, QueryCost};
use rand::rngs::OsRng;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;
use zk_proofs::circuit::CredentialCircuit;
use zk_proofs::types::{Address, CredentialType, FrHex};

use crate::aggregator::{budget_key, MultiRepositoryAggregator};
use crate::composer::{
    aggregate_circuit, authorize_subject, collaboration_circuit, compose, language_circuit, repository_circuit,
    validate_aggregate_claim, ComposeError, ComposedCredential,
};
use crate::db;
use crate::errors::ApiError;
use crate::keys::KeyStore;
use crate::ledger::{CredentialId, LedgerError, TxContext};
use crate::models::*;
use crate::state::AppState;

const CALLER_HEADER: &str = "X-CALLER-ADDRESS";

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/v1/aggregate", post(aggregate))
        .route("/api/v1/credentials", post(register_credential))
        .route("/api/v1/credentials/compose", post(compose_credential))
        .route("/api/v1/credentials/verify", post(verify_credential))
        .route("/api/v1/credentials/:hash/revoke", post(revoke_credential))
        .route("/api/v1/credentials/:hash/storage", put(update_storage))
        .route("/api/v1/admin/pause", post(pause))
        .route("/api/v1/admin/unpause", post(unpause))
        .route("/api/v1/admin/verifiers", post(set_verifier))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/zk/vk/:credential_type", get(get_vk))
        .route("/api/v1/proofs/verify", post(verify_proof))
        .route("/api/v1/credentials/:hash", get(get_credential))
        .route("/api/v1/artifacts/:pointer", get(get_artifact))
        .route("/api/v1/ledger/status", get(ledger_status))
        .route("/api/v1/accounts/:address", get(get_account))
        .route("/api/v1/privacy/k-anonymity", post(check_k_anonymity))
        .merge(protected_routes)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(provided_key) = headers.get("X-API-KEY") {
        if provided_key.as_bytes() == state.api_key.as_bytes() {
            return Ok(next.run(request).await);
        }
    }

    tracing::warn!("unauthorized access attempt");
    Err(StatusCode::UNAUTHORIZED)
}

fn now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

fn caller(headers: &HeaderMap) -> Result<Address, ApiError> {
    let raw = headers
        .get(CALLER_HEADER)
        .ok_or_else(|| ApiError::Forbidden(format!("missing {CALLER_HEADER} header")))?;
    raw.to_str()
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("invalid {CALLER_HEADER} header")))
}

fn tx(headers: &HeaderMap) -> Result<TxContext, ApiError> {
    Ok(TxContext { sender: caller(headers)?, timestamp: now() })
}

fn decode_proof(proof_b64: &str) -> Result<Vec<u8>, ApiError> {
    B64.decode(proof_b64).map_err(|_| ApiError::BadRequest("invalid proof_b64".to_string()))
}

fn decode_inputs(inputs: &[FrHex]) -> Result<Vec<Fr>, ApiError> {
    inputs
        .iter()
        .map(|x| x.to_fr().map_err(|e| ApiError::BadRequest(format!("invalid public input: {e}"))))
        .collect()
}

/// Proving is CPU bound; keep it off the async workers.
async fn prove_blocking<C, const N: usize>(keys: Arc<KeyStore>, circuit: C) -> Result<ComposedCredential, ApiError>
where
    C: CredentialCircuit<N> + Send + 'static,
{
    tokio::task::spawn_blocking(move || compose(&keys, circuit, &mut OsRng))
        .await
        .map_err(|_| ApiError::Internal)?
        .map_err(ApiError::from)
}

async fn get_vk(
    State(state): State<AppState>,
    Path(credential_type): Path<CredentialType>,
) -> Result<Json<ZkVkResponse>, ApiError> {
    let vk = state
        .keys
        .verifying_key(credential_type)
        .ok_or_else(|| ApiError::NotFound(format!("no verifying key for {credential_type}")))?;
    let vk_bytes = zk_proofs::groth16::serialize_vk(vk).map_err(|_| ApiError::Internal)?;

    Ok(Json(ZkVkResponse {
        credential_type,
        curve: "bn254".to_string(),
        proof_system: "groth16".to_string(),
        vk_b64: B64.encode(vk_bytes),
    }))
}

async fn verify_proof(
    State(state): State<AppState>,
    Json(req): Json<VerifyProofRequest>,
) -> Result<Json<VerifyProofResponse>, ApiError> {
    let proof = decode_proof(&req.proof_b64)?;
    let inputs = decode_inputs(&req.public_inputs)?;

    let result = state.read(|l| l.check_proof(req.credential_type, &proof, &inputs)).await;

    Ok(Json(VerifyProofResponse { ok: result.is_ok(), reason: result.err().map(|r| r.to_string()) }))
}

async fn aggregate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AggregateRequest>,
) -> Result<Json<AggregateResponse>, ApiError> {
    let subject = caller(&headers)?;
    authorize_subject(&req.authorization, subject, &req.subject_id)?;
    // Everything that can reject the request is checked before the budget is touched.
    validate_aggregate_claim(&req.claim)?;

    let mut aggregator = MultiRepositoryAggregator::new(state.config.aggregator.clone());
    for metric in req.repositories {
        aggregator.add_repository(metric);
    }
    aggregator.check_corpus()?;
    if state.keys.proving_key(CredentialType::Aggregate).is_none() {
        return Err(ComposeError::MissingProvingKey(CredentialType::Aggregate).into());
    }

    // The budget lock makes reserve-then-release a single step per subject.
    let output = state
        .with_budget(|budget| aggregator.generate_aggregated_credentials(&req.subject_id, budget))
        .await?;

    let run_id = Uuid::new_v4();
    db::insert_aggregation_run(
        &state.db,
        run_id,
        &budget_key(&req.subject_id),
        output.profile.repository_count,
        QueryCost { epsilon: output.epsilon_spent, delta: output.delta_spent },
        &FrHex::from_fr(&output.profile.credential_hash).0,
    )
    .await?;

    let timestamp = now();
    let circuit = aggregate_circuit(subject, &output, &req.claim, timestamp)?;
    let composed = prove_blocking(state.keys.clone(), circuit).await?;

    let credential = composed.to_artifact(json!({
        "run_id": run_id,
        "issued_at": timestamp,
        "epsilon_spent": output.epsilon_spent,
    }));
    let storage_pointer = state.artifacts.put(&credential).await?;

    tracing::info!(%run_id, %subject, %storage_pointer, "aggregate credential composed");

    Ok(Json(AggregateResponse {
        run_id,
        profile: output.profile,
        epsilon_spent: output.epsilon_spent,
        credential,
        storage_pointer,
    }))
}

async fn compose_credential(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ComposeRequest>,
) -> Result<Json<ComposeResponse>, ApiError> {
    let subject = caller(&headers)?;
    let timestamp = now();
    let keys = state.keys.clone();
    let mut rng = OsRng;

    let composed = match req {
        ComposeRequest::Repository { metric, claim } => {
            let circuit = repository_circuit(subject, &metric, &claim, timestamp, &mut rng)?;
            prove_blocking(keys, circuit).await?
        }
        ComposeRequest::Language { repositories, claim } => {
            let circuit = language_circuit(subject, &repositories, &claim, timestamp, &mut rng)?;
            prove_blocking(keys, circuit).await?
        }
        ComposeRequest::Collaboration { subject_id, metric, claim, authorization } => {
            authorize_subject(&authorization, subject, &subject_id)?;
            let circuit = collaboration_circuit(subject, &subject_id, &metric, &claim, timestamp, &mut rng)?;
            prove_blocking(keys, circuit).await?
        }
    };

    let credential = composed.to_artifact(json!({ "issued_at": timestamp }));
    let storage_pointer = state.artifacts.put(&credential).await?;

    Ok(Json(ComposeResponse { credential, storage_pointer }))
}

async fn verify_credential(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VerifyCredentialRequest>,
) -> Result<Json<CredentialIdResponse>, ApiError> {
    let ctx = tx(&headers)?;
    let proof = decode_proof(&req.proof_b64)?;
    let inputs = decode_inputs(&req.public_inputs)?;

    let identity_hash = state
        .transact(|l| l.verify_single_credential(&ctx, req.credential_type, &proof, &inputs, req.expires_at))
        .await?;

    Ok(Json(CredentialIdResponse { identity_hash }))
}

async fn register_credential(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterCredentialRequest>,
) -> Result<(StatusCode, Json<CredentialIdResponse>), ApiError> {
    let ctx = tx(&headers)?;
    let identity_hash = req.identity_hash;

    state
        .transact(|l| {
            l.register_credential(
                &ctx,
                identity_hash,
                req.subject,
                req.credential_type,
                req.expires_at,
                req.storage_pointer,
                req.score,
            )
        })
        .await?;

    Ok((StatusCode::CREATED, Json(CredentialIdResponse { identity_hash })))
}

async fn revoke_credential(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(hash): Path<CredentialId>,
) -> Result<StatusCode, ApiError> {
    let ctx = tx(&headers)?;
    state.transact(|l| l.revoke_credential(&ctx, hash)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_storage(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(hash): Path<CredentialId>,
    Json(req): Json<UpdateStorageRequest>,
) -> Result<StatusCode, ApiError> {
    let ctx = tx(&headers)?;
    state
        .transact(|l| l.update_credential_storage(&ctx, hash, req.storage_pointer))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_credential(
    State(state): State<AppState>,
    Path(hash): Path<CredentialId>,
) -> Result<Json<CredentialDetailsResponse>, ApiError> {
    let now = now();
    let details = state
        .read(|l| {
            let record = l.get_credential_details(&hash)?;
            let status = l.get_credential_status(&hash, now)?;
            Some(CredentialDetailsResponse {
                identity_hash: hash,
                subject: record.subject,
                credential_type: record.credential_type,
                issued_at: record.issued_at,
                expires_at: record.expires_at,
                revoked: record.revoked,
                storage_pointer: record.storage_pointer.clone(),
                score: record.score,
                status,
                valid: l.is_credential_valid(&hash, now),
            })
        })
        .await;

    details.map(Json).ok_or_else(|| LedgerError::NotFound.into())
}

async fn get_artifact(
    State(state): State<AppState>,
    Path(pointer): Path<String>,
) -> Result<Json<CredentialArtifact>, ApiError> {
    state
        .artifacts
        .get(&pointer)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("artifact not found".to_string()))
}

async fn ledger_status(State(state): State<AppState>) -> Json<LedgerStatusResponse> {
    let (paused, owner) = state.read(|l| (l.is_paused(), l.owner())).await;
    Json(LedgerStatusResponse { paused, owner })
}

async fn get_account(State(state): State<AppState>, Path(address): Path<Address>) -> Json<AccountResponse> {
    let (credential_count, authorized_verifier) = state
        .read(|l| (l.credential_count(&address), l.is_authorized_verifier(&address)))
        .await;
    Json(AccountResponse { address, credential_count, authorized_verifier })
}

async fn pause(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<LedgerStatusResponse>, ApiError> {
    let ctx = tx(&headers)?;
    let owner = state.transact(|l| l.pause(&ctx).map(|_| l.owner())).await?;
    Ok(Json(LedgerStatusResponse { paused: true, owner }))
}

async fn unpause(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<LedgerStatusResponse>, ApiError> {
    let ctx = tx(&headers)?;
    let owner = state.transact(|l| l.unpause(&ctx).map(|_| l.owner())).await?;
    Ok(Json(LedgerStatusResponse { paused: false, owner }))
}

async fn set_verifier(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VerifierAuthorizationRequest>,
) -> Result<StatusCode, ApiError> {
    let ctx = tx(&headers)?;
    state
        .transact(|l| l.set_verifier_authorization(&ctx, req.verifier, req.authorized))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn check_k_anonymity(
    State(state): State<AppState>,
    Json(req): Json<KAnonymityCheckRequest>,
) -> Result<Json<KAnonymityReport>, ApiError> {
    let privacy = &state.config.privacy;
    let request = KAnonymityRequest {
        group_size: req.group_size,
        k: req.k.unwrap_or(privacy.default_k),
        equivalence_class_size: req.equivalence_class_size,
        attributes: req
            .attributes
            .iter()
            .map(|a| generalize(&a.name, &a.value, a.rule))
            .collect(),
        sensitive_values: req.sensitive_values,
        diversity_level: req.diversity_level.unwrap_or(privacy.diversity_level),
    };

    Ok(Json(privacy_engine::evaluate(&request)?))
}
