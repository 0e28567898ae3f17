use std::collections::BTreeMap;

use ark_bn254::Fr;
use chrono::{DateTime, Utc};
use privacy_engine::generalize::Generalization;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zk_proofs::types::{Address, CredentialType, FrHex};

use crate::ledger::{CredentialId, CredentialStatus};

/// Serde adapter for field elements as [`FrHex`] strings.
pub mod fr_hex {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(x: &Fr, s: S) -> Result<S::Ok, S::Error> {
        FrHex::from_fr(x).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Fr, D::Error> {
        FrHex::deserialize(d)?.to_fr().map_err(serde::de::Error::custom)
    }
}

/// Per-repository metrics as delivered by the collector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMetric {
    pub name: String,
    pub commit_count: u64,
    pub lines_of_code: u64,
    /// Language name to lines of code.
    #[serde(default)]
    pub language_histogram: BTreeMap<String, u64>,
    pub collaborator_count: u64,
    pub user_contribution_percent: u64,
    /// `hash(ownerId)` of the repository owner.
    #[serde(with = "fr_hex")]
    pub owner_hash: Fr,
    pub created_at: DateTime<Utc>,
}

/// User-level profile produced by one aggregation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateProfile {
    pub subject_id: String,
    pub total_commits: u64,
    pub total_loc: u64,
    pub language_proficiency: BTreeMap<String, u64>,
    pub collaboration_score: u64,
    pub consistency_score: u64,
    pub diversity_score: u64,
    pub repository_count: u64,
    pub is_not_owner_of_all: bool,
    #[serde(with = "fr_hex")]
    pub credential_hash: Fr,
}

/// Opaque credential blob handed to the artifact store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CredentialArtifact {
    pub credential_type: CredentialType,
    pub proof_b64: String,
    pub public_inputs: Vec<FrHex>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepositoryClaim {
    pub min_commits: u64,
    pub max_commits: u64,
    pub min_loc: u64,
    pub max_loc: u64,
    pub min_collaborators: u64,
    pub max_collaborators: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LanguageClaim {
    pub language: String,
    /// Public set the language is proven to belong to.
    pub language_set: [String; 4],
    pub min_proficiency: u64,
    pub max_proficiency: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollaborationClaim {
    pub min_collaborators: u64,
    pub max_collaborators: u64,
    pub min_contribution_pct: u64,
    pub max_contribution_pct: u64,
    pub is_not_owner: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregateClaim {
    pub min_repositories: u64,
    pub min_commits: u64,
    pub max_commits: u64,
    pub min_loc: u64,
    pub max_loc: u64,
}

/// Ed25519 signature over `authorization_message(subject_id)` by the key behind the caller address.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubjectAuthorization {
    pub signature_hex: String,
    pub public_key_hex: String,
}

// ---------------------------------------------------------------------------------------------
// HTTP payloads
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ZkVkResponse {
    pub credential_type: CredentialType,
    pub curve: String,
    pub proof_system: String,
    pub vk_b64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyProofRequest {
    pub credential_type: CredentialType,
    pub proof_b64: String,
    pub public_inputs: Vec<FrHex>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyProofResponse {
    pub ok: bool,
    /// Named reason when `ok` is false.
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AggregateRequest {
    pub subject_id: String,
    pub repositories: Vec<RepositoryMetric>,
    pub claim: AggregateClaim,
    pub authorization: SubjectAuthorization,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AggregateResponse {
    pub run_id: Uuid,
    pub profile: AggregateProfile,
    pub epsilon_spent: f64,
    pub credential: CredentialArtifact,
    pub storage_pointer: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "credential_type", rename_all = "snake_case")]
pub enum ComposeRequest {
    Repository {
        metric: RepositoryMetric,
        claim: RepositoryClaim,
    },
    Language {
        repositories: Vec<RepositoryMetric>,
        claim: LanguageClaim,
    },
    Collaboration {
        subject_id: String,
        metric: RepositoryMetric,
        claim: CollaborationClaim,
        authorization: SubjectAuthorization,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComposeResponse {
    pub credential: CredentialArtifact,
    pub storage_pointer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyCredentialRequest {
    pub credential_type: CredentialType,
    pub proof_b64: String,
    pub public_inputs: Vec<FrHex>,
    pub expires_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialIdResponse {
    pub identity_hash: CredentialId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterCredentialRequest {
    pub identity_hash: CredentialId,
    pub subject: Address,
    pub credential_type: CredentialType,
    pub expires_at: u64,
    pub storage_pointer: String,
    #[serde(default)]
    pub score: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateStorageRequest {
    pub storage_pointer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialDetailsResponse {
    pub identity_hash: CredentialId,
    pub subject: Address,
    pub credential_type: CredentialType,
    pub issued_at: u64,
    pub expires_at: u64,
    pub revoked: bool,
    pub storage_pointer: String,
    pub score: u64,
    pub status: CredentialStatus,
    pub valid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifierAuthorizationRequest {
    pub verifier: Address,
    pub authorized: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerStatusResponse {
    pub paused: bool,
    pub owner: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    pub credential_count: u64,
    pub authorized_verifier: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttributeInput {
    pub name: String,
    pub value: String,
    #[serde(default = "no_generalization")]
    pub rule: Generalization,
}

fn no_generalization() -> Generalization {
    Generalization::None
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KAnonymityCheckRequest {
    pub group_size: u64,
    #[serde(default)]
    pub k: Option<u64>,
    pub equivalence_class_size: u64,
    pub attributes: Vec<AttributeInput>,
    #[serde(default)]
    pub sensitive_values: Vec<String>,
    #[serde(default)]
    pub diversity_level: Option<u64>,
}
