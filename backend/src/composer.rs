//! Credential proof composer.
//!
//! Builds the fixed-shape statement and witness for one credential type, evaluates every
//! primitive natively, and only then hands the circuit to the Groth16 prover. The output is a
//! proof plus the public input vector and nothing else.

use ark_bn254::Fr;
use ark_ff::UniformRand;
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use rand::{CryptoRng, RngCore};
use thiserror::Error;
use zk_proofs::circuit::{
    AggregateCircuit, AggregateStatement, CollaborationCircuit, CollaborationStatement, CollaborationWitness,
    CredentialCircuit, LanguageCircuit, LanguageStatement, LanguageWitness, RepositoryCircuit, RepositoryStatement,
    RepositoryWitness, WitnessError,
};
use zk_proofs::constants::{MAX_LANGUAGES, MAX_PERCENT};
use zk_proofs::groth16::{prove, serialize_proof, ZkError};
use zk_proofs::hash::{field_from_bytes, language_id, subject_hash};
use zk_proofs::primitives::{PrimitiveError, SignatureVerify};
use zk_proofs::types::{Address, CredentialType, FrHex, PrimitiveKind};

use crate::aggregator::{language_proficiency, AggregationOutput};
use crate::keys::KeyStore;
use crate::models::{
    AggregateClaim, CollaborationClaim, CredentialArtifact, LanguageClaim, RepositoryClaim, RepositoryMetric,
    SubjectAuthorization,
};

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("constraint violated: {0}")]
    ConstraintViolation(PrimitiveKind),

    #[error("witness rejected: {0}")]
    Witness(WitnessError),

    #[error("invalid claim: {0}")]
    InvalidClaim(String),

    #[error("subject authorization does not match the subject address")]
    SubjectNotAuthorized,

    #[error("no proving key for {0}")]
    MissingProvingKey(CredentialType),

    #[error("proving failed: {0}")]
    Proving(String),
}

impl From<WitnessError> for ComposeError {
    fn from(e: WitnessError) -> Self {
        match e {
            WitnessError::Primitive(PrimitiveError::Unsatisfied(kind)) => ComposeError::ConstraintViolation(kind),
            other => ComposeError::Witness(other),
        }
    }
}

impl From<ZkError> for ComposeError {
    fn from(e: ZkError) -> Self {
        match e {
            ZkError::Witness(w) => w.into(),
            other => ComposeError::Proving(other.to_string()),
        }
    }
}

/// Proof and public inputs of one credential.
#[derive(Clone, Debug)]
pub struct ComposedCredential {
    pub credential_type: CredentialType,
    pub proof_bytes: Vec<u8>,
    pub public_inputs: Vec<Fr>,
}

impl ComposedCredential {
    pub fn to_artifact(&self, metadata: serde_json::Value) -> CredentialArtifact {
        CredentialArtifact {
            credential_type: self.credential_type,
            proof_b64: B64.encode(&self.proof_bytes),
            public_inputs: self.public_inputs.iter().map(FrHex::from_fr).collect(),
            metadata,
        }
    }
}

fn claim_bounds(name: &str, min: u64, max: u64) -> Result<(), ComposeError> {
    if min > max {
        return Err(ComposeError::InvalidClaim(format!("{name}: minimum exceeds maximum")));
    }
    Ok(())
}

fn percent_bounds(name: &str, min: u64, max: u64) -> Result<(), ComposeError> {
    claim_bounds(name, min, max)?;
    if max > MAX_PERCENT {
        return Err(ComposeError::InvalidClaim(format!("{name}: maximum exceeds 100")));
    }
    Ok(())
}

/// Message a subject signs to let `subject_id` be proven under its address.
pub fn authorization_message(subject_id: &str) -> String {
    format!("contrib-credential/subject/v1:{subject_id}")
}

/// Check that whoever signed `auth` controls `subject` and vouched for `subject_id`.
///
/// Circuits bind their commitments to the public `subject` address only; the subject hash
/// inside the witness is trusted because it is derived here, from an id the address signed.
pub fn authorize_subject(auth: &SubjectAuthorization, subject: Address, subject_id: &str) -> Result<(), ComposeError> {
    let malformed = || ComposeError::InvalidClaim("malformed subject authorization".to_string());

    let signature: [u8; 64] = hex::decode(auth.signature_hex.trim_start_matches("0x"))
        .map_err(|_| malformed())?
        .try_into()
        .map_err(|_| malformed())?;
    let public_key: [u8; 32] = hex::decode(auth.public_key_hex.trim_start_matches("0x"))
        .map_err(|_| malformed())?
        .try_into()
        .map_err(|_| malformed())?;

    let claim = SignatureVerify {
        message: authorization_message(subject_id).into_bytes(),
        signature,
        public_key,
        expected_address: subject,
    }
    .evaluate();

    if !claim.is_valid {
        tracing::warn!(%subject, "subject authorization rejected");
        return Err(ComposeError::SubjectNotAuthorized);
    }
    Ok(())
}

/// Bounds of an aggregate claim; checked before any budget is spent.
pub fn validate_aggregate_claim(claim: &AggregateClaim) -> Result<(), ComposeError> {
    if claim.min_repositories == 0 {
        return Err(ComposeError::InvalidClaim("min_repositories must be at least 1".to_string()));
    }
    claim_bounds("commits", claim.min_commits, claim.max_commits)?;
    claim_bounds("lines_of_code", claim.min_loc, claim.max_loc)
}

pub fn repository_circuit<R: RngCore + CryptoRng>(
    subject: Address,
    metric: &RepositoryMetric,
    claim: &RepositoryClaim,
    timestamp: u64,
    rng: &mut R,
) -> Result<RepositoryCircuit, ComposeError> {
    claim_bounds("commits", claim.min_commits, claim.max_commits)?;
    claim_bounds("lines_of_code", claim.min_loc, claim.max_loc)?;
    claim_bounds("collaborators", claim.min_collaborators, claim.max_collaborators)?;
    if metric.language_histogram.len() > MAX_LANGUAGES {
        return Err(ComposeError::InvalidClaim(format!(
            "repository lists more than {MAX_LANGUAGES} languages"
        )));
    }

    let mut languages = [Fr::from(0u64); MAX_LANGUAGES];
    for (slot, language) in languages.iter_mut().zip(metric.language_histogram.keys()) {
        *slot = language_id(language);
    }

    let witness = RepositoryWitness {
        name_hash: field_from_bytes(metric.name.as_bytes()),
        owner_hash: metric.owner_hash,
        commits: metric.commit_count,
        loc: metric.lines_of_code,
        collaborators: metric.collaborator_count,
        languages,
        nonce: Fr::rand(rng),
    };
    let subject_fr = subject.to_fr();
    let statement = RepositoryStatement {
        repo_hash: witness.repo_hash(subject_fr),
        subject: subject_fr,
        min_commits: claim.min_commits,
        max_commits: claim.max_commits,
        min_loc: claim.min_loc,
        max_loc: claim.max_loc,
        language_count: witness.language_count(),
        min_collaborators: claim.min_collaborators,
        max_collaborators: claim.max_collaborators,
        timestamp,
    };
    Ok(RepositoryCircuit { statement, witness })
}

/// Proficiency is computed across `metrics` the same way the aggregator does.
pub fn language_circuit<R: RngCore + CryptoRng>(
    subject: Address,
    metrics: &[RepositoryMetric],
    claim: &LanguageClaim,
    timestamp: u64,
    rng: &mut R,
) -> Result<LanguageCircuit, ComposeError> {
    percent_bounds("proficiency", claim.min_proficiency, claim.max_proficiency)?;

    let proficiency = language_proficiency(metrics)
        .get(&claim.language.to_ascii_lowercase())
        .copied()
        .unwrap_or(0);

    let witness = LanguageWitness {
        language: language_id(&claim.language),
        proficiency,
        nonce: Fr::rand(rng),
    };
    let subject_fr = subject.to_fr();
    let statement = LanguageStatement {
        subject: subject_fr,
        profile_commitment: witness.profile_commitment(subject_fr),
        language_set: claim.language_set.each_ref().map(|l| language_id(l)),
        min_proficiency: claim.min_proficiency,
        max_proficiency: claim.max_proficiency,
        timestamp,
    };
    Ok(LanguageCircuit { statement, witness })
}

pub fn collaboration_circuit<R: RngCore + CryptoRng>(
    subject: Address,
    subject_id: &str,
    metric: &RepositoryMetric,
    claim: &CollaborationClaim,
    timestamp: u64,
    rng: &mut R,
) -> Result<CollaborationCircuit, ComposeError> {
    claim_bounds("collaborators", claim.min_collaborators, claim.max_collaborators)?;
    percent_bounds("contribution_pct", claim.min_contribution_pct, claim.max_contribution_pct)?;

    let witness = CollaborationWitness {
        subject_hash: subject_hash(subject_id),
        owner_hash: metric.owner_hash,
        collaborators: metric.collaborator_count,
        contribution_pct: metric.user_contribution_percent,
        nonce: Fr::rand(rng),
    };
    let subject_fr = subject.to_fr();
    let statement = CollaborationStatement {
        subject: subject_fr,
        commitment: witness.commitment(subject_fr),
        min_collaborators: claim.min_collaborators,
        max_collaborators: claim.max_collaborators,
        min_contribution_pct: claim.min_contribution_pct,
        max_contribution_pct: claim.max_contribution_pct,
        is_not_owner: claim.is_not_owner,
        timestamp,
    };
    Ok(CollaborationCircuit { statement, witness })
}

/// The statement is taken from the aggregation run; the claim only supplies the bounds.
pub fn aggregate_circuit(
    subject: Address,
    output: &AggregationOutput,
    claim: &AggregateClaim,
    timestamp: u64,
) -> Result<AggregateCircuit, ComposeError> {
    validate_aggregate_claim(claim)?;

    let witness = output.witness.clone();
    let statement = AggregateStatement {
        subject: subject.to_fr(),
        credential_hash: witness.credential_hash(),
        corpus_root: output.corpus.root(),
        min_repositories: claim.min_repositories,
        min_commits: claim.min_commits,
        max_commits: claim.max_commits,
        min_loc: claim.min_loc,
        max_loc: claim.max_loc,
        is_not_owner_of_all: witness.is_not_owner_of_all,
        timestamp,
    };
    Ok(AggregateCircuit { statement, witness })
}

/// Evaluate the circuit's primitives, then prove it with the stored key for its type.
///
/// Blocking: proving is CPU bound.
pub fn compose<C, const N: usize, R>(keys: &KeyStore, circuit: C, rng: &mut R) -> Result<ComposedCredential, ComposeError>
where
    C: CredentialCircuit<N>,
    R: RngCore + CryptoRng,
{
    let ty = C::CREDENTIAL_TYPE;
    if let Err(e) = circuit.check_witness() {
        let e = ComposeError::from(e);
        tracing::warn!(credential_type = %ty, error = %e, "witness does not satisfy the credential");
        return Err(e);
    }

    let pk = keys.proving_key(ty).ok_or(ComposeError::MissingProvingKey(ty))?;
    let (proof, inputs) = prove(pk, circuit, rng)?;
    let proof_bytes = serialize_proof(&proof).map_err(|e| ComposeError::Proving(e.to_string()))?;

    tracing::info!(credential_type = %ty, "credential proof composed");
    Ok(ComposedCredential { credential_type: ty, proof_bytes, public_inputs: inputs.to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use zk_proofs::groth16::setup_keys;
    use zk_proofs::primitives::address_from_public_key;
    use zk_proofs::statement::validate_public_inputs;

    const SUBJECT: Address = Address([5u8; 20]);
    const NOW: u64 = 1_700_000_000;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(11)
    }

    fn metric(owner: &str) -> RepositoryMetric {
        RepositoryMetric {
            name: "octo/widgets".to_string(),
            commit_count: 120,
            lines_of_code: 8_000,
            language_histogram: [("Rust".to_string(), 6_000), ("Shell".to_string(), 2_000)].into_iter().collect(),
            collaborator_count: 6,
            user_contribution_percent: 40,
            owner_hash: subject_hash(owner),
            created_at: Utc::now(),
        }
    }

    fn repository_claim() -> RepositoryClaim {
        RepositoryClaim {
            min_commits: 100,
            max_commits: 200,
            min_loc: 1_000,
            max_loc: 10_000,
            min_collaborators: 2,
            max_collaborators: 10,
        }
    }

    #[test]
    fn repository_statement_passes_the_input_domain() {
        let circuit = repository_circuit(SUBJECT, &metric("octo"), &repository_claim(), NOW, &mut rng()).unwrap();
        assert_eq!(circuit.statement.language_count, 2);
        assert!(circuit.check_witness().is_ok());
        assert_eq!(validate_public_inputs(CredentialType::Repository, &circuit.public_inputs()), Ok(()));
    }

    #[test]
    fn out_of_range_metric_names_only_the_primitive() {
        let claim = RepositoryClaim { min_commits: 500, max_commits: 900, ..repository_claim() };
        let circuit = repository_circuit(SUBJECT, &metric("octo"), &claim, NOW, &mut rng()).unwrap();

        let err = compose(&KeyStore::empty(), circuit, &mut rng()).unwrap_err();
        assert!(matches!(err, ComposeError::ConstraintViolation(PrimitiveKind::Range)));
        assert!(!err.to_string().contains("120"));
    }

    #[test]
    fn inverted_claim_bounds_are_rejected_up_front() {
        let claim = RepositoryClaim { min_loc: 9, max_loc: 1, ..repository_claim() };
        let err = repository_circuit(SUBJECT, &metric("octo"), &claim, NOW, &mut rng()).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidClaim(_)));

        let claim = LanguageClaim {
            language: "rust".into(),
            language_set: ["rust".into(), "go".into(), "c".into(), "zig".into()],
            min_proficiency: 10,
            max_proficiency: 101,
        };
        let err = language_circuit(SUBJECT, &[metric("octo")], &claim, NOW, &mut rng()).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidClaim(_)));
    }

    #[test]
    fn language_outside_the_public_set_fails_membership() {
        let claim = LanguageClaim {
            language: "rust".into(),
            language_set: ["go".into(), "c".into(), "zig".into(), "java".into()],
            min_proficiency: 50,
            max_proficiency: 100,
        };
        let circuit = language_circuit(SUBJECT, &[metric("octo")], &claim, NOW, &mut rng()).unwrap();
        let err = compose(&KeyStore::empty(), circuit, &mut rng()).unwrap_err();
        assert!(matches!(err, ComposeError::ConstraintViolation(PrimitiveKind::SetMembership)));
    }

    #[test]
    fn owner_cannot_claim_non_ownership() {
        let claim = CollaborationClaim {
            min_collaborators: 1,
            max_collaborators: 10,
            min_contribution_pct: 10,
            max_contribution_pct: 90,
            is_not_owner: true,
        };
        let circuit = collaboration_circuit(SUBJECT, "alice", &metric("alice"), &claim, NOW, &mut rng()).unwrap();
        let err = compose(&KeyStore::empty(), circuit, &mut rng()).unwrap_err();
        assert!(matches!(err, ComposeError::Witness(WitnessError::OwnershipClaim)));
    }

    #[test]
    fn satisfied_witness_without_keys_reports_the_missing_key() {
        let circuit = repository_circuit(SUBJECT, &metric("octo"), &repository_claim(), NOW, &mut rng()).unwrap();
        let err = compose(&KeyStore::empty(), circuit, &mut rng()).unwrap_err();
        assert!(matches!(err, ComposeError::MissingProvingKey(CredentialType::Repository)));
    }

    #[test]
    fn collaboration_credential_is_proven() {
        let mut rng = rng();
        let mut keys = KeyStore::empty();
        keys.insert(setup_keys(CredentialType::Collaboration, &mut rng).unwrap());

        let claim = CollaborationClaim {
            min_collaborators: 1,
            max_collaborators: 10,
            min_contribution_pct: 10,
            max_contribution_pct: 90,
            is_not_owner: true,
        };
        let circuit = collaboration_circuit(SUBJECT, "alice", &metric("octo"), &claim, NOW, &mut rng).unwrap();
        let composed = compose(&keys, circuit, &mut rng).unwrap();

        assert_eq!(composed.proof_bytes.len(), zk_proofs::constants::PROOF_ENCODED_LEN);
        assert_eq!(composed.public_inputs.len(), CredentialType::Collaboration.public_input_len());
        let vk = keys.verifying_key(CredentialType::Collaboration).unwrap();
        let proof = zk_proofs::groth16::deserialize_proof(&composed.proof_bytes).unwrap();
        zk_proofs::groth16::verify(vk, &composed.public_inputs, &proof).unwrap();

        let artifact = composed.to_artifact(serde_json::Value::Null);
        assert_eq!(artifact.public_inputs.len(), 8);
    }

    #[test]
    fn subject_authorization_checks_the_signer_address() {
        let signing = SigningKey::from_bytes(&[42u8; 32]);
        let public_key = signing.verifying_key().to_bytes();
        let subject = address_from_public_key(&public_key);
        let auth = SubjectAuthorization {
            signature_hex: hex::encode(signing.sign(authorization_message("alice").as_bytes()).to_bytes()),
            public_key_hex: hex::encode(public_key),
        };
        assert!(authorize_subject(&auth, subject, "alice").is_ok());
        assert!(matches!(authorize_subject(&auth, SUBJECT, "alice"), Err(ComposeError::SubjectNotAuthorized)));
        // Signed for alice, not for bob.
        assert!(matches!(authorize_subject(&auth, subject, "bob"), Err(ComposeError::SubjectNotAuthorized)));

        let garbled = SubjectAuthorization { signature_hex: "zz".into(), ..auth };
        assert!(matches!(authorize_subject(&garbled, subject, "alice"), Err(ComposeError::InvalidClaim(_))));
    }

    #[test]
    fn aggregate_claim_bounds_are_checked_up_front() {
        let claim = AggregateClaim { min_repositories: 3, min_commits: 0, max_commits: 100, min_loc: 0, max_loc: 100 };
        assert!(validate_aggregate_claim(&claim).is_ok());

        let inverted = AggregateClaim { min_commits: 1_000, max_commits: 0, ..claim.clone() };
        assert!(matches!(validate_aggregate_claim(&inverted), Err(ComposeError::InvalidClaim(_))));
        let no_floor = AggregateClaim { min_repositories: 0, ..claim };
        assert!(matches!(validate_aggregate_claim(&no_floor), Err(ComposeError::InvalidClaim(_))));
    }
}
