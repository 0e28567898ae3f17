//! Proof verification as seen by the credential ledger.
//!
//! Structural checks (encoded length, decoding, public input domain) run before the pairing
//! check and each failure has its own name. The ledger only depends on [`ProofVerifier`].

use std::collections::HashMap;
use std::sync::Arc;

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Proof, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zk_proofs::constants::PROOF_ENCODED_LEN;
use zk_proofs::groth16::{deserialize_proof, verify, ZkError};
use zk_proofs::statement::validate_public_inputs;
use zk_proofs::types::CredentialType;

use crate::keys::KeyStore;

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationFailure {
    #[error("proof is shorter than {PROOF_ENCODED_LEN} bytes")]
    ProofTooShort,

    #[error("proof bytes do not decode")]
    MalformedProof,

    #[error("expected {expected} public inputs, got {got}")]
    InputCountMismatch { expected: usize, got: usize },

    #[error("public input out of domain: {0}")]
    InputOutOfDomain(String),

    #[error("no verifying key for {0}")]
    MissingVerifyingKey(CredentialType),

    #[error("pairing check failed")]
    PairingCheckFailed,
}

pub trait ProofVerifier: Send + Sync {
    /// The succinct-proof check against the stored verifying key for `ty`.
    fn pairing_check(&self, ty: CredentialType, proof: &Proof<Bn254>, inputs: &[Fr]) -> Result<(), VerificationFailure>;

    /// Full verification: length, decoding and input domain, then the pairing check.
    fn verify_proof(&self, ty: CredentialType, proof_bytes: &[u8], inputs: &[Fr]) -> Result<(), VerificationFailure> {
        if proof_bytes.len() < PROOF_ENCODED_LEN {
            return Err(VerificationFailure::ProofTooShort);
        }
        let proof = deserialize_proof(&proof_bytes[..PROOF_ENCODED_LEN]).map_err(|_| VerificationFailure::MalformedProof)?;

        let expected = ty.public_input_len();
        if inputs.len() != expected {
            return Err(VerificationFailure::InputCountMismatch { expected, got: inputs.len() });
        }
        validate_public_inputs(ty, inputs).map_err(|e| VerificationFailure::InputOutOfDomain(e.to_string()))?;

        self.pairing_check(ty, &proof, inputs)
    }
}

impl<T: ProofVerifier + ?Sized> ProofVerifier for Arc<T> {
    fn pairing_check(&self, ty: CredentialType, proof: &Proof<Bn254>, inputs: &[Fr]) -> Result<(), VerificationFailure> {
        (**self).pairing_check(ty, proof, inputs)
    }
}

/// Groth16 verification against one verifying key per credential type.
#[derive(Clone, Default)]
pub struct Groth16Verifier {
    vks: HashMap<CredentialType, VerifyingKey<Bn254>>,
}

impl Groth16Verifier {
    pub fn from_keys(keys: &KeyStore) -> Self {
        let vks = CredentialType::ALL
            .into_iter()
            .filter_map(|ty| keys.verifying_key(ty).map(|vk| (ty, vk.clone())))
            .collect();
        Self { vks }
    }
}

impl ProofVerifier for Groth16Verifier {
    fn pairing_check(&self, ty: CredentialType, proof: &Proof<Bn254>, inputs: &[Fr]) -> Result<(), VerificationFailure> {
        let vk = self.vks.get(&ty).ok_or(VerificationFailure::MissingVerifyingKey(ty))?;
        match verify(vk, inputs, proof) {
            Ok(()) => Ok(()),
            Err(ZkError::InputCount { expected, got }) => Err(VerificationFailure::InputCountMismatch { expected, got }),
            Err(e) => {
                tracing::debug!(credential_type = %ty, error = %e, "pairing check rejected proof");
                Err(VerificationFailure::PairingCheckFailed)
            }
        }
    }
}
