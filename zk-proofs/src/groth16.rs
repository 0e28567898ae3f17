//! Groth16 prover/verifier orchestration for the credential circuits.
//!
//! SECURITY NOTE: Groth16 needs a trusted setup per circuit. Keys generated by [`setup_keys`] come
//! from local randomness and are suitable for development and tests only. Production keys should
//! come from an MPC ceremony and be loaded with [`deserialize_pk`] / [`deserialize_vk`].

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, Proof, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::{CircuitSpecificSetupSNARK, SNARK};
use rand::{CryptoRng, RngCore};
use thiserror::Error;

use crate::circuit::{
    AggregateCircuit, CollaborationCircuit, CredentialCircuit, LanguageCircuit, RepositoryCircuit, WitnessError,
};
use crate::constants::{
    AGGREGATE_PUBLIC_INPUTS, COLLABORATION_PUBLIC_INPUTS, LANGUAGE_PUBLIC_INPUTS, PROOF_ENCODED_LEN,
    REPOSITORY_PUBLIC_INPUTS,
};
use crate::types::CredentialType;

#[derive(Debug, Error)]
pub enum ZkError {
    #[error("witness rejected: {0}")]
    Witness(#[from] WitnessError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("expected {expected} public inputs, got {got}")]
    InputCount { expected: usize, got: usize },

    #[error("proof verification failed")]
    VerificationFailed,

    #[error("arkworks error: {0}")]
    Ark(String),
}

/// Proving and verifying key for one credential circuit.
#[derive(Clone)]
pub struct CredentialKeys {
    pub credential_type: CredentialType,
    pub pk: ProvingKey<Bn254>,
    pub vk: VerifyingKey<Bn254>,
}

fn setup_for<C, const N: usize, R>(rng: &mut R) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), ZkError>
where
    C: CredentialCircuit<N>,
    R: RngCore + CryptoRng,
{
    // Constraint shape depends only on the type, so the blank circuit is enough.
    Groth16::<Bn254>::circuit_specific_setup(C::blank(), rng).map_err(|e| ZkError::Ark(format!("{e}")))
}

/// Generate a Groth16 keypair for one credential type. Run once per type.
pub fn setup_keys<R: RngCore + CryptoRng>(ty: CredentialType, rng: &mut R) -> Result<CredentialKeys, ZkError> {
    let (pk, vk) = match ty {
        CredentialType::Repository => setup_for::<RepositoryCircuit, REPOSITORY_PUBLIC_INPUTS, _>(rng)?,
        CredentialType::Language => setup_for::<LanguageCircuit, LANGUAGE_PUBLIC_INPUTS, _>(rng)?,
        CredentialType::Collaboration => setup_for::<CollaborationCircuit, COLLABORATION_PUBLIC_INPUTS, _>(rng)?,
        CredentialType::Aggregate => setup_for::<AggregateCircuit, AGGREGATE_PUBLIC_INPUTS, _>(rng)?,
    };
    tracing::debug!(credential_type = %ty, "generated groth16 keys");
    Ok(CredentialKeys { credential_type: ty, pk, vk })
}

/// Prove a credential circuit.
///
/// The witness is evaluated natively first, so an unsatisfiable witness is reported with the
/// failing primitive instead of producing a proof that cannot verify.
pub fn prove<C, const N: usize, R>(
    pk: &ProvingKey<Bn254>,
    circuit: C,
    rng: &mut R,
) -> Result<(Proof<Bn254>, [Fr; N]), ZkError>
where
    C: CredentialCircuit<N>,
    R: RngCore + CryptoRng,
{
    circuit.check_witness()?;
    let public_inputs = circuit.public_inputs();
    let proof = Groth16::<Bn254>::prove(pk, circuit, rng).map_err(|e| ZkError::Ark(format!("{e}")))?;
    Ok((proof, public_inputs))
}

/// Verify a proof against a public input vector.
pub fn verify(vk: &VerifyingKey<Bn254>, public_inputs: &[Fr], proof: &Proof<Bn254>) -> Result<(), ZkError> {
    let expected = vk.gamma_abc_g1.len().saturating_sub(1);
    if public_inputs.len() != expected {
        return Err(ZkError::InputCount { expected, got: public_inputs.len() });
    }
    let ok = Groth16::<Bn254>::verify(vk, public_inputs, proof).map_err(|e| ZkError::Ark(format!("{e}")))?;
    if !ok {
        return Err(ZkError::VerificationFailed);
    }
    Ok(())
}

fn to_bytes<T: CanonicalSerialize>(value: &T) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    value
        .serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn serialize_pk(pk: &ProvingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    to_bytes(pk)
}

pub fn deserialize_pk(bytes: &[u8]) -> Result<ProvingKey<Bn254>, ZkError> {
    ProvingKey::<Bn254>::deserialize_compressed(bytes).map_err(|e| ZkError::Serialization(format!("{e}")))
}

pub fn serialize_vk(vk: &VerifyingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    to_bytes(vk)
}

pub fn deserialize_vk(bytes: &[u8]) -> Result<VerifyingKey<Bn254>, ZkError> {
    VerifyingKey::<Bn254>::deserialize_compressed(bytes).map_err(|e| ZkError::Serialization(format!("{e}")))
}

/// Compressed proof encoding: `A (32) || B (64) || C (32)`.
pub fn serialize_proof(proof: &Proof<Bn254>) -> Result<Vec<u8>, ZkError> {
    let out = to_bytes(proof)?;
    debug_assert_eq!(out.len(), PROOF_ENCODED_LEN);
    Ok(out)
}

pub fn deserialize_proof(bytes: &[u8]) -> Result<Proof<Bn254>, ZkError> {
    Proof::<Bn254>::deserialize_compressed(bytes).map_err(|e| ZkError::Serialization(format!("{e}")))
}
