use ark_bn254::Fr;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use zk_proofs::circuit::{LanguageCircuit, LanguageStatement, LanguageWitness};
use zk_proofs::groth16::{
    deserialize_proof, deserialize_vk, prove, serialize_proof, serialize_vk, setup_keys, verify, ZkError,
};
use zk_proofs::hash::language_id;
use zk_proofs::statement::{language, validate_public_inputs};
use zk_proofs::types::CredentialType;

fn language_circuit() -> LanguageCircuit {
    let subject = Fr::from(0xfeed_u64);
    let witness = LanguageWitness { language: language_id("rust"), proficiency: 72, nonce: Fr::from(9u64) };
    LanguageCircuit {
        statement: LanguageStatement {
            subject,
            profile_commitment: witness.profile_commitment(subject),
            language_set: ["rust", "go", "c", "zig"].map(language_id),
            min_proficiency: 60,
            max_proficiency: 90,
            timestamp: 1_700_000_000,
        },
        witness,
    }
}

#[test]
fn language_credential_proves_and_verifies() {
    let mut rng = ChaCha20Rng::seed_from_u64(42);
    let keys = setup_keys(CredentialType::Language, &mut rng).unwrap();

    let (proof, inputs) = prove(&keys.pk, language_circuit(), &mut rng).unwrap();
    assert_eq!(validate_public_inputs(CredentialType::Language, &inputs), Ok(()));

    // Keys and proofs survive a serialization round trip.
    let vk = deserialize_vk(&serialize_vk(&keys.vk).unwrap()).unwrap();
    let bytes = serialize_proof(&proof).unwrap();
    assert_eq!(bytes.len(), zk_proofs::constants::PROOF_ENCODED_LEN);
    let proof = deserialize_proof(&bytes).unwrap();

    verify(&vk, &inputs, &proof).unwrap();

    let mut tampered = inputs;
    tampered[language::MAX_PROFICIENCY] = Fr::from(91u64);
    assert!(matches!(verify(&vk, &tampered, &proof), Err(ZkError::VerificationFailed)));

    assert!(matches!(
        verify(&vk, &inputs[..8], &proof),
        Err(ZkError::InputCount { expected: 9, got: 8 })
    ));
}

#[test]
fn prover_refuses_unsatisfiable_witness() {
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let keys = setup_keys(CredentialType::Language, &mut rng).unwrap();

    let mut circuit = language_circuit();
    circuit.statement.min_proficiency = 80;
    assert!(matches!(prove(&keys.pk, circuit, &mut rng), Err(ZkError::Witness(_))));
}
