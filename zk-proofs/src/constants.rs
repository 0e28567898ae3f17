//! Crate-wide constants used by the credential circuits and host-side orchestration.

use std::sync::OnceLock;

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{find_poseidon_ark_and_mds, PoseidonConfig};
use ark_ff::PrimeField;

/// Bit width of every bounded quantity checked by a range proof.
///
/// Values, minimums and maximums are all decomposed into this many boolean wires, so the
/// comparator never has to reason about field wrap-around.
pub const RANGE_BITS: usize = 64;

/// Depth of the repository corpus Merkle tree (256 leaves).
pub const MERKLE_DEPTH: usize = 8;

/// Number of language slots carried by a repository witness. Slot value 0 means "empty".
pub const MAX_LANGUAGES: usize = 8;

/// Size of the public language set a Language credential proves membership in.
pub const LANGUAGE_SET_SIZE: usize = 4;

/// Upper bound for percentage-like public inputs (contribution share, proficiency).
pub const MAX_PERCENT: u64 = 100;

/// Fixed public input vector lengths, one per credential type.
pub const REPOSITORY_PUBLIC_INPUTS: usize = 10;
pub const LANGUAGE_PUBLIC_INPUTS: usize = 9;
pub const COLLABORATION_PUBLIC_INPUTS: usize = 8;
pub const AGGREGATE_PUBLIC_INPUTS: usize = 10;

/// Length of an arkworks compressed BN254 Groth16 proof (A in G1, B in G2, C in G1).
pub const PROOF_ENCODED_LEN: usize = 32 + 64 + 32;

/// Domain separator for credential identity hashes.
pub const IDENTITY_DOMAIN: &[u8] = b"contrib-credential/identity/v1";

// Poseidon sponge configuration.
//
// We use a width-3 sponge (rate=2, capacity=1) to efficiently absorb pairs of field elements.
// NOTE: parameters should be reviewed against an audited constant set before production use.
pub const POSEIDON_RATE: usize = 2;
pub const POSEIDON_CAPACITY: usize = 1;

// Typical Poseidon parameters for width=3.
pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

/// Poseidon S-box exponent (alpha).
pub const POSEIDON_ALPHA: u64 = 5;

/// Deterministically derive Poseidon parameters for BN254::Fr.
///
/// This uses arkworks' parameter derivation helper (Ark + MDS) so both the native hasher
/// and the in-circuit gadget agree on the same constants.
pub fn poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits = Fr::MODULUS_BIT_SIZE as u64;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        POSEIDON_RATE,
        POSEIDON_FULL_ROUNDS as u64,
        POSEIDON_PARTIAL_ROUNDS as u64,
        0,
    );

    PoseidonConfig::new(
        POSEIDON_FULL_ROUNDS,
        POSEIDON_PARTIAL_ROUNDS,
        POSEIDON_ALPHA,
        mds,
        ark,
        POSEIDON_RATE,
        POSEIDON_CAPACITY,
    )
}

/// Process-wide cached Poseidon parameters.
///
/// Deriving the round constants walks a Grain LFSR, which is too slow to repeat per hash.
pub fn poseidon_params() -> &'static PoseidonConfig<Fr> {
    static PARAMS: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();
    PARAMS.get_or_init(poseidon_config)
}
