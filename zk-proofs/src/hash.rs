//! Native Poseidon hashing and field conversions shared by every component.
//!
//! The circuit gadgets in [`crate::gadgets`] mirror these functions exactly; any change here
//! must be made on both sides or proofs will stop verifying.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::PoseidonSponge;
use ark_crypto_primitives::sponge::CryptographicSponge;
use ark_ff::{BigInteger, PrimeField};
use sha2::{Digest, Sha256};

use crate::constants::poseidon_params;

/// Absorb `inputs` into a fresh sponge and squeeze one element.
pub fn poseidon_hash(inputs: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::<Fr>::new(poseidon_params());
    sponge.absorb(&inputs.to_vec());
    sponge.squeeze_field_elements::<Fr>(1)[0]
}

/// `H(a, b)`: the two-to-one hash used by Merkle nodes, commitments and hash chains.
pub fn hash_pair(a: Fr, b: Fr) -> Fr {
    poseidon_hash(&[a, b])
}

/// Commitment to a private value: `H(value, nonce)`.
pub fn commit_value(value: u64, nonce: Fr) -> Fr {
    hash_pair(Fr::from(value), nonce)
}

/// Fold `values` into a running hash starting at `start`: `h_{i+1} = H(h_i, values[i])`.
pub fn hash_chain(start: Fr, values: &[Fr]) -> Fr {
    values.iter().fold(start, |acc, v| hash_pair(acc, *v))
}

/// Corpus leaf for one repository: `H(nameHash, ownerHash)`. Also the aggregator's dedup key.
pub fn repository_leaf(name_hash: Fr, owner_hash: Fr) -> Fr {
    hash_pair(name_hash, owner_hash)
}

/// Map arbitrary bytes (names, logins, languages) into the field.
pub fn field_from_bytes(bytes: &[u8]) -> Fr {
    let digest = Sha256::digest(bytes);
    Fr::from_be_bytes_mod_order(&digest)
}

/// `hash(subjectId)`: the identity a repository owner hash is compared against.
pub fn subject_hash(subject_id: &str) -> Fr {
    poseidon_hash(&[field_from_bytes(subject_id.as_bytes())])
}

/// Field id for a language name. Never zero, because zero marks an empty slot.
pub fn language_id(language: &str) -> Fr {
    let id = field_from_bytes(language.to_ascii_lowercase().as_bytes());
    if id == Fr::from(0u64) { Fr::from(1u64) } else { id }
}

/// Interpret a field element as a u64 if it fits in 64 bits.
pub fn fr_to_u64(x: &Fr) -> Option<u64> {
    let limbs = x.into_bigint().0;
    if limbs[1..].iter().all(|l| *l == 0) {
        Some(limbs[0])
    } else {
        None
    }
}

/// 32-byte big-endian encoding, the word layout used in identity hashes.
pub fn fr_to_be_bytes(x: &Fr) -> [u8; 32] {
    let bytes = x.into_bigint().to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}
