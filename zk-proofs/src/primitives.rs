//! Constraint primitive library (native evaluation).
//!
//! One canonical algorithm per primitive kind. Each check takes a private witness plus public
//! parameters and yields a [`ProofPrimitiveClaim`] whose validity bit is exactly what the matching
//! gadget in [`crate::gadgets`] computes in-circuit. Composition is a logical AND; there is no
//! partial success.

use ark_bn254::Fr;
use ed25519_dalek::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::hash::{commit_value, hash_chain};
use crate::merkle::MerklePath;
use crate::types::{Address, PrimitiveKind, ProofPrimitiveClaim};

/// Version of the primitive parameter contract. Bump when any algorithm below changes.
pub const PRIMITIVE_CONTRACT_VERSION: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrimitiveError {
    #[error("primitive {0} is unsatisfied")]
    Unsatisfied(PrimitiveKind),
}

/// `min <= value <= max` and `H(value, nonce) == commitment`.
#[derive(Clone, Debug)]
pub struct RangeProof {
    pub value: u64,
    pub nonce: Fr,
    pub min: u64,
    pub max: u64,
    pub commitment: Fr,
}

impl RangeProof {
    /// Convenience constructor that derives the commitment from the witness.
    pub fn committed(value: u64, nonce: Fr, min: u64, max: u64) -> Self {
        Self { value, nonce, min, max, commitment: commit_value(value, nonce) }
    }

    pub fn evaluate(&self) -> ProofPrimitiveClaim {
        let opens = commit_value(self.value, self.nonce) == self.commitment;
        let in_range = self.min <= self.value && self.value <= self.max;
        ProofPrimitiveClaim {
            kind: PrimitiveKind::Range,
            public_inputs: vec![Fr::from(self.min), Fr::from(self.max)],
            commitment: Some(self.commitment),
            is_valid: opens && in_range,
        }
    }
}

/// Recompute `root` from `leaf` and its authentication path.
#[derive(Clone, Debug)]
pub struct MerkleMembership {
    pub leaf: Fr,
    pub path: MerklePath,
    pub root: Fr,
}

impl MerkleMembership {
    pub fn evaluate(&self) -> ProofPrimitiveClaim {
        let indices_are_bits = self.path.path_indices.iter().all(|i| *i <= 1);
        ProofPrimitiveClaim {
            kind: PrimitiveKind::MerkleMembership,
            public_inputs: vec![self.root],
            commitment: None,
            is_valid: indices_are_bits && self.path.compute_root(self.leaf) == self.root,
        }
    }
}

/// `value` equals at least one element of `set`.
#[derive(Clone, Debug)]
pub struct SetMembership {
    pub value: Fr,
    pub set: Vec<Fr>,
}

impl SetMembership {
    pub fn evaluate(&self) -> ProofPrimitiveClaim {
        // No early exit: every element is compared.
        let found = self.set.iter().fold(false, |acc, item| acc | (*item == self.value));
        ProofPrimitiveClaim {
            kind: PrimitiveKind::SetMembership,
            public_inputs: self.set.clone(),
            commitment: None,
            is_valid: found,
        }
    }
}

/// `H(...H(H(start, v0), v1)..., vn) == final_hash`.
#[derive(Clone, Debug)]
pub struct HashChain {
    pub start: Fr,
    pub values: Vec<Fr>,
    pub final_hash: Fr,
}

impl HashChain {
    pub fn evaluate(&self) -> ProofPrimitiveClaim {
        ProofPrimitiveClaim {
            kind: PrimitiveKind::HashChain,
            public_inputs: vec![self.start, self.final_hash],
            commitment: Some(self.final_hash),
            is_valid: hash_chain(self.start, &self.values) == self.final_hash,
        }
    }
}

/// Ed25519 signature whose signer identity must equal `expected_address`.
#[derive(Clone, Debug)]
pub struct SignatureVerify {
    pub message: Vec<u8>,
    pub signature: [u8; 64],
    pub public_key: [u8; 32],
    pub expected_address: Address,
}

impl SignatureVerify {
    pub fn evaluate(&self) -> ProofPrimitiveClaim {
        let is_valid = recover_signer(&self.message, &self.signature, &self.public_key)
            .is_some_and(|signer| signer == self.expected_address);
        ProofPrimitiveClaim {
            kind: PrimitiveKind::Signature,
            public_inputs: vec![self.expected_address.to_fr()],
            commitment: None,
            is_valid,
        }
    }
}

/// Address controlled by an Ed25519 public key: the last 20 bytes of `sha256(key)`.
pub fn address_from_public_key(public_key: &[u8; 32]) -> Address {
    let digest = Sha256::digest(public_key);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address(out)
}

/// Signer identity for `(message, signature, public_key)`, or `None` if the signature does
/// not verify strictly under that key.
pub fn recover_signer(message: &[u8], signature: &[u8; 64], public_key: &[u8; 32]) -> Option<Address> {
    let key = VerifyingKey::from_bytes(public_key).ok()?;
    let sig = Signature::from_bytes(signature);
    key.verify_strict(message, &sig).ok()?;
    Some(address_from_public_key(public_key))
}

/// Tagged union over the canonical primitive kinds.
#[derive(Clone, Debug)]
pub enum Primitive {
    Range(RangeProof),
    Merkle(MerkleMembership),
    SetMembership(SetMembership),
    HashChain(HashChain),
    Signature(SignatureVerify),
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::Range(_) => PrimitiveKind::Range,
            Primitive::Merkle(_) => PrimitiveKind::MerkleMembership,
            Primitive::SetMembership(_) => PrimitiveKind::SetMembership,
            Primitive::HashChain(_) => PrimitiveKind::HashChain,
            Primitive::Signature(_) => PrimitiveKind::Signature,
        }
    }

    pub fn evaluate(&self) -> ProofPrimitiveClaim {
        match self {
            Primitive::Range(p) => p.evaluate(),
            Primitive::Merkle(p) => p.evaluate(),
            Primitive::SetMembership(p) => p.evaluate(),
            Primitive::HashChain(p) => p.evaluate(),
            Primitive::Signature(p) => p.evaluate(),
        }
    }
}

/// Logical AND across claims, i.e. the product of their 0/1 validity bits.
pub fn conjunction(claims: &[ProofPrimitiveClaim]) -> bool {
    claims.iter().all(|c| c.is_valid)
}

/// Evaluate every primitive and fail on the first unsatisfied one.
///
/// The error only names the primitive kind; witness values never appear in it.
pub fn require_all(primitives: &[Primitive]) -> Result<Vec<ProofPrimitiveClaim>, PrimitiveError> {
    let claims: Vec<ProofPrimitiveClaim> = primitives.iter().map(Primitive::evaluate).collect();
    match claims.iter().find(|c| !c.is_valid) {
        Some(failed) => Err(PrimitiveError::Unsatisfied(failed.kind)),
        None => Ok(claims),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_pair;
    use crate::merkle::MerkleTree;
    use ed25519_dalek::{Signer, SigningKey};

    fn nonce() -> Fr {
        Fr::from(0xdead_beefu64)
    }

    #[test]
    fn range_proof_boundaries() {
        let (min, max) = (10u64, 20u64);
        for (value, expected) in [(10, true), (20, true), (15, true), (9, false), (21, false)] {
            let claim = RangeProof::committed(value, nonce(), min, max).evaluate();
            assert_eq!(claim.is_valid, expected, "value {value}");
        }
    }

    #[test]
    fn range_proof_point_interval_is_legal() {
        assert!(RangeProof::committed(42, nonce(), 42, 42).evaluate().is_valid);
        assert!(!RangeProof::committed(41, nonce(), 42, 42).evaluate().is_valid);
    }

    #[test]
    fn range_proof_rejects_wrong_commitment() {
        let mut proof = RangeProof::committed(15, nonce(), 10, 20);
        proof.commitment = commit_value(16, nonce());
        assert!(!proof.evaluate().is_valid);

        let mut proof = RangeProof::committed(15, nonce(), 10, 20);
        proof.nonce = Fr::from(1u64);
        assert!(!proof.evaluate().is_valid);
    }

    #[test]
    fn range_proof_handles_extreme_bounds() {
        assert!(RangeProof::committed(u64::MAX, nonce(), 0, u64::MAX).evaluate().is_valid);
        assert!(RangeProof::committed(0, nonce(), 0, 0).evaluate().is_valid);
    }

    #[test]
    fn merkle_membership_detects_tampering() {
        let leaves: Vec<Fr> = (1..=6u64).map(Fr::from).collect();
        let tree = MerkleTree::new(&leaves).unwrap();
        let good = MerkleMembership { leaf: leaves[3], path: tree.path(3).unwrap(), root: tree.root() };
        assert!(good.evaluate().is_valid);

        for level in 0..crate::constants::MERKLE_DEPTH {
            let mut flipped_element = good.clone();
            flipped_element.path.path_elements[level] += Fr::from(1u64);
            assert!(!flipped_element.evaluate().is_valid, "element at level {level}");

            let mut flipped_index = good.clone();
            flipped_index.path.path_indices[level] ^= 1;
            assert!(!flipped_index.evaluate().is_valid, "index at level {level}");
        }
    }

    #[test]
    fn merkle_membership_rejects_non_bit_indices() {
        let leaves = vec![Fr::from(1u64), Fr::from(2u64)];
        let tree = MerkleTree::new(&leaves).unwrap();
        let mut m = MerkleMembership { leaf: leaves[0], path: tree.path(0).unwrap(), root: tree.root() };
        m.path.path_indices[5] = 2;
        assert!(!m.evaluate().is_valid);
    }

    #[test]
    fn set_membership() {
        let set = vec![Fr::from(3u64), Fr::from(5u64), Fr::from(8u64)];
        assert!(SetMembership { value: Fr::from(5u64), set: set.clone() }.evaluate().is_valid);
        assert!(!SetMembership { value: Fr::from(4u64), set: set.clone() }.evaluate().is_valid);
        assert!(!SetMembership { value: Fr::from(4u64), set: vec![] }.evaluate().is_valid);
    }

    #[test]
    fn hash_chain_is_order_sensitive() {
        let start = Fr::from(1u64);
        let values = vec![Fr::from(2u64), Fr::from(3u64)];
        let final_hash = hash_pair(hash_pair(start, values[0]), values[1]);
        assert!(HashChain { start, values: values.clone(), final_hash }.evaluate().is_valid);

        let reversed = vec![values[1], values[0]];
        assert!(!HashChain { start, values: reversed, final_hash }.evaluate().is_valid);
    }

    #[test]
    fn signature_recovers_expected_address() {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let public_key = signing.verifying_key().to_bytes();
        let message = b"issue aggregate credential".to_vec();
        let signature = signing.sign(&message).to_bytes();
        let expected_address = address_from_public_key(&public_key);

        let ok = SignatureVerify { message: message.clone(), signature, public_key, expected_address };
        assert!(ok.evaluate().is_valid);

        let wrong_address = SignatureVerify { expected_address: Address([1u8; 20]), ..ok.clone() };
        assert!(!wrong_address.evaluate().is_valid);

        let tampered = SignatureVerify { message: b"something else".to_vec(), ..ok };
        assert!(!tampered.evaluate().is_valid);
    }

    #[test]
    fn require_all_names_failing_kind() {
        let primitives = vec![
            Primitive::Range(RangeProof::committed(5, nonce(), 0, 10)),
            Primitive::SetMembership(SetMembership { value: Fr::from(1u64), set: vec![Fr::from(2u64)] }),
        ];
        assert_eq!(
            require_all(&primitives).unwrap_err(),
            PrimitiveError::Unsatisfied(PrimitiveKind::SetMembership)
        );
        assert!(require_all(&primitives[..1]).is_ok());
    }
}
