//! R1CS gadgets for the constraint primitive library.
//!
//! Every gadget returns its validity as a 0/1 field element rather than enforcing it, so the
//! credential circuits can AND (multiply) the bits together and enforce the product once.
//! Booleans are kept as `FpVar`s constrained by `b * b = b`.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_ff::{AdditiveGroup, BigInteger, Field, PrimeField};
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};
use ark_std::{One, Zero};

use crate::constants::{poseidon_params, RANGE_BITS};

/// In-circuit counterpart of [`crate::hash::poseidon_hash`].
pub fn poseidon_hash_var(
    cs: ConstraintSystemRef<Fr>,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::<Fr>::new(cs, poseidon_params());
    sponge.absorb(&inputs.to_vec())?;
    let mut out = sponge.squeeze_field_elements(1)?;
    Ok(out.remove(0))
}

pub fn hash_pair_var(
    cs: ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    poseidon_hash_var(cs, &[a.clone(), b.clone()])
}

/// Running hash `h_{i+1} = H(h_i, values[i])`.
pub fn hash_chain_var(
    cs: ConstraintSystemRef<Fr>,
    start: &FpVar<Fr>,
    values: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut acc = start.clone();
    for v in values {
        acc = hash_pair_var(cs.clone(), &acc, v)?;
    }
    Ok(acc)
}

/// Enforce `b ∈ {0, 1}`.
pub fn enforce_bit(b: &FpVar<Fr>) -> Result<(), SynthesisError> {
    b.mul_equals(b, b)
}

/// Logical AND of two bits.
pub fn and(a: &FpVar<Fr>, b: &FpVar<Fr>) -> FpVar<Fr> {
    a * b
}

/// Logical NOT of a bit.
pub fn not(a: &FpVar<Fr>) -> FpVar<Fr> {
    FpVar::<Fr>::one() - a
}

/// AND over any number of bits.
pub fn all(bits: &[FpVar<Fr>]) -> FpVar<Fr> {
    bits.iter().fold(FpVar::<Fr>::one(), |acc, b| acc * b)
}

/// Enforce that a composed validity signal equals 1.
pub fn require_true(valid: &FpVar<Fr>) -> Result<(), SynthesisError> {
    valid.enforce_equal(&FpVar::<Fr>::one())
}

/// 1 if `x == 0`, else 0.
pub fn is_zero(cs: ConstraintSystemRef<Fr>, x: &FpVar<Fr>) -> Result<FpVar<Fr>, SynthesisError> {
    let inv = FpVar::<Fr>::new_witness(cs, || {
        let v = x.value()?;
        Ok(v.inverse().unwrap_or_else(Fr::zero))
    })?;
    let out = FpVar::<Fr>::one() - x * &inv;
    // x * out = 0 forces out = 0 whenever x != 0; out = 1 - x * inv forces out = 1 when x = 0.
    x.mul_equals(&out, &FpVar::<Fr>::zero())?;
    Ok(out)
}

/// 1 if `a == b`, else 0.
pub fn is_equal(
    cs: ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    is_zero(cs, &(a - b))
}

/// Decompose `v` into `bits` little-endian bit wires, enforcing that `v` fits.
pub fn decompose(
    cs: ConstraintSystemRef<Fr>,
    v: &FpVar<Fr>,
    bits: usize,
) -> Result<Vec<FpVar<Fr>>, SynthesisError> {
    let mut out = Vec::with_capacity(bits);
    let mut acc = FpVar::<Fr>::zero();
    let mut coeff = Fr::one();

    for i in 0..bits {
        let bit = FpVar::<Fr>::new_witness(cs.clone(), || {
            let x = v.value()?;
            Ok(Fr::from(x.into_bigint().get_bit(i) as u64))
        })?;
        enforce_bit(&bit)?;
        acc += &bit * coeff;
        coeff.double_in_place();
        out.push(bit);
    }

    acc.enforce_equal(v)?;
    Ok(out)
}

/// Enforce that `v` fits in [`RANGE_BITS`] bits.
pub fn constrain_range_bits(cs: ConstraintSystemRef<Fr>, v: &FpVar<Fr>) -> Result<(), SynthesisError> {
    decompose(cs, v, RANGE_BITS).map(|_| ())
}

/// 1 if `a <= b`, for `a` and `b` already constrained to [`RANGE_BITS`] bits.
///
/// `b - a + 2^RANGE_BITS` lies in `(0, 2^(RANGE_BITS+1))`; its top bit is set iff `b >= a`.
pub fn less_or_equal(
    cs: ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    let shift = Fr::from(2u64).pow([RANGE_BITS as u64]);
    let shifted = b - a + FpVar::<Fr>::constant(shift);
    let bits = decompose(cs, &shifted, RANGE_BITS + 1)?;
    Ok(bits[RANGE_BITS].clone())
}

/// 1 if `min <= value <= max`. All three are range-constrained here.
pub fn range_check(
    cs: ConstraintSystemRef<Fr>,
    value: &FpVar<Fr>,
    min: &FpVar<Fr>,
    max: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    constrain_range_bits(cs.clone(), value)?;
    constrain_range_bits(cs.clone(), min)?;
    constrain_range_bits(cs.clone(), max)?;
    let above_min = less_or_equal(cs.clone(), min, value)?;
    let below_max = less_or_equal(cs, value, max)?;
    Ok(and(&above_min, &below_max))
}

/// 1 if `value >= min`. Both are range-constrained here.
pub fn at_least(
    cs: ConstraintSystemRef<Fr>,
    value: &FpVar<Fr>,
    min: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    constrain_range_bits(cs.clone(), value)?;
    constrain_range_bits(cs.clone(), min)?;
    less_or_equal(cs, min, value)
}

/// In-circuit range proof: `H(value, nonce) == commitment` AND `min <= value <= max`.
pub fn range_proof(
    cs: ConstraintSystemRef<Fr>,
    value: &FpVar<Fr>,
    nonce: &FpVar<Fr>,
    min: &FpVar<Fr>,
    max: &FpVar<Fr>,
    commitment: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    let recomputed = hash_pair_var(cs.clone(), value, nonce)?;
    let opens = is_equal(cs.clone(), &recomputed, commitment)?;
    let in_range = range_check(cs, value, min, max)?;
    Ok(and(&opens, &in_range))
}

/// Recompute a Merkle root from `leaf`; 1 if it equals `root`.
///
/// `path_indices[i] == 0` keeps the running node on the left.
pub fn merkle_membership(
    cs: ConstraintSystemRef<Fr>,
    leaf: &FpVar<Fr>,
    path_elements: &[FpVar<Fr>],
    path_indices: &[FpVar<Fr>],
    root: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    if path_elements.len() != path_indices.len() {
        return Err(SynthesisError::Unsatisfiable);
    }

    let mut node = leaf.clone();
    for (sibling, index) in path_elements.iter().zip(path_indices) {
        enforce_bit(index)?;
        // swap = index * (sibling - node); left = node + swap, right = sibling - swap.
        let swap = index * (sibling - &node);
        let left = &node + &swap;
        let right = sibling - &swap;
        node = hash_pair_var(cs.clone(), &left, &right)?;
    }

    is_equal(cs, &node, root)
}

/// 1 if `value` equals some element of `set`. The matching index is never materialized.
pub fn set_membership(
    cs: ConstraintSystemRef<Fr>,
    value: &FpVar<Fr>,
    set: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    if set.is_empty() {
        return Ok(FpVar::<Fr>::zero());
    }
    let product = set
        .iter()
        .fold(FpVar::<Fr>::one(), |acc, item| acc * (value - item));
    is_zero(cs, &product)
}

/// 1 if folding `values` into `start` yields `final_hash`.
pub fn hash_chain_check(
    cs: ConstraintSystemRef<Fr>,
    start: &FpVar<Fr>,
    values: &[FpVar<Fr>],
    final_hash: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    let folded = hash_chain_var(cs.clone(), start, values)?;
    is_equal(cs, &folded, final_hash)
}
