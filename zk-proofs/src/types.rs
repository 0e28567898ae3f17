//! Types shared between the circuits, the native primitive library and the host-side verifier.

use std::fmt;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::PrimeField;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{
    AGGREGATE_PUBLIC_INPUTS, COLLABORATION_PUBLIC_INPUTS, LANGUAGE_PUBLIC_INPUTS,
    REPOSITORY_PUBLIC_INPUTS,
};

/// JSON-friendly representation of a field element.
///
/// We expose Fr values as hex strings of arkworks' canonical compressed encoding so all
/// components agree on the byte order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrHex(pub String);

impl FrHex {
    pub fn from_fr(x: &Fr) -> Self {
        let mut bytes = Vec::new();
        x.serialize_compressed(&mut bytes)
            .expect("in-memory serialization");
        Self(hex::encode(bytes))
    }

    pub fn to_fr(&self) -> Result<Fr, String> {
        let bytes = hex::decode(self.0.trim_start_matches("0x")).map_err(|e| format!("invalid hex: {e}"))?;
        Fr::deserialize_compressed(&bytes[..]).map_err(|e| format!("invalid field bytes: {e}"))
    }
}

/// A 20-byte ledger account address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Embed the address into the scalar field (20 bytes always fit below the modulus).
    pub fn to_fr(&self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| format!("invalid address hex: {e}"))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| "address must be exactly 20 bytes".to_string())?;
        Ok(Address(arr))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The four credential shapes the verifier understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    Repository = 0,
    Language = 1,
    Collaboration = 2,
    Aggregate = 3,
}

impl CredentialType {
    pub const ALL: [CredentialType; 4] = [
        CredentialType::Repository,
        CredentialType::Language,
        CredentialType::Collaboration,
        CredentialType::Aggregate,
    ];

    /// Number of public inputs a proof of this type is checked against.
    pub fn public_input_len(self) -> usize {
        match self {
            CredentialType::Repository => REPOSITORY_PUBLIC_INPUTS,
            CredentialType::Language => LANGUAGE_PUBLIC_INPUTS,
            CredentialType::Collaboration => COLLABORATION_PUBLIC_INPUTS,
            CredentialType::Aggregate => AGGREGATE_PUBLIC_INPUTS,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CredentialType::Repository => "repository",
            CredentialType::Language => "language",
            CredentialType::Collaboration => "collaboration",
            CredentialType::Aggregate => "aggregate",
        }
    }
}

impl TryFrom<u64> for CredentialType {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CredentialType::Repository),
            1 => Ok(CredentialType::Language),
            2 => Ok(CredentialType::Collaboration),
            3 => Ok(CredentialType::Aggregate),
            other => Err(format!("unknown credential type {other}")),
        }
    }
}

impl FromStr for CredentialType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CredentialType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown credential type '{s}'"))
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which primitive produced a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Range,
    MerkleMembership,
    SetMembership,
    HashChain,
    Signature,
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveKind::Range => "range",
            PrimitiveKind::MerkleMembership => "merkle_membership",
            PrimitiveKind::SetMembership => "set_membership",
            PrimitiveKind::HashChain => "hash_chain",
            PrimitiveKind::Signature => "signature",
        };
        f.write_str(s)
    }
}

/// Result of evaluating one primitive.
///
/// Only the public parameters are kept; the witness never leaves the evaluator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofPrimitiveClaim {
    pub kind: PrimitiveKind,
    pub public_inputs: Vec<Fr>,
    pub commitment: Option<Fr>,
    pub is_valid: bool,
}

impl ProofPrimitiveClaim {
    /// Field encoding of the validity bit (0 or 1).
    pub fn validity_bit(&self) -> Fr {
        Fr::from(self.is_valid as u64)
    }
}
