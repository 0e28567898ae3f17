//! Public input contract per credential type.
//!
//! This is the only part of the proof composer the verifier depends on: the fixed layout of
//! each public input vector and the domain every entry must lie in.

use ark_bn254::Fr;
use ark_std::Zero;
use thiserror::Error;

use crate::constants::{LANGUAGE_SET_SIZE, MAX_LANGUAGES, MAX_PERCENT};
use crate::hash::fr_to_u64;
use crate::types::CredentialType;

pub mod repository {
    pub const REPO_HASH: usize = 0;
    pub const SUBJECT: usize = 1;
    pub const MIN_COMMITS: usize = 2;
    pub const MAX_COMMITS: usize = 3;
    pub const MIN_LOC: usize = 4;
    pub const MAX_LOC: usize = 5;
    pub const LANGUAGE_COUNT: usize = 6;
    pub const MIN_COLLABORATORS: usize = 7;
    pub const MAX_COLLABORATORS: usize = 8;
    pub const TIMESTAMP: usize = 9;
}

pub mod language {
    pub const SUBJECT: usize = 0;
    pub const PROFILE_COMMITMENT: usize = 1;
    pub const LANGUAGE_SET: usize = 2;
    pub const MIN_PROFICIENCY: usize = 6;
    pub const MAX_PROFICIENCY: usize = 7;
    pub const TIMESTAMP: usize = 8;
}

pub mod collaboration {
    pub const SUBJECT: usize = 0;
    pub const COMMITMENT: usize = 1;
    pub const MIN_COLLABORATORS: usize = 2;
    pub const MAX_COLLABORATORS: usize = 3;
    pub const MIN_CONTRIBUTION_PCT: usize = 4;
    pub const MAX_CONTRIBUTION_PCT: usize = 5;
    pub const IS_NOT_OWNER: usize = 6;
    pub const TIMESTAMP: usize = 7;
}

pub mod aggregate {
    pub const SUBJECT: usize = 0;
    pub const CREDENTIAL_HASH: usize = 1;
    pub const CORPUS_ROOT: usize = 2;
    pub const MIN_REPOSITORIES: usize = 3;
    pub const MIN_COMMITS: usize = 4;
    pub const MAX_COMMITS: usize = 5;
    pub const MIN_LOC: usize = 6;
    pub const MAX_LOC: usize = 7;
    pub const IS_NOT_OWNER_OF_ALL: usize = 8;
    pub const TIMESTAMP: usize = 9;
}

/// Why a public input vector was rejected before the pairing check.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InputDomainError {
    #[error("expected {expected} public inputs, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("{0} must be non-zero")]
    ZeroField(&'static str),

    #[error("{0} does not fit in 64 bits")]
    NotU64(&'static str),

    #[error("{0}: minimum exceeds maximum")]
    InvertedBounds(&'static str),

    #[error("{0} exceeds 100")]
    PercentOutOfRange(&'static str),

    #[error("{0} must be 0 or 1")]
    NotBoolean(&'static str),

    #[error("language count exceeds the number of language slots")]
    TooManyLanguages,
}

/// Index of the subject address within a type's public input vector.
pub fn subject_index(ty: CredentialType) -> usize {
    match ty {
        CredentialType::Repository => repository::SUBJECT,
        CredentialType::Language => language::SUBJECT,
        CredentialType::Collaboration => collaboration::SUBJECT,
        CredentialType::Aggregate => aggregate::SUBJECT,
    }
}

/// Index of the issuance timestamp within a type's public input vector.
pub fn timestamp_index(ty: CredentialType) -> usize {
    match ty {
        CredentialType::Repository => repository::TIMESTAMP,
        CredentialType::Language => language::TIMESTAMP,
        CredentialType::Collaboration => collaboration::TIMESTAMP,
        CredentialType::Aggregate => aggregate::TIMESTAMP,
    }
}

struct Inputs<'a>(&'a [Fr]);

impl Inputs<'_> {
    fn non_zero(&self, idx: usize, name: &'static str) -> Result<(), InputDomainError> {
        if self.0[idx].is_zero() {
            return Err(InputDomainError::ZeroField(name));
        }
        Ok(())
    }

    fn u64(&self, idx: usize, name: &'static str) -> Result<u64, InputDomainError> {
        fr_to_u64(&self.0[idx]).ok_or(InputDomainError::NotU64(name))
    }

    fn bounds(&self, min: usize, max: usize, name: &'static str) -> Result<(u64, u64), InputDomainError> {
        let lo = self.u64(min, name)?;
        let hi = self.u64(max, name)?;
        if lo > hi {
            return Err(InputDomainError::InvertedBounds(name));
        }
        Ok((lo, hi))
    }

    fn percent_bounds(&self, min: usize, max: usize, name: &'static str) -> Result<(), InputDomainError> {
        let (_, hi) = self.bounds(min, max, name)?;
        if hi > MAX_PERCENT {
            return Err(InputDomainError::PercentOutOfRange(name));
        }
        Ok(())
    }

    fn boolean(&self, idx: usize, name: &'static str) -> Result<(), InputDomainError> {
        match self.u64(idx, name)? {
            0 | 1 => Ok(()),
            _ => Err(InputDomainError::NotBoolean(name)),
        }
    }

    fn timestamp(&self, idx: usize) -> Result<(), InputDomainError> {
        self.non_zero(idx, "timestamp")?;
        self.u64(idx, "timestamp").map(|_| ())
    }
}

/// Range-check every public input against the credential type's expected domain.
pub fn validate_public_inputs(ty: CredentialType, inputs: &[Fr]) -> Result<(), InputDomainError> {
    let expected = ty.public_input_len();
    if inputs.len() != expected {
        return Err(InputDomainError::LengthMismatch { expected, got: inputs.len() });
    }
    let x = Inputs(inputs);

    match ty {
        CredentialType::Repository => {
            use repository::*;
            x.non_zero(REPO_HASH, "repo_hash")?;
            x.non_zero(SUBJECT, "subject")?;
            x.bounds(MIN_COMMITS, MAX_COMMITS, "commits")?;
            x.bounds(MIN_LOC, MAX_LOC, "lines_of_code")?;
            x.bounds(MIN_COLLABORATORS, MAX_COLLABORATORS, "collaborators")?;
            if x.u64(LANGUAGE_COUNT, "language_count")? > MAX_LANGUAGES as u64 {
                return Err(InputDomainError::TooManyLanguages);
            }
            x.timestamp(TIMESTAMP)
        }
        CredentialType::Language => {
            use language::*;
            x.non_zero(SUBJECT, "subject")?;
            x.non_zero(PROFILE_COMMITMENT, "profile_commitment")?;
            for i in 0..LANGUAGE_SET_SIZE {
                x.non_zero(LANGUAGE_SET + i, "language_set")?;
            }
            x.percent_bounds(MIN_PROFICIENCY, MAX_PROFICIENCY, "proficiency")?;
            x.timestamp(TIMESTAMP)
        }
        CredentialType::Collaboration => {
            use collaboration::*;
            x.non_zero(SUBJECT, "subject")?;
            x.non_zero(COMMITMENT, "collaboration_commitment")?;
            x.bounds(MIN_COLLABORATORS, MAX_COLLABORATORS, "collaborators")?;
            x.percent_bounds(MIN_CONTRIBUTION_PCT, MAX_CONTRIBUTION_PCT, "contribution_pct")?;
            x.boolean(IS_NOT_OWNER, "is_not_owner")?;
            x.timestamp(TIMESTAMP)
        }
        CredentialType::Aggregate => {
            use aggregate::*;
            x.non_zero(SUBJECT, "subject")?;
            x.non_zero(CREDENTIAL_HASH, "credential_hash")?;
            x.non_zero(CORPUS_ROOT, "corpus_root")?;
            x.non_zero(MIN_REPOSITORIES, "min_repositories")?;
            x.u64(MIN_REPOSITORIES, "min_repositories")?;
            x.bounds(MIN_COMMITS, MAX_COMMITS, "commits")?;
            x.bounds(MIN_LOC, MAX_LOC, "lines_of_code")?;
            x.boolean(IS_NOT_OWNER_OF_ALL, "is_not_owner_of_all")?;
            x.timestamp(TIMESTAMP)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository_inputs() -> Vec<Fr> {
        [7u64, 9, 10, 100, 1_000, 5_000, 3, 1, 4, 1_700_000_000]
            .into_iter()
            .map(Fr::from)
            .collect()
    }

    #[test]
    fn accepts_well_formed_repository_inputs() {
        assert_eq!(validate_public_inputs(CredentialType::Repository, &repository_inputs()), Ok(()));
    }

    #[test]
    fn rejects_wrong_length() {
        let mut inputs = repository_inputs();
        inputs.pop();
        assert_eq!(
            validate_public_inputs(CredentialType::Repository, &inputs),
            Err(InputDomainError::LengthMismatch { expected: 10, got: 9 })
        );
    }

    #[test]
    fn rejects_inverted_bounds_and_zero_hashes() {
        let mut inputs = repository_inputs();
        inputs[repository::MIN_COMMITS] = Fr::from(101u64);
        assert_eq!(
            validate_public_inputs(CredentialType::Repository, &inputs),
            Err(InputDomainError::InvertedBounds("commits"))
        );

        let mut inputs = repository_inputs();
        inputs[repository::REPO_HASH] = Fr::from(0u64);
        assert_eq!(
            validate_public_inputs(CredentialType::Repository, &inputs),
            Err(InputDomainError::ZeroField("repo_hash"))
        );
    }

    #[test]
    fn rejects_percentages_over_100_and_non_boolean_flags() {
        let mut inputs: Vec<Fr> = [5u64, 6, 1, 3, 10, 101, 1, 1_700_000_000]
            .into_iter()
            .map(Fr::from)
            .collect();
        assert_eq!(
            validate_public_inputs(CredentialType::Collaboration, &inputs),
            Err(InputDomainError::PercentOutOfRange("contribution_pct"))
        );
        inputs[collaboration::MAX_CONTRIBUTION_PCT] = Fr::from(100u64);
        inputs[collaboration::IS_NOT_OWNER] = Fr::from(2u64);
        assert_eq!(
            validate_public_inputs(CredentialType::Collaboration, &inputs),
            Err(InputDomainError::NotBoolean("is_not_owner"))
        );
    }

    #[test]
    fn rejects_bounds_wider_than_u64() {
        let mut inputs = repository_inputs();
        inputs[repository::MAX_LOC] = -Fr::from(1u64);
        assert_eq!(
            validate_public_inputs(CredentialType::Repository, &inputs),
            Err(InputDomainError::NotU64("lines_of_code"))
        );
    }
}
