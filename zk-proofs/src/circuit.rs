//! R1CS circuits, one per credential type.
//!
//! Each circuit composes gadgets from [`crate::gadgets`] and ANDs their validity bits into one
//! signal that is enforced to equal 1, so an unsatisfied primitive makes the whole witness
//! unsatisfiable. Public inputs are allocated straight from [`CredentialCircuit::public_inputs`],
//! which keeps the allocation order and the verifier's layout in lockstep.
//!
//! `check_witness` evaluates the same statement with the native primitive library so the
//! composer can refuse to prove (and name the failing primitive) before any Groth16 work.

use ark_bn254::Fr;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_std::Zero;
use thiserror::Error;

use crate::constants::{
    AGGREGATE_PUBLIC_INPUTS, COLLABORATION_PUBLIC_INPUTS, LANGUAGE_PUBLIC_INPUTS, LANGUAGE_SET_SIZE,
    MAX_LANGUAGES, REPOSITORY_PUBLIC_INPUTS,
};
use crate::gadgets::{
    all, and, at_least, constrain_range_bits, decompose, enforce_bit, hash_chain_check, hash_pair_var,
    is_equal, is_zero, merkle_membership, not, range_check, range_proof, require_true, set_membership,
};
use crate::hash::{commit_value, hash_chain, repository_leaf};
use crate::merkle::MerklePath;
use crate::primitives::{
    require_all, HashChain, MerkleMembership, Primitive, PrimitiveError, RangeProof, SetMembership,
};
use crate::statement;
use crate::types::{CredentialType, ProofPrimitiveClaim};

/// Address inputs are 20-byte values.
const ADDRESS_BITS: usize = 160;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WitnessError {
    #[error(transparent)]
    Primitive(#[from] PrimitiveError),

    #[error("language count does not match the committed language slots")]
    LanguageCountMismatch,

    #[error("non-ownership claim does not hold for the committed owner")]
    OwnershipClaim,

    #[error("witness does not match the public statement")]
    StatementMismatch,
}

/// A circuit with a fixed number `N` of public inputs.
pub trait CredentialCircuit<const N: usize>: ConstraintSynthesizer<Fr> + Clone {
    const CREDENTIAL_TYPE: CredentialType;

    /// Default-valued instance; constraint shape only depends on the type, so this is what
    /// key generation runs on.
    fn blank() -> Self;

    /// Public inputs in allocation order.
    fn public_inputs(&self) -> [Fr; N];

    /// Native evaluation of every primitive the circuit enforces.
    fn check_witness(&self) -> Result<Vec<ProofPrimitiveClaim>, WitnessError>;
}

fn alloc_inputs(cs: &ConstraintSystemRef<Fr>, values: &[Fr]) -> Result<Vec<FpVar<Fr>>, SynthesisError> {
    values
        .iter()
        .map(|v| FpVar::<Fr>::new_input(cs.clone(), || Ok(*v)))
        .collect()
}

fn alloc_witness(cs: &ConstraintSystemRef<Fr>, value: Fr) -> Result<FpVar<Fr>, SynthesisError> {
    FpVar::<Fr>::new_witness(cs.clone(), || Ok(value))
}

fn alloc_witnesses(cs: &ConstraintSystemRef<Fr>, values: &[Fr]) -> Result<Vec<FpVar<Fr>>, SynthesisError> {
    values.iter().map(|v| alloc_witness(cs, *v)).collect()
}

// ---------------------------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct RepositoryStatement {
    pub repo_hash: Fr,
    pub subject: Fr,
    pub min_commits: u64,
    pub max_commits: u64,
    pub min_loc: u64,
    pub max_loc: u64,
    pub language_count: u64,
    pub min_collaborators: u64,
    pub max_collaborators: u64,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Default)]
pub struct RepositoryWitness {
    pub name_hash: Fr,
    pub owner_hash: Fr,
    pub commits: u64,
    pub loc: u64,
    pub collaborators: u64,
    /// Language ids; zero marks an empty slot.
    pub languages: [Fr; MAX_LANGUAGES],
    pub nonce: Fr,
}

impl RepositoryWitness {
    pub fn language_count(&self) -> u64 {
        self.languages.iter().filter(|l| !l.is_zero()).count() as u64
    }

    fn chain_values(&self) -> Vec<Fr> {
        let mut values = vec![
            self.name_hash,
            self.owner_hash,
            commit_value(self.commits, self.nonce),
            commit_value(self.loc, self.nonce),
            commit_value(self.collaborators, self.nonce),
        ];
        values.extend_from_slice(&self.languages);
        values.push(self.nonce);
        values
    }

    /// `repoHash`: hash chain from the subject over the committed repository fields.
    pub fn repo_hash(&self, subject: Fr) -> Fr {
        hash_chain(subject, &self.chain_values())
    }
}

#[derive(Clone, Debug, Default)]
pub struct RepositoryCircuit {
    pub statement: RepositoryStatement,
    pub witness: RepositoryWitness,
}

impl CredentialCircuit<REPOSITORY_PUBLIC_INPUTS> for RepositoryCircuit {
    const CREDENTIAL_TYPE: CredentialType = CredentialType::Repository;

    fn blank() -> Self {
        Self::default()
    }

    fn public_inputs(&self) -> [Fr; REPOSITORY_PUBLIC_INPUTS] {
        use statement::repository::*;
        let s = &self.statement;
        let mut out = [Fr::zero(); REPOSITORY_PUBLIC_INPUTS];
        out[REPO_HASH] = s.repo_hash;
        out[SUBJECT] = s.subject;
        out[MIN_COMMITS] = Fr::from(s.min_commits);
        out[MAX_COMMITS] = Fr::from(s.max_commits);
        out[MIN_LOC] = Fr::from(s.min_loc);
        out[MAX_LOC] = Fr::from(s.max_loc);
        out[LANGUAGE_COUNT] = Fr::from(s.language_count);
        out[MIN_COLLABORATORS] = Fr::from(s.min_collaborators);
        out[MAX_COLLABORATORS] = Fr::from(s.max_collaborators);
        out[TIMESTAMP] = Fr::from(s.timestamp);
        out
    }

    fn check_witness(&self) -> Result<Vec<ProofPrimitiveClaim>, WitnessError> {
        let s = &self.statement;
        let w = &self.witness;
        if w.language_count() != s.language_count {
            return Err(WitnessError::LanguageCountMismatch);
        }
        Ok(require_all(&[
            Primitive::Range(RangeProof::committed(w.commits, w.nonce, s.min_commits, s.max_commits)),
            Primitive::Range(RangeProof::committed(w.loc, w.nonce, s.min_loc, s.max_loc)),
            Primitive::Range(RangeProof::committed(
                w.collaborators,
                w.nonce,
                s.min_collaborators,
                s.max_collaborators,
            )),
            Primitive::HashChain(HashChain {
                start: s.subject,
                values: w.chain_values(),
                final_hash: s.repo_hash,
            }),
        ])?)
    }
}

impl ConstraintSynthesizer<Fr> for RepositoryCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        use statement::repository::*;

        // IMPORTANT: inputs are allocated from `public_inputs()` so ordering matches the verifier.
        let inputs = alloc_inputs(&cs, &self.public_inputs())?;
        let w = &self.witness;

        let nonce = alloc_witness(&cs, w.nonce)?;
        let name_hash = alloc_witness(&cs, w.name_hash)?;
        let owner_hash = alloc_witness(&cs, w.owner_hash)?;
        let commits = alloc_witness(&cs, Fr::from(w.commits))?;
        let loc = alloc_witness(&cs, Fr::from(w.loc))?;
        let collaborators = alloc_witness(&cs, Fr::from(w.collaborators))?;
        let c_commits = alloc_witness(&cs, commit_value(w.commits, w.nonce))?;
        let c_loc = alloc_witness(&cs, commit_value(w.loc, w.nonce))?;
        let c_collaborators = alloc_witness(&cs, commit_value(w.collaborators, w.nonce))?;
        let languages = alloc_witnesses(&cs, &w.languages)?;

        let mut checks = vec![
            range_proof(cs.clone(), &commits, &nonce, &inputs[MIN_COMMITS], &inputs[MAX_COMMITS], &c_commits)?,
            range_proof(cs.clone(), &loc, &nonce, &inputs[MIN_LOC], &inputs[MAX_LOC], &c_loc)?,
            range_proof(
                cs.clone(),
                &collaborators,
                &nonce,
                &inputs[MIN_COLLABORATORS],
                &inputs[MAX_COLLABORATORS],
                &c_collaborators,
            )?,
        ];

        // Count of occupied language slots must equal the public language count.
        let mut occupied = FpVar::<Fr>::zero();
        for language in &languages {
            occupied += not(&is_zero(cs.clone(), language)?);
        }
        checks.push(is_equal(cs.clone(), &occupied, &inputs[LANGUAGE_COUNT])?);

        let mut values = vec![name_hash, owner_hash, c_commits, c_loc, c_collaborators];
        values.extend(languages);
        values.push(nonce);
        checks.push(hash_chain_check(cs.clone(), &inputs[SUBJECT], &values, &inputs[REPO_HASH])?);

        constrain_range_bits(cs.clone(), &inputs[TIMESTAMP])?;

        require_true(&all(&checks))
    }
}

// ---------------------------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct LanguageStatement {
    pub subject: Fr,
    pub profile_commitment: Fr,
    pub language_set: [Fr; LANGUAGE_SET_SIZE],
    pub min_proficiency: u64,
    pub max_proficiency: u64,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Default)]
pub struct LanguageWitness {
    pub language: Fr,
    pub proficiency: u64,
    pub nonce: Fr,
}

impl LanguageWitness {
    fn chain_values(&self) -> Vec<Fr> {
        vec![self.language, commit_value(self.proficiency, self.nonce), self.nonce]
    }

    pub fn profile_commitment(&self, subject: Fr) -> Fr {
        hash_chain(subject, &self.chain_values())
    }
}

#[derive(Clone, Debug, Default)]
pub struct LanguageCircuit {
    pub statement: LanguageStatement,
    pub witness: LanguageWitness,
}

impl CredentialCircuit<LANGUAGE_PUBLIC_INPUTS> for LanguageCircuit {
    const CREDENTIAL_TYPE: CredentialType = CredentialType::Language;

    fn blank() -> Self {
        Self::default()
    }

    fn public_inputs(&self) -> [Fr; LANGUAGE_PUBLIC_INPUTS] {
        use statement::language::*;
        let s = &self.statement;
        let mut out = [Fr::zero(); LANGUAGE_PUBLIC_INPUTS];
        out[SUBJECT] = s.subject;
        out[PROFILE_COMMITMENT] = s.profile_commitment;
        out[LANGUAGE_SET..LANGUAGE_SET + LANGUAGE_SET_SIZE].copy_from_slice(&s.language_set);
        out[MIN_PROFICIENCY] = Fr::from(s.min_proficiency);
        out[MAX_PROFICIENCY] = Fr::from(s.max_proficiency);
        out[TIMESTAMP] = Fr::from(s.timestamp);
        out
    }

    fn check_witness(&self) -> Result<Vec<ProofPrimitiveClaim>, WitnessError> {
        let s = &self.statement;
        let w = &self.witness;
        Ok(require_all(&[
            Primitive::SetMembership(SetMembership {
                value: w.language,
                set: s.language_set.to_vec(),
            }),
            Primitive::Range(RangeProof::committed(w.proficiency, w.nonce, s.min_proficiency, s.max_proficiency)),
            Primitive::HashChain(HashChain {
                start: s.subject,
                values: w.chain_values(),
                final_hash: s.profile_commitment,
            }),
        ])?)
    }
}

impl ConstraintSynthesizer<Fr> for LanguageCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        use statement::language::*;

        let inputs = alloc_inputs(&cs, &self.public_inputs())?;
        let w = &self.witness;

        let language = alloc_witness(&cs, w.language)?;
        let proficiency = alloc_witness(&cs, Fr::from(w.proficiency))?;
        let nonce = alloc_witness(&cs, w.nonce)?;
        let c_proficiency = alloc_witness(&cs, commit_value(w.proficiency, w.nonce))?;

        let checks = [
            set_membership(cs.clone(), &language, &inputs[LANGUAGE_SET..LANGUAGE_SET + LANGUAGE_SET_SIZE])?,
            range_proof(
                cs.clone(),
                &proficiency,
                &nonce,
                &inputs[MIN_PROFICIENCY],
                &inputs[MAX_PROFICIENCY],
                &c_proficiency,
            )?,
            hash_chain_check(
                cs.clone(),
                &inputs[SUBJECT],
                &[language, c_proficiency, nonce],
                &inputs[PROFILE_COMMITMENT],
            )?,
        ];

        constrain_range_bits(cs.clone(), &inputs[TIMESTAMP])?;

        require_true(&all(&checks))
    }
}

// ---------------------------------------------------------------------------------------------
// Collaboration
// ---------------------------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct CollaborationStatement {
    pub subject: Fr,
    pub commitment: Fr,
    pub min_collaborators: u64,
    pub max_collaborators: u64,
    pub min_contribution_pct: u64,
    pub max_contribution_pct: u64,
    pub is_not_owner: bool,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Default)]
pub struct CollaborationWitness {
    pub subject_hash: Fr,
    pub owner_hash: Fr,
    pub collaborators: u64,
    pub contribution_pct: u64,
    pub nonce: Fr,
}

impl CollaborationWitness {
    fn chain_values(&self) -> Vec<Fr> {
        vec![
            self.subject_hash,
            commit_value(self.collaborators, self.nonce),
            commit_value(self.contribution_pct, self.nonce),
            self.owner_hash,
            self.nonce,
        ]
    }

    pub fn commitment(&self, subject: Fr) -> Fr {
        hash_chain(subject, &self.chain_values())
    }
}

#[derive(Clone, Debug, Default)]
pub struct CollaborationCircuit {
    pub statement: CollaborationStatement,
    pub witness: CollaborationWitness,
}

impl CredentialCircuit<COLLABORATION_PUBLIC_INPUTS> for CollaborationCircuit {
    const CREDENTIAL_TYPE: CredentialType = CredentialType::Collaboration;

    fn blank() -> Self {
        Self::default()
    }

    fn public_inputs(&self) -> [Fr; COLLABORATION_PUBLIC_INPUTS] {
        use statement::collaboration::*;
        let s = &self.statement;
        let mut out = [Fr::zero(); COLLABORATION_PUBLIC_INPUTS];
        out[SUBJECT] = s.subject;
        out[COMMITMENT] = s.commitment;
        out[MIN_COLLABORATORS] = Fr::from(s.min_collaborators);
        out[MAX_COLLABORATORS] = Fr::from(s.max_collaborators);
        out[MIN_CONTRIBUTION_PCT] = Fr::from(s.min_contribution_pct);
        out[MAX_CONTRIBUTION_PCT] = Fr::from(s.max_contribution_pct);
        out[IS_NOT_OWNER] = Fr::from(s.is_not_owner as u64);
        out[TIMESTAMP] = Fr::from(s.timestamp);
        out
    }

    fn check_witness(&self) -> Result<Vec<ProofPrimitiveClaim>, WitnessError> {
        let s = &self.statement;
        let w = &self.witness;
        if s.is_not_owner && w.owner_hash == w.subject_hash {
            return Err(WitnessError::OwnershipClaim);
        }
        Ok(require_all(&[
            Primitive::Range(RangeProof::committed(
                w.collaborators,
                w.nonce,
                s.min_collaborators,
                s.max_collaborators,
            )),
            Primitive::Range(RangeProof::committed(
                w.contribution_pct,
                w.nonce,
                s.min_contribution_pct,
                s.max_contribution_pct,
            )),
            Primitive::HashChain(HashChain {
                start: s.subject,
                values: w.chain_values(),
                final_hash: s.commitment,
            }),
        ])?)
    }
}

impl ConstraintSynthesizer<Fr> for CollaborationCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        use statement::collaboration::*;

        let inputs = alloc_inputs(&cs, &self.public_inputs())?;
        let w = &self.witness;

        let subject_hash = alloc_witness(&cs, w.subject_hash)?;
        let owner_hash = alloc_witness(&cs, w.owner_hash)?;
        let collaborators = alloc_witness(&cs, Fr::from(w.collaborators))?;
        let contribution = alloc_witness(&cs, Fr::from(w.contribution_pct))?;
        let nonce = alloc_witness(&cs, w.nonce)?;
        let c_collaborators = alloc_witness(&cs, commit_value(w.collaborators, w.nonce))?;
        let c_contribution = alloc_witness(&cs, commit_value(w.contribution_pct, w.nonce))?;

        let flag = &inputs[IS_NOT_OWNER];
        enforce_bit(flag)?;
        let owns = is_equal(cs.clone(), &owner_hash, &subject_hash)?;

        let checks = [
            range_proof(
                cs.clone(),
                &collaborators,
                &nonce,
                &inputs[MIN_COLLABORATORS],
                &inputs[MAX_COLLABORATORS],
                &c_collaborators,
            )?,
            range_proof(
                cs.clone(),
                &contribution,
                &nonce,
                &inputs[MIN_CONTRIBUTION_PCT],
                &inputs[MAX_CONTRIBUTION_PCT],
                &c_contribution,
            )?,
            // flag = 1 requires a foreign owner; flag = 0 claims nothing.
            not(&and(flag, &owns)),
            hash_chain_check(
                cs.clone(),
                &inputs[SUBJECT],
                &[subject_hash, c_collaborators, c_contribution, owner_hash, nonce],
                &inputs[COMMITMENT],
            )?,
        ];

        constrain_range_bits(cs.clone(), &inputs[TIMESTAMP])?;

        require_true(&all(&checks))
    }
}

// ---------------------------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct AggregateStatement {
    pub subject: Fr,
    pub credential_hash: Fr,
    pub corpus_root: Fr,
    pub min_repositories: u64,
    pub min_commits: u64,
    pub max_commits: u64,
    pub min_loc: u64,
    pub max_loc: u64,
    pub is_not_owner_of_all: bool,
    pub timestamp: u64,
}

/// Private side of an aggregate profile plus the anchor repository used for the corpus
/// membership and non-ownership checks.
#[derive(Clone, Debug, Default)]
pub struct AggregateWitness {
    pub subject_hash: Fr,
    pub total_commits: u64,
    pub total_loc: u64,
    pub collaboration_score: u64,
    pub consistency_score: u64,
    pub diversity_score: u64,
    pub repository_count: u64,
    pub is_not_owner_of_all: bool,
    pub corpus_root: Fr,
    pub language_digest: Fr,
    pub anchor_name_hash: Fr,
    pub anchor_owner_hash: Fr,
    pub anchor_path: MerklePath,
}

impl AggregateWitness {
    fn chain_values(&self) -> Vec<Fr> {
        vec![
            Fr::from(self.total_commits),
            Fr::from(self.total_loc),
            Fr::from(self.collaboration_score),
            Fr::from(self.consistency_score),
            Fr::from(self.diversity_score),
            Fr::from(self.repository_count),
            Fr::from(self.is_not_owner_of_all as u64),
            self.corpus_root,
            self.language_digest,
        ]
    }

    /// `credentialHash`: hash chain from the subject hash over the aggregate's public fields.
    pub fn credential_hash(&self) -> Fr {
        hash_chain(self.subject_hash, &self.chain_values())
    }
}

#[derive(Clone, Debug, Default)]
pub struct AggregateCircuit {
    pub statement: AggregateStatement,
    pub witness: AggregateWitness,
}

impl CredentialCircuit<AGGREGATE_PUBLIC_INPUTS> for AggregateCircuit {
    const CREDENTIAL_TYPE: CredentialType = CredentialType::Aggregate;

    fn blank() -> Self {
        Self::default()
    }

    fn public_inputs(&self) -> [Fr; AGGREGATE_PUBLIC_INPUTS] {
        use statement::aggregate::*;
        let s = &self.statement;
        let mut out = [Fr::zero(); AGGREGATE_PUBLIC_INPUTS];
        out[SUBJECT] = s.subject;
        out[CREDENTIAL_HASH] = s.credential_hash;
        out[CORPUS_ROOT] = s.corpus_root;
        out[MIN_REPOSITORIES] = Fr::from(s.min_repositories);
        out[MIN_COMMITS] = Fr::from(s.min_commits);
        out[MAX_COMMITS] = Fr::from(s.max_commits);
        out[MIN_LOC] = Fr::from(s.min_loc);
        out[MAX_LOC] = Fr::from(s.max_loc);
        out[IS_NOT_OWNER_OF_ALL] = Fr::from(s.is_not_owner_of_all as u64);
        out[TIMESTAMP] = Fr::from(s.timestamp);
        out
    }

    fn check_witness(&self) -> Result<Vec<ProofPrimitiveClaim>, WitnessError> {
        let s = &self.statement;
        let w = &self.witness;
        if s.corpus_root != w.corpus_root || s.is_not_owner_of_all != w.is_not_owner_of_all {
            return Err(WitnessError::StatementMismatch);
        }
        if s.is_not_owner_of_all && w.anchor_owner_hash == w.subject_hash {
            return Err(WitnessError::OwnershipClaim);
        }
        // Totals are bound by the credential hash chain rather than a per-value commitment, so
        // the range primitives carry the trivial opening (zero nonce).
        let bound = |value: u64, min: u64, max: u64| {
            Primitive::Range(RangeProof::committed(value, Fr::zero(), min, max))
        };
        Ok(require_all(&[
            bound(w.total_commits, s.min_commits, s.max_commits),
            bound(w.total_loc, s.min_loc, s.max_loc),
            bound(w.repository_count, s.min_repositories, u64::MAX),
            Primitive::Merkle(MerkleMembership {
                leaf: repository_leaf(w.anchor_name_hash, w.anchor_owner_hash),
                path: w.anchor_path.clone(),
                root: s.corpus_root,
            }),
            Primitive::HashChain(HashChain {
                start: w.subject_hash,
                values: w.chain_values(),
                final_hash: s.credential_hash,
            }),
        ])?)
    }
}

impl ConstraintSynthesizer<Fr> for AggregateCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        use statement::aggregate::*;

        let inputs = alloc_inputs(&cs, &self.public_inputs())?;
        let w = &self.witness;

        let subject_hash = alloc_witness(&cs, w.subject_hash)?;
        let total_commits = alloc_witness(&cs, Fr::from(w.total_commits))?;
        let total_loc = alloc_witness(&cs, Fr::from(w.total_loc))?;
        let collaboration = alloc_witness(&cs, Fr::from(w.collaboration_score))?;
        let consistency = alloc_witness(&cs, Fr::from(w.consistency_score))?;
        let diversity = alloc_witness(&cs, Fr::from(w.diversity_score))?;
        let repository_count = alloc_witness(&cs, Fr::from(w.repository_count))?;
        let language_digest = alloc_witness(&cs, w.language_digest)?;
        let anchor_name = alloc_witness(&cs, w.anchor_name_hash)?;
        let anchor_owner = alloc_witness(&cs, w.anchor_owner_hash)?;
        let path_elements = alloc_witnesses(&cs, &w.anchor_path.path_elements)?;
        let path_indices: Vec<Fr> = w.anchor_path.path_indices.iter().map(|i| Fr::from(*i as u64)).collect();
        let path_indices = alloc_witnesses(&cs, &path_indices)?;

        let flag = &inputs[IS_NOT_OWNER_OF_ALL];
        enforce_bit(flag)?;

        let anchor_leaf = hash_pair_var(cs.clone(), &anchor_name, &anchor_owner)?;
        let anchor_is_own = is_equal(cs.clone(), &anchor_owner, &subject_hash)?;

        let checks = [
            range_check(cs.clone(), &total_commits, &inputs[MIN_COMMITS], &inputs[MAX_COMMITS])?,
            range_check(cs.clone(), &total_loc, &inputs[MIN_LOC], &inputs[MAX_LOC])?,
            at_least(cs.clone(), &repository_count, &inputs[MIN_REPOSITORIES])?,
            merkle_membership(cs.clone(), &anchor_leaf, &path_elements, &path_indices, &inputs[CORPUS_ROOT])?,
            not(&and(flag, &anchor_is_own)),
            hash_chain_check(
                cs.clone(),
                &subject_hash,
                &[
                    total_commits,
                    total_loc,
                    collaboration,
                    consistency,
                    diversity,
                    repository_count,
                    flag.clone(),
                    inputs[CORPUS_ROOT].clone(),
                    language_digest,
                ],
                &inputs[CREDENTIAL_HASH],
            )?,
        ];

        decompose(cs.clone(), &inputs[SUBJECT], ADDRESS_BITS)?;
        constrain_range_bits(cs.clone(), &inputs[TIMESTAMP])?;

        require_true(&all(&checks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{language_id, subject_hash};
    use crate::merkle::MerkleTree;
    use crate::primitives::PrimitiveError;
    use crate::types::PrimitiveKind;
    use ark_relations::r1cs::ConstraintSystem;

    fn satisfied<C: ConstraintSynthesizer<Fr>>(circuit: C) -> bool {
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        cs.is_satisfied().unwrap()
    }

    fn repository_circuit() -> RepositoryCircuit {
        let subject = Fr::from(0xabcdu64);
        let mut languages = [Fr::zero(); MAX_LANGUAGES];
        languages[0] = language_id("rust");
        languages[1] = language_id("go");
        let witness = RepositoryWitness {
            name_hash: Fr::from(11u64),
            owner_hash: subject_hash("someone-else"),
            commits: 120,
            loc: 4_500,
            collaborators: 3,
            languages,
            nonce: Fr::from(77u64),
        };
        RepositoryCircuit {
            statement: RepositoryStatement {
                repo_hash: witness.repo_hash(subject),
                subject,
                min_commits: 100,
                max_commits: 200,
                min_loc: 1_000,
                max_loc: 10_000,
                language_count: 2,
                min_collaborators: 2,
                max_collaborators: 5,
                timestamp: 1_700_000_000,
            },
            witness,
        }
    }

    #[test]
    fn repository_circuit_satisfied_for_honest_witness() {
        let circuit = repository_circuit();
        assert!(circuit.check_witness().is_ok());
        assert!(satisfied(circuit));
    }

    #[test]
    fn repository_commit_bounds_are_inclusive() {
        for commits in [100u64, 200] {
            let mut circuit = repository_circuit();
            circuit.witness.commits = commits;
            circuit.statement.repo_hash = circuit.witness.repo_hash(circuit.statement.subject);
            assert!(satisfied(circuit), "commits {commits}");
        }

        let mut circuit = repository_circuit();
        circuit.witness.commits = 99;
        circuit.statement.repo_hash = circuit.witness.repo_hash(circuit.statement.subject);
        assert_eq!(
            circuit.check_witness().unwrap_err(),
            WitnessError::Primitive(PrimitiveError::Unsatisfied(PrimitiveKind::Range))
        );
        assert!(!satisfied(circuit));
    }

    #[test]
    fn repository_language_count_must_match() {
        let mut circuit = repository_circuit();
        circuit.statement.language_count = 3;
        assert_eq!(circuit.check_witness().unwrap_err(), WitnessError::LanguageCountMismatch);
        assert!(!satisfied(circuit));
    }

    #[test]
    fn repository_hash_binds_witness() {
        let mut circuit = repository_circuit();
        circuit.witness.loc = 5_000;
        assert_eq!(
            circuit.check_witness().unwrap_err(),
            WitnessError::Primitive(PrimitiveError::Unsatisfied(PrimitiveKind::HashChain))
        );
        assert!(!satisfied(circuit));
    }

    fn language_circuit(language: &str) -> LanguageCircuit {
        let subject = Fr::from(0x1234u64);
        let witness = LanguageWitness { language: language_id(language), proficiency: 80, nonce: Fr::from(5u64) };
        LanguageCircuit {
            statement: LanguageStatement {
                subject,
                profile_commitment: witness.profile_commitment(subject),
                language_set: ["rust", "go", "c", "zig"].map(language_id),
                min_proficiency: 50,
                max_proficiency: 100,
                timestamp: 1_700_000_000,
            },
            witness,
        }
    }

    #[test]
    fn language_membership() {
        assert!(satisfied(language_circuit("go")));
        let outsider = language_circuit("python");
        assert_eq!(
            outsider.check_witness().unwrap_err(),
            WitnessError::Primitive(PrimitiveError::Unsatisfied(PrimitiveKind::SetMembership))
        );
        assert!(!satisfied(outsider));
    }

    fn collaboration_circuit(owner: &str, is_not_owner: bool) -> CollaborationCircuit {
        let subject = Fr::from(0x99u64);
        let witness = CollaborationWitness {
            subject_hash: subject_hash("alice"),
            owner_hash: subject_hash(owner),
            collaborators: 4,
            contribution_pct: 35,
            nonce: Fr::from(3u64),
        };
        CollaborationCircuit {
            statement: CollaborationStatement {
                subject,
                commitment: witness.commitment(subject),
                min_collaborators: 2,
                max_collaborators: 10,
                min_contribution_pct: 20,
                max_contribution_pct: 50,
                is_not_owner,
                timestamp: 1_700_000_000,
            },
            witness,
        }
    }

    #[test]
    fn collaboration_non_ownership_flag() {
        assert!(satisfied(collaboration_circuit("bob", true)));
        assert!(satisfied(collaboration_circuit("alice", false)));

        let self_owned = collaboration_circuit("alice", true);
        assert_eq!(self_owned.check_witness().unwrap_err(), WitnessError::OwnershipClaim);
        assert!(!satisfied(self_owned));
    }

    fn aggregate_circuit(anchor_owner: &str, flag: bool) -> AggregateCircuit {
        let subject_h = subject_hash("alice");
        let leaves = vec![
            repository_leaf(Fr::from(1u64), subject_h),
            repository_leaf(Fr::from(2u64), subject_hash(anchor_owner)),
            repository_leaf(Fr::from(3u64), subject_h),
        ];
        let tree = MerkleTree::new(&leaves).unwrap();
        let witness = AggregateWitness {
            subject_hash: subject_h,
            total_commits: 640,
            total_loc: 52_000,
            collaboration_score: 40,
            consistency_score: 30,
            diversity_score: 20,
            repository_count: 3,
            is_not_owner_of_all: flag,
            corpus_root: tree.root(),
            language_digest: Fr::from(42u64),
            anchor_name_hash: Fr::from(2u64),
            anchor_owner_hash: subject_hash(anchor_owner),
            anchor_path: tree.path(1).unwrap(),
        };
        AggregateCircuit {
            statement: AggregateStatement {
                subject: Fr::from(0x55u64),
                credential_hash: witness.credential_hash(),
                corpus_root: tree.root(),
                min_repositories: 3,
                min_commits: 500,
                max_commits: 1_000,
                min_loc: 10_000,
                max_loc: 100_000,
                is_not_owner_of_all: flag,
                timestamp: 1_700_000_000,
            },
            witness,
        }
    }

    #[test]
    fn aggregate_circuit_satisfied() {
        let circuit = aggregate_circuit("bob", true);
        assert!(circuit.check_witness().is_ok());
        assert!(satisfied(circuit));
    }

    #[test]
    fn aggregate_rejects_self_owned_anchor_when_claiming_non_ownership() {
        let circuit = aggregate_circuit("alice", true);
        assert_eq!(circuit.check_witness().unwrap_err(), WitnessError::OwnershipClaim);
        assert!(!satisfied(circuit));
    }

    #[test]
    fn aggregate_requires_minimum_repositories() {
        let mut circuit = aggregate_circuit("bob", true);
        circuit.statement.min_repositories = 4;
        assert!(circuit.check_witness().is_err());
        assert!(!satisfied(circuit));
    }

    fn blank_builds<C: ConstraintSynthesizer<Fr>>(circuit: C) -> usize {
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        cs.num_constraints()
    }

    #[test]
    fn blank_circuits_synthesize() {
        // Key generation runs on blank circuits.
        assert!(blank_builds(RepositoryCircuit::blank()) > 0);
        assert!(blank_builds(LanguageCircuit::blank()) > 0);
        assert!(blank_builds(CollaborationCircuit::blank()) > 0);
        assert!(blank_builds(AggregateCircuit::blank()) > 0);
    }
}
