//! Credential verifier and registry.
//!
//! The registry is a state machine driven by [`LedgerEvent`]s. Every successful mutation appends
//! its events to a pending journal which the caller drains and persists in order; replaying the
//! persisted events rebuilds the exact same state without re-verifying any proof.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use ark_bn254::Fr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zk_proofs::constants::IDENTITY_DOMAIN;
use zk_proofs::hash::fr_to_be_bytes;
use zk_proofs::statement::subject_index;
use zk_proofs::types::{Address, CredentialType, FrHex};

use crate::verifier::{ProofVerifier, VerificationFailure};

/// A 32-byte digest rendered as `0x`-prefixed hex.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bytes32(pub [u8; 32]);

/// `identityHash`: the registry key of a credential.
pub type CredentialId = Bytes32;

impl fmt::Debug for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes32({self})")
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Bytes32 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| format!("invalid hex: {e}"))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| "expected exactly 32 bytes".to_string())?;
        Ok(Bytes32(arr))
    }
}

impl Serialize for Bytes32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Bytes32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Valid,
    Expired,
    Revoked,
}

/// Caller identity and block time of one ledger transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxContext {
    pub sender: Address,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub subject: Address,
    pub credential_type: CredentialType,
    pub issued_at: u64,
    pub expires_at: u64,
    pub revoked: bool,
    pub storage_pointer: String,
    pub score: u64,
    /// Public inputs the credential was verified against; empty for registered credentials.
    #[serde(default)]
    pub public_inputs: Vec<FrHex>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    VerifierAuthorizationChanged { verifier: Address, authorized: bool },
    Paused { by: Address, at: u64 },
    Unpaused { by: Address, at: u64 },
    CredentialRecorded { identity_hash: CredentialId, record: CredentialRecord },
    CredentialRevoked { identity_hash: CredentialId, at: u64 },
    StorageUpdated { identity_hash: CredentialId, storage_pointer: String },
    ProofConsumed { digest: Bytes32 },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("registry is paused")]
    Paused,

    #[error("registry is not paused")]
    NotPaused,

    #[error("caller is not an authorized verifier")]
    Unauthorized,

    #[error("caller is not the registry owner")]
    NotOwner,

    #[error("credential expiry is not in the future")]
    ExpiredCredential,

    #[error("credential already exists")]
    DuplicateCredential,

    #[error("proof has already been used")]
    ProofReplayed,

    #[error("proof subject does not match the caller")]
    SubjectMismatch,

    #[error("proof rejected: {0}")]
    ProofRejected(VerificationFailure),

    #[error("credential not found")]
    NotFound,

    #[error("credential already revoked")]
    AlreadyRevoked,

    #[error("storage pointer must not be empty")]
    EmptyStoragePointer,
}

/// `identityHash = sha256(domain || subject || type || inputs (32-byte BE each) || issuedAt BE)`.
pub fn identity_hash(subject: &Address, ty: CredentialType, inputs: &[Fr], issued_at: u64) -> CredentialId {
    let mut hasher = Sha256::new();
    hasher.update(IDENTITY_DOMAIN);
    hasher.update(subject.0);
    hasher.update([ty.as_u8()]);
    for input in inputs {
        hasher.update(fr_to_be_bytes(input));
    }
    hasher.update(issued_at.to_be_bytes());
    Bytes32(hasher.finalize().into())
}

/// Digest of an exact `(type, proof, inputs)` submission, used to refuse re-use of a proof.
pub fn proof_digest(ty: CredentialType, proof_bytes: &[u8], inputs: &[Fr]) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update([ty.as_u8()]);
    hasher.update((proof_bytes.len() as u64).to_be_bytes());
    hasher.update(proof_bytes);
    for input in inputs {
        hasher.update(fr_to_be_bytes(input));
    }
    Bytes32(hasher.finalize().into())
}

#[derive(Clone)]
pub struct CredentialLedger<V> {
    owner: Address,
    verifier: V,
    paused: bool,
    verifiers: HashSet<Address>,
    credentials: HashMap<CredentialId, CredentialRecord>,
    counts: HashMap<Address, u64>,
    consumed: HashSet<Bytes32>,
    pending: Vec<LedgerEvent>,
}

impl<V: ProofVerifier> CredentialLedger<V> {
    /// Genesis state: unpaused, with the owner as the only authorized verifier.
    pub fn new(owner: Address, verifier: V) -> Self {
        let mut verifiers = HashSet::new();
        verifiers.insert(owner);
        Self {
            owner,
            verifier,
            paused: false,
            verifiers,
            credentials: HashMap::new(),
            counts: HashMap::new(),
            consumed: HashSet::new(),
            pending: Vec::new(),
        }
    }

    /// Rebuild a ledger from its persisted event log.
    pub fn replay<I>(owner: Address, verifier: V, events: I) -> Self
    where
        I: IntoIterator<Item = LedgerEvent>,
    {
        let mut ledger = Self::new(owner, verifier);
        let mut applied = 0usize;
        for event in events {
            ledger.apply(event);
            applied += 1;
        }
        tracing::info!(events = applied, credentials = ledger.credentials.len(), "ledger replayed");
        ledger
    }

    fn apply(&mut self, event: LedgerEvent) {
        match event {
            LedgerEvent::VerifierAuthorizationChanged { verifier, authorized } => {
                if authorized {
                    self.verifiers.insert(verifier);
                } else {
                    self.verifiers.remove(&verifier);
                }
            }
            LedgerEvent::Paused { .. } => self.paused = true,
            LedgerEvent::Unpaused { .. } => self.paused = false,
            LedgerEvent::CredentialRecorded { identity_hash, record } => {
                *self.counts.entry(record.subject).or_insert(0) += 1;
                self.credentials.insert(identity_hash, record);
            }
            LedgerEvent::CredentialRevoked { identity_hash, .. } => {
                if let Some(record) = self.credentials.get_mut(&identity_hash) {
                    record.revoked = true;
                }
            }
            LedgerEvent::StorageUpdated { identity_hash, storage_pointer } => {
                if let Some(record) = self.credentials.get_mut(&identity_hash) {
                    record.storage_pointer = storage_pointer;
                }
            }
            LedgerEvent::ProofConsumed { digest } => {
                self.consumed.insert(digest);
            }
        }
    }

    fn commit(&mut self, event: LedgerEvent) {
        self.apply(event.clone());
        self.pending.push(event);
    }

    /// Events produced since the last drain, in application order.
    pub fn drain_pending(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.pending)
    }

    fn ensure_running(&self) -> Result<(), LedgerError> {
        if self.paused {
            return Err(LedgerError::Paused);
        }
        Ok(())
    }

    fn ensure_owner(&self, ctx: &TxContext) -> Result<(), LedgerError> {
        if ctx.sender != self.owner {
            return Err(LedgerError::NotOwner);
        }
        Ok(())
    }

    fn ensure_verifier(&self, ctx: &TxContext) -> Result<(), LedgerError> {
        if !self.verifiers.contains(&ctx.sender) {
            return Err(LedgerError::Unauthorized);
        }
        Ok(())
    }

    /// Structural and pairing verification with the named failure.
    pub fn check_proof(&self, ty: CredentialType, proof_bytes: &[u8], inputs: &[Fr]) -> Result<(), VerificationFailure> {
        self.verifier.verify_proof(ty, proof_bytes, inputs)
    }

    /// `verifyProof`: never errors, only answers.
    pub fn verify_proof(&self, ty: CredentialType, proof_bytes: &[u8], inputs: &[Fr]) -> bool {
        match self.check_proof(ty, proof_bytes, inputs) {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!(credential_type = %ty, %reason, "proof did not verify");
                false
            }
        }
    }

    /// Verify a proof and record the resulting credential for the caller.
    pub fn verify_single_credential(
        &mut self,
        ctx: &TxContext,
        ty: CredentialType,
        proof_bytes: &[u8],
        inputs: &[Fr],
        expires_at: u64,
    ) -> Result<CredentialId, LedgerError> {
        self.ensure_running()?;
        if expires_at <= ctx.timestamp {
            return Err(LedgerError::ExpiredCredential);
        }
        self.check_proof(ty, proof_bytes, inputs).map_err(|reason| {
            tracing::warn!(credential_type = %ty, %reason, "credential proof rejected");
            LedgerError::ProofRejected(reason)
        })?;
        if inputs[subject_index(ty)] != ctx.sender.to_fr() {
            return Err(LedgerError::SubjectMismatch);
        }

        let digest = proof_digest(ty, proof_bytes, inputs);
        if self.consumed.contains(&digest) {
            return Err(LedgerError::ProofReplayed);
        }
        let id = identity_hash(&ctx.sender, ty, inputs, ctx.timestamp);
        if self.credentials.contains_key(&id) {
            return Err(LedgerError::DuplicateCredential);
        }

        self.commit(LedgerEvent::ProofConsumed { digest });
        self.commit(LedgerEvent::CredentialRecorded {
            identity_hash: id,
            record: CredentialRecord {
                subject: ctx.sender,
                credential_type: ty,
                issued_at: ctx.timestamp,
                expires_at,
                revoked: false,
                storage_pointer: String::new(),
                score: 0,
                public_inputs: inputs.iter().map(FrHex::from_fr).collect(),
            },
        });
        tracing::info!(identity_hash = %id, subject = %ctx.sender, credential_type = %ty, "credential verified");
        Ok(id)
    }

    /// Record a credential verified elsewhere. Fails if `identity_hash` already exists.
    #[allow(clippy::too_many_arguments)]
    pub fn register_credential(
        &mut self,
        ctx: &TxContext,
        identity_hash: CredentialId,
        subject: Address,
        ty: CredentialType,
        expires_at: u64,
        storage_pointer: String,
        score: u64,
    ) -> Result<(), LedgerError> {
        self.ensure_running()?;
        self.ensure_verifier(ctx)?;
        if self.credentials.contains_key(&identity_hash) {
            return Err(LedgerError::DuplicateCredential);
        }
        if expires_at <= ctx.timestamp {
            return Err(LedgerError::ExpiredCredential);
        }
        if storage_pointer.is_empty() {
            return Err(LedgerError::EmptyStoragePointer);
        }

        self.commit(LedgerEvent::CredentialRecorded {
            identity_hash,
            record: CredentialRecord {
                subject,
                credential_type: ty,
                issued_at: ctx.timestamp,
                expires_at,
                revoked: false,
                storage_pointer,
                score,
                public_inputs: Vec::new(),
            },
        });
        tracing::info!(%identity_hash, %subject, credential_type = %ty, verifier = %ctx.sender, "credential registered");
        Ok(())
    }

    /// Revocation is terminal.
    pub fn revoke_credential(&mut self, ctx: &TxContext, identity_hash: CredentialId) -> Result<(), LedgerError> {
        self.ensure_running()?;
        self.ensure_verifier(ctx)?;
        let record = self.credentials.get(&identity_hash).ok_or(LedgerError::NotFound)?;
        if record.revoked {
            return Err(LedgerError::AlreadyRevoked);
        }

        self.commit(LedgerEvent::CredentialRevoked { identity_hash, at: ctx.timestamp });
        tracing::info!(%identity_hash, verifier = %ctx.sender, "credential revoked");
        Ok(())
    }

    pub fn update_credential_storage(
        &mut self,
        ctx: &TxContext,
        identity_hash: CredentialId,
        storage_pointer: String,
    ) -> Result<(), LedgerError> {
        self.ensure_running()?;
        self.ensure_verifier(ctx)?;
        if storage_pointer.is_empty() {
            return Err(LedgerError::EmptyStoragePointer);
        }
        let record = self.credentials.get(&identity_hash).ok_or(LedgerError::NotFound)?;
        if record.revoked {
            return Err(LedgerError::AlreadyRevoked);
        }

        self.commit(LedgerEvent::StorageUpdated { identity_hash, storage_pointer });
        Ok(())
    }

    pub fn is_credential_valid(&self, identity_hash: &CredentialId, now: u64) -> bool {
        self.get_credential_status(identity_hash, now) == Some(CredentialStatus::Valid)
    }

    pub fn get_credential_status(&self, identity_hash: &CredentialId, now: u64) -> Option<CredentialStatus> {
        let record = self.credentials.get(identity_hash)?;
        Some(if record.revoked {
            CredentialStatus::Revoked
        } else if now > record.expires_at {
            CredentialStatus::Expired
        } else {
            CredentialStatus::Valid
        })
    }

    pub fn get_credential_details(&self, identity_hash: &CredentialId) -> Option<&CredentialRecord> {
        self.credentials.get(identity_hash)
    }

    pub fn pause(&mut self, ctx: &TxContext) -> Result<(), LedgerError> {
        self.ensure_owner(ctx)?;
        self.ensure_running()?;
        self.commit(LedgerEvent::Paused { by: ctx.sender, at: ctx.timestamp });
        tracing::warn!(by = %ctx.sender, "registry paused");
        Ok(())
    }

    pub fn unpause(&mut self, ctx: &TxContext) -> Result<(), LedgerError> {
        self.ensure_owner(ctx)?;
        if !self.paused {
            return Err(LedgerError::NotPaused);
        }
        self.commit(LedgerEvent::Unpaused { by: ctx.sender, at: ctx.timestamp });
        tracing::info!(by = %ctx.sender, "registry unpaused");
        Ok(())
    }

    pub fn set_verifier_authorization(
        &mut self,
        ctx: &TxContext,
        verifier: Address,
        authorized: bool,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(ctx)?;
        self.ensure_running()?;
        self.commit(LedgerEvent::VerifierAuthorizationChanged { verifier, authorized });
        tracing::info!(%verifier, authorized, "verifier authorization changed");
        Ok(())
    }

    pub fn credential_count(&self, subject: &Address) -> u64 {
        self.counts.get(subject).copied().unwrap_or(0)
    }

    pub fn is_authorized_verifier(&self, address: &Address) -> bool {
        self.verifiers.contains(address)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn owner(&self) -> Address {
        self.owner
    }
}
