//! Groth16 key material per credential type, cached on disk.

use std::collections::HashMap;
use std::path::Path;

use ark_bn254::Bn254;
use ark_groth16::{ProvingKey, VerifyingKey};
use rand::{CryptoRng, RngCore};
use zk_proofs::groth16::{deserialize_pk, deserialize_vk, serialize_pk, serialize_vk, setup_keys, CredentialKeys, ZkError};
use zk_proofs::types::CredentialType;

use crate::errors::ApiError;

#[derive(Clone, Default)]
pub struct KeyStore {
    keys: HashMap<CredentialType, CredentialKeys>,
}

impl KeyStore {
    /// A store with no keys; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keys: CredentialKeys) {
        self.keys.insert(keys.credential_type, keys);
    }

    pub fn proving_key(&self, ty: CredentialType) -> Option<&ProvingKey<Bn254>> {
        self.keys.get(&ty).map(|k| &k.pk)
    }

    pub fn verifying_key(&self, ty: CredentialType) -> Option<&VerifyingKey<Bn254>> {
        self.keys.get(&ty).map(|k| &k.vk)
    }

    /// Run the trusted setup for every credential type in memory.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, ZkError> {
        let mut store = Self::empty();
        for ty in CredentialType::ALL {
            store.insert(setup_keys(ty, rng)?);
        }
        Ok(store)
    }

    /// Load keys from `keys_dir`, running the setup for (and persisting) any missing type.
    ///
    /// Blocking: call from `spawn_blocking`.
    pub fn load_or_generate<R: RngCore + CryptoRng>(keys_dir: &Path, rng: &mut R) -> Result<Self, ApiError> {
        std::fs::create_dir_all(keys_dir).map_err(|_| ApiError::Internal)?;

        let mut store = Self::empty();
        for ty in CredentialType::ALL {
            let pk_path = keys_dir.join(format!("{ty}_pk.bin"));
            let vk_path = keys_dir.join(format!("{ty}_vk.bin"));

            if pk_path.exists() && vk_path.exists() {
                let pk_bytes = std::fs::read(&pk_path).map_err(|_| ApiError::Internal)?;
                let vk_bytes = std::fs::read(&vk_path).map_err(|_| ApiError::Internal)?;

                let pk = deserialize_pk(&pk_bytes).map_err(|_| ApiError::Internal)?;
                let vk = deserialize_vk(&vk_bytes).map_err(|_| ApiError::Internal)?;

                tracing::debug!(credential_type = %ty, "loaded groth16 keys");
                store.insert(CredentialKeys { credential_type: ty, pk, vk });
                continue;
            }

            // Trusted setup randomness (development only).
            //
            // IMPORTANT: In production, load keys from an MPC ceremony instead.
            tracing::info!(credential_type = %ty, "running groth16 setup");
            let keys = setup_keys(ty, rng).map_err(|e| {
                tracing::error!(credential_type = %ty, error = %e, "groth16 setup failed");
                ApiError::Internal
            })?;

            let pk_bytes = serialize_pk(&keys.pk).map_err(|_| ApiError::Internal)?;
            let vk_bytes = serialize_vk(&keys.vk).map_err(|_| ApiError::Internal)?;

            std::fs::write(&pk_path, pk_bytes).map_err(|_| ApiError::Internal)?;
            std::fs::write(&vk_path, vk_bytes).map_err(|_| ApiError::Internal)?;

            store.insert(keys);
        }
        Ok(store)
    }
}
