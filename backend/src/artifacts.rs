//! Content-addressed credential artifact store.
//!
//! Artifacts are written as `<root>/<sha256>.json`; the registry only keeps the
//! `sha256:<hex>` pointer.

use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::errors::ApiError;
use crate::models::CredentialArtifact;

const POINTER_PREFIX: &str = "sha256:";

#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn digest_of(pointer: &str) -> Result<&str, ApiError> {
        let digest = pointer
            .strip_prefix(POINTER_PREFIX)
            .ok_or_else(|| ApiError::BadRequest("storage pointer must start with sha256:".to_string()))?;
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ApiError::BadRequest("invalid storage pointer digest".to_string()));
        }
        Ok(digest)
    }

    pub async fn put(&self, artifact: &CredentialArtifact) -> Result<String, ApiError> {
        let bytes = serde_json::to_vec(artifact).map_err(|_| ApiError::Internal)?;
        let digest = hex::encode(Sha256::digest(&bytes));

        tokio::fs::create_dir_all(&self.root).await.map_err(|_| ApiError::Internal)?;
        tokio::fs::write(self.root.join(format!("{digest}.json")), &bytes)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to write credential artifact");
                ApiError::Internal
            })?;

        tracing::debug!(%digest, credential_type = %artifact.credential_type, "stored credential artifact");
        Ok(format!("{POINTER_PREFIX}{digest}"))
    }

    /// Fetch an artifact by pointer. The stored bytes must still hash to the pointer.
    pub async fn get(&self, pointer: &str) -> Result<Option<CredentialArtifact>, ApiError> {
        let digest = Self::digest_of(pointer)?.to_ascii_lowercase();
        let path = self.root.join(format!("{digest}.json"));

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(_) => return Err(ApiError::Internal),
        };

        if hex::encode(Sha256::digest(&bytes)) != digest {
            tracing::error!(%digest, "artifact content does not match its pointer");
            return Err(ApiError::Internal);
        }
        let artifact = serde_json::from_slice(&bytes).map_err(|_| ApiError::Internal)?;
        Ok(Some(artifact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zk_proofs::types::{CredentialType, FrHex};

    fn artifact() -> CredentialArtifact {
        CredentialArtifact {
            credential_type: CredentialType::Language,
            proof_b64: "AAAA".to_string(),
            public_inputs: vec![FrHex("0x01".to_string())],
            metadata: serde_json::json!({ "issued_at": 1 }),
        }
    }

    #[tokio::test]
    async fn put_then_get_by_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("artifacts"));

        let pointer = store.put(&artifact()).await.unwrap();
        assert!(pointer.starts_with("sha256:"));
        assert_eq!(store.put(&artifact()).await.unwrap(), pointer);
        assert_eq!(store.get(&pointer).await.unwrap(), Some(artifact()));

        let missing = format!("sha256:{}", "0".repeat(64));
        assert_eq!(store.get(&missing).await.unwrap(), None);
    }

    #[tokio::test]
    async fn pointers_cannot_escape_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        assert!(matches!(store.get("sha256:../../etc/passwd").await, Err(ApiError::BadRequest(_))));
        assert!(matches!(store.get("ipfs://abc").await, Err(ApiError::BadRequest(_))));
    }
}
