//! Persisted vault layout.
//!
//! The whole vault is one JSON record. Only ids, labels and timestamps are in
//! the clear; certificates and signing keys live inside AEAD ciphertexts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use ghostkey_core::types::serde_b64;
use ghostkey_core::{GhostkeyCertificate, KeyId, SigningKeyBytes, Timestamp};

use crate::error::{VaultError, VaultResult};

pub const VAULT_VERSION: u16 = 1;

/// Plaintext sealed at vault creation; decrypting it proves the password.
pub const VERIFICATION_TOKEN: &[u8] = b"GHOSTKEY_VAULT_V1";

pub fn is_verification_token(plaintext: &[u8]) -> bool {
    plaintext.ct_eq(VERIFICATION_TOKEN).into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredVault {
    pub version: u16,
    #[serde(with = "serde_b64::array")]
    pub salt: [u8; 16],
    #[serde(with = "serde_b64::vec")]
    pub verification_ciphertext: Vec<u8>,
    #[serde(with = "serde_b64::array")]
    pub verification_iv: [u8; 12],
    #[serde(default)]
    pub keys: BTreeMap<KeyId, EncryptedKey>,
    #[serde(default)]
    pub active_key_id: Option<KeyId>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u16,
}

impl StoredVault {
    pub fn new(salt: [u8; 16], verification_iv: [u8; 12], verification_ciphertext: Vec<u8>) -> Self {
        Self {
            version: VAULT_VERSION,
            salt,
            verification_ciphertext,
            verification_iv,
            keys: BTreeMap::new(),
            active_key_id: None,
        }
    }

    pub fn encode(&self) -> VaultResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| VaultError::Serialization(e.to_string()))
    }

    /// Decode, refusing layouts written by other format versions.
    pub fn decode(bytes: &[u8]) -> VaultResult<Self> {
        let header: VersionHeader =
            serde_json::from_slice(bytes).map_err(|e| VaultError::Serialization(e.to_string()))?;
        if header.version != VAULT_VERSION {
            return Err(VaultError::UnsupportedVersion(header.version));
        }
        let vault: Self =
            serde_json::from_slice(bytes).map_err(|e| VaultError::Serialization(e.to_string()))?;
        if let Some(active) = vault.active_key_id {
            if !vault.keys.contains_key(&active) {
                return Err(VaultError::Serialization(
                    "active key id does not reference a stored key".into(),
                ));
            }
        }
        Ok(vault)
    }

    /// Key to promote after `removed` is deleted: the earliest created
    /// remaining key, ties broken by id.
    pub fn promotion_candidate(&self) -> Option<KeyId> {
        self.keys
            .values()
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|k| k.id)
    }

    pub fn metadata(&self) -> Vec<KeyMetadata> {
        let mut out: Vec<KeyMetadata> = self
            .keys
            .values()
            .map(|k| KeyMetadata {
                id: k.id,
                label: k.label.clone(),
                created_at: k.created_at,
                is_active: self.active_key_id == Some(k.id),
            })
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }
}

/// Ciphertext record for one ghost key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedKey {
    pub id: KeyId,
    pub label: String,
    pub created_at: Timestamp,
    #[serde(with = "serde_b64::vec")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "serde_b64::array")]
    pub iv: [u8; 12],
}

/// Decrypted vault record. Drop it as soon as the operation using it is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GhostkeyEntry {
    pub id: KeyId,
    pub label: String,
    pub created_at: Timestamp,
    /// Armored `GHOSTKEY_CERTIFICATE_V1` block.
    pub certificate: String,
    pub signing_key: SigningKeyBytes,
}

impl GhostkeyEntry {
    pub fn parsed_certificate(&self) -> VaultResult<GhostkeyCertificate> {
        GhostkeyCertificate::from_armored(&self.certificate)
            .map_err(|e| VaultError::MalformedCredential(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub id: KeyId,
    pub label: String,
    pub created_at: Timestamp,
    pub is_active: bool,
}
