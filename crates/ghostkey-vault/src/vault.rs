//! The credential vault.
//!
//! States: uninitialized (no stored record), locked, unlocked. All state
//! lives behind one `RwLock`: mutations take the write lock, reads the read
//! lock, so a reader never observes a half-written `StoredVault`.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::RngCore;
use zeroize::Zeroizing;

use ghostkey_core::{
    CryptoProvider, GhostkeyCertificate, KeyId, RecordId, SigningKeyBytes, StorageBackend,
    Timestamp,
};

use crate::credential;
use crate::envelope;
use crate::error::{VaultError, VaultResult};
use crate::session::Session;
use crate::stored::{
    is_verification_token, EncryptedKey, GhostkeyEntry, KeyMetadata, StoredVault,
    VERIFICATION_TOKEN,
};

/// Storage record holding the serialized [`StoredVault`].
pub const VAULT_RECORD_ID: &str = "ghostkey_vault";

pub struct CredentialVault {
    provider: Arc<dyn CryptoProvider>,
    backend: Arc<dyn StorageBackend>,
    record_id: RecordId,
    session: RwLock<Session>,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("record_id", &self.record_id)
            .finish_non_exhaustive()
    }
}

impl CredentialVault {
    pub fn new(provider: Arc<dyn CryptoProvider>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            provider,
            backend,
            record_id: RecordId::new(VAULT_RECORD_ID),
            session: RwLock::new(Session::new()),
        }
    }

    fn read(&self) -> VaultResult<RwLockReadGuard<'_, Session>> {
        self.session
            .read()
            .map_err(|e| VaultError::Internal(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> VaultResult<RwLockWriteGuard<'_, Session>> {
        self.session
            .write()
            .map_err(|e| VaultError::Internal(format!("lock poisoned: {}", e)))
    }

    fn load(&self) -> VaultResult<Option<StoredVault>> {
        match self.backend.get(&self.record_id)? {
            Some(bytes) => StoredVault::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn load_existing(&self) -> VaultResult<StoredVault> {
        self.load()?
            .ok_or_else(|| VaultError::Storage("vault has not been created".into()))
    }

    fn save(&self, vault: &StoredVault) -> VaultResult<()> {
        self.backend.put(&self.record_id, &vault.encode()?)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    pub fn vault_exists(&self) -> VaultResult<bool> {
        let _guard = self.read()?;
        Ok(self.backend.exists(&self.record_id)?)
    }

    pub fn is_unlocked(&self) -> bool {
        self.read().map(|s| s.is_unlocked()).unwrap_or(false)
    }

    /// Unlock with `password`, creating the vault on first use.
    ///
    /// Both paths run one key derivation and one decryption, so timing does
    /// not reveal whether a vault already exists. A wrong password yields
    /// `Ok(false)`, leaves the session locked and writes nothing.
    pub fn unlock(&self, password: &str) -> VaultResult<bool> {
        let mut session = self.write()?;

        match self.load()? {
            None => {
                let mut salt = [0u8; 16];
                rand::rngs::OsRng.fill_bytes(&mut salt);
                let key = self.derive(password, &salt)?;
                let (iv, ciphertext) =
                    envelope::seal(self.provider.as_ref(), &key, VERIFICATION_TOKEN)?;
                let check = envelope::open(self.provider.as_ref(), &key, &iv, &ciphertext)?;
                if !is_verification_token(&check) {
                    return Err(VaultError::Internal("verification token mismatch".into()));
                }
                self.save(&StoredVault::new(salt, iv, ciphertext))?;
                session.unlock(key);
                tracing::info!("created new ghost key vault");
                Ok(true)
            }
            Some(stored) => {
                let key = self.derive(password, &stored.salt)?;
                let verified = envelope::open(
                    self.provider.as_ref(),
                    &key,
                    &stored.verification_iv,
                    &stored.verification_ciphertext,
                )
                .map(|plaintext| is_verification_token(&plaintext))
                .unwrap_or(false);

                if verified {
                    session.unlock(key);
                    tracing::info!("vault unlocked");
                } else {
                    session.lock();
                    tracing::warn!("vault unlock failed");
                }
                Ok(verified)
            }
        }
    }

    fn derive(&self, password: &str, salt: &[u8; 16]) -> VaultResult<Zeroizing<[u8; 32]>> {
        self.provider
            .kdf(password.as_bytes(), salt)
            .map_err(|e| VaultError::KeyDerivation(e.to_string()))
    }

    pub fn lock(&self) -> VaultResult<()> {
        self.write()?.lock();
        tracing::info!("vault locked");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Import an armored certificate + signing key pair.
    pub fn import(&self, armored: &str, label: &str) -> VaultResult<KeyId> {
        let session = self.write()?;
        let key = session.key()?;
        let parsed = credential::parse_armored(armored)?;
        self.insert(key, &parsed.certificate, &parsed.signing_key, label)
    }

    /// Store a freshly issued credential.
    pub fn import_issued(
        &self,
        certificate: &GhostkeyCertificate,
        signing_key: &SigningKeyBytes,
        label: &str,
    ) -> VaultResult<KeyId> {
        if signing_key.verifying_key_bytes() != certificate.ghostkey_verifying_key {
            return Err(VaultError::MalformedCredential(
                "signing key does not match certificate".into(),
            ));
        }
        let session = self.write()?;
        let key = session.key()?;
        self.insert(key, certificate, signing_key, label)
    }

    fn insert(
        &self,
        key: &[u8; 32],
        certificate: &GhostkeyCertificate,
        signing_key: &SigningKeyBytes,
        label: &str,
    ) -> VaultResult<KeyId> {
        let mut vault = self.load_existing()?;
        let entry = GhostkeyEntry {
            id: KeyId::generate(),
            label: label.to_string(),
            created_at: Timestamp::now(),
            certificate: certificate
                .to_armored()
                .map_err(|e| VaultError::Serialization(e.to_string()))?,
            signing_key: signing_key.clone(),
        };
        let (iv, ciphertext) = envelope::seal_value(self.provider.as_ref(), key, &entry)?;

        let id = entry.id;
        vault.keys.insert(
            id,
            EncryptedKey {
                id,
                label: entry.label.clone(),
                created_at: entry.created_at,
                ciphertext,
                iv,
            },
        );
        if vault.active_key_id.is_none() {
            vault.active_key_id = Some(id);
        }
        self.save(&vault)?;

        tracing::info!(key_id = %id, label = %entry.label, "ghost key imported");
        Ok(id)
    }

    /// Remove a key. If it was active, the oldest remaining key becomes active.
    pub fn delete(&self, id: &KeyId) -> VaultResult<()> {
        let _session = self.write()?;
        let mut vault = self.load()?.ok_or(VaultError::KeyNotFound(*id))?;
        if vault.keys.remove(id).is_none() {
            return Err(VaultError::KeyNotFound(*id));
        }
        if vault.active_key_id == Some(*id) {
            vault.active_key_id = vault.promotion_candidate();
            if let Some(promoted) = vault.active_key_id {
                tracing::info!(key_id = %promoted, "promoted ghost key to active");
            }
        }
        self.save(&vault)?;
        tracing::info!(key_id = %id, "ghost key deleted");
        Ok(())
    }

    pub fn set_active(&self, id: &KeyId) -> VaultResult<()> {
        let _session = self.write()?;
        let mut vault = self.load()?.ok_or(VaultError::KeyNotFound(*id))?;
        if !vault.keys.contains_key(id) {
            return Err(VaultError::KeyNotFound(*id));
        }
        vault.active_key_id = Some(*id);
        self.save(&vault)?;
        tracing::info!(key_id = %id, "active ghost key changed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Metadata only. Never decrypts.
    pub fn list(&self) -> VaultResult<Vec<KeyMetadata>> {
        let _session = self.read()?;
        Ok(self.load()?.map(|v| v.metadata()).unwrap_or_default())
    }

    pub fn key_count(&self) -> VaultResult<usize> {
        let _session = self.read()?;
        Ok(self.load()?.map(|v| v.keys.len()).unwrap_or(0))
    }

    pub fn active_key_id(&self) -> VaultResult<Option<KeyId>> {
        let _session = self.read()?;
        Ok(self.load()?.and_then(|v| v.active_key_id))
    }

    pub fn get_decrypted(&self, id: &KeyId) -> VaultResult<GhostkeyEntry> {
        let session = self.read()?;
        let key = session.key()?;
        let vault = self.load_existing()?;
        let record = vault.keys.get(id).ok_or(VaultError::KeyNotFound(*id))?;
        self.decrypt(key, record)
    }

    pub fn get_active(&self) -> VaultResult<GhostkeyEntry> {
        let session = self.read()?;
        let key = session.key()?;
        let vault = self.load_existing()?;
        let id = vault.active_key_id.ok_or(VaultError::NoActiveCredential)?;
        let record = vault.keys.get(&id).ok_or(VaultError::NoActiveCredential)?;
        self.decrypt(key, record)
    }

    /// Armored certificate + signing key text for one entry.
    pub fn export(&self, id: &KeyId) -> VaultResult<String> {
        let entry = self.get_decrypted(id)?;
        Ok(credential::join_blocks(
            &entry.certificate,
            &entry.signing_key.to_armored(),
        ))
    }

    fn decrypt(&self, key: &[u8; 32], record: &EncryptedKey) -> VaultResult<GhostkeyEntry> {
        let entry: GhostkeyEntry =
            envelope::open_value(self.provider.as_ref(), key, &record.iv, &record.ciphertext)?;
        if entry.id != record.id {
            return Err(VaultError::Decryption("record id mismatch".into()));
        }
        Ok(entry)
    }
}
