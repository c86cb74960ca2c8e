use ghostkey_core::{GhostkeyError, KeyId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault is locked: unlock it with your password first")]
    Locked,

    #[error("no active ghost key: import a ghost key certificate first")]
    NoActiveCredential,

    #[error("ghost key not found: {0}")]
    KeyNotFound(KeyId),

    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unsupported vault version {0}")]
    UnsupportedVersion(u16),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<GhostkeyError> for VaultError {
    fn from(e: GhostkeyError) -> Self {
        match e {
            GhostkeyError::Storage(m) => VaultError::Storage(m),
            GhostkeyError::Serialization(m) => VaultError::Serialization(m),
            GhostkeyError::Encoding(m) | GhostkeyError::InvalidDelegateCertificate(m) => {
                VaultError::MalformedCredential(m)
            }
            GhostkeyError::Crypto(m) | GhostkeyError::Internal(m) => VaultError::Internal(m),
        }
    }
}

impl From<VaultError> for GhostkeyError {
    fn from(e: VaultError) -> Self {
        GhostkeyError::Storage(e.to_string())
    }
}

pub type VaultResult<T> = Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_errors_are_actionable() {
        assert!(VaultError::Locked.to_string().contains("unlock"));
        assert!(VaultError::NoActiveCredential.to_string().contains("import"));
    }

    #[test]
    fn test_key_not_found_names_id() {
        let id = KeyId::generate();
        assert!(VaultError::KeyNotFound(id).to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_storage_error_maps() {
        let e: VaultError = GhostkeyError::Storage("disk".into()).into();
        assert!(matches!(e, VaultError::Storage(_)));
    }
}
