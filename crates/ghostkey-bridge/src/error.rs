use ghostkey_cert::CertError;
use ghostkey_vault::VaultError;
use thiserror::Error;

/// Errors surfaced to the requester.
///
/// Messages name the state the user must fix and never contain key
/// material or vault internals.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("vault is locked: unlock it to continue")]
    VaultLocked,

    #[error("no active ghost key: import one to continue")]
    NoActiveCredential,

    #[error("ghost key not found")]
    KeyNotFound,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("duplicate request id")]
    DuplicateRequest,

    #[error("signing failed")]
    Signing,

    #[error("request timed out")]
    Timeout,

    #[error("bridge closed")]
    ChannelClosed,

    #[error("internal error")]
    Internal(String),
}

impl BridgeError {
    /// Stable machine-readable code for the wire.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::VaultLocked => "VAULT_LOCKED",
            BridgeError::NoActiveCredential => "NO_ACTIVE_CREDENTIAL",
            BridgeError::KeyNotFound => "KEY_NOT_FOUND",
            BridgeError::InvalidRequest(_) => "INVALID_REQUEST",
            BridgeError::DuplicateRequest => "DUPLICATE_REQUEST",
            BridgeError::Signing => "SIGNING_FAILED",
            BridgeError::Timeout => "TIMEOUT",
            BridgeError::ChannelClosed => "BRIDGE_CLOSED",
            BridgeError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<VaultError> for BridgeError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::Locked => BridgeError::VaultLocked,
            VaultError::NoActiveCredential => BridgeError::NoActiveCredential,
            VaultError::KeyNotFound(_) => BridgeError::KeyNotFound,
            other => {
                tracing::error!(error = %other, "vault failure while handling bridge request");
                BridgeError::Internal("vault failure".into())
            }
        }
    }
}

impl From<CertError> for BridgeError {
    fn from(e: CertError) -> Self {
        tracing::error!(error = %e, "signing failure while handling bridge request");
        BridgeError::Signing
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_errors_map_distinctly() {
        assert_eq!(BridgeError::from(VaultError::Locked), BridgeError::VaultLocked);
        assert_eq!(
            BridgeError::from(VaultError::NoActiveCredential),
            BridgeError::NoActiveCredential
        );
        assert_eq!(BridgeError::VaultLocked.code(), "VAULT_LOCKED");
        assert_eq!(BridgeError::NoActiveCredential.code(), "NO_ACTIVE_CREDENTIAL");
    }

    #[test]
    fn test_internal_detail_not_in_message() {
        let e = BridgeError::from(VaultError::Decryption("aead tag mismatch".into()));
        assert!(!e.to_string().contains("aead"));
    }

    #[test]
    fn test_messages_are_actionable() {
        assert!(BridgeError::VaultLocked.to_string().contains("unlock"));
        assert!(BridgeError::NoActiveCredential.to_string().contains("import"));
    }
}
