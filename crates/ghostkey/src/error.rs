use thiserror::Error;

/// Error type for the ghostkey binary, aggregating errors from every
/// workspace crate.
#[derive(Debug, Error)]
pub enum RootError {
    #[error("{0}")]
    Core(#[from] ghostkey_core::GhostkeyError),

    #[error("certificate error: {0}")]
    Cert(#[from] ghostkey_cert::CertError),

    #[error("vault error: {0}")]
    Vault(#[from] ghostkey_vault::VaultError),

    #[error("bridge error: {0}")]
    Bridge(#[from] ghostkey_bridge::BridgeError),

    #[error("incorrect vault password")]
    WrongPassword,

    #[error("vault password required: pass --password or set GHOSTKEY_PASSWORD")]
    PasswordRequired,

    #[error("signed message failed verification")]
    VerificationFailed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RootError {
    fn from(e: serde_json::Error) -> Self {
        RootError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RootError {
    fn from(e: toml::de::Error) -> Self {
        RootError::Config(format!("TOML parse error: {}", e))
    }
}

pub type RootResult<T> = Result<T, RootError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_error_config() {
        let err = RootError::Config("missing vault_path".into());
        assert_eq!(err.to_string(), "configuration error: missing vault_path");
    }

    #[test]
    fn test_root_error_from_vault() {
        let root_err: RootError = ghostkey_vault::VaultError::Locked.into();
        assert!(root_err.to_string().contains("unlock"));
    }

    #[test]
    fn test_root_error_from_cert() {
        let root_err: RootError = ghostkey_cert::CertError::CertificateAlreadySigned.into();
        assert!(matches!(root_err, RootError::Cert(_)));
    }

    #[test]
    fn test_root_error_from_bridge() {
        let root_err: RootError = ghostkey_bridge::BridgeError::Timeout.into();
        assert!(root_err.to_string().starts_with("bridge error"));
    }

    #[test]
    fn test_root_error_from_toml() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let root_err: RootError = toml_err.into();
        assert!(root_err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_root_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let root_err: RootError = json_err.into();
        assert!(matches!(root_err, RootError::Serialization(_)));
    }

    #[test]
    fn test_password_hint() {
        assert!(RootError::PasswordRequired.to_string().contains("GHOSTKEY_PASSWORD"));
    }
}
