use thiserror::Error;

#[derive(Debug, Error)]
pub enum GhostkeyError {
    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("invalid delegate certificate: {0}")]
    InvalidDelegateCertificate(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type GhostkeyResult<T> = Result<T, GhostkeyError>;

impl From<serde_json::Error> for GhostkeyError {
    fn from(e: serde_json::Error) -> Self {
        GhostkeyError::Serialization(e.to_string())
    }
}
