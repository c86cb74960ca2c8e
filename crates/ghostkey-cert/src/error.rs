use ghostkey_core::GhostkeyError;
use thiserror::Error;

/// Errors from the blind signature engine and issuance client.
///
/// Display strings never include key material, blinding secrets or raw
/// signature bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertError {
    #[error("invalid delegate certificate: {0}")]
    InvalidDelegateCertificate(String),

    #[error("unblinding failed: {0}")]
    UnblindingFailed(String),

    #[error("blinding failed")]
    Blinding,

    #[error("signing failed")]
    Signing,

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("signer rejected request ({status}): {message}")]
    SignerRejected { status: u16, message: String },

    #[error("a certificate has already been signed for this payment")]
    CertificateAlreadySigned,

    #[error("malformed signer response: {0}")]
    MalformedResponse(String),

    #[error("assembled certificate failed verification")]
    VerificationFailed,
}

impl CertError {
    /// Transport failures and server-side errors may succeed on retry.
    /// `CertificateAlreadySigned` is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            CertError::Transport(_) => true,
            CertError::SignerRejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<GhostkeyError> for CertError {
    fn from(err: GhostkeyError) -> Self {
        match err {
            GhostkeyError::InvalidDelegateCertificate(m) => CertError::InvalidDelegateCertificate(m),
            GhostkeyError::Encoding(m) | GhostkeyError::Serialization(m) => CertError::Encoding(m),
            // Crypto detail is not surfaced
            GhostkeyError::Crypto(_) => CertError::Signing,
            GhostkeyError::Storage(m) | GhostkeyError::Internal(m) => CertError::Encoding(m),
        }
    }
}

pub type CertResult<T> = Result<T, CertError>;
