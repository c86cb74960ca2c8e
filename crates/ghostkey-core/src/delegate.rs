//! Delegate document: the JSON layout the standard provider reads out of an
//! otherwise opaque [`DelegateCertificate`].

use serde::{Deserialize, Serialize};

use crate::error::{GhostkeyError, GhostkeyResult};
use crate::types::{serde_b64, DelegateCertificate};

pub const DELEGATE_VERSION: u16 = 1;

const DELEGATE_DOMAIN: &[u8] = b"ghostkey-delegate";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateDocument {
    pub version: u16,
    /// Tier attestation, e.g. the donation amount this delegate signs for.
    pub info: String,
    /// DER-encoded RSA public key of the delegate authority.
    #[serde(with = "serde_b64::vec")]
    pub authority_key: Vec<u8>,
    /// Master key signature over [`DelegateDocument::signing_payload`].
    #[serde(with = "serde_b64::vec")]
    pub master_signature: Vec<u8>,
}

impl DelegateDocument {
    pub fn new(info: impl Into<String>, authority_key: Vec<u8>) -> Self {
        Self {
            version: DELEGATE_VERSION,
            info: info.into(),
            authority_key,
            master_signature: Vec::new(),
        }
    }

    pub fn with_master_signature(mut self, signature: Vec<u8>) -> Self {
        self.master_signature = signature;
        self
    }

    /// Bytes the master key signs: everything except the signature itself.
    pub fn signing_payload(&self) -> Vec<u8> {
        let info = self.info.as_bytes();
        let mut out = Vec::with_capacity(
            DELEGATE_DOMAIN.len() + 2 + 4 + info.len() + 4 + self.authority_key.len(),
        );
        out.extend_from_slice(DELEGATE_DOMAIN);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&(info.len() as u32).to_be_bytes());
        out.extend_from_slice(info);
        out.extend_from_slice(&(self.authority_key.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.authority_key);
        out
    }

    pub fn encode(&self) -> GhostkeyResult<DelegateCertificate> {
        let bytes = serde_json::to_vec(self)?;
        Ok(DelegateCertificate::from_bytes(bytes))
    }

    pub fn decode(delegate: &DelegateCertificate) -> GhostkeyResult<Self> {
        let doc: Self = serde_json::from_slice(delegate.as_bytes())
            .map_err(|e| GhostkeyError::InvalidDelegateCertificate(e.to_string()))?;
        if doc.version != DELEGATE_VERSION {
            return Err(GhostkeyError::InvalidDelegateCertificate(format!(
                "unsupported delegate version {}",
                doc.version
            )));
        }
        if doc.authority_key.is_empty() {
            return Err(GhostkeyError::InvalidDelegateCertificate(
                "missing authority key".into(),
            ));
        }
        Ok(doc)
    }
}
