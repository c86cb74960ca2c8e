//! Messages signed by a ghost key, bundled with the certificate that vouches
//! for the signing key.

use serde::{Deserialize, Serialize};

use ghostkey_core::armor;
use ghostkey_core::types::serde_b64;
use ghostkey_core::{GhostkeyCertificate, SigningKeyBytes};

use crate::engine::BlindSignatureEngine;
use crate::error::{CertError, CertResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub certificate: GhostkeyCertificate,
    #[serde(with = "serde_b64::vec")]
    pub message: Vec<u8>,
    #[serde(with = "serde_b64::array")]
    pub signature: [u8; 64],
}

impl SignedMessage {
    pub fn to_armored(&self) -> CertResult<String> {
        let bytes = serde_json::to_vec(self).map_err(|e| CertError::Encoding(e.to_string()))?;
        Ok(armor::armor(armor::SIGNED_MESSAGE_LABEL, &bytes))
    }

    pub fn from_armored(text: &str) -> CertResult<Self> {
        let bytes = armor::dearmor(text, armor::SIGNED_MESSAGE_LABEL)?;
        serde_json::from_slice(&bytes).map_err(|e| CertError::Encoding(e.to_string()))
    }
}

impl BlindSignatureEngine {
    /// Sign `message` with the ghost key belonging to `certificate`.
    ///
    /// Fails with `Signing` if `signing_key` is not the key the certificate
    /// binds.
    pub fn sign_message(
        &self,
        certificate: &GhostkeyCertificate,
        signing_key: &SigningKeyBytes,
        message: &[u8],
    ) -> CertResult<SignedMessage> {
        if signing_key.verifying_key_bytes() != certificate.ghostkey_verifying_key {
            return Err(CertError::Signing);
        }
        let signature = self.sign_challenge(signing_key, message)?;
        Ok(SignedMessage {
            certificate: certificate.clone(),
            message: message.to_vec(),
            signature,
        })
    }

    /// Endorsed certificate and valid ghost key signature over the message.
    pub fn verify_signed_message(
        &self,
        signed: &SignedMessage,
        master_verifying_key: &[u8; 32],
    ) -> bool {
        self.verify_endorsed(&signed.certificate, master_verifying_key)
            && self.verify_challenge(
                &signed.certificate.ghostkey_verifying_key,
                &signed.message,
                &signed.signature,
            )
    }
}
