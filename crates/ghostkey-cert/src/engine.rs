//! Blind signature engine.
//!
//! Stateless orchestration of the issuance cryptography: derive a ghost
//! keypair, blind its certificate payload for the delegate authority, unblind
//! the authority's answer into a [`GhostkeyCertificate`], and verify it.
//! Every operation is a pure function of its inputs plus the injected
//! [`CryptoProvider`].

use std::sync::Arc;

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use ghostkey_core::{
    certificate_payload, BlindedRequest, BlindingContext, CryptoProvider, DelegateCertificate,
    DelegateDocument, GhostkeyCertificate, GhostkeyError, SigningKeyBytes, CERTIFICATE_VERSION,
};

use crate::error::{CertError, CertResult};

const KEYPAIR_INFO: &[u8] = b"ghostkey/v1/keypair";
const BLINDING_INFO: &[u8] = b"ghostkey/v1/blinding";

/// Output of [`BlindSignatureEngine::generate_and_blind`]: the volatile
/// context plus the blinded value destined for the signer.
#[derive(Debug)]
pub struct BlindedKey {
    context: BlindingContext,
    blinded_verifying_key: Vec<u8>,
}

impl BlindedKey {
    pub fn context(&self) -> &BlindingContext {
        &self.context
    }

    pub fn blinded_verifying_key(&self) -> &[u8] {
        &self.blinded_verifying_key
    }

    /// The request for the external signer. Carries no secret material.
    pub fn request(&self, payment_reference: impl Into<String>) -> BlindedRequest {
        BlindedRequest {
            payment_reference: payment_reference.into(),
            blinded_verifying_key: self.blinded_verifying_key.clone(),
        }
    }

    pub fn into_context(self) -> BlindingContext {
        self.context
    }
}

#[derive(Clone)]
pub struct BlindSignatureEngine {
    provider: Arc<dyn CryptoProvider>,
}

impl std::fmt::Debug for BlindSignatureEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlindSignatureEngine").finish_non_exhaustive()
    }
}

impl BlindSignatureEngine {
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.provider
    }

    /// Derive a keypair and blinding secret from `seed` and blind the
    /// certificate payload for `delegate`.
    ///
    /// Deterministic in `(delegate, seed)`. The blinding secret is derived
    /// with the delegate bytes mixed in so a blinded value is tied to one
    /// delegate.
    pub fn generate_and_blind(
        &self,
        delegate: &DelegateCertificate,
        seed: &[u8; 32],
    ) -> CertResult<BlindedKey> {
        let hk = Hkdf::<Sha256>::new(None, seed);

        let mut keypair_seed = Zeroizing::new([0u8; 32]);
        hk.expand(KEYPAIR_INFO, keypair_seed.as_mut())
            .map_err(|_| CertError::Blinding)?;

        let mut info = Vec::with_capacity(BLINDING_INFO.len() + 32);
        info.extend_from_slice(BLINDING_INFO);
        info.extend_from_slice(&Sha256::digest(delegate.as_bytes()));
        let mut blinding_secret = Zeroizing::new([0u8; 32]);
        hk.expand(&info, blinding_secret.as_mut())
            .map_err(|_| CertError::Blinding)?;

        let (verifying_key, signing_key) = self.provider.generate_keypair(&keypair_seed)?;
        let payload = certificate_payload(CERTIFICATE_VERSION, delegate, &verifying_key);
        let blinded = self
            .provider
            .blind(delegate, &payload, &blinding_secret)
            .map_err(|e| match e {
                GhostkeyError::InvalidDelegateCertificate(m) => {
                    CertError::InvalidDelegateCertificate(m)
                }
                _ => CertError::Blinding,
            })?;

        tracing::debug!(
            blinded_len = blinded.len(),
            "generated and blinded ghost key"
        );

        Ok(BlindedKey {
            context: BlindingContext::new(verifying_key, signing_key, *blinding_secret),
            blinded_verifying_key: blinded,
        })
    }

    /// Unblind the signer's answer and assemble the certificate.
    pub fn assemble_certificate(
        &self,
        delegate: &DelegateCertificate,
        blind_signature: &[u8],
        blinding_secret: &[u8; 32],
        verifying_key: &[u8; 32],
    ) -> CertResult<GhostkeyCertificate> {
        let payload = certificate_payload(CERTIFICATE_VERSION, delegate, verifying_key);
        let signature = self
            .provider
            .unblind(delegate, &payload, blind_signature, blinding_secret)
            .map_err(|e| match e {
                GhostkeyError::InvalidDelegateCertificate(m) => {
                    CertError::InvalidDelegateCertificate(m)
                }
                _ => CertError::UnblindingFailed("signature could not be unblinded".into()),
            })?;

        if signature.is_empty() || signature.len() != blind_signature.len() {
            return Err(CertError::UnblindingFailed(format!(
                "unexpected signature length {}",
                signature.len()
            )));
        }

        Ok(GhostkeyCertificate {
            version: CERTIFICATE_VERSION,
            delegate_certificate: delegate.clone(),
            ghostkey_verifying_key: *verifying_key,
            signature,
        })
    }

    /// True iff the certificate signature verifies under the delegate
    /// authority key over the canonical payload. Never errors.
    pub fn verify(&self, certificate: &GhostkeyCertificate) -> bool {
        if certificate.version != CERTIFICATE_VERSION || certificate.signature.is_empty() {
            return false;
        }
        self.provider.verify_blind_signature(
            &certificate.delegate_certificate,
            &certificate.signing_payload(),
            &certificate.signature,
        )
    }

    pub fn sign_challenge(
        &self,
        signing_key: &SigningKeyBytes,
        message: &[u8],
    ) -> CertResult<[u8; 64]> {
        self.provider
            .sign(signing_key, message)
            .map_err(|_| CertError::Signing)
    }

    pub fn verify_challenge(&self, verifying_key: &[u8; 32], message: &[u8], signature: &[u8]) -> bool {
        self.provider.verify(verifying_key, message, signature)
    }

    /// Check the master key's signature on a delegate document.
    pub fn verify_delegate(&self, delegate: &DelegateCertificate, master_verifying_key: &[u8; 32]) -> bool {
        match DelegateDocument::decode(delegate) {
            Ok(doc) => self.provider.verify(
                master_verifying_key,
                &doc.signing_payload(),
                &doc.master_signature,
            ),
            Err(_) => false,
        }
    }

    /// The whole trust chain: `master_verifying_key` endorsed the delegate,
    /// and the delegate authority signed the certificate. A certificate whose
    /// delegate nobody endorsed is only self-consistent, not valid.
    pub fn verify_endorsed(
        &self,
        certificate: &GhostkeyCertificate,
        master_verifying_key: &[u8; 32],
    ) -> bool {
        self.verify_delegate(&certificate.delegate_certificate, master_verifying_key)
            && self.verify(certificate)
    }

    /// The tier attestation carried by the delegate.
    pub fn delegate_info(&self, delegate: &DelegateCertificate) -> CertResult<String> {
        Ok(DelegateDocument::decode(delegate)?.info)
    }
}
