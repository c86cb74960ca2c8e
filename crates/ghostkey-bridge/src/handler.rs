//! Privileged request handler: the only component that touches the vault on
//! behalf of a requester.

use std::sync::Arc;

use ghostkey_cert::{BlindSignatureEngine, SignedMessage};
use ghostkey_core::{KeyId, Timestamp};
use ghostkey_vault::CredentialVault;

use crate::error::{BridgeError, BridgeResult};
use crate::types::{AuthPayload, AuthResponse, ForwardedRequest, PageResponse};

pub struct AuthHandler {
    vault: Arc<CredentialVault>,
    engine: BlindSignatureEngine,
}

impl AuthHandler {
    pub fn new(vault: Arc<CredentialVault>, engine: BlindSignatureEngine) -> Self {
        Self { vault, engine }
    }

    pub fn vault(&self) -> &Arc<CredentialVault> {
        &self.vault
    }

    /// Answer one forwarded request. Failures become error responses.
    pub fn handle(&self, forwarded: &ForwardedRequest) -> PageResponse {
        let request_id = forwarded.request.request_id.clone();
        match self.authenticate(forwarded) {
            Ok(data) => {
                tracing::info!(request_id = %request_id, origin = %forwarded.origin, "challenge signed");
                PageResponse::ok(request_id, data)
            }
            Err(e) => {
                tracing::warn!(request_id = %request_id, code = e.code(), "challenge refused");
                PageResponse::err(request_id, &e)
            }
        }
    }

    /// Sign the challenge with the active ghost key.
    ///
    /// The vault is never unlocked from here; a locked vault is refused
    /// before any credential is resolved.
    pub fn authenticate(&self, forwarded: &ForwardedRequest) -> BridgeResult<AuthResponse> {
        forwarded.request.validate()?;
        if forwarded.origin.is_empty() {
            return Err(BridgeError::InvalidRequest("missing origin".into()));
        }
        if !self.vault.is_unlocked() {
            return Err(BridgeError::VaultLocked);
        }

        let payload = AuthPayload::new(&forwarded.origin, &forwarded.request, Timestamp::now())
            .to_canonical_bytes()?;
        let signed = self.sign_with(None, &payload)?;

        Ok(AuthResponse {
            signed_payload: signed.to_armored()?,
            certificate: signed
                .certificate
                .to_armored()
                .map_err(|e| BridgeError::Internal(e.to_string()))?,
        })
    }

    /// Sign an arbitrary message with `key_id`, or the active key if `None`.
    pub fn sign_message(&self, key_id: Option<&KeyId>, message: &[u8]) -> BridgeResult<SignedMessage> {
        self.sign_with(key_id, message)
    }

    fn sign_with(&self, key_id: Option<&KeyId>, message: &[u8]) -> BridgeResult<SignedMessage> {
        // The decrypted entry is dropped, and its signing key zeroized, on return.
        let entry = match key_id {
            Some(id) => self.vault.get_decrypted(id)?,
            None => self.vault.get_active()?,
        };
        let certificate = entry.parsed_certificate()?;
        Ok(self
            .engine
            .sign_message(&certificate, &entry.signing_key, message)?)
    }
}
