//! Issuance client: runs the blind issuance flow against an external signer.
//!
//! The signer sees only the payment reference and the blinded verifying key.
//! Retrying is the caller's decision; see [`CertError::is_retryable`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use ghostkey_core::{BlindedRequest, DelegateCertificate, GhostkeyCertificate, SigningKeyBytes};

use crate::engine::BlindSignatureEngine;
use crate::error::{CertError, CertResult};

/// Body of the signer's "already signed" conflict response.
pub const ALREADY_SIGNED_MESSAGE: &str = "CERTIFICATE_ALREADY_SIGNED";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignCertificateRequest {
    pub payment_reference: String,
    pub blinded_verifying_key_b64: String,
}

impl From<&BlindedRequest> for SignCertificateRequest {
    fn from(req: &BlindedRequest) -> Self {
        Self {
            payment_reference: req.payment_reference.clone(),
            blinded_verifying_key_b64: STANDARD.encode(&req.blinded_verifying_key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignCertificateResponse {
    pub blind_signature_b64: String,
}

#[derive(Debug, Default, Deserialize)]
struct SignerErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// SignerEndpoint
// ---------------------------------------------------------------------------

/// Something that turns a blinded request into a blind signature.
#[async_trait]
pub trait SignerEndpoint: Send + Sync {
    async fn sign_certificate(&self, request: &BlindedRequest) -> CertResult<Vec<u8>>;
}

/// `POST {base_url}/sign-certificate` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSigner {
    client: Client,
    endpoint: String,
}

impl HttpSigner {
    pub fn new(base_url: &str, timeout: Duration) -> CertResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CertError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/sign-certificate", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SignerEndpoint for HttpSigner {
    async fn sign_certificate(&self, request: &BlindedRequest) -> CertResult<Vec<u8>> {
        let body = SignCertificateRequest::from(request);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| CertError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            tracing::warn!("signer reports certificate already signed for this payment");
            return Err(CertError::CertificateAlreadySigned);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let parsed: SignerErrorBody = serde_json::from_str(&text).unwrap_or_default();
            let message = parsed
                .error
                .or(parsed.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            tracing::warn!(status = status.as_u16(), %message, "signer rejected request");
            return Err(CertError::SignerRejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SignCertificateResponse = response
            .json()
            .await
            .map_err(|e| CertError::MalformedResponse(e.to_string()))?;
        STANDARD
            .decode(parsed.blind_signature_b64.as_bytes())
            .map_err(|e| CertError::MalformedResponse(format!("blind signature: {}", e)))
    }
}

// ---------------------------------------------------------------------------
// IssuanceClient
// ---------------------------------------------------------------------------

/// A freshly issued credential: the certificate and its signing key.
#[derive(Debug, Clone)]
pub struct IssuedGhostkey {
    pub certificate: GhostkeyCertificate,
    pub signing_key: SigningKeyBytes,
}

pub struct IssuanceClient {
    engine: BlindSignatureEngine,
    signer: Arc<dyn SignerEndpoint>,
    master_verifying_key: [u8; 32],
}

impl IssuanceClient {
    /// `master_verifying_key` is the trust anchor delegates must be endorsed by.
    pub fn new(
        engine: BlindSignatureEngine,
        signer: Arc<dyn SignerEndpoint>,
        master_verifying_key: [u8; 32],
    ) -> Self {
        Self {
            engine,
            signer,
            master_verifying_key,
        }
    }

    pub fn engine(&self) -> &BlindSignatureEngine {
        &self.engine
    }

    /// Full issuance: blind, remote sign, unblind, assemble and verify.
    ///
    /// `seed` must be fresh randomness. The blinding context is dropped (and
    /// zeroized) before this returns, on every path.
    pub async fn issue(
        &self,
        delegate: &DelegateCertificate,
        payment_reference: &str,
        seed: &[u8; 32],
    ) -> CertResult<IssuedGhostkey> {
        // Checked before the payment reference is spent on a signature.
        if !self.engine.verify_delegate(delegate, &self.master_verifying_key) {
            return Err(CertError::InvalidDelegateCertificate(
                "not endorsed by the master key".into(),
            ));
        }
        let blinded = self.engine.generate_and_blind(delegate, seed)?;
        let request = blinded.request(payment_reference);
        let context = blinded.into_context();

        let blind_signature = self.signer.sign_certificate(&request).await?;
        let certificate = self.engine.assemble_certificate(
            delegate,
            &blind_signature,
            context.blinding_secret(),
            context.verifying_key(),
        )?;

        if !self
            .engine
            .verify_endorsed(&certificate, &self.master_verifying_key)
        {
            return Err(CertError::VerificationFailed);
        }

        tracing::info!(
            verifying_key = %hex::encode(&context.verifying_key()[..4]),
            "ghost key certificate issued"
        );

        Ok(IssuedGhostkey {
            certificate,
            signing_key: context.signing_key().clone(),
        })
    }
}
