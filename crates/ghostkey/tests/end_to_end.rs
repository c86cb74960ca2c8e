//! End to end: issue a ghost key into the vault, then use it through the
//! stdio bridge host and the signing helpers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use blind_rsa_signatures::{KeyPair, Options};
use ed25519_dalek::{Signer, SigningKey};

use ghostkey::{
    check_delegate, check_ghost_key, issue_into_vault, run_stdio_host, verification_engine,
    RootConfig, RootError, RootState,
};
use ghostkey_bridge::{AuthPayload, BridgeConfig, PageResponse};
use ghostkey_cert::{CertError, CertResult, SignedMessage, SignerEndpoint};
use ghostkey_core::{BlindedRequest, DelegateCertificate, DelegateDocument, KdfParams};
use ghostkey_vault::{InMemoryBackend, VaultError};

fn authority() -> &'static KeyPair {
    static KP: OnceLock<KeyPair> = OnceLock::new();
    KP.get_or_init(|| KeyPair::generate(&mut rand::rngs::OsRng, 2048).unwrap())
}

fn master() -> SigningKey {
    SigningKey::from_bytes(&[42u8; 32])
}

fn master_vk() -> [u8; 32] {
    master().verifying_key().to_bytes()
}

fn delegate_signed_by(key: &SigningKey) -> DelegateCertificate {
    let doc = DelegateDocument::new("tier:20", authority().pk.to_der().unwrap());
    let sig = key.sign(&doc.signing_payload());
    doc.with_master_signature(sig.to_bytes().to_vec())
        .encode()
        .unwrap()
}

fn delegate() -> DelegateCertificate {
    delegate_signed_by(&master())
}

#[derive(Default)]
struct CountingSigner {
    calls: AtomicUsize,
}

#[async_trait]
impl SignerEndpoint for CountingSigner {
    async fn sign_certificate(&self, request: &BlindedRequest) -> CertResult<Vec<u8>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(CertError::CertificateAlreadySigned);
        }
        let sig = authority()
            .sk
            .blind_sign(
                &mut rand::rngs::OsRng,
                &request.blinded_verifying_key,
                &Options::default(),
            )
            .unwrap();
        Ok(sig.0.clone())
    }
}

fn config() -> RootConfig {
    RootConfig {
        kdf: KdfParams::insecure_for_tests(),
        master_verifying_key: Some(STANDARD.encode(master_vk())),
        ..RootConfig::default()
    }
}

fn state() -> RootState {
    RootState::with_backend(config(), Arc::new(InMemoryBackend::new())).unwrap()
}

async fn issued_state() -> RootState {
    let state = state();
    state.unlock(Some("hunter2")).unwrap();
    issue_into_vault(
        &state,
        Arc::new(CountingSigner::default()),
        &delegate(),
        "pay-1",
        "main",
    )
    .await
    .unwrap();
    state
}

fn quick_bridge() -> BridgeConfig {
    BridgeConfig {
        timeout: Duration::from_secs(30),
        channel_capacity: 8,
    }
}

async fn host(state: &RootState, input: &str) -> Vec<PageResponse> {
    let mut out = Vec::new();
    run_stdio_host(state.handler.clone(), quick_bridge(), input.as_bytes(), &mut out)
        .await
        .unwrap();
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn issued_key_is_stored_active_and_valid() {
    let state = issued_state().await;
    let active = state.vault.get_active().unwrap();
    assert_eq!(active.label, "main");
    let cert = active.parsed_certificate().unwrap();
    assert!(state.engine.verify(&cert));
    assert!(state.engine.verify_endorsed(&cert, &master_vk()));
    assert_eq!(
        state.engine.delegate_info(&cert.delegate_certificate).unwrap(),
        "tier:20"
    );
}

#[tokio::test]
async fn issue_refuses_locked_vault_before_contacting_signer() {
    let state = state();
    let signer = Arc::new(CountingSigner::default());
    let err = issue_into_vault(&state, signer.clone(), &delegate(), "pay-1", "x")
        .await
        .unwrap_err();
    assert!(matches!(err, RootError::Vault(VaultError::Locked)));
    assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_issue_for_same_payment_is_rejected() {
    let state = state();
    state.unlock(Some("pw")).unwrap();
    let signer = Arc::new(CountingSigner::default());
    issue_into_vault(&state, signer.clone(), &delegate(), "pay-1", "a")
        .await
        .unwrap();
    let err = issue_into_vault(&state, signer, &delegate(), "pay-1", "b")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RootError::Cert(CertError::CertificateAlreadySigned)
    ));
    assert_eq!(state.vault.key_count().unwrap(), 1);
}

#[tokio::test]
async fn stdio_host_answers_each_request() {
    let state = issued_state().await;
    let input = concat!(
        r#"{"origin":"https://a.example","type":"authenticate","request_id":"r1","challenge":"c1","purpose":"login"}"#,
        "\n\n",
        r#"{"origin":"https://b.example","type":"authenticateContract","request_id":"r2","challenge":"c2","purpose":"vote","contract_address":"k-1"}"#,
        "\n",
        r#"{"request_id":"r3","type":"bogus"}"#,
        "\n",
        "garbage\n",
    );
    let mut responses = host(&state, input).await;
    responses.sort_by(|a, b| a.request_id.as_str().cmp(b.request_id.as_str()));
    assert_eq!(responses.len(), 3);

    for (resp, origin, challenge) in [
        (&responses[0], "https://a.example", "c1"),
        (&responses[1], "https://b.example", "c2"),
    ] {
        assert!(resp.success, "{:?}", resp.error);
        let signed =
            SignedMessage::from_armored(&resp.data.as_ref().unwrap().signed_payload).unwrap();
        assert!(state.engine.verify_signed_message(&signed, &master_vk()));
        let payload: AuthPayload = serde_json::from_slice(&signed.message).unwrap();
        assert_eq!(payload.origin, origin);
        assert_eq!(payload.challenge, challenge);
    }

    assert_eq!(responses[2].request_id.as_str(), "r3");
    assert_eq!(
        responses[2].error.as_ref().unwrap().code,
        "INVALID_REQUEST"
    );
}

#[tokio::test]
async fn stdio_host_with_locked_vault() {
    let state = issued_state().await;
    state.vault.lock().unwrap();
    let input = concat!(
        r#"{"origin":"https://a.example","type":"authenticate","request_id":"r1","challenge":"c1","purpose":"login"}"#,
        "\n"
    );
    let responses = host(&state, input).await;
    assert_eq!(responses.len(), 1);
    assert!(!responses[0].success);
    assert_eq!(responses[0].error.as_ref().unwrap().code, "VAULT_LOCKED");
}

#[tokio::test]
async fn empty_input_ends_cleanly() {
    let state = state();
    assert!(host(&state, "").await.is_empty());
}

#[tokio::test]
async fn sign_with_explicit_key_and_verify() {
    let state = issued_state().await;
    let id = state.vault.active_key_id().unwrap().unwrap();
    let signed = state
        .handler
        .sign_message(Some(&id), b"I am a human")
        .unwrap();
    let reparsed = SignedMessage::from_armored(&signed.to_armored().unwrap()).unwrap();
    assert!(state.engine.verify_signed_message(&reparsed, &master_vk()));

    let mut forged = reparsed.clone();
    forged.message = b"I am a bot".to_vec();
    assert!(!state.engine.verify_signed_message(&forged, &master_vk()));
    assert!(!state.engine.verify_signed_message(&reparsed, &[0u8; 32]));
}

#[tokio::test]
async fn issue_refuses_delegate_from_unknown_master() {
    let state = state();
    state.unlock(Some("pw")).unwrap();
    let signer = Arc::new(CountingSigner::default());
    let rogue = delegate_signed_by(&SigningKey::from_bytes(&[7u8; 32]));
    let err = issue_into_vault(&state, signer.clone(), &rogue, "pay-1", "x")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RootError::Cert(CertError::InvalidDelegateCertificate(_))
    ));
    assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(state.vault.key_count().unwrap(), 0);
}

#[tokio::test]
async fn issue_without_master_key_fails_closed() {
    let config = RootConfig {
        master_verifying_key: None,
        ..config()
    };
    let state = RootState::with_backend(config, Arc::new(InMemoryBackend::new())).unwrap();
    state.unlock(Some("pw")).unwrap();
    let signer = Arc::new(CountingSigner::default());
    let err = issue_into_vault(&state, signer.clone(), &delegate(), "pay-1", "x")
        .await
        .unwrap_err();
    assert!(matches!(err, RootError::Config(_)));
    assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn check_delegate_against_master() {
    let engine = verification_engine(&config());
    assert_eq!(
        check_delegate(&engine, &delegate(), &master_vk()).unwrap(),
        "tier:20"
    );
    let rogue = delegate_signed_by(&SigningKey::from_bytes(&[7u8; 32]));
    assert!(matches!(
        check_delegate(&engine, &rogue, &master_vk()),
        Err(RootError::VerificationFailed)
    ));
}

#[tokio::test]
async fn check_ghost_key_against_master() {
    let state = issued_state().await;
    let cert = state.vault.get_active().unwrap().parsed_certificate().unwrap();
    let armored = cert.to_armored().unwrap();
    let reparsed = ghostkey_core::GhostkeyCertificate::from_armored(&armored).unwrap();

    let engine = verification_engine(&state.config);
    assert_eq!(
        check_ghost_key(&engine, &reparsed, &master_vk()).unwrap(),
        "tier:20"
    );
    let other = SigningKey::from_bytes(&[7u8; 32]).verifying_key().to_bytes();
    assert!(matches!(
        check_ghost_key(&engine, &reparsed, &other),
        Err(RootError::VerificationFailed)
    ));
}
