//! A page asks for a challenge signature through the bridge; the privileged
//! side answers with a really issued ghost key.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use blind_rsa_signatures::{KeyPair, Options};
use ed25519_dalek::{Signer, SigningKey};
use ghostkey_bridge::{
    serve, AuthBridge, AuthHandler, AuthPayload, BridgeConfig, BridgeOutcome, PageResponse,
};
use ghostkey_cert::{BlindSignatureEngine, SignedMessage};
use ghostkey_core::{DelegateDocument, GhostkeyCertificate, KdfParams, StandardProvider};
use ghostkey_vault::{CredentialVault, InMemoryBackend};

fn authority() -> &'static KeyPair {
    static KP: OnceLock<KeyPair> = OnceLock::new();
    KP.get_or_init(|| KeyPair::generate(&mut rand::rngs::OsRng, 2048).unwrap())
}

fn provider() -> Arc<StandardProvider> {
    Arc::new(StandardProvider::new(KdfParams::insecure_for_tests()))
}

fn master() -> SigningKey {
    SigningKey::from_bytes(&[0x5Au8; 32])
}

fn master_vk() -> [u8; 32] {
    master().verifying_key().to_bytes()
}

fn issue(engine: &BlindSignatureEngine) -> String {
    let doc = DelegateDocument::new("tier:20", authority().pk.to_der().unwrap());
    let sig = master().sign(&doc.signing_payload()).to_bytes().to_vec();
    let delegate = doc.with_master_signature(sig).encode().unwrap();
    let blinded = engine.generate_and_blind(&delegate, &[9u8; 32]).unwrap();
    let blind_sig = authority()
        .sk
        .blind_sign(
            &mut rand::rngs::OsRng,
            blinded.blinded_verifying_key(),
            &Options::default(),
        )
        .unwrap();
    let ctx = blinded.into_context();
    let cert = engine
        .assemble_certificate(&delegate, &blind_sig.0, ctx.blinding_secret(), ctx.verifying_key())
        .unwrap();
    ghostkey_vault::to_armored(&cert, ctx.signing_key()).unwrap()
}

struct Host {
    bridge: AuthBridge,
    vault: Arc<CredentialVault>,
    engine: BlindSignatureEngine,
}

fn start(unlocked: bool) -> Host {
    let engine = BlindSignatureEngine::new(provider());
    let vault = Arc::new(CredentialVault::new(provider(), Arc::new(InMemoryBackend::new())));
    vault.unlock("pw").unwrap();
    vault.import(&issue(&engine), "main").unwrap();
    if !unlocked {
        vault.lock().unwrap();
    }

    let (bridge, link) = AuthBridge::new(BridgeConfig {
        timeout: Duration::from_secs(30),
        channel_capacity: 8,
    });
    let handler = Arc::new(AuthHandler::new(
        vault.clone(),
        BlindSignatureEngine::new(provider()),
    ));
    tokio::spawn(serve(handler, link, bridge.responder()));
    Host {
        bridge,
        vault,
        engine,
    }
}

fn response(outcome: BridgeOutcome) -> PageResponse {
    match outcome {
        BridgeOutcome::Response(r) => r,
        BridgeOutcome::Timeout => panic!("unexpected timeout"),
    }
}

#[tokio::test]
async fn signs_challenge_bound_to_origin() {
    let host = start(true);
    let page = host.bridge.requester("https://shop.example");
    let resp = response(page.authenticate("nonce-1", "login").await.unwrap());
    assert!(resp.success, "{:?}", resp.error);

    let data = resp.data.unwrap();
    let signed = SignedMessage::from_armored(&data.signed_payload).unwrap();
    assert!(host.engine.verify_signed_message(&signed, &master_vk()));

    let cert = GhostkeyCertificate::from_armored(&data.certificate).unwrap();
    assert_eq!(cert, signed.certificate);
    assert!(host.engine.verify_endorsed(&cert, &master_vk()));

    let payload: AuthPayload = serde_json::from_slice(&signed.message).unwrap();
    assert_eq!(payload.origin, "https://shop.example");
    assert_eq!(payload.challenge, "nonce-1");
    assert_eq!(payload.purpose, "login");
    assert_eq!(payload.kind, "auth");
    assert!(payload.timestamp > 0);
}

#[tokio::test]
async fn contract_request_carries_address() {
    let host = start(true);
    let page = host.bridge.requester("https://dao.example");
    let resp = response(
        page.authenticate_contract("contract-7", "nonce-2", "vote")
            .await
            .unwrap(),
    );
    let signed = SignedMessage::from_armored(&resp.data.unwrap().signed_payload).unwrap();
    let payload: AuthPayload = serde_json::from_slice(&signed.message).unwrap();
    assert_eq!(payload.contract_address.as_deref(), Some("contract-7"));
}

#[tokio::test]
async fn locked_vault_is_refused_without_prompt() {
    let host = start(false);
    let page = host.bridge.requester("https://shop.example");
    let resp = response(page.authenticate("nonce", "login").await.unwrap());
    assert!(!resp.success);
    assert_eq!(resp.error.unwrap().code, "VAULT_LOCKED");
    assert!(!host.vault.is_unlocked());
}

#[tokio::test]
async fn no_active_credential() {
    let host = start(true);
    let id = host.vault.active_key_id().unwrap().unwrap();
    host.vault.delete(&id).unwrap();
    let page = host.bridge.requester("https://shop.example");
    let resp = response(page.authenticate("nonce", "login").await.unwrap());
    assert_eq!(resp.error.unwrap().code, "NO_ACTIVE_CREDENTIAL");
}

#[tokio::test]
async fn origin_cannot_be_spoofed_by_payload() {
    let host = start(true);
    let page = host.bridge.requester("https://evil.example");
    let resp = response(
        page.authenticate("https://bank.example", "login")
            .await
            .unwrap(),
    );
    let signed = SignedMessage::from_armored(&resp.data.unwrap().signed_payload).unwrap();
    let payload: AuthPayload = serde_json::from_slice(&signed.message).unwrap();
    assert_eq!(payload.origin, "https://evil.example");
}

#[tokio::test]
async fn malformed_request_is_rejected() {
    let host = start(true);
    let page = host.bridge.requester("https://shop.example");
    let resp = response(page.authenticate("", "login").await.unwrap());
    assert_eq!(resp.error.unwrap().code, "INVALID_REQUEST");
}

#[tokio::test]
async fn many_pages_in_flight() {
    let host = start(true);
    let mut tasks = Vec::new();
    for i in 0..8 {
        let page = host.bridge.requester(format!("https://site{}.example", i));
        tasks.push(tokio::spawn(async move {
            let resp = response(page.authenticate(&format!("n{}", i), "login").await.unwrap());
            let signed = SignedMessage::from_armored(&resp.data.unwrap().signed_payload).unwrap();
            let payload: AuthPayload = serde_json::from_slice(&signed.message).unwrap();
            assert_eq!(payload.origin, format!("https://site{}.example", i));
            assert_eq!(payload.challenge, format!("n{}", i));
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    assert_eq!(host.bridge.snapshot().pending, 0);
}
