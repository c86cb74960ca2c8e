//! Vault lifecycle across process restarts and with real issued credentials.

use std::sync::{Arc, OnceLock};

use blind_rsa_signatures::{KeyPair, Options};
use ghostkey_cert::BlindSignatureEngine;
use ghostkey_core::{DelegateDocument, KdfParams, StandardProvider, StorageBackend};
use ghostkey_vault::{CredentialVault, InMemoryBackend, VaultError};

fn authority() -> &'static KeyPair {
    static KP: OnceLock<KeyPair> = OnceLock::new();
    KP.get_or_init(|| KeyPair::generate(&mut rand::rngs::OsRng, 2048).unwrap())
}

fn provider() -> Arc<StandardProvider> {
    Arc::new(StandardProvider::new(KdfParams::insecure_for_tests()))
}

/// Issue a real certificate without any network: sign the blinded key
/// directly with the authority fixture.
fn issue(engine: &BlindSignatureEngine, seed: u8) -> String {
    let delegate = DelegateDocument::new("tier:20", authority().pk.to_der().unwrap())
        .encode()
        .unwrap();
    let blinded = engine.generate_and_blind(&delegate, &[seed; 32]).unwrap();
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
    assert!(engine.verify(&cert));
    ghostkey_vault::to_armored(&cert, ctx.signing_key()).unwrap()
}

#[test]
fn unlock_import_lock_unlock_roundtrip() {
    let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
    let engine = BlindSignatureEngine::new(provider());

    let vault = CredentialVault::new(provider(), backend.clone());
    assert!(vault.unlock("s3cret").unwrap());
    let id = vault.import(&issue(&engine, 1), "donation").unwrap();
    let before = vault.get_decrypted(&id).unwrap();
    vault.lock().unwrap();
    assert!(vault.unlock("s3cret").unwrap());
    assert_eq!(vault.get_decrypted(&id).unwrap(), before);

    // A fresh instance over the same storage, as after a restart.
    let reopened = CredentialVault::new(provider(), backend);
    assert!(!reopened.is_unlocked());
    assert!(matches!(reopened.get_active(), Err(VaultError::Locked)));
    assert!(!reopened.unlock("wrong").unwrap());
    assert!(reopened.unlock("s3cret").unwrap());
    let active = reopened.get_active().unwrap();
    assert_eq!(active, before);

    let cert = active.parsed_certificate().unwrap();
    assert!(engine.verify(&cert));
    let sig = engine.sign_challenge(&active.signing_key, b"challenge").unwrap();
    assert!(engine.verify_challenge(&cert.ghostkey_verifying_key, b"challenge", &sig));
}

#[test]
fn exported_credential_imports_into_another_vault() {
    let engine = BlindSignatureEngine::new(provider());
    let source = CredentialVault::new(provider(), Arc::new(InMemoryBackend::new()));
    source.unlock("one").unwrap();
    let id = source.import(&issue(&engine, 2), "laptop").unwrap();
    let exported = source.export(&id).unwrap();

    let target = CredentialVault::new(provider(), Arc::new(InMemoryBackend::new()));
    target.unlock("two").unwrap();
    let copied = target.import(&exported, "phone").unwrap();
    assert_eq!(
        target.get_decrypted(&copied).unwrap().signing_key,
        source.get_decrypted(&id).unwrap().signing_key
    );
}

#[test]
fn concurrent_readers_and_writers() {
    let engine = BlindSignatureEngine::new(provider());
    let vault = Arc::new(CredentialVault::new(provider(), Arc::new(InMemoryBackend::new())));
    vault.unlock("pw").unwrap();
    let text = issue(&engine, 3);

    let mut handles = Vec::new();
    for i in 0..4 {
        let vault = vault.clone();
        let text = text.clone();
        handles.push(std::thread::spawn(move || {
            for j in 0..5 {
                vault.import(&text, &format!("t{}-{}", i, j)).unwrap();
                let listed = vault.list().unwrap();
                assert!(!listed.is_empty());
                assert_eq!(listed.iter().filter(|m| m.is_active).count(), 1);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(vault.key_count().unwrap(), 20);
}

#[cfg(feature = "sqlite")]
#[test]
fn sqlite_backed_vault_survives_reopen() {
    use ghostkey_vault::SqliteBackend;

    let dir = std::env::temp_dir().join(format!("ghostkey-vault-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("vault.db");
    let engine = BlindSignatureEngine::new(provider());

    let id = {
        let vault = CredentialVault::new(provider(), Arc::new(SqliteBackend::open(&path).unwrap()));
        vault.unlock("pw").unwrap();
        vault.import(&issue(&engine, 4), "disk").unwrap()
    };

    let vault = CredentialVault::new(provider(), Arc::new(SqliteBackend::open(&path).unwrap()));
    assert!(vault.vault_exists().unwrap());
    assert!(vault.unlock("pw").unwrap());
    assert_eq!(vault.get_active().unwrap().id, id);
    std::fs::remove_dir_all(&dir).ok();
}
