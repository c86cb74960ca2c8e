use zeroize::Zeroizing;

use crate::error::GhostkeyResult;
use crate::types::{DelegateCertificate, RecordId, SigningKeyBytes};

// ---------------------------------------------------------------------------
// CryptoProvider: the primitive capability interface
//
// Everything the engine and vault need from cryptography goes through this
// trait so tests can substitute a deterministic fake. Implementations hold no
// per-call state.
// ---------------------------------------------------------------------------

pub trait CryptoProvider: Send + Sync {
    /// Deterministically derive a signing keypair from `seed`.
    /// Returns `(verifying_key, signing_key)`.
    fn generate_keypair(&self, seed: &[u8; 32]) -> GhostkeyResult<([u8; 32], SigningKeyBytes)>;

    /// Blind `message` for signing by the authority named in `delegate`.
    /// Deterministic in `blinding_secret`.
    fn blind(
        &self,
        delegate: &DelegateCertificate,
        message: &[u8],
        blinding_secret: &[u8; 32],
    ) -> GhostkeyResult<Vec<u8>>;

    /// Remove the blinding from `blind_signature`, yielding a signature over
    /// `message` under the delegate authority key.
    fn unblind(
        &self,
        delegate: &DelegateCertificate,
        message: &[u8],
        blind_signature: &[u8],
        blinding_secret: &[u8; 32],
    ) -> GhostkeyResult<Vec<u8>>;

    /// Check an unblinded signature against the delegate authority key.
    fn verify_blind_signature(
        &self,
        delegate: &DelegateCertificate,
        message: &[u8],
        signature: &[u8],
    ) -> bool;

    fn sign(&self, signing_key: &SigningKeyBytes, message: &[u8]) -> GhostkeyResult<[u8; 64]>;

    fn verify(&self, verifying_key: &[u8; 32], message: &[u8], signature: &[u8]) -> bool;

    fn aead_encrypt(&self, key: &[u8; 32], iv: &[u8; 12], plaintext: &[u8])
        -> GhostkeyResult<Vec<u8>>;

    fn aead_decrypt(
        &self,
        key: &[u8; 32],
        iv: &[u8; 12],
        ciphertext: &[u8],
    ) -> GhostkeyResult<Zeroizing<Vec<u8>>>;

    fn kdf(&self, password: &[u8], salt: &[u8; 16]) -> GhostkeyResult<Zeroizing<[u8; 32]>>;
}

// ---------------------------------------------------------------------------
// StorageBackend: opaque keyed record store
//
// The backend stores only record ids and opaque bytes. Encryption happens
// before anything reaches it.
// ---------------------------------------------------------------------------

pub trait StorageBackend: Send + Sync {
    fn get(&self, record_id: &RecordId) -> GhostkeyResult<Option<Vec<u8>>>;
    fn put(&self, record_id: &RecordId, value: &[u8]) -> GhostkeyResult<()>;
    fn delete(&self, record_id: &RecordId) -> GhostkeyResult<bool>;
    fn exists(&self, record_id: &RecordId) -> GhostkeyResult<bool>;
}
