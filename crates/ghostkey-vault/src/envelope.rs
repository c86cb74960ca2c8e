use ghostkey_core::CryptoProvider;
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};

// AEAD envelopes for vault records.
//
// Every seal draws a fresh random 96-bit IV from the OS RNG. IVs are never
// derived, counted or reused, including when the same entry is re-sealed.

pub const IV_SIZE: usize = 12;

pub fn fresh_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` under `key` with a new IV. Returns `(iv, ciphertext)`.
pub fn seal(
    provider: &dyn CryptoProvider,
    key: &[u8; 32],
    plaintext: &[u8],
) -> VaultResult<([u8; IV_SIZE], Vec<u8>)> {
    let iv = fresh_iv();
    let ciphertext = provider
        .aead_encrypt(key, &iv, plaintext)
        .map_err(|_| VaultError::Encryption("encryption failed".into()))?;
    Ok((iv, ciphertext))
}

pub fn open(
    provider: &dyn CryptoProvider,
    key: &[u8; 32],
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> VaultResult<Zeroizing<Vec<u8>>> {
    provider
        .aead_decrypt(key, iv, ciphertext)
        .map_err(|_| VaultError::Decryption("decryption failed".into()))
}

/// Serialize and seal a value.
pub fn seal_value<T: Serialize>(
    provider: &dyn CryptoProvider,
    key: &[u8; 32],
    value: &T,
) -> VaultResult<([u8; IV_SIZE], Vec<u8>)> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(value)
            .map_err(|e| VaultError::Serialization(format!("serialize failed: {}", e)))?,
    );
    seal(provider, key, &plaintext)
}

/// Open and deserialize a value.
pub fn open_value<T: DeserializeOwned>(
    provider: &dyn CryptoProvider,
    key: &[u8; 32],
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> VaultResult<T> {
    let plaintext = open(provider, key, iv, ciphertext)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| VaultError::Serialization(format!("deserialize failed: {}", e)))
}
