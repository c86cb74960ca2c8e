use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce as AesNonce};
use argon2::{Algorithm, Argon2, Params, Version};
use blind_rsa_signatures::{BlindSignature, Options, PublicKey as RsaPublicKey, Signature as RsaSignature};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::delegate::DelegateDocument;
use crate::error::{GhostkeyError, GhostkeyResult};
use crate::traits::CryptoProvider;
use crate::types::{DelegateCertificate, SigningKeyBytes};

// ---------------------------------------------------------------------------
// KdfParams: Argon2id cost parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_memory_kib() -> u32 {
    19_456
}

fn default_iterations() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

impl KdfParams {
    /// Fast, weak parameters. Only for tests.
    pub fn insecure_for_tests() -> Self {
        Self {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    /// Reject costs Argon2 would refuse at unlock time.
    pub fn validate(&self) -> GhostkeyResult<()> {
        self.to_argon2().map(|_| ())
    }

    fn to_argon2(self) -> GhostkeyResult<Argon2<'static>> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, Some(32))
            .map_err(|e| GhostkeyError::Crypto(format!("invalid kdf parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

// ---------------------------------------------------------------------------
// StandardProvider
//
// Ed25519 for ghost keys, RSA blind signatures (RSABSSA-PSS) for the
// delegate authority, AES-256-GCM for the vault and Argon2id for passwords.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StandardProvider {
    kdf_params: KdfParams,
}

impl StandardProvider {
    pub fn new(kdf_params: KdfParams) -> Self {
        Self { kdf_params }
    }

    pub fn kdf_params(&self) -> &KdfParams {
        &self.kdf_params
    }

    fn authority_key(delegate: &DelegateCertificate) -> GhostkeyResult<RsaPublicKey> {
        let doc = DelegateDocument::decode(delegate)?;
        RsaPublicKey::from_der(&doc.authority_key).map_err(|e| {
            GhostkeyError::InvalidDelegateCertificate(format!("authority key: {}", e))
        })
    }
}

impl CryptoProvider for StandardProvider {
    fn generate_keypair(&self, seed: &[u8; 32]) -> GhostkeyResult<([u8; 32], SigningKeyBytes)> {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key().to_bytes();
        Ok((verifying_key, SigningKeyBytes::new(signing_key.to_keypair_bytes())))
    }

    fn blind(
        &self,
        delegate: &DelegateCertificate,
        message: &[u8],
        blinding_secret: &[u8; 32],
    ) -> GhostkeyResult<Vec<u8>> {
        let pk = Self::authority_key(delegate)?;
        let mut rng = ChaCha20Rng::from_seed(*blinding_secret);
        let result = pk
            .blind(&mut rng, message, false, &Options::default())
            .map_err(|e| GhostkeyError::Crypto(format!("blinding failed: {}", e)))?;
        Ok(result.blind_msg.0.clone())
    }

    fn unblind(
        &self,
        delegate: &DelegateCertificate,
        message: &[u8],
        blind_signature: &[u8],
        blinding_secret: &[u8; 32],
    ) -> GhostkeyResult<Vec<u8>> {
        let pk = Self::authority_key(delegate)?;
        let options = Options::default();
        // Replaying the seeded blind recovers the unblinding secret.
        let mut rng = ChaCha20Rng::from_seed(*blinding_secret);
        let result = pk
            .blind(&mut rng, message, false, &options)
            .map_err(|e| GhostkeyError::Crypto(format!("blinding failed: {}", e)))?;
        let blind_sig = BlindSignature::new(blind_signature.to_vec());
        let sig = pk
            .finalize(&blind_sig, &result.secret, result.msg_randomizer, message, &options)
            .map_err(|e| GhostkeyError::Crypto(format!("unblinding failed: {}", e)))?;
        Ok(sig.0.clone())
    }

    fn verify_blind_signature(
        &self,
        delegate: &DelegateCertificate,
        message: &[u8],
        signature: &[u8],
    ) -> bool {
        let Ok(pk) = Self::authority_key(delegate) else {
            return false;
        };
        let sig = RsaSignature::new(signature.to_vec());
        pk.verify(&sig, None, message, &Options::default()).is_ok()
    }

    fn sign(&self, signing_key: &SigningKeyBytes, message: &[u8]) -> GhostkeyResult<[u8; 64]> {
        let key = SigningKey::from_keypair_bytes(signing_key.as_bytes())
            .map_err(|_| GhostkeyError::Crypto("malformed signing key".into()))?;
        Ok(key.sign(message).to_bytes())
    }

    fn verify(&self, verifying_key: &[u8; 32], message: &[u8], signature: &[u8]) -> bool {
        let Ok(vk) = VerifyingKey::from_bytes(verifying_key) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(signature) else {
            return false;
        };
        vk.verify_strict(message, &sig).is_ok()
    }

    fn aead_encrypt(
        &self,
        key: &[u8; 32],
        iv: &[u8; 12],
        plaintext: &[u8],
    ) -> GhostkeyResult<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| GhostkeyError::Crypto(format!("cipher init failed: {}", e)))?;
        cipher
            .encrypt(AesNonce::from_slice(iv), plaintext)
            .map_err(|e| GhostkeyError::Crypto(format!("encryption failed: {}", e)))
    }

    fn aead_decrypt(
        &self,
        key: &[u8; 32],
        iv: &[u8; 12],
        ciphertext: &[u8],
    ) -> GhostkeyResult<Zeroizing<Vec<u8>>> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| GhostkeyError::Crypto(format!("cipher init failed: {}", e)))?;
        cipher
            .decrypt(AesNonce::from_slice(iv), ciphertext)
            .map(Zeroizing::new)
            .map_err(|e| GhostkeyError::Crypto(format!("decryption failed: {}", e)))
    }

    fn kdf(&self, password: &[u8], salt: &[u8; 16]) -> GhostkeyResult<Zeroizing<[u8; 32]>> {
        let argon2 = self.kdf_params.to_argon2()?;
        let mut output = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(password, salt, output.as_mut())
            .map_err(|e| GhostkeyError::Crypto(format!("key derivation failed: {}", e)))?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blind_rsa_signatures::KeyPair;
    use std::sync::OnceLock;

    fn authority() -> &'static KeyPair {
        static KP: OnceLock<KeyPair> = OnceLock::new();
        KP.get_or_init(|| KeyPair::generate(&mut rand::rngs::OsRng, 2048).unwrap())
    }

    fn delegate() -> DelegateCertificate {
        DelegateDocument::new("tier:20", authority().pk.to_der().unwrap())
            .encode()
            .unwrap()
    }

    fn provider() -> StandardProvider {
        StandardProvider::new(KdfParams::insecure_for_tests())
    }

    #[test]
    fn test_keypair_deterministic_from_seed() {
        let p = provider();
        let (vk1, sk1) = p.generate_keypair(&[3u8; 32]).unwrap();
        let (vk2, sk2) = p.generate_keypair(&[3u8; 32]).unwrap();
        assert_eq!(vk1, vk2);
        assert_eq!(sk1, sk2);
        assert_eq!(sk1.verifying_key_bytes(), vk1);
    }

    #[test]
    fn test_sign_verify() {
        let p = provider();
        let (vk, sk) = p.generate_keypair(&[4u8; 32]).unwrap();
        let sig = p.sign(&sk, b"challenge").unwrap();
        assert!(p.verify(&vk, b"challenge", &sig));
        assert!(!p.verify(&vk, b"challenge!", &sig));
        assert!(!p.verify(&vk, b"challenge", &sig[..63]));
    }

    #[test]
    fn test_sign_rejects_inconsistent_keypair() {
        let p = provider();
        let (_, sk) = p.generate_keypair(&[5u8; 32]).unwrap();
        let mut raw = *sk.as_bytes();
        raw[40] ^= 0xFF;
        assert!(p.sign(&SigningKeyBytes::new(raw), b"m").is_err());
    }

    #[test]
    fn test_blind_is_deterministic_in_secret() {
        let p = provider();
        let d = delegate();
        let a = p.blind(&d, b"message", &[1u8; 32]).unwrap();
        let b = p.blind(&d, b"message", &[1u8; 32]).unwrap();
        let c = p.blind(&d, b"message", &[2u8; 32]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_blind_sign_unblind_verify() {
        let p = provider();
        let d = delegate();
        let secret = [8u8; 32];
        let blinded = p.blind(&d, b"vk-bytes", &secret).unwrap();
        let blind_sig = authority()
            .sk
            .blind_sign(&mut rand::rngs::OsRng, &blinded, &Options::default())
            .unwrap();
        let sig = p.unblind(&d, b"vk-bytes", &blind_sig.0, &secret).unwrap();
        assert_eq!(sig.len(), 256);
        assert!(p.verify_blind_signature(&d, b"vk-bytes", &sig));
        assert!(!p.verify_blind_signature(&d, b"other", &sig));
    }

    #[test]
    fn test_blind_with_garbage_delegate() {
        let p = provider();
        let d = DelegateCertificate::from_bytes(b"0123456789".to_vec());
        assert!(matches!(
            p.blind(&d, b"m", &[0u8; 32]),
            Err(GhostkeyError::InvalidDelegateCertificate(_))
        ));
        assert!(!p.verify_blind_signature(&d, b"m", &[0u8; 256]));
    }

    #[test]
    fn test_aead_roundtrip_and_tamper() {
        let p = provider();
        let key = [0x42u8; 32];
        let iv = [7u8; 12];
        let ct = p.aead_encrypt(&key, &iv, b"secret entry").unwrap();
        assert_eq!(p.aead_decrypt(&key, &iv, &ct).unwrap().as_slice(), b"secret entry");

        let mut bad = ct.clone();
        bad[0] ^= 1;
        assert!(p.aead_decrypt(&key, &iv, &bad).is_err());
        assert!(p.aead_decrypt(&[0x43u8; 32], &iv, &ct).is_err());
    }

    #[test]
    fn test_kdf_deterministic_and_salted() {
        let p = provider();
        let k1 = p.kdf(b"hunter2", &[1u8; 16]).unwrap();
        let k2 = p.kdf(b"hunter2", &[1u8; 16]).unwrap();
        let k3 = p.kdf(b"hunter2", &[2u8; 16]).unwrap();
        let k4 = p.kdf(b"hunter3", &[1u8; 16]).unwrap();
        assert_eq!(*k1, *k2);
        assert_ne!(*k1, *k3);
        assert_ne!(*k1, *k4);
    }

    #[test]
    fn test_default_kdf_params() {
        let params = KdfParams::default();
        assert_eq!(params.memory_kib, 19_456);
        assert!(params.to_argon2().is_ok());
    }
}
