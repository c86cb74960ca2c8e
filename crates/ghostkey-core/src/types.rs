use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::armor;
use crate::error::{GhostkeyError, GhostkeyResult};

/// Version tag written into every ghost key certificate.
pub const CERTIFICATE_VERSION: u16 = 1;

/// Domain separator for the certificate signing payload.
const CERTIFICATE_DOMAIN: &[u8] = b"ghostkey-certificate";

// ---------------------------------------------------------------------------
// Timestamp: canonical time representation (seconds + nanoseconds)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds_since_epoch: u64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            seconds_since_epoch: now.timestamp() as u64,
            nanoseconds: now.timestamp_subsec_nanos(),
        }
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            seconds_since_epoch: seconds,
            nanoseconds: 0,
        }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self {
            seconds_since_epoch: millis / 1000,
            nanoseconds: ((millis % 1000) * 1_000_000) as u32,
        }
    }

    /// Milliseconds since the Unix epoch.
    pub fn as_millis(&self) -> u64 {
        self.seconds_since_epoch * 1000 + u64::from(self.nanoseconds / 1_000_000)
    }

    pub fn to_rfc3339(&self) -> String {
        let dt =
            chrono::DateTime::from_timestamp(self.seconds_since_epoch as i64, self.nanoseconds);
        dt.map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "invalid".to_string())
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Timestamp {
    fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            seconds_since_epoch: dt.timestamp() as u64,
            nanoseconds: dt.timestamp_subsec_nanos(),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed identifiers
// ---------------------------------------------------------------------------

/// Identifier of a credential stored in the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub uuid::Uuid);

impl KeyId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn parse(s: &str) -> GhostkeyResult<Self> {
        uuid::Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| GhostkeyError::Encoding(format!("invalid key id: {}", e)))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_id!(
    RequestId,
    "Correlation token for a bridge request (128 random bits, hex)."
);
define_id!(RecordId, "Key of a persisted storage record.");

impl RequestId {
    /// Fresh 128-bit random token.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }
}

// ---------------------------------------------------------------------------
// DelegateCertificate: opaque authority blob
// ---------------------------------------------------------------------------

/// Issuer-signed attestation of a tier, treated as opaque bytes.
///
/// The core never constructs the content of a delegate certificate; it
/// carries it verbatim into ghost key certificates and hands it to the
/// crypto provider, which knows how to recover the authority key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelegateCertificate(#[serde(with = "serde_b64::vec")] Vec<u8>);

impl DelegateCertificate {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_armored(&self) -> String {
        armor::armor(armor::DELEGATE_CERTIFICATE_LABEL, &self.0)
    }

    pub fn from_armored(text: &str) -> GhostkeyResult<Self> {
        armor::dearmor(text, armor::DELEGATE_CERTIFICATE_LABEL).map(Self)
    }
}

impl fmt::Debug for DelegateCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DelegateCertificate({} bytes)", self.0.len())
    }
}

// ---------------------------------------------------------------------------
// GhostkeyCertificate
// ---------------------------------------------------------------------------

/// A delegate-endorsed binding of a ghost key verifying key.
///
/// `signature` is the unblinded authority signature over
/// [`certificate_payload`] of the other three fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GhostkeyCertificate {
    pub version: u16,
    pub delegate_certificate: DelegateCertificate,
    #[serde(with = "serde_b64::array")]
    pub ghostkey_verifying_key: [u8; 32],
    #[serde(with = "serde_b64::vec")]
    pub signature: Vec<u8>,
}

impl GhostkeyCertificate {
    /// Canonical bytes covered by `signature`.
    pub fn signing_payload(&self) -> Vec<u8> {
        certificate_payload(
            self.version,
            &self.delegate_certificate,
            &self.ghostkey_verifying_key,
        )
    }

    pub fn to_bytes(&self) -> GhostkeyResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| GhostkeyError::Serialization(format!("certificate encode: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> GhostkeyResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| GhostkeyError::Serialization(format!("certificate decode: {}", e)))
    }

    pub fn to_armored(&self) -> GhostkeyResult<String> {
        Ok(armor::armor(armor::CERTIFICATE_LABEL, &self.to_bytes()?))
    }

    pub fn from_armored(text: &str) -> GhostkeyResult<Self> {
        let bytes = armor::dearmor(text, armor::CERTIFICATE_LABEL)?;
        Self::from_bytes(&bytes)
    }
}

/// Canonical encoding of `(version, delegate_certificate, verifying_key)`.
///
/// Layout: domain tag, version (u16 BE), delegate length (u32 BE),
/// delegate bytes, 32-byte verifying key.
pub fn certificate_payload(
    version: u16,
    delegate_certificate: &DelegateCertificate,
    verifying_key: &[u8; 32],
) -> Vec<u8> {
    let delegate = delegate_certificate.as_bytes();
    let mut out = Vec::with_capacity(CERTIFICATE_DOMAIN.len() + 2 + 4 + delegate.len() + 32);
    out.extend_from_slice(CERTIFICATE_DOMAIN);
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&(delegate.len() as u32).to_be_bytes());
    out.extend_from_slice(delegate);
    out.extend_from_slice(verifying_key);
    out
}

// ---------------------------------------------------------------------------
// SigningKeyBytes: 64-byte Ed25519 keypair encoding, zeroized on drop
// ---------------------------------------------------------------------------

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKeyBytes([u8; 64]);

impl SigningKeyBytes {
    pub fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 64] = slice.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// The public half embedded in the keypair encoding.
    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        let mut vk = [0u8; 32];
        vk.copy_from_slice(&self.0[32..]);
        vk
    }

    pub fn to_armored(&self) -> String {
        armor::armor(armor::SIGNING_KEY_LABEL, &self.0)
    }

    pub fn from_armored(text: &str) -> GhostkeyResult<Self> {
        let bytes = zeroize::Zeroizing::new(armor::dearmor(text, armor::SIGNING_KEY_LABEL)?);
        Self::from_slice(&bytes).ok_or_else(|| {
            GhostkeyError::Encoding(format!("signing key must be 64 bytes, got {}", bytes.len()))
        })
    }
}

impl PartialEq for SigningKeyBytes {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SigningKeyBytes {}

impl fmt::Debug for SigningKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKeyBytes(<redacted>)")
    }
}

impl Serialize for SigningKeyBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_b64::array::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for SigningKeyBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_b64::array::deserialize::<D, 64>(deserializer).map(Self)
    }
}

// ---------------------------------------------------------------------------
// BlindingContext: per-issuance volatile secrets
// ---------------------------------------------------------------------------

/// Key material for one in-flight issuance.
///
/// Lives only in memory for the duration of a single issuance flow and is
/// zeroized on drop. Never serialized.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct BlindingContext {
    verifying_key: [u8; 32],
    signing_key: SigningKeyBytes,
    blinding_secret: [u8; 32],
}

impl BlindingContext {
    pub fn new(
        verifying_key: [u8; 32],
        signing_key: SigningKeyBytes,
        blinding_secret: [u8; 32],
    ) -> Self {
        Self {
            verifying_key,
            signing_key,
            blinding_secret,
        }
    }

    pub fn verifying_key(&self) -> &[u8; 32] {
        &self.verifying_key
    }

    pub fn signing_key(&self) -> &SigningKeyBytes {
        &self.signing_key
    }

    pub fn blinding_secret(&self) -> &[u8; 32] {
        &self.blinding_secret
    }
}

impl fmt::Debug for BlindingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlindingContext")
            .field("verifying_key", &hex::encode(self.verifying_key))
            .finish_non_exhaustive()
    }
}

/// What the external signer receives: an opaque payment reference and the
/// blinded verifying key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlindedRequest {
    pub payment_reference: String,
    pub blinded_verifying_key: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Base64 serialization helpers
// ---------------------------------------------------------------------------

pub mod serde_b64 {
    pub mod vec {
        use base64::{engine::general_purpose::STANDARD, Engine};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&STANDARD.encode(bytes))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
            let s = String::deserialize(deserializer)?;
            STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
        }
    }

    pub mod array {
        use base64::{engine::general_purpose::STANDARD, Engine};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&STANDARD.encode(bytes))
        }

        pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            let bytes = zeroize::Zeroizing::new(
                STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)?,
            );
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| serde::de::Error::custom(format!("expected {} bytes", N)))
        }
    }
}
