//! Ghost key certificate engine.
//!
//! Issues anonymous, tier-bound certificates with RSA blind signatures: the
//! delegate authority signs a ghost key's certificate payload without ever
//! seeing the key. Also verifies certificates and signs challenges and
//! messages with an issued ghost key.

pub mod engine;
pub mod error;
pub mod issuance;
pub mod signed_message;

pub use engine::{BlindSignatureEngine, BlindedKey};
pub use error::{CertError, CertResult};
pub use issuance::{
    HttpSigner, IssuanceClient, IssuedGhostkey, SignCertificateRequest, SignCertificateResponse,
    SignerEndpoint, ALREADY_SIGNED_MESSAGE,
};
pub use signed_message::SignedMessage;
