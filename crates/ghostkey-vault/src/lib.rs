//! Encrypted at-rest storage for ghost keys.
//!
//! A single password unlocks the vault: Argon2id turns it into an AES-256-GCM
//! key that seals each stored credential under its own random IV. The key
//! lives only in the in-memory [`Session`](session::Session).

pub mod credential;
pub mod envelope;
pub mod error;
pub mod in_memory_backend;
pub mod session;
pub mod stored;
pub mod vault;

#[cfg(feature = "sqlite")]
pub mod storage;

pub use credential::{parse_armored, to_armored, ParsedCredential};
pub use error::*;
pub use in_memory_backend::InMemoryBackend;
pub use stored::{EncryptedKey, GhostkeyEntry, KeyMetadata, StoredVault, VAULT_VERSION};
pub use vault::{CredentialVault, VAULT_RECORD_ID};

#[cfg(feature = "sqlite")]
pub use storage::SqliteBackend;
