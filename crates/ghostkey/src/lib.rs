//! Ghostkey root library
//!
//! Ties the workspace together for the `ghostkey` binary: configuration,
//! the aggregated error type, vault and engine wiring, issuance into the
//! vault, and the stdio bridge host.
//!
//! # Architecture
//!
//! The binary is a thin orchestrator. `initialize_root` opens the SQLite
//! vault and builds the blind signature engine and bridge handler over one
//! shared provider; each CLI command then works against the resulting
//! `RootState`.

pub mod config;
pub mod error;
pub mod host;

pub use config::{BridgeSection, IssuanceSection, RootConfig};
pub use error::{RootError, RootResult};
pub use host::run_stdio_host;

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use tracing::{info, warn};
use zeroize::Zeroizing;

use ghostkey_bridge::AuthHandler;
use ghostkey_cert::{BlindSignatureEngine, HttpSigner, IssuanceClient, SignerEndpoint};
use ghostkey_core::{
    CryptoProvider, DelegateCertificate, GhostkeyCertificate, KeyId, StandardProvider,
    StorageBackend,
};
use ghostkey_vault::{CredentialVault, SqliteBackend, VaultError};

// ---------------------------------------------------------------------------
// Root state
// ---------------------------------------------------------------------------

/// Initialized subsystem handles. Created by `initialize_root`.
pub struct RootState {
    pub config: RootConfig,
    pub vault: Arc<CredentialVault>,
    pub engine: BlindSignatureEngine,
    pub handler: Arc<AuthHandler>,
}

impl RootState {
    /// Wire the subsystems over an already-open storage backend.
    pub fn with_backend(config: RootConfig, backend: Arc<dyn StorageBackend>) -> RootResult<Self> {
        config.validate()?;
        let provider: Arc<dyn CryptoProvider> = Arc::new(StandardProvider::new(config.kdf));
        let vault = Arc::new(CredentialVault::new(provider.clone(), backend));
        let engine = BlindSignatureEngine::new(provider);
        let handler = Arc::new(AuthHandler::new(vault.clone(), engine.clone()));
        Ok(Self {
            config,
            vault,
            engine,
            handler,
        })
    }

    /// Unlock the vault, creating it on first use.
    pub fn unlock(&self, password: Option<&str>) -> RootResult<()> {
        let password = password.ok_or(RootError::PasswordRequired)?;
        if !self.vault.unlock(password)? {
            return Err(RootError::WrongPassword);
        }
        Ok(())
    }

    /// The signing service named in `[issuance]`.
    pub fn http_signer(&self) -> RootResult<HttpSigner> {
        Ok(HttpSigner::new(
            &self.config.issuance.endpoint,
            Duration::from_secs(self.config.issuance.timeout_secs),
        )?)
    }
}

/// Open the vault database named by `config` and wire the subsystems.
pub fn initialize_root(config: RootConfig) -> RootResult<RootState> {
    config.validate()?;

    info!(
        vault_path = %config.vault_path.display(),
        data_dir = %config.data_dir.display(),
        "initializing ghostkey"
    );

    std::fs::create_dir_all(&config.data_dir)?;
    if let Some(parent) = config.vault_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let backend = SqliteBackend::open(&config.vault_path)?;
    restrict_permissions(&config.vault_path);

    RootState::with_backend(config, Arc::new(backend))
}

/// Make the vault file owner-only. Failure leaves the file usable, so it is
/// reported rather than fatal.
fn restrict_permissions(path: &std::path::Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = std::fs::set_permissions(path, perms) {
            warn!(path = %path.display(), error = %e, "could not restrict vault file permissions");
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

// ---------------------------------------------------------------------------
// Offline verification
// ---------------------------------------------------------------------------

/// An engine for checking certificates without opening the vault.
pub fn verification_engine(config: &RootConfig) -> BlindSignatureEngine {
    BlindSignatureEngine::new(Arc::new(StandardProvider::new(config.kdf)))
}

/// Check that the master key endorsed `delegate`; returns its info text.
pub fn check_delegate(
    engine: &BlindSignatureEngine,
    delegate: &DelegateCertificate,
    master_verifying_key: &[u8; 32],
) -> RootResult<String> {
    if !engine.verify_delegate(delegate, master_verifying_key) {
        return Err(RootError::VerificationFailed);
    }
    Ok(engine.delegate_info(delegate)?)
}

/// Check the whole chain from the master key down to `certificate`;
/// returns the delegate's info text.
pub fn check_ghost_key(
    engine: &BlindSignatureEngine,
    certificate: &GhostkeyCertificate,
    master_verifying_key: &[u8; 32],
) -> RootResult<String> {
    if !engine.verify_endorsed(certificate, master_verifying_key) {
        return Err(RootError::VerificationFailed);
    }
    Ok(engine.delegate_info(&certificate.delegate_certificate)?)
}

// ---------------------------------------------------------------------------
// Issuance into the vault
// ---------------------------------------------------------------------------

/// Obtain a new ghost key from `signer` and store it in the vault.
///
/// The vault must already be unlocked: the signer refuses a payment
/// reference twice, so a certificate that could not be stored would be lost.
pub async fn issue_into_vault(
    state: &RootState,
    signer: Arc<dyn SignerEndpoint>,
    delegate: &DelegateCertificate,
    payment_reference: &str,
    label: &str,
) -> RootResult<KeyId> {
    if !state.vault.is_unlocked() {
        return Err(VaultError::Locked.into());
    }
    let master_verifying_key = state.config.master_key()?;

    let mut seed = Zeroizing::new([0u8; 32]);
    rand::rngs::OsRng.fill_bytes(seed.as_mut());

    let client = IssuanceClient::new(state.engine.clone(), signer, master_verifying_key);
    let issued = client.issue(delegate, payment_reference, &seed).await?;
    let id = state
        .vault
        .import_issued(&issued.certificate, &issued.signing_key, label)?;

    info!(key_id = %id, "ghost key issued and stored");
    Ok(id)
}
