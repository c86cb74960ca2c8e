use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};

/// In-memory unlock state. Holds the password-derived key while unlocked.
///
/// Never serialized. The key is zeroized when the session locks or drops.
#[derive(Default)]
pub struct Session {
    derived_key: Option<Zeroizing<[u8; 32]>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unlock(&mut self, derived_key: Zeroizing<[u8; 32]>) {
        self.derived_key = Some(derived_key);
    }

    pub fn lock(&mut self) {
        // Dropping the Zeroizing wrapper clears the key.
        self.derived_key = None;
    }

    pub fn is_unlocked(&self) -> bool {
        self.derived_key.is_some()
    }

    pub fn key(&self) -> VaultResult<&[u8; 32]> {
        self.derived_key
            .as_ref()
            .map(|k| &**k)
            .ok_or(VaultError::Locked)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}
