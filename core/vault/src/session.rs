//! Vault session management.
//!
//! A session holds the derived key bundle for as long as the vault is open.
//! Keys are zeroized when the session is locked or dropped.

use std::fmt;
use uuid::Uuid;

use crate::config::VaultConfig;
use framevault_common::{Error, Result};
use framevault_crypto::{derive_vault_keys, VaultKeys};

/// Random identifier of one open session, used as a log field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Generate a new unique session handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the handle string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of the vault session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Keys are available.
    Active,
    /// Keys have been erased.
    Locked,
}

/// Key-holding half of an open vault.
pub struct VaultSession {
    handle: SessionHandle,
    keys: Option<VaultKeys>,
    state: SessionState,
}

impl VaultSession {
    /// Derive keys from a passphrase and start a session.
    ///
    /// # Errors
    /// - Empty passphrase
    /// - Key derivation failure (fatal, never retried)
    pub fn unlock(passphrase: &[u8], config: &VaultConfig) -> Result<Self> {
        let keys = derive_vault_keys(passphrase, &config.salt)?;
        Ok(Self::from_keys(keys))
    }

    /// Start a session from an already-derived bundle.
    pub fn from_keys(keys: VaultKeys) -> Self {
        Self {
            handle: SessionHandle::new(),
            keys: Some(keys),
            state: SessionState::Active,
        }
    }

    /// Get the session handle.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Get the key bundle, if the session is active.
    ///
    /// # Errors
    /// - Returns `NotPermitted` if the session is locked
    pub fn keys(&self) -> Result<&VaultKeys> {
        match (self.state, self.keys.as_ref()) {
            (SessionState::Active, Some(keys)) => Ok(keys),
            _ => Err(Error::NotPermitted("Session is locked".to_string())),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Erase the keys. The session cannot be reactivated.
    pub fn lock(&mut self) {
        // VaultKeys members zeroize on drop.
        self.keys = None;
        self.state = SessionState::Locked;
    }
}

impl fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSession")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for VaultSession {
    fn drop(&mut self) {
        self.lock();
    }
}
