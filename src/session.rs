//! Access-credential session state.
//!
//! The upstream feed authenticates with a short-lived token the operator
//! supplies once per trading day. The scanner reads it every cycle; the
//! control server sets and clears it. The token is held as a
//! `SecretString` so it is redacted from Debug output and never logged.

use secrecy::SecretString;
use std::sync::{Arc, RwLock};

/// Thread-safe holder for the current access credential.
///
/// Cloning shares the same underlying slot, so the scanner task and the
/// arming handlers all observe the same state.
#[derive(Clone, Default)]
pub struct SessionManager {
    credential: Arc<RwLock<Option<SecretString>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the session with a fresh credential, replacing any previous one.
    pub fn set(&self, credential: SecretString) {
        let mut guard = match self.credential.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(credential);
    }

    /// Current credential, if armed.
    pub fn get(&self) -> Option<SecretString> {
        let guard = match self.credential.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }

    /// Drop the credential. Idempotent.
    pub fn clear(&self) {
        let mut guard = match self.credential.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
    }

    pub fn is_armed(&self) -> bool {
        let guard = match self.credential.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.is_some()
    }
}
