//! Bearer token persistence in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
#[cfg(test)]
use std::sync::OnceLock;

#[cfg(not(test))]
use keyring::Entry;
use posbindu_core::util::normalize_text_option;
use posbindu_core::CredentialProvider;

use crate::error::CliError;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "posbindu-cli";

type AuthResult<T> = Result<T, CliError>;

fn secure_storage_error(error: impl std::fmt::Display) -> CliError {
    CliError::Auth(format!("Secure storage error: {error}"))
}

#[derive(Clone)]
pub struct TokenStore {
    username: String,
}

impl TokenStore {
    pub fn new(profile_name: &str) -> Self {
        Self {
            username: format!("bearer_token:{profile_name}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> AuthResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username).map_err(secure_storage_error)
    }

    #[cfg(not(test))]
    pub fn load(&self) -> AuthResult<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(secure_storage_error(error)),
        }
    }

    #[cfg(test)]
    pub fn load(&self) -> AuthResult<Option<String>> {
        let guard = Self::test_store().lock().map_err(secure_storage_error)?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    pub fn save(&self, token: &str) -> AuthResult<()> {
        self.entry()?
            .set_password(token)
            .map_err(secure_storage_error)
    }

    #[cfg(test)]
    pub fn save(&self, token: &str) -> AuthResult<()> {
        let mut guard = Self::test_store().lock().map_err(secure_storage_error)?;
        guard.insert(self.username.clone(), token.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    pub fn clear(&self) -> AuthResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(secure_storage_error(error)),
        }
    }

    #[cfg(test)]
    pub fn clear(&self) -> AuthResult<()> {
        let mut guard = Self::test_store().lock().map_err(secure_storage_error)?;
        guard.remove(&self.username);
        Ok(())
    }
}

/// Credential provider backed by the keychain entry of one profile.
///
/// `POSBINDU_API_TOKEN` overrides the stored token. When the remote rejects
/// the token the keychain entry is removed, so the next command starts
/// without a credential until `posbindu auth login` runs again.
pub struct KeyringCredentials {
    store: TokenStore,
    token: Mutex<Option<String>>,
}

impl KeyringCredentials {
    pub fn for_profile(profile_name: &str) -> AuthResult<Self> {
        let store = TokenStore::new(profile_name);
        let token = match normalize_text_option(std::env::var("POSBINDU_API_TOKEN").ok()) {
            Some(token) => Some(token),
            None => store.load()?,
        };
        Ok(Self {
            store,
            token: Mutex::new(token),
        })
    }
}

impl CredentialProvider for KeyringCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Err(error) = self.store.clear() {
            tracing::warn!("Failed to remove rejected token from keychain: {error}");
        } else {
            tracing::info!("Removed rejected bearer token; run `posbindu auth login`");
        }
    }
}
