use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::StoreError;

/// Storage keys shared with the web client. Changing any of these orphans
/// state written by existing installs.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const ID_TOKEN: &str = "idToken";
    pub const REFRESH_TOKEN: &str = "refreshToken";

    pub const CREDENTIAL_ID: &str = "touchIDCredentialId";
    pub const REGISTERED: &str = "touchIDRegistered";
    pub const REGISTRATION_TIME: &str = "touchIDRegistrationTime";
    pub const VERIFIED: &str = "touchIDVerified";
    pub const VERIFICATION_TIME: &str = "touchIDVerificationTime";

    pub const IN_PROTECTED_AREA: &str = "inProtectedArea";
    pub const PROTECTED_AREA_TAB_ID: &str = "protectedAreaTabId";
    pub const ACTIVE_TAB_ID: &str = "activeTabId";

    /// Lives in the tab-scoped store, not the persistent one.
    pub const TAB_ID: &str = "tabId";
}

/// Flat string-keyed store. Reads never fail; an unreadable entry is absent.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// In-memory store. Backs the per-process tab store and every test.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.read().clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Remove every key, attempting all of them even if one fails.
pub fn remove_all(store: &dyn KeyValueStore, keys: &[&str]) -> Result<(), StoreError> {
    let mut first_err = None;
    for key in keys {
        if let Err(e) = store.remove(key) {
            log::error!("Failed to remove '{key}' from store: {e}");
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
