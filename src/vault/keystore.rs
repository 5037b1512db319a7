//! OS-level secure storage for the vault encryption key.

use keyring::Entry;

use super::VaultError;

/// Key-value contract over the OS secure store. `get` distinguishes a
/// missing entry from an unreachable store; the latter is fatal.
pub trait KeyStore {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, VaultError>;
    fn set(&self, service: &str, account: &str, value: &str) -> Result<(), VaultError>;
}

/// Production key store backed by the OS keychain via `keyring`
pub struct KeyringStore;

impl KeyStore for KeyringStore {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, VaultError> {
        let entry = Entry::new(service, account)
            .map_err(|e| VaultError::KeyStore(e.to_string()))?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VaultError::KeyStore(e.to_string())),
        }
    }

    fn set(&self, service: &str, account: &str, value: &str) -> Result<(), VaultError> {
        let entry = Entry::new(service, account)
            .map_err(|e| VaultError::KeyStore(e.to_string()))?;
        entry
            .set_password(value)
            .map_err(|e| VaultError::KeyStore(e.to_string()))
    }
}

/// In-memory key store for tests
#[cfg(test)]
pub struct MemoryKeyStore {
    entries: std::cell::RefCell<std::collections::HashMap<(String, String), String>>,
    pub set_calls: std::cell::Cell<usize>,
}

#[cfg(test)]
impl MemoryKeyStore {
    pub fn new() -> Self {
        Self {
            entries: std::cell::RefCell::new(std::collections::HashMap::new()),
            set_calls: std::cell::Cell::new(0),
        }
    }
}

#[cfg(test)]
impl KeyStore for std::rc::Rc<MemoryKeyStore> {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, VaultError> {
        (**self).get(service, account)
    }

    fn set(&self, service: &str, account: &str, value: &str) -> Result<(), VaultError> {
        (**self).set(service, account, value)
    }
}

#[cfg(test)]
impl KeyStore for MemoryKeyStore {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, VaultError> {
        Ok(self
            .entries
            .borrow()
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    fn set(&self, service: &str, account: &str, value: &str) -> Result<(), VaultError> {
        self.set_calls.set(self.set_calls.get() + 1);
        self.entries
            .borrow_mut()
            .insert((service.to_string(), account.to_string()), value.to_string());
        Ok(())
    }
}
