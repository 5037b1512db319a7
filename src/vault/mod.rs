//! Encrypted local credential cache.
//!
//! The vault encrypts cached user passwords with a ChaCha20-Poly1305 key
//! held in the OS keychain under a fixed service/account identity. The key
//! is generated on first use and is stable across process invocations; if
//! the keychain entry is ever lost, every cached password silently becomes
//! undecryptable and the login flow falls back to prompting.
//!
//! Ciphertext layout: a fresh random 96-bit nonce prefixed to the AEAD
//! output, the whole encoded as URL-safe base64.

pub mod keystore;

use std::cell::RefCell;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use thiserror::Error;
use tracing::debug;

use crate::config::{CachedUser, ConfigError, ConfigStore};

pub use keystore::{KeyStore, KeyringStore};

/// Keychain identity for the vault encryption key
const KEYRING_SERVICE: &str = "atlasctl-credentials";
const KEYRING_ACCOUNT: &str = "encryption-key";

/// ChaCha20-Poly1305 nonce length in bytes
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("secure key store unavailable: {0}")]
    KeyStore(String),

    #[error("stored encryption key is invalid")]
    InvalidKey,

    #[error("encryption failed")]
    Encrypt,

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Decrypt failures are non-fatal and degrade to a fresh password prompt.
/// The variants distinguish undecodable text, a payload shorter than the
/// nonce prefix, and a cipher rejection (wrong key or corrupted data look
/// identical at this layer).
#[derive(Error, Debug)]
pub enum DecryptError {
    #[error("ciphertext is not valid base64")]
    Encoding(#[from] base64::DecodeError),

    #[error("ciphertext is shorter than the nonce prefix")]
    TooShort,

    #[error("decryption failed: wrong key or corrupted data")]
    Cipher,

    #[error("decrypted payload is not valid UTF-8")]
    NotText,
}

pub struct Vault<'a> {
    config: &'a ConfigStore,
    keys: Box<dyn KeyStore>,
    // Cached after the first keychain round trip so repeated calls within
    // one process always see the identical key.
    key: RefCell<Option<Key>>,
}

impl<'a> Vault<'a> {
    pub fn new(config: &'a ConfigStore) -> Self {
        Self::with_key_store(config, Box::new(KeyringStore))
    }

    pub fn with_key_store(config: &'a ConfigStore, keys: Box<dyn KeyStore>) -> Self {
        Self {
            config,
            keys,
            key: RefCell::new(None),
        }
    }

    /// Fetch the vault key from the OS secure store, generating and
    /// persisting a fresh 256-bit key on first use.
    pub fn get_or_create_key(&self) -> Result<Key, VaultError> {
        if let Some(key) = *self.key.borrow() {
            return Ok(key);
        }

        let key = match self.keys.get(KEYRING_SERVICE, KEYRING_ACCOUNT)? {
            Some(encoded) => {
                let raw = STANDARD.decode(&encoded).map_err(|_| VaultError::InvalidKey)?;
                if raw.len() != 32 {
                    return Err(VaultError::InvalidKey);
                }
                Key::clone_from_slice(&raw)
            }
            None => {
                let key = ChaCha20Poly1305::generate_key(&mut OsRng);
                self.keys
                    .set(KEYRING_SERVICE, KEYRING_ACCOUNT, &STANDARD.encode(key))?;
                debug!("generated new vault encryption key");
                key
            }
        };

        *self.key.borrow_mut() = Some(key);
        Ok(key)
    }

    /// Encrypt a password for at-rest storage. Each call uses a fresh
    /// random nonce, so encrypting the same plaintext twice yields
    /// different ciphertexts.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let key = self.get_or_create_key()?;
        let cipher = ChaCha20Poly1305::new(&key);

        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Encrypt)?;

        let mut raw = nonce.to_vec();
        raw.extend_from_slice(&sealed);
        Ok(URL_SAFE.encode(raw))
    }

    /// Decrypt a stored password. Failures surface as
    /// `VaultError::Decrypt` so callers can degrade to a re-prompt.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, VaultError> {
        let key = self.get_or_create_key()?;
        let cipher = ChaCha20Poly1305::new(&key);

        let raw = URL_SAFE.decode(ciphertext).map_err(DecryptError::from)?;
        if raw.len() < NONCE_LEN {
            return Err(DecryptError::TooShort.into());
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| DecryptError::Cipher)?;
        String::from_utf8(plaintext).map_err(|_| DecryptError::NotText.into())
    }

    /// Cached users for an environment
    pub fn users(&self, environment: &str) -> Result<Vec<CachedUser>, VaultError> {
        Ok(self.config.users(environment)?)
    }

    /// Insert or replace a cached user's encrypted password and token.
    /// Called only after the full login chain has succeeded.
    pub fn upsert_user(
        &self,
        environment: &str,
        user_id: &str,
        encrypted_password: &str,
        token: &str,
    ) -> Result<(), VaultError> {
        self.config.upsert_user(
            environment,
            CachedUser {
                userid: user_id.to_string(),
                password: encrypted_password.to_string(),
                token: token.to_string(),
            },
        )?;
        Ok(())
    }
}
