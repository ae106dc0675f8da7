//! Per-recipient encryption

use crate::keys::KeyDirectory;
use tracing::{debug, error};
use zeyple_common::types::RecipientKey;
use zeyple_common::{Error, Result};

/// Encrypts plaintext for a single recipient key.
///
/// Output is always ASCII armored and produced in always-trust mode. One
/// key per call: every recipient gets its own ciphertext.
pub struct Encryptor<'a, D: KeyDirectory + ?Sized> {
    directory: &'a D,
}

impl<'a, D: KeyDirectory + ?Sized> Encryptor<'a, D> {
    pub fn new(directory: &'a D) -> Self {
        Self { directory }
    }

    /// Encrypt `plaintext` to `key`.
    ///
    /// An expired key fails with [`Error::KeyExpired`] before the engine is
    /// invoked.
    pub async fn encrypt(&self, plaintext: &[u8], key: &RecipientKey) -> Result<Vec<u8>> {
        if key.expired {
            error!("Key {} with user email {} is expired", key.id, key.email);
            return Err(Error::KeyExpired {
                key_id: key.id.clone(),
                email: key.email.clone(),
            });
        }

        debug!("Encrypting {} bytes to key {}", plaintext.len(), key.id);
        self.directory
            .encrypt_to(plaintext, std::slice::from_ref(&key.id))
            .await
    }
}
