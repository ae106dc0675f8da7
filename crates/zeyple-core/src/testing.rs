//! In-memory collaborators for unit tests

use crate::keys::KeyDirectory;
use crate::transport::Transport;
use async_trait::async_trait;
use std::sync::Mutex;
use zeyple_common::types::KeyRecord;
use zeyple_common::{Error, Result};

/// Key directory backed by a list of records. Search is a substring match
/// on uid emails, as loose as a real keyring search.
#[derive(Default)]
pub struct MemoryDirectory {
    records: Vec<KeyRecord>,
    searches: Mutex<Vec<String>>,
    encryptions: Mutex<Vec<(Vec<u8>, Vec<String>)>>,
    fail_encrypt: bool,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(self, email: &str, key_id: &str) -> Self {
        self.with_record(email, key_id, false)
    }

    pub fn with_expired_key(self, email: &str, key_id: &str) -> Self {
        self.with_record(email, key_id, true)
    }

    fn with_record(mut self, email: &str, key_id: &str, expired: bool) -> Self {
        self.records.push(KeyRecord {
            uid_emails: vec![email.to_string()],
            subkey_ids: vec![key_id.to_string(), format!("{}-SUB", key_id)],
            expired,
        });
        self
    }

    pub fn failing_encryption(mut self) -> Self {
        self.fail_encrypt = true;
        self
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }

    /// (plaintext, key ids) of every encryption performed
    pub fn encryptions(&self) -> Vec<(Vec<u8>, Vec<String>)> {
        self.encryptions.lock().unwrap().clone()
    }

    /// Deterministic stand-in for armored ciphertext
    pub fn ciphertext_for(plaintext: &[u8], key_ids: &[String]) -> Vec<u8> {
        format!(
            "-----BEGIN PGP MESSAGE-----\n\n{}:{}\n-----END PGP MESSAGE-----\n",
            key_ids.join(","),
            plaintext.len()
        )
        .into_bytes()
    }
}

#[async_trait]
impl KeyDirectory for MemoryDirectory {
    async fn search(&self, query: &str) -> Result<Vec<KeyRecord>> {
        self.searches.lock().unwrap().push(query.to_string());
        Ok(self
            .records
            .iter()
            .filter(|r| r.uid_emails.iter().any(|uid| uid.contains(query)))
            .cloned()
            .collect())
    }

    async fn encrypt_to(&self, plaintext: &[u8], key_ids: &[String]) -> Result<Vec<u8>> {
        if self.fail_encrypt {
            return Err(Error::Engine("engine unavailable".to_string()));
        }
        self.encryptions
            .lock()
            .unwrap()
            .push((plaintext.to_vec(), key_ids.to_vec()));
        Ok(Self::ciphertext_for(plaintext, key_ids))
    }
}

/// Transport that records deliveries instead of sending them
#[derive(Default)]
pub struct RecordingTransport {
    deliveries: Mutex<Vec<(Option<String>, String, Vec<u8>)>>,
    fail_for: Option<String>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when delivering to `recipient`
    pub fn failing_for(mut self, recipient: &str) -> Self {
        self.fail_for = Some(recipient.to_string());
        self
    }

    /// (from, to, message bytes) of every delivery
    pub fn deliveries(&self) -> Vec<(Option<String>, String, Vec<u8>)> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.deliveries().into_iter().map(|(_, to, _)| to).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver(&self, from: Option<&str>, to: &str, message: &[u8]) -> Result<()> {
        if self.fail_for.as_deref() == Some(to) {
            return Err(Error::Transport(format!("relay refused {}", to)));
        }
        self.deliveries.lock().unwrap().push((
            from.map(|f| f.to_string()),
            to.to_string(),
            message.to_vec(),
        ));
        Ok(())
    }
}
