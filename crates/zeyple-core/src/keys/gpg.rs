//! GnuPG-backed key directory
//!
//! Runs the `gpg` executable against a dedicated home directory. Each
//! `GpgDirectory` carries its own executable/home pair and passes it on
//! every invocation, so two directories never share engine state.

use super::KeyDirectory;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};
use zeyple_common::config::GpgConfig;
use zeyple_common::types::KeyRecord;
use zeyple_common::{Error, Result};

/// Key directory and encryption engine backed by GnuPG
#[derive(Debug, Clone)]
pub struct GpgDirectory {
    executable: PathBuf,
    home: PathBuf,
}

impl GpgDirectory {
    /// Create a directory for the configured engine
    pub fn new(config: &GpgConfig) -> Result<Self> {
        Self::with_paths(config.executable(), &config.home)
    }

    /// Create a directory for an explicit executable and home
    pub fn with_paths(executable: PathBuf, home: &Path) -> Result<Self> {
        if !home.is_dir() {
            return Err(Error::Engine(format!(
                "GnuPG home {} is not a directory",
                home.display()
            )));
        }

        Ok(Self {
            executable,
            home: home.to_path_buf(),
        })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .arg("--homedir")
            .arg(&self.home)
            .arg("--batch")
            .arg("--no-tty")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_error(&self, e: std::io::Error) -> Error {
        Error::Engine(format!(
            "Failed to run {}: {}",
            self.executable.display(),
            e
        ))
    }
}

#[async_trait]
impl KeyDirectory for GpgDirectory {
    async fn search(&self, query: &str) -> Result<Vec<KeyRecord>> {
        let output = self
            .command()
            .arg("--with-colons")
            .arg("--fixed-list-mode")
            .arg("--list-keys")
            .arg("--")
            .arg(query)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stdout.trim().is_empty() {
                // gpg exits non-zero when nothing matches
                if stderr.contains("No public key") || stderr.contains("not found") {
                    debug!("No keys found for {}", query);
                    return Ok(Vec::new());
                }
                return Err(Error::Engine(format!(
                    "Key listing failed ({}): {}",
                    output.status,
                    stderr.trim()
                )));
            }
            warn!("Key listing for {} reported: {}", query, stderr.trim());
        }

        Ok(parse_colon_listing(&stdout))
    }

    async fn encrypt_to(&self, plaintext: &[u8], key_ids: &[String]) -> Result<Vec<u8>> {
        if key_ids.is_empty() {
            return Err(Error::Engine("No recipient key given".to_string()));
        }

        let mut command = self.command();
        command
            .arg("--yes")
            .arg("--armor")
            .arg("--trust-model")
            .arg("always")
            .arg("--encrypt");
        for key_id in key_ids {
            command.arg("--recipient").arg(key_id);
        }
        command.arg("--output").arg("-").stdin(Stdio::piped());

        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Engine("gpg stdin unavailable".to_string()))?;
        let input = plaintext.to_vec();
        // Feed stdin concurrently so a full stdout pipe cannot deadlock gpg
        let writer = tokio::spawn(async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::Engine(format!("gpg did not finish: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Engine(format!(
                "Encryption failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(Error::Engine(format!("Failed to write to gpg: {}", e))),
            Err(e) => return Err(Error::Engine(format!("gpg writer task failed: {}", e))),
        }

        if output.stdout.is_empty() {
            return Err(Error::Engine("gpg produced no ciphertext".to_string()));
        }

        Ok(output.stdout)
    }
}

/// Parse `gpg --with-colons --list-keys` output into key records.
///
/// `pub` starts a key (validity `e` marks it expired), `sub` adds a subkey
/// id after the primary id, and `uid` contributes the email of a user id.
pub fn parse_colon_listing(listing: &str) -> Vec<KeyRecord> {
    let mut records = Vec::new();
    let mut current: Option<KeyRecord> = None;

    for line in listing.lines() {
        let fields: Vec<&str> = line.split(':').collect();

        match fields[0] {
            "pub" => {
                if let Some(record) = current.take() {
                    records.push(record);
                }
                let mut record = KeyRecord {
                    expired: fields.get(1) == Some(&"e"),
                    ..Default::default()
                };
                if let Some(key_id) = fields.get(4).filter(|id| !id.is_empty()) {
                    record.subkey_ids.push(key_id.to_string());
                }
                current = Some(record);
            }
            "sub" => {
                if let (Some(record), Some(key_id)) = (current.as_mut(), fields.get(4)) {
                    if !key_id.is_empty() {
                        record.subkey_ids.push(key_id.to_string());
                    }
                }
            }
            "uid" => {
                if let (Some(record), Some(user_id)) = (current.as_mut(), fields.get(9)) {
                    if let Some(email) = uid_email(&unescape(user_id)) {
                        record.uid_emails.push(email);
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(record) = current {
        records.push(record);
    }

    records
}

/// Email part of a user id: `Name <email>` or a bare address
fn uid_email(user_id: &str) -> Option<String> {
    if let (Some(start), Some(end)) = (user_id.rfind('<'), user_id.rfind('>')) {
        if start < end {
            let email = user_id[start + 1..end].trim();
            return (!email.is_empty()).then(|| email.to_string());
        }
    }

    let trimmed = user_id.trim();
    trimmed.contains('@').then(|| trimmed.to_string())
}

/// Undo the `\xNN` escaping of colon listings
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1] == b'x' {
            let decoded = std::str::from_utf8(&bytes[i + 2..i + 4])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
