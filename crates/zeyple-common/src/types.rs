//! Common types for Zeyple

use serde::{Deserialize, Serialize};
use std::fmt;

/// Product name used in the provenance header
pub const TITLE: &str = "Zeyple";

/// Product version used in the provenance header
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the provenance header added to processed messages
pub const PROVENANCE_HEADER: &str = "X-Zeyple";

/// Value of the provenance header: "processed by <name> v<version>"
pub fn provenance() -> String {
    format!("processed by {} v{}", TITLE, VERSION)
}

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.splitn(2, '@').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self::new(parts[0], parts[1]))
        } else {
            None
        }
    }

    /// Sub-addressing tag of the local part (`tag` in `user+tag@domain`).
    ///
    /// The tag must be at least one character long; a bare trailing `+`
    /// is part of the mailbox name.
    pub fn subaddress_tag(&self) -> Option<&str> {
        let pos = self.local.find('+')?;
        let tag = &self.local[pos + 1..];
        if tag.is_empty() {
            None
        } else {
            Some(tag)
        }
    }

    /// The same address with its sub-addressing tag removed, if it has one
    pub fn without_subaddress(&self) -> Option<Self> {
        self.subaddress_tag()?;
        let pos = self.local.find('+')?;
        Some(Self::new(&self.local[..pos], self.domain.clone()))
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

/// Strip the sub-addressing tag from an address string.
///
/// Returns `None` when the address has no tag (or is not an address at all).
pub fn strip_subaddress(address: &str) -> Option<String> {
    EmailAddress::parse(address)
        .and_then(|a| a.without_subaddress())
        .map(|a| a.to_string())
}

/// A key as reported by the key directory
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Emails of every user id on the key
    pub uid_emails: Vec<String>,
    /// Key ids, primary key first
    pub subkey_ids: Vec<String>,
    /// Whether the key is expired
    pub expired: bool,
}

impl KeyRecord {
    /// Id of the primary key
    pub fn primary_id(&self) -> Option<&str> {
        self.subkey_ids.first().map(|s| s.as_str())
    }

    /// Whether one of the user ids carries exactly this email (case-sensitive)
    pub fn has_uid_email(&self, email: &str) -> bool {
        self.uid_emails.iter().any(|uid| uid == email)
    }
}

/// Handle on the key selected for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientKey {
    /// Key id handed to the engine
    pub id: String,
    /// The user id email the key was matched on
    pub email: String,
    /// Whether the key is expired
    pub expired: bool,
}

impl RecipientKey {
    /// Build a recipient key from the record that matched `email`
    pub fn from_record(record: &KeyRecord, email: &str) -> Option<Self> {
        record.primary_id().map(|id| Self {
            id: id.to_string(),
            email: email.to_string(),
            expired: record.expired,
        })
    }
}

impl fmt::Display for RecipientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
