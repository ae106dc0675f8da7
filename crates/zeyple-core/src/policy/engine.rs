//! Policy decisions for one recipient

use crate::mime::Message;
use tracing::{error, info, warn};
use zeyple_common::config::ZeypleConfig;
use zeyple_common::types::{provenance, RecipientKey, PROVENANCE_HEADER};

/// What to do with the message for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Encrypt to the resolved key
    Encrypt(RecipientKey),
    /// Deliver an unmodified copy
    PassThrough,
    /// Do not deliver at all
    Drop,
}

/// Policy switches, read once from the configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncryptionPolicy {
    /// Drop recipients without a key instead of sending in clear
    pub force_encrypt: bool,
    /// Add the provenance header to outgoing messages
    pub add_header: bool,
}

impl EncryptionPolicy {
    pub fn new(force_encrypt: bool, add_header: bool) -> Self {
        Self {
            force_encrypt,
            add_header,
        }
    }

    /// Decide from the outcome of key resolution for `recipient`
    pub fn decide(&self, recipient: &str, key: Option<RecipientKey>) -> Decision {
        match key {
            Some(key) => {
                info!("Encrypting for {} with key {}", recipient, key.id);
                Decision::Encrypt(key)
            }
            None if self.force_encrypt => {
                error!("No keys found for {}, message will not be sent!", recipient);
                Decision::Drop
            }
            None => {
                warn!("No keys found for {}, message will be sent unencrypted", recipient);
                Decision::PassThrough
            }
        }
    }

    /// Append the provenance header when enabled
    pub fn annotate(&self, message: Message) -> Message {
        if self.add_header {
            message.with_header_appended(PROVENANCE_HEADER, &provenance())
        } else {
            message
        }
    }
}

impl From<&ZeypleConfig> for EncryptionPolicy {
    fn from(config: &ZeypleConfig) -> Self {
        Self::new(config.force_encrypt, config.add_header)
    }
}
