//! Key Module
//!
//! Resolves recipient addresses to encryption keys through a key
//! directory, with alias and sub-address fallback.

mod alias;
mod gpg;
mod resolver;

pub use alias::AliasTable;
pub use gpg::{parse_colon_listing, GpgDirectory};
pub use resolver::{KeyResolver, MAX_RESOLUTION_ATTEMPTS};

use async_trait::async_trait;
use zeyple_common::types::KeyRecord;
use zeyple_common::Result;

/// Access to the keyring and the encryption engine behind it.
///
/// One instance is one engine context; it is created per invocation and
/// never shared between concurrent runs.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Keys matching `query`. Matching may be fuzzy: callers must verify
    /// the user ids of the returned records.
    async fn search(&self, query: &str) -> Result<Vec<KeyRecord>>;

    /// Encrypt `plaintext` to the given key ids. Output is ASCII armored
    /// and the keys are used without checking their trust.
    async fn encrypt_to(&self, plaintext: &[u8], key_ids: &[String]) -> Result<Vec<u8>>;
}
