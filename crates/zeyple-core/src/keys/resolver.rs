//! Recipient key resolution

use super::{AliasTable, KeyDirectory};
use tracing::{debug, info};
use zeyple_common::types::{strip_subaddress, RecipientKey};
use zeyple_common::Result;

/// Lookup rounds per recipient: the address itself, then the address with
/// its sub-addressing tag removed
pub const MAX_RESOLUTION_ATTEMPTS: usize = 2;

/// Resolves recipient addresses to keys
pub struct KeyResolver<'a, D: KeyDirectory + ?Sized> {
    directory: &'a D,
    aliases: &'a AliasTable,
}

impl<'a, D: KeyDirectory + ?Sized> KeyResolver<'a, D> {
    /// Create a new resolver
    pub fn new(directory: &'a D, aliases: &'a AliasTable) -> Self {
        Self { directory, aliases }
    }

    /// Find the key to encrypt to for `email`.
    ///
    /// Each round applies the alias table once, then accepts only a key with
    /// a user id email equal to the address. When that fails and the address
    /// carries a `+tag`, the next round starts over with the tag removed.
    pub async fn resolve(&self, email: &str) -> Result<Option<RecipientKey>> {
        let mut address = email.to_string();

        for _ in 0..MAX_RESOLUTION_ATTEMPTS {
            info!("Trying to encrypt for {}", address);

            if let Some(replacement) = self.aliases.lookup(&address) {
                address = replacement.to_string();
            }

            if let Some(key) = self.find_exact(&address).await? {
                return Ok(Some(key));
            }

            match strip_subaddress(&address) {
                Some(stripped) => {
                    debug!("No key for {}, retrying as {}", address, stripped);
                    address = stripped;
                }
                None => break,
            }
        }

        Ok(None)
    }

    /// Directory search can return unrelated keys (a search for "n" matches
    /// every uid containing an n), so the uid email must match exactly
    async fn find_exact(&self, address: &str) -> Result<Option<RecipientKey>> {
        let records = self.directory.search(address).await?;
        debug!("Directory returned {} candidate(s) for {}", records.len(), address);

        Ok(records
            .iter()
            .filter(|record| record.has_uid_email(address))
            .find_map(|record| RecipientKey::from_record(record, address)))
    }
}
