//! Key aliases from the `[keyaliases]` configuration section

use std::collections::BTreeMap;
use tracing::debug;

/// Maps an alias address to the address whose key should be used.
///
/// Lookups are case-insensitive on the alias side, matching how the
/// configuration file folds option names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: BTreeMap<String, String>,
}

impl AliasTable {
    /// Create an empty alias table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an alias
    pub fn insert(&mut self, alias: &str, replacement: &str) {
        self.entries
            .insert(alias.trim().to_lowercase(), replacement.trim().to_string());
    }

    /// Replacement address for `address`, if one is configured
    pub fn lookup(&self, address: &str) -> Option<&str> {
        let replacement = self.entries.get(&address.to_lowercase())?;
        debug!("Using key alias {} for {}", replacement, address);
        Some(replacement.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<&BTreeMap<String, String>> for AliasTable {
    fn from(entries: &BTreeMap<String, String>) -> Self {
        let mut table = Self::new();
        for (alias, replacement) in entries {
            table.insert(alias, replacement);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let mut table = AliasTable::new();
        table.insert("Team@Example.com", "lead@example.com");

        assert_eq!(table.lookup("team@example.com"), Some("lead@example.com"));
        assert_eq!(table.lookup("TEAM@EXAMPLE.COM"), Some("lead@example.com"));
        assert_eq!(table.lookup("other@example.com"), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_from_config_map() {
        let mut entries = BTreeMap::new();
        entries.insert("a@example.com".to_string(), " b@example.com ".to_string());

        let table = AliasTable::from(&entries);
        assert_eq!(table.lookup("a@example.com"), Some("b@example.com"));
    }
}
