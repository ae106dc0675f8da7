//! Configuration for Zeyple
//!
//! The configuration is read once at startup from `zeyple.conf` (INI, the
//! historical format) or a `.toml` file, deserialized into [`Config`] and
//! validated before any message is touched.

use ::config::File;
pub use ::config::FileFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the default locations
pub const CONFIG_FILE_NAME: &str = "zeyple.conf";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Filter behavior
    #[serde(default)]
    pub zeyple: ZeypleConfig,

    /// GnuPG engine configuration
    pub gpg: GpgConfig,

    /// SMTP relay the processed messages are handed to
    pub relay: RelayConfig,

    /// Key aliases: recipient address -> address whose key is used
    #[serde(default)]
    pub keyaliases: BTreeMap<String, String>,
}

/// Filter behavior configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZeypleConfig {
    /// Log file; logging is disabled when absent
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Drop messages for recipients without a key instead of sending them
    /// unencrypted
    #[serde(default)]
    pub force_encrypt: bool,

    /// Add the `X-Zeyple` provenance header
    #[serde(default)]
    pub add_header: bool,
}

/// GnuPG configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpgConfig {
    /// GnuPG home directory holding the public keyring
    pub home: PathBuf,

    /// Path to the gpg executable (looked up on PATH when absent)
    #[serde(default)]
    pub executable: Option<PathBuf>,
}

impl GpgConfig {
    /// The executable to run
    pub fn executable(&self) -> PathBuf {
        self.executable
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_gpg_executable()))
    }
}

fn default_gpg_executable() -> String {
    "gpg".to_string()
}

/// SMTP relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relay host
    pub host: String,

    /// Relay port
    pub port: u16,
}

impl Config {
    /// Load configuration from a single file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Err(crate::Error::Config(format!(
                "Cannot open config file {}",
                path.display()
            )));
        }

        Self::from_files(&[path.to_path_buf()])
    }

    /// Load configuration from the default locations.
    ///
    /// `/etc/zeyple.conf` is read first and `./zeyple.conf` overrides it.
    pub fn load() -> crate::Result<Self> {
        let paths = [
            Path::new("/etc").join(CONFIG_FILE_NAME),
            PathBuf::from(CONFIG_FILE_NAME),
        ];

        Self::from_files(&paths)
    }

    /// Parse configuration from a string
    pub fn parse(content: &str, format: FileFormat) -> crate::Result<Self> {
        let config: Config = ::config::Config::builder()
            .add_source(File::from_str(content, format))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn from_files(paths: &[PathBuf]) -> crate::Result<Self> {
        let existing: Vec<&PathBuf> = paths.iter().filter(|p| p.exists()).collect();
        if existing.is_empty() {
            return Err(crate::Error::Config("Cannot open config file".to_string()));
        }

        let mut builder = ::config::Config::builder();
        for path in existing {
            tracing::debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(File::from(path.as_path()).format(file_format(path)));
        }

        let config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check required fields that deserialization alone cannot enforce
    pub fn validate(&self) -> crate::Result<()> {
        if self.gpg.home.as_os_str().is_empty() {
            return Err(crate::Error::Config("gpg.home must not be empty".to_string()));
        }

        if self.relay.host.trim().is_empty() {
            return Err(crate::Error::Config("relay.host must not be empty".to_string()));
        }

        if self.relay.port == 0 {
            return Err(crate::Error::Config("relay.port must not be 0".to_string()));
        }

        if let Some(executable) = &self.gpg.executable {
            if executable.as_os_str().is_empty() {
                return Err(crate::Error::Config(
                    "gpg.executable must not be empty when set".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// `.toml` files are TOML, everything else is the INI `zeyple.conf` format
fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Ini,
    }
}
