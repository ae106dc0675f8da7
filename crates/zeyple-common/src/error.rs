//! Error types for Zeyple

use thiserror::Error;

/// Main error type for Zeyple
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Key {key_id} with user email {email} is expired")]
    KeyExpired { key_id: String, email: String },

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Zeyple
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the process exit code for this error (sysexits.h values,
    /// which the MTA pipe delivery agent interprets)
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 78,       // EX_CONFIG
            Error::Parse(_) => 65,        // EX_DATAERR
            Error::KeyExpired { .. } => 65,
            Error::Engine(_) => 69,       // EX_UNAVAILABLE
            Error::Transport(_) => 75,    // EX_TEMPFAIL
            Error::Io(_) => 74,           // EX_IOERR
            Error::Other(_) => 70,        // EX_SOFTWARE
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Parse(_) => "PARSE_ERROR",
            Error::KeyExpired { .. } => "KEY_EXPIRED",
            Error::Engine(_) => "ENGINE_ERROR",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::Config("x".into()).exit_code(), 78);
        assert_eq!(Error::Transport("x".into()).exit_code(), 75);
        assert_eq!(Error::Engine("x".into()).exit_code(), 69);
    }

    #[test]
    fn test_key_expired_message() {
        let err = Error::KeyExpired {
            key_id: "ABCDEF0123456789".to_string(),
            email: "user@example.com".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Key ABCDEF0123456789 with user email user@example.com is expired"
        );
        assert_eq!(err.code(), "KEY_EXPIRED");
    }
}
