//! Encryption policy
//!
//! Decides per recipient whether the message is encrypted, sent as-is or
//! dropped, and annotates outgoing messages.

mod engine;

pub use engine::{Decision, EncryptionPolicy};
