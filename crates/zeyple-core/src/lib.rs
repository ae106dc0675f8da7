//! Zeyple Core - outbound PGP/MIME encryption pipeline
//!
//! This crate provides the message model, key resolution, encryption,
//! policy and delivery pieces of Zeyple, tied together by [`Zeyple`].

pub mod crypto;
pub mod keys;
pub mod mime;
pub mod pipeline;
pub mod policy;
pub mod transport;

#[cfg(test)]
mod testing;

pub use crypto::Encryptor;
pub use keys::{AliasTable, GpgDirectory, KeyDirectory, KeyResolver};
pub use mime::Message;
pub use pipeline::{Delivered, Zeyple};
pub use policy::{Decision, EncryptionPolicy};
pub use transport::{SmtpRelay, Transport};
