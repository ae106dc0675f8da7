//! MIME Module
//!
//! Parses outgoing messages without losing a byte, flattens them into the
//! plaintext that gets encrypted, and builds the PGP/MIME (RFC 3156)
//! envelope around the ciphertext.

mod envelope;
mod flatten;
mod message;

pub use envelope::{
    build_encrypted_message, encrypted_part, version_part, ENCRYPTED_FILENAME, PREAMBLE,
};
pub use flatten::flatten_for_encryption;
pub use message::{Body, ContentType, HeaderField, LineEnding, Message, Multipart, MAX_DEPTH};

use uuid::Uuid;

/// Generate a multipart boundary that does not occur in `content`
pub fn new_boundary(content: &[u8]) -> String {
    loop {
        let boundary = format!("=-Zeyple-{}", Uuid::new_v4().simple());
        if !contains(content, boundary.as_bytes()) {
            return boundary;
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
