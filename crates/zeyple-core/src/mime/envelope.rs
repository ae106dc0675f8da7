//! PGP/MIME envelope (RFC 3156 section 4)

use super::message::{Body, ContentType, HeaderField, LineEnding, Message, Multipart};
use super::new_boundary;

/// Preamble shown by mail clients that do not understand PGP/MIME
pub const PREAMBLE: &str = "This is an OpenPGP/MIME encrypted message (RFC 4880 and 3156)";

/// File name of the encrypted part
pub const ENCRYPTED_FILENAME: &str = "encrypted.asc";

const PGP_ENCRYPTED: &str = "application/pgp-encrypted";

/// The `application/pgp-encrypted` control part
pub fn version_part(eol: LineEnding) -> Message {
    let headers = vec![
        HeaderField::new("Content-Type", PGP_ENCRYPTED, eol),
        HeaderField::new("Content-Description", "PGP/MIME version identification", eol),
    ];
    let body = format!("Version: 1{}", eol.as_str());

    Message::new(headers, Body::Single(body.as_bytes().into()), eol)
}

/// The `application/octet-stream` part carrying the armored ciphertext
pub fn encrypted_part(ciphertext: &[u8], eol: LineEnding) -> Message {
    let content_type =
        ContentType::new("application", "octet-stream").with_param("name", ENCRYPTED_FILENAME);
    let headers = vec![
        HeaderField::new("Content-Type", &content_type.to_header_value(), eol),
        HeaderField::new("Content-Description", "OpenPGP encrypted message", eol),
        HeaderField::new(
            "Content-Disposition",
            &format!("inline; filename=\"{}\"", ENCRYPTED_FILENAME),
            eol,
        ),
    ];

    Message::new(headers, Body::Single(ciphertext.into()), eol)
}

/// Build the outgoing encrypted message for `original`.
///
/// Every original header is kept in order, except that Content-Type becomes
/// `multipart/encrypted` and Content-Transfer-Encoding is dropped. The body
/// is replaced by the version part and the encrypted part.
pub fn build_encrypted_message(original: &Message, ciphertext: &[u8]) -> Message {
    let eol = original.line_ending();
    let boundary = new_boundary(ciphertext);

    let content_type = ContentType::new("multipart", "encrypted")
        .with_param("protocol", PGP_ENCRYPTED)
        .with_param("boundary", &boundary);

    let body = Multipart::new(
        &boundary,
        PREAMBLE.as_bytes(),
        vec![version_part(eol), encrypted_part(ciphertext, eol)],
        eol,
    );

    let mut message = original
        .clone()
        .with_header_replaced("Content-Type", &content_type.to_header_value())
        .without_header("Content-Transfer-Encoding")
        .with_body(Body::Multipart(body));

    if message.header_field("MIME-Version").is_none() {
        message = message.with_header_appended("MIME-Version", "1.0");
    }

    message
}
