//! Flattening a message into the plaintext that gets encrypted

use super::message::{Body, ContentType, HeaderField, LineEnding, Message, Multipart};
use super::new_boundary;

/// Produce the MIME entity to encrypt for `message`.
///
/// Multipart messages keep their body byte-for-byte behind a re-synthesized
/// `Content-Type:` line. Single-part messages are wrapped in a one-member
/// `multipart/mixed` container so both shapes decrypt to a multipart entity.
/// No `MIME-Version` is emitted: the outer envelope carries it.
pub fn flatten_for_encryption(message: &Message) -> Vec<u8> {
    let eol = message.line_ending();

    match message.body() {
        Body::Multipart(multipart) => flatten_multipart(message, multipart, eol),
        Body::Single(payload) => wrap_single_part(message, payload, eol),
    }
}

fn flatten_multipart(message: &Message, multipart: &Multipart, eol: LineEnding) -> Vec<u8> {
    let body = multipart.raw();
    let mut out = Vec::with_capacity(body.len() + 256);

    out.extend_from_slice(b"Content-Type:");
    match message.header_field("Content-Type") {
        Some(field) => {
            let value = field.raw_value();
            out.extend_from_slice(value);
            if !value.ends_with(b"\n") {
                out.extend_from_slice(eol.as_bytes());
            }
        }
        None => {
            // Unreachable for parsed input: a multipart body needs a boundary
            let content_type = ContentType::new("multipart", "mixed")
                .with_param("boundary", multipart.boundary());
            out.push(b' ');
            out.extend_from_slice(content_type.to_header_value().as_bytes());
            out.extend_from_slice(eol.as_bytes());
        }
    }
    out.extend_from_slice(eol.as_bytes());
    out.extend_from_slice(body);
    out
}

fn wrap_single_part(message: &Message, payload: &std::sync::Arc<[u8]>, eol: LineEnding) -> Vec<u8> {
    let content_type = message.content_type();

    let mut headers = vec![HeaderField::new(
        "Content-Type",
        &content_type.to_header_value(),
        eol,
    )];
    if let Some(encoding) = message.header("Content-Transfer-Encoding") {
        headers.push(HeaderField::new("Content-Transfer-Encoding", &encoding, eol));
    }
    let part = Message::new(headers, Body::Single(payload.clone()), eol);

    let boundary = new_boundary(payload);
    let mixed = ContentType::new("multipart", "mixed").with_param("boundary", &boundary);
    let wrapper = Message::new(
        vec![HeaderField::new("Content-Type", &mixed.to_header_value(), eol)],
        Body::Multipart(Multipart::new(&boundary, b"", vec![part], eol)),
        eol,
    );

    wrapper.to_bytes()
}
