//! Parsed RFC 5322 message
//!
//! The parser keeps the exact bytes of every header field and body so that
//! an unmodified message (or sub-part) serializes back byte-for-byte. Only
//! the pieces that need interpretation (Content-Type, From) are handed to
//! `mail_parser`.

use mail_parser::{MessageParser, MimeHeaders};
use std::sync::Arc;
use zeyple_common::{Error, Result};

/// Maximum multipart nesting that is parsed into child messages. Deeper
/// parts are kept as opaque bytes.
pub const MAX_DEPTH: usize = 64;

/// Line terminator style of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// Detect the style from the first line terminator in `data`
    pub fn detect(data: &[u8]) -> Self {
        match data.iter().position(|&b| b == b'\n') {
            Some(pos) if pos > 0 && data[pos - 1] == b'\r' => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// A single header field, kept as raw bytes (folded lines and terminator
/// included)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    name: String,
    raw: Arc<[u8]>,
}

impl HeaderField {
    /// Create a new `Name: value` field
    pub fn new(name: &str, value: &str, eol: LineEnding) -> Self {
        let mut raw = Vec::with_capacity(name.len() + value.len() + 4);
        raw.extend_from_slice(name.as_bytes());
        raw.extend_from_slice(b": ");
        raw.extend_from_slice(value.as_bytes());
        raw.extend_from_slice(eol.as_bytes());

        Self {
            name: name.to_string(),
            raw: raw.into(),
        }
    }

    fn from_raw(raw: &[u8]) -> Option<Self> {
        let colon = raw.iter().position(|&b| b == b':')?;
        let name = std::str::from_utf8(&raw[..colon]).ok()?.trim_end();
        if name.is_empty() || name.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            raw: raw.into(),
        })
    }

    /// Field name as written
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive name comparison
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// The complete field, including its line terminator
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Everything after the colon, folding and terminator included
    pub fn raw_value(&self) -> &[u8] {
        match self.raw.iter().position(|&b| b == b':') {
            Some(colon) => &self.raw[colon + 1..],
            None => &[],
        }
    }

    /// Unfolded, trimmed value
    pub fn value(&self) -> String {
        let value = String::from_utf8_lossy(self.raw_value());
        let mut unfolded = String::with_capacity(value.len());
        for (i, line) in value.split('\n').enumerate() {
            let line = line.trim_end_matches('\r');
            if i > 0 && !line.is_empty() {
                unfolded.push(' ');
            }
            unfolded.push_str(line.trim());
        }
        unfolded.trim().to_string()
    }
}

/// Parsed `Content-Type`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub main: String,
    pub sub: String,
    /// Parameters other than the type itself, in order
    pub params: Vec<(String, String)>,
}

impl ContentType {
    pub fn new(main: &str, sub: &str) -> Self {
        Self {
            main: main.to_ascii_lowercase(),
            sub: sub.to_ascii_lowercase(),
            params: Vec::new(),
        }
    }

    /// `text/plain`, the RFC 2045 default
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn is_multipart(&self) -> bool {
        self.main == "multipart"
    }

    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main, self.sub)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn boundary(&self) -> Option<&str> {
        self.param("boundary").filter(|b| !b.is_empty())
    }

    /// Render as a header value: `main/sub; name="value"; ...`.
    ///
    /// Values that are not printable ASCII use the RFC 2231 extended form
    /// `name*=utf-8''%XX...`.
    pub fn to_header_value(&self) -> String {
        let mut value = self.mime_type();
        for (name, param) in &self.params {
            value.push_str("; ");
            value.push_str(name);
            if param.bytes().all(|b| (b' '..=b'~').contains(&b)) {
                value.push_str("=\"");
                for c in param.chars() {
                    if c == '"' || c == '\\' {
                        value.push('\\');
                    }
                    value.push(c);
                }
                value.push('"');
            } else {
                value.push_str("*=utf-8''");
                value.push_str(&percent_encode(param));
            }
        }
        value
    }
}

/// RFC 2231 value encoding: attribute-chars stay, every other byte is `%XX`
fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Leaf body bytes, exactly as they appeared on the wire
    Single(Arc<[u8]>),
    /// Multipart body split on its boundary
    Multipart(Multipart),
}

impl Body {
    /// The body as it serializes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Single(bytes) => bytes,
            Body::Multipart(multipart) => multipart.raw(),
        }
    }
}

/// A multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multipart {
    boundary: String,
    preamble: Arc<[u8]>,
    parts: Vec<Arc<Message>>,
    epilogue: Arc<[u8]>,
    raw: Arc<[u8]>,
}

impl Multipart {
    /// Build a new multipart body, rendering it with `eol` line endings
    pub fn new(boundary: &str, preamble: &[u8], parts: Vec<Message>, eol: LineEnding) -> Self {
        let eol = eol.as_bytes();
        let mut raw = Vec::new();

        if !preamble.is_empty() {
            raw.extend_from_slice(preamble);
            raw.extend_from_slice(eol);
        }
        for part in &parts {
            raw.extend_from_slice(b"--");
            raw.extend_from_slice(boundary.as_bytes());
            raw.extend_from_slice(eol);
            raw.extend_from_slice(&part.to_bytes());
            raw.extend_from_slice(eol);
        }
        raw.extend_from_slice(b"--");
        raw.extend_from_slice(boundary.as_bytes());
        raw.extend_from_slice(b"--");
        raw.extend_from_slice(eol);

        Self {
            boundary: boundary.to_string(),
            preamble: preamble.into(),
            parts: parts.into_iter().map(Arc::new).collect(),
            epilogue: Arc::from(&[][..]),
            raw: raw.into(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn preamble(&self) -> &[u8] {
        &self.preamble
    }

    pub fn parts(&self) -> &[Arc<Message>] {
        &self.parts
    }

    pub fn epilogue(&self) -> &[u8] {
        &self.epilogue
    }

    /// The whole body, byte-for-byte
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Split `body` on `boundary`. Returns `None` when no delimiter line is
    /// found.
    fn split(body: &[u8], boundary: &str, depth: usize) -> Option<Self> {
        let delimiter = format!("--{}", boundary);
        let delimiter = delimiter.as_bytes();

        let mut preamble: Option<&[u8]> = None;
        let mut parts = Vec::new();
        let mut part_start = 0;
        let mut epilogue: &[u8] = &[];
        let mut closed = false;

        let mut line_start = 0;
        while line_start < body.len() {
            let line_end = match body[line_start..].iter().position(|&b| b == b'\n') {
                Some(pos) => line_start + pos + 1,
                None => body.len(),
            };
            let line = &body[line_start..line_end];

            if let Some(is_close) = match_delimiter(line, delimiter) {
                let content_end = strip_preceding_eol(body, line_start);
                match preamble {
                    None => preamble = Some(&body[..content_end]),
                    Some(_) => {
                        let content = &body[part_start..content_end.max(part_start)];
                        parts.push(Arc::new(Message::parse_part(content, depth + 1)));
                    }
                }
                part_start = line_end;

                if is_close {
                    epilogue = &body[line_end..];
                    closed = true;
                    break;
                }
            }

            line_start = line_end;
        }

        let preamble = preamble?;
        if !closed && part_start < body.len() {
            // Unterminated multipart: the last part runs to the end
            parts.push(Arc::new(Message::parse_part(&body[part_start..], depth + 1)));
        }

        Some(Self {
            boundary: boundary.to_string(),
            preamble: preamble.into(),
            parts,
            epilogue: epilogue.into(),
            raw: body.into(),
        })
    }
}

/// `Some(is_close)` if `line` is a delimiter line for `delimiter`
fn match_delimiter(line: &[u8], delimiter: &[u8]) -> Option<bool> {
    let rest = line.strip_prefix(delimiter)?;
    let (is_close, rest) = match rest.strip_prefix(b"--") {
        Some(rest) => (true, rest),
        None => (false, rest),
    };

    if rest.iter().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n')) {
        Some(is_close)
    } else {
        None
    }
}

/// The line terminator before a delimiter belongs to the delimiter
fn strip_preceding_eol(body: &[u8], pos: usize) -> usize {
    let mut end = pos;
    if end > 0 && body[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && body[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}

/// An immutable parsed message.
///
/// Cloning is cheap: byte buffers and child parts are shared. The `with_*`
/// methods return a new message and never touch the one they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    headers: Vec<HeaderField>,
    /// Terminator of the blank line separating headers from body, `None` for
    /// body parts that had no blank line
    separator: Option<LineEnding>,
    body: Body,
    eol: LineEnding,
}

impl Message {
    /// Parse a complete message. Fails when the header block is malformed or
    /// never terminated by a blank line.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (header_end, separator, body_start) = find_separator(data)
            .ok_or_else(|| Error::Parse("No header/body separator found".to_string()))?;

        let headers = parse_headers(&data[..header_end])
            .ok_or_else(|| Error::Parse("Malformed header line".to_string()))?;

        Ok(Self::assemble(
            headers,
            separator,
            &data[body_start..],
            LineEnding::detect(data),
            0,
        ))
    }

    /// Lenient parse for body parts: anything that does not look like a
    /// header block becomes an opaque body.
    fn parse_part(data: &[u8], depth: usize) -> Self {
        let eol = LineEnding::detect(data);

        if let Some((header_end, separator, body_start)) = find_separator(data) {
            if let Some(headers) = parse_headers(&data[..header_end]) {
                return Self::assemble(headers, separator, &data[body_start..], eol, depth);
            }
        }

        // No blank line: either a header-only part or opaque content
        let (headers, body) = match parse_headers(data).filter(|h| !h.is_empty()) {
            Some(headers) => (headers, Arc::from(&[][..])),
            None => (Vec::new(), Arc::from(data)),
        };

        Self {
            headers,
            separator: None,
            body: Body::Single(body),
            eol,
        }
    }

    fn assemble(
        headers: Vec<HeaderField>,
        separator: LineEnding,
        body: &[u8],
        eol: LineEnding,
        depth: usize,
    ) -> Self {
        let mut message = Self {
            headers,
            separator: Some(separator),
            body: Body::Single(body.into()),
            eol,
        };

        if depth < MAX_DEPTH {
            let content_type = message.content_type();
            if content_type.is_multipart() {
                if let Some(multipart) = content_type
                    .boundary()
                    .and_then(|boundary| Multipart::split(body, boundary, depth))
                {
                    message.body = Body::Multipart(multipart);
                }
            }
        }

        message
    }

    /// Create a new message from header fields and a body
    pub fn new(headers: Vec<HeaderField>, body: Body, eol: LineEnding) -> Self {
        Self {
            headers,
            separator: Some(eol),
            body,
            eol,
        }
    }

    pub fn headers(&self) -> &[HeaderField] {
        &self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Body bytes as they serialize
    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_bytes()
    }

    /// Child parts (empty for single-part bodies)
    pub fn parts(&self) -> &[Arc<Message>] {
        match &self.body {
            Body::Multipart(multipart) => multipart.parts(),
            Body::Single(_) => &[],
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, Body::Multipart(_))
    }

    pub fn line_ending(&self) -> LineEnding {
        self.eol
    }

    /// First header field with this name
    pub fn header_field(&self, name: &str) -> Option<&HeaderField> {
        self.headers.iter().find(|h| h.is(name))
    }

    /// Unfolded value of the first header with this name
    pub fn header(&self, name: &str) -> Option<String> {
        self.header_field(name).map(|h| h.value())
    }

    /// Number of header fields with this name
    pub fn header_count(&self, name: &str) -> usize {
        self.headers.iter().filter(|h| h.is(name)).count()
    }

    /// Value of the `Message-ID` header, for log context
    pub fn message_id(&self) -> Option<String> {
        self.header("Message-ID")
    }

    /// Parsed Content-Type, `text/plain` when absent or unparseable
    pub fn content_type(&self) -> ContentType {
        let field = match self.header_field("Content-Type") {
            Some(field) => field,
            None => return ContentType::text_plain(),
        };

        let block = self.single_field_block(field);
        MessageParser::default()
            .parse(&block[..])
            .and_then(|parsed| {
                parsed.content_type().map(|ct| {
                    let mut content_type = ContentType::new(ct.ctype(), ct.subtype().unwrap_or(""));
                    if let Some(attributes) = ct.attributes() {
                        for (name, value) in attributes {
                            content_type = content_type.with_param(name, value);
                        }
                    }
                    content_type
                })
            })
            .filter(|ct| !ct.main.is_empty() && !ct.sub.is_empty())
            .unwrap_or_else(ContentType::text_plain)
    }

    /// First address of the `From` header
    pub fn sender(&self) -> Option<String> {
        let field = self.header_field("From")?;
        let block = self.single_field_block(field);

        let parsed = MessageParser::default().parse(&block[..])?;
        parsed
            .from()
            .and_then(|a| a.first())
            .and_then(|a| a.address())
            .map(|email| email.to_string())
    }

    /// A header block holding only `field`, as input for `mail_parser`
    fn single_field_block(&self, field: &HeaderField) -> Vec<u8> {
        let mut block = field.raw().to_vec();
        if !block.ends_with(b"\n") {
            block.extend_from_slice(self.eol.as_bytes());
        }
        block.extend_from_slice(self.eol.as_bytes());
        block
    }

    /// Replace the first field named `name` in place (appending when absent)
    /// and drop any further fields with that name
    pub fn with_header_replaced(mut self, name: &str, value: &str) -> Self {
        let field = HeaderField::new(name, value, self.eol);
        match self.headers.iter().position(|h| h.is(name)) {
            Some(pos) => {
                self.headers[pos] = field;
                let mut index = 0;
                self.headers.retain(|h| {
                    let keep = index <= pos || !h.is(name);
                    index += 1;
                    keep
                });
            }
            None => self.headers.push(field),
        }
        self
    }

    /// Append a header field
    pub fn with_header_appended(mut self, name: &str, value: &str) -> Self {
        self.headers.push(HeaderField::new(name, value, self.eol));
        self
    }

    /// Remove every field named `name`
    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.retain(|h| !h.is(name));
        self
    }

    /// Replace the body
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self.separator.get_or_insert(self.eol);
        self
    }

    /// Serialize the message
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let mut out = Vec::with_capacity(body.len() + 1024);
        for header in &self.headers {
            out.extend_from_slice(header.raw());
        }
        if let Some(separator) = self.separator {
            out.extend_from_slice(separator.as_bytes());
        }
        out.extend_from_slice(body);
        out
    }
}

/// Find the blank line ending the header block:
/// `(header_end, separator_style, body_start)`
fn find_separator(data: &[u8]) -> Option<(usize, LineEnding, usize)> {
    let mut line_start = 0;
    while line_start < data.len() {
        let nl = line_start + data[line_start..].iter().position(|&b| b == b'\n')?;
        let line = &data[line_start..nl];

        if line.is_empty() {
            return Some((line_start, LineEnding::Lf, nl + 1));
        }
        if line == b"\r" {
            return Some((line_start, LineEnding::CrLf, nl + 1));
        }

        line_start = nl + 1;
    }
    None
}

/// Split a header block into fields. `None` when a line is neither a field
/// nor a continuation.
fn parse_headers(block: &[u8]) -> Option<Vec<HeaderField>> {
    let mut fields: Vec<Vec<u8>> = Vec::new();

    let mut line_start = 0;
    while line_start < block.len() {
        let line_end = match block[line_start..].iter().position(|&b| b == b'\n') {
            Some(pos) => line_start + pos + 1,
            None => block.len(),
        };
        let line = &block[line_start..line_end];

        if line[0] == b' ' || line[0] == b'\t' {
            // Continuation of the previous field
            fields.last_mut()?.extend_from_slice(line);
        } else {
            fields.push(line.to_vec());
        }

        line_start = line_end;
    }

    fields.iter().map(|raw| HeaderField::from_raw(raw)).collect()
}
