//! Character-encoding resolution and strict text decoding.
//!
//! Legacy Stata files from non-English locales frequently mis-declare their
//! encoding, so loaders decode text through an ordered candidate list and
//! take the first encoding that decodes every text field cleanly. The
//! historical candidate list (utf-8, windows-1252, iso-8859-1, latin1)
//! collapses to two entries here: under WHATWG labels the iso-8859-1 and
//! latin1 names resolve to windows-1252, whose decoder accepts any byte
//! sequence, so later candidates would be unreachable anyway.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::error::ParseError;

/// Fallback encodings, tried in order until one decodes without error.
pub const ENCODING_CANDIDATES: &[&Encoding] = &[UTF_8, WINDOWS_1252];

/// Resolve a user-supplied encoding label such as `utf-8` or `windows-1252`.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding, ParseError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| ParseError::UnknownEncoding(label.to_string()))
}

/// Decode `bytes` with `encoding`, failing on any malformed sequence.
pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String, ParseError> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(ParseError::Decode {
            encoding: encoding.name(),
        })
    } else {
        Ok(text.into_owned())
    }
}

/// Decode a NUL-padded fixed-width field, ignoring everything from the first
/// NUL onwards.
pub fn decode_padded(bytes: &[u8], encoding: &'static Encoding) -> Result<String, ParseError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    decode_bytes(&bytes[..end], encoding)
}
