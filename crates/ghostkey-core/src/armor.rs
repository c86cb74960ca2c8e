//! PEM-style armor: base64 wrapped at 64 columns between labelled delimiters.
//!
//! Parsers locate blocks by their delimiters, so surrounding text and
//! whitespace (including CRLF line endings) are ignored.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{GhostkeyError, GhostkeyResult};

pub const CERTIFICATE_LABEL: &str = "GHOSTKEY_CERTIFICATE_V1";
pub const SIGNING_KEY_LABEL: &str = "SIGNING_KEY_V1";
pub const SIGNED_MESSAGE_LABEL: &str = "SIGNED_MESSAGE_V1";
pub const DELEGATE_CERTIFICATE_LABEL: &str = "DELEGATE_CERTIFICATE_V1";

const LINE_WIDTH: usize = 64;

pub fn begin_marker(label: &str) -> String {
    format!("-----BEGIN {}-----", label)
}

pub fn end_marker(label: &str) -> String {
    format!("-----END {}-----", label)
}

/// Wrap `bytes` in a labelled armor block. The output ends with a newline.
pub fn armor(label: &str, bytes: &[u8]) -> String {
    let encoded = STANDARD.encode(bytes);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH + 64);
    out.push_str(&begin_marker(label));
    out.push('\n');
    // base64 output is ASCII so byte chunks are valid str slices
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }
    out.push_str(&end_marker(label));
    out.push('\n');
    out
}

/// True if `text` contains a complete block with this label.
pub fn contains_block(text: &str, label: &str) -> bool {
    block_body(text, label).is_some()
}

/// Locate the first `label` block in `text` and decode its body.
pub fn dearmor(text: &str, label: &str) -> GhostkeyResult<Vec<u8>> {
    let body = block_body(text, label)
        .ok_or_else(|| GhostkeyError::Encoding(format!("missing {} block", label)))?;
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(GhostkeyError::Encoding(format!("empty {} block", label)));
    }
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| GhostkeyError::Encoding(format!("invalid base64 in {} block: {}", label, e)))
}

fn block_body<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let begin = begin_marker(label);
    let end = end_marker(label);
    let start = text.find(&begin)? + begin.len();
    let len = text[start..].find(&end)?;
    Some(&text[start..start + len])
}
