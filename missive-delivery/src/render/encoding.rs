//! Line ending normalisation and MIME transfer encodings.

use std::fmt::Write as _;

/// Longest encoded line, excluding the CRLF.
const MAX_LINE: usize = 76;

/// Convert every bare `\n` into `\r\n`.
///
/// Existing `\r\n` pairs and lone `\r` are left as they are, so applying this
/// twice gives the same result as applying it once.
#[must_use]
pub fn normalize_crlf(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 32);
    let mut previous = None;

    for ch in input.chars() {
        if ch == '\n' && previous != Some('\r') {
            out.push('\r');
        }
        out.push(ch);
        previous = Some(ch);
    }

    out
}

/// Quoted-printable encode `input` (RFC 2045 section 6.7).
///
/// `input` is expected to use CRLF line endings; each CRLF is kept as a hard
/// line break. Whitespace at the end of a line is escaped, and lines are
/// wrapped with soft breaks so no encoded line exceeds 76 characters.
#[must_use]
pub fn quoted_printable(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    let mut lines = input.split("\r\n").peekable();

    while let Some(line) = lines.next() {
        encode_line(line.as_bytes(), &mut out);
        if lines.peek().is_some() {
            out.push_str("\r\n");
        }
    }

    out
}

fn encode_line(line: &[u8], out: &mut String) {
    let mut column = 0;

    for (i, &byte) in line.iter().enumerate() {
        let last = i + 1 == line.len();
        let literal = match byte {
            b' ' | b'\t' => !last,
            b'=' => false,
            33..=126 => true,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        // The final character of a line may use the column a soft break
        // would otherwise need.
        let limit = if last { MAX_LINE } else { MAX_LINE - 1 };
        if column + width > limit {
            out.push_str("=\r\n");
            column = 0;
        }

        if literal {
            out.push(char::from(byte));
        } else {
            push_hex(byte, out);
        }
        column += width;
    }
}

fn push_hex(byte: u8, out: &mut String) {
    let _ = write!(out, "={byte:02X}");
}

/// Append an already encoded `tail` to an encoded `head`.
///
/// A soft break is inserted when `head` does not end on a line boundary so
/// the line length limit still holds after joining.
pub(crate) fn join_encoded(head: &str, tail: &str, out: &mut String) {
    out.push_str(head);
    if !head.is_empty() && !head.ends_with("\r\n") && !tail.is_empty() {
        out.push_str("=\r\n");
    }
    out.push_str(tail);
}

/// Overhead of `=?utf-8?q?` and `?=`.
const ENCODED_WORD_OVERHEAD: usize = 12;
const MAX_ENCODED_WORD: usize = 75;

/// Encode a header value as RFC 2047 `Q` encoded-words if it is not plain
/// printable ASCII; such values are returned unchanged. Control characters,
/// CR and LF included, always force encoding.
///
/// Long values are split across several encoded-words on character
/// boundaries, separated by folding whitespace.
#[must_use]
pub fn encode_header(value: &str) -> String {
    if value.is_ascii() && !value.contains("=?") && !value.chars().any(|c| c.is_ascii_control()) {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut word = String::new();
    let mut buf = [0; 4];

    for ch in value.chars() {
        let mut encoded = String::new();
        for &byte in ch.encode_utf8(&mut buf).as_bytes() {
            match byte {
                b' ' => encoded.push('_'),
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'!' | b'*' | b'+' | b'-' | b'/' => {
                    encoded.push(char::from(byte));
                }
                _ => push_hex(byte, &mut encoded),
            }
        }

        if word.len() + encoded.len() > MAX_ENCODED_WORD - ENCODED_WORD_OVERHEAD {
            words.push(std::mem::take(&mut word));
        }
        word.push_str(&encoded);
    }
    if !word.is_empty() {
        words.push(word);
    }

    words
        .iter()
        .map(|word| format!("=?utf-8?q?{word}?="))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// Encode the display name of a `Name <addr>` header value.
///
/// The angle address is kept as written. A name that needs no encoding is
/// also kept as written, quotes included. Anything else goes through
/// [`encode_header`] whole.
#[must_use]
pub fn encode_mailbox(value: &str) -> String {
    match value.rsplit_once('<') {
        Some((name, addr))
            if !name.trim().is_empty() && !addr.chars().any(|c| c.is_ascii_control()) =>
        {
            let trimmed = name.trim();
            let bare = trimmed
                .strip_prefix('"')
                .and_then(|n| n.strip_suffix('"'))
                .unwrap_or(trimmed);

            let encoded = encode_header(bare);
            if encoded == bare {
                format!("{trimmed} <{addr}")
            } else {
                format!("{encoded} <{addr}")
            }
        }
        _ => encode_header(value),
    }
}
