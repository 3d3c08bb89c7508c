//! RFC 5322 mailbox parser
//!
//! Accepts the two mailbox forms that appear in subscription requests and
//! recipient lists:
//!
//! ```text
//! mailbox        = name-addr / addr-spec
//! name-addr      = [display-name] angle-addr
//! angle-addr     = "<" addr-spec ">"
//! addr-spec      = local-part "@" domain
//! local-part     = dot-atom / quoted-string
//! domain         = dot-atom / domain-literal
//! domain-literal = "[" *dtext "]"
//! ```
//!
//! Obsolete syntax (comments, folding whitespace inside the addr-spec, source
//! routes) is rejected.
//!
//! # Size Constraints
//!
//! - Maximum address length: 254 octets
//! - Maximum local-part: 64 octets
//! - Maximum domain: 255 octets

use std::{
    borrow::Cow,
    net::{Ipv4Addr, Ipv6Addr},
};

use thiserror::Error;

/// Result type for address parsing
pub type Result<T> = std::result::Result<T, AddressError>;

/// Errors that can occur during address parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,
    #[error("Address exceeds 254 octets")]
    AddressTooLong,
    #[error("Local-part exceeds 64 octets")]
    LocalPartTooLong,
    #[error("Domain exceeds 255 octets")]
    DomainTooLong,
    #[error("Missing closing angle bracket '>'")]
    MissingCloseBracket,
    #[error("Unexpected text after '>': {0}")]
    TrailingText(String),
    #[error("Missing '@' separator in mailbox")]
    MissingAtSign,
    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
    #[error("Invalid domain literal: {0}")]
    InvalidDomainLiteral(String),
    #[error("Unclosed quoted string in local-part")]
    UnclosedQuotedString,
    #[error("Invalid quoted string: {0}")]
    InvalidQuotedString(String),
}

/// A parsed mailbox (local-part@domain)
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Mailbox {
    /// The local part (before @)
    pub local_part: String,
    /// The domain or domain literal (after @)
    pub domain: String,
}

impl Mailbox {
    /// The local part with quoting undone and any `+tag` suffix removed.
    ///
    /// `"abuse"@x` and `abuse+lists@x` both give `abuse`.
    #[must_use]
    pub fn user(&self) -> Cow<'_, str> {
        match unquote(&self.local_part) {
            Some(unquoted) => Cow::Owned(strip_tag(&unquoted).to_string()),
            None => Cow::Borrowed(strip_tag(&self.local_part)),
        }
    }

    /// Returns `true` if the domain is a bracketed literal such as `[192.0.2.1]`.
    #[must_use]
    pub fn is_domain_literal(&self) -> bool {
        self.domain.starts_with('[')
    }
}

fn strip_tag(local: &str) -> &str {
    local.split_once('+').map_or(local, |(user, _)| user)
}

/// The content of a quoted-string with quoted-pairs resolved, or `None`
/// if `local` is not quoted.
fn unquote(local: &str) -> Option<String> {
    let inner = local.strip_prefix('"')?.strip_suffix('"')?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    Some(out)
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// Parse a mailbox, with or without a display name.
///
/// `Jane Doe <jane@example.com>`, `<jane@example.com>` and `jane@example.com`
/// all yield the same [`Mailbox`].
///
/// # Errors
///
/// Returns `AddressError` if the input is not a valid RFC 5322 mailbox.
pub fn parse_mailbox(input: &str) -> Result<Mailbox> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }

    let addr_spec = match find_unquoted(trimmed, '<') {
        Some(open) => {
            let rest = &trimmed[open + 1..];
            let close = rest.rfind('>').ok_or(AddressError::MissingCloseBracket)?;
            let trailing = rest[close + 1..].trim();
            if !trailing.is_empty() {
                return Err(AddressError::TrailingText(trailing.to_string()));
            }
            &rest[..close]
        }
        None => trimmed,
    };

    parse_addr_spec(addr_spec)
}

/// Parse a bare addr-spec: `local-part@domain`
///
/// # Errors
///
/// Returns `AddressError` if the input is not a valid addr-spec.
pub fn parse_addr_spec(input: &str) -> Result<Mailbox> {
    if input.is_empty() {
        return Err(AddressError::Empty);
    }
    if input.len() > 254 {
        return Err(AddressError::AddressTooLong);
    }

    let at_pos = find_unquoted_at(input)?;
    let local_part = &input[..at_pos];
    let domain = &input[at_pos + 1..];

    if local_part.len() > 64 {
        return Err(AddressError::LocalPartTooLong);
    }
    if domain.len() > 255 {
        return Err(AddressError::DomainTooLong);
    }

    Ok(Mailbox {
        local_part: parse_local_part(local_part)?,
        domain: parse_domain_or_literal(domain)?,
    })
}

/// Find the first `needle` outside of a quoted string.
fn find_unquoted(input: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut prev_was_backslash = false;

    for (i, ch) in input.char_indices() {
        if ch == '"' && !prev_was_backslash {
            in_quotes = !in_quotes;
        } else if ch == needle && !in_quotes {
            return Some(i);
        }
        prev_was_backslash = ch == '\\' && !prev_was_backslash;
    }

    None
}

/// Find the position of the '@' that separates local-part from domain
///
/// The last unquoted '@' outside a domain literal wins, so quoted local parts
/// may themselves contain '@'.
fn find_unquoted_at(input: &str) -> Result<usize> {
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut prev_was_backslash = false;
    let mut found = None;

    for (i, ch) in input.char_indices() {
        if ch == '"' && !prev_was_backslash && !in_brackets {
            in_quotes = !in_quotes;
        } else if ch == '[' && !in_quotes {
            in_brackets = true;
        } else if ch == ']' && !in_quotes {
            in_brackets = false;
        } else if ch == '@' && !in_quotes && !in_brackets {
            found = Some(i);
        }

        prev_was_backslash = ch == '\\' && !prev_was_backslash;
    }

    found.ok_or(AddressError::MissingAtSign)
}

fn parse_local_part(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(AddressError::InvalidLocalPart(
            "Empty local-part".to_string(),
        ));
    }

    if input.starts_with('"') {
        parse_quoted_string(input)
    } else {
        parse_dot_atom(input).map_err(AddressError::InvalidLocalPart)
    }
}

/// dot-atom-text = 1*atext *("." 1*atext)
fn parse_dot_atom(input: &str) -> std::result::Result<String, String> {
    if input.starts_with('.') || input.ends_with('.') {
        return Err("Dot-atom cannot start or end with '.'".to_string());
    }

    if input.contains("..") {
        return Err("Dot-atom cannot contain consecutive dots".to_string());
    }

    if let Some(ch) = input.chars().find(|&ch| ch != '.' && !is_atext(ch)) {
        return Err(format!("Invalid character '{ch}' in atom"));
    }

    Ok(input.to_string())
}

fn parse_quoted_string(input: &str) -> Result<String> {
    if !input.ends_with('"') || input.len() < 2 {
        return Err(AddressError::UnclosedQuotedString);
    }

    let content = &input[1..input.len() - 1];

    let mut chars = content.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next_ch) if next_ch.is_ascii_graphic() || next_ch == ' ' => {}
                Some(next_ch) => {
                    return Err(AddressError::InvalidQuotedString(format!(
                        "Invalid quoted-pair: \\{next_ch}"
                    )));
                }
                None => {
                    return Err(AddressError::InvalidQuotedString(
                        "Backslash at end of quoted string".to_string(),
                    ));
                }
            }
        } else if !is_qtext(ch) {
            return Err(AddressError::InvalidQuotedString(format!(
                "Invalid character '{ch}' in quoted string"
            )));
        }
    }

    Ok(input.to_string())
}

fn parse_domain_or_literal(input: &str) -> Result<String> {
    if input.starts_with('[') {
        parse_domain_literal(input)
    } else {
        parse_domain(input)
    }
}

fn parse_domain(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(AddressError::InvalidDomain("Empty domain".to_string()));
    }

    if input.starts_with('.') || input.ends_with('.') {
        return Err(AddressError::InvalidDomain(
            "Domain cannot start or end with '.'".to_string(),
        ));
    }

    if input.contains("..") {
        return Err(AddressError::InvalidDomain(
            "Domain cannot contain consecutive dots".to_string(),
        ));
    }

    for label in input.split('.') {
        parse_label(label)?;
    }

    Ok(input.to_ascii_lowercase())
}

/// A DNS label: letters, digits and hyphens, not starting or ending with a hyphen
fn parse_label(input: &str) -> Result<()> {
    if input.len() > 63 {
        return Err(AddressError::InvalidDomain(format!(
            "Label exceeds 63 octets: {input}"
        )));
    }

    if input.starts_with('-') || input.ends_with('-') {
        return Err(AddressError::InvalidDomain(format!(
            "Label cannot start or end with '-': {input}"
        )));
    }

    if let Some(ch) = input
        .chars()
        .find(|&ch| !ch.is_ascii_alphanumeric() && ch != '-')
    {
        return Err(AddressError::InvalidDomain(format!(
            "Invalid character '{ch}' in label"
        )));
    }

    Ok(())
}

/// `[IPv4]`, `[IPv6:...]` or a general `[tag:value]` literal
fn parse_domain_literal(input: &str) -> Result<String> {
    if !input.ends_with(']') {
        return Err(AddressError::InvalidDomainLiteral(
            "Domain literal must be enclosed in brackets".to_string(),
        ));
    }

    let content = &input[1..input.len() - 1];

    if content.parse::<Ipv4Addr>().is_ok() {
        return Ok(input.to_string());
    }

    if let Some(ipv6) = content.strip_prefix("IPv6:")
        && ipv6.parse::<Ipv6Addr>().is_ok()
    {
        return Ok(input.to_string());
    }

    if let Some((tag, value)) = content.split_once(':')
        && !tag.is_empty()
        && !value.is_empty()
    {
        return Ok(input.to_string());
    }

    Err(AddressError::InvalidDomainLiteral(format!(
        "Invalid domain literal format: {content}"
    )))
}

/// atext = ALPHA / DIGIT / "!" / "#" / "$" / "%" / "&" / "'" / "*" / "+" /
///         "-" / "/" / "=" / "?" / "^" / "_" / "`" / "{" / "|" / "}" / "~"
#[inline]
const fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

/// Printable ASCII except backslash and quote
#[inline]
const fn is_qtext(ch: char) -> bool {
    matches!(ch as u32, 32..=33 | 35..=91 | 93..=126)
}
