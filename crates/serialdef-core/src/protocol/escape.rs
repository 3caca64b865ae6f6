//! Byte-string escaping
//!
//! Converts between raw command/response bytes and the printable C-style
//! escaped text used in configuration and diagnostics.
//!
//! Escapes understood by [`from_escaped`]:
//! - `\n`, `\r`, `\t`, `\\`, `\"`, `\'`, `\?`, `\a`, `\b`, `\f`, `\v`
//! - `\xH` / `\xHH` (hex, one or two digits)
//! - `\N`, `\NN`, `\NNN` (octal, value at most `\377`)
//!
//! [`to_escaped`] only ever emits `\n`, `\r`, `\t`, `\\`, `\"` and `\xHH`.

use thiserror::Error;

/// Initial buffer reservation; most command strings are well under this.
pub(crate) const TYPICAL_LEN: usize = 64;

/// Errors produced while decoding escaped text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscapeError {
    /// Malformed escape starting at byte `offset` of the input
    #[error("Invalid escape sequence at offset {offset}: {reason}")]
    InvalidEscapeSequence {
        /// Position of the backslash
        offset: usize,
        /// What was wrong
        reason: String,
    },
}

/// Render raw bytes as printable escaped text. Never fails.
pub fn to_escaped(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len().max(TYPICAL_LEN));
    for &b in raw {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02X}", b)),
        }
    }
    out
}

/// Decode escaped text back into raw bytes.
///
/// Characters outside the ASCII range are taken as their UTF-8 bytes.
pub fn from_escaped(text: &str) -> Result<Vec<u8>, EscapeError> {
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len().max(TYPICAL_LEN));
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            result.push(bytes[i]);
            i += 1;
            continue;
        }

        let offset = i;
        let Some(&code) = bytes.get(i + 1) else {
            return Err(invalid(offset, "unterminated escape at end of text"));
        };
        i += 2;

        let simple = match code {
            b'n' => Some(b'\n'),
            b'r' => Some(b'\r'),
            b't' => Some(b'\t'),
            b'\\' => Some(b'\\'),
            b'"' => Some(b'"'),
            b'\'' => Some(b'\''),
            b'?' => Some(b'?'),
            b'a' => Some(0x07),
            b'b' => Some(0x08),
            b'f' => Some(0x0C),
            b'v' => Some(0x0B),
            _ => None,
        };
        if let Some(b) = simple {
            result.push(b);
            continue;
        }

        match code {
            b'x' | b'X' => {
                let digits = take_digits(bytes, i, 2, |c| c.is_ascii_hexdigit());
                if digits == 0 {
                    return Err(invalid(offset, "\\x must be followed by a hex digit"));
                }
                let value = parse_radix(&bytes[i..i + digits], 16);
                result.push(value as u8);
                i += digits;
            }
            b'0'..=b'7' => {
                // The first octal digit is the escape code itself
                let start = i - 1;
                let digits = 1 + take_digits(bytes, i, 2, |c| (b'0'..=b'7').contains(&c));
                let value = parse_radix(&bytes[start..start + digits], 8);
                if value > 0xFF {
                    return Err(invalid(offset, "octal escape out of byte range"));
                }
                result.push(value as u8);
                i = start + digits;
            }
            other => {
                let shown = text[offset + 1..]
                    .chars()
                    .next()
                    .unwrap_or(other as char);
                return Err(invalid(
                    offset,
                    &format!("unrecognized escape '\\{}'", shown),
                ));
            }
        }
    }

    Ok(result)
}

fn invalid(offset: usize, reason: &str) -> EscapeError {
    EscapeError::InvalidEscapeSequence {
        offset,
        reason: reason.to_string(),
    }
}

/// Count up to `max` consecutive bytes starting at `start` that satisfy `pred`
fn take_digits(bytes: &[u8], start: usize, max: usize, pred: impl Fn(u8) -> bool) -> usize {
    bytes[start.min(bytes.len())..]
        .iter()
        .take(max)
        .take_while(|&&c| pred(c))
        .count()
}

fn parse_radix(digits: &[u8], radix: u32) -> u32 {
    digits
        .iter()
        .filter_map(|&c| (c as char).to_digit(radix))
        .fold(0, |acc, d| acc * radix + d)
}

/// Serde adapter storing a byte string as escaped text
pub mod serde_escaped {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    /// Write `bytes` as escaped text
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_escaped(bytes))
    }

    /// Read escaped text back into bytes
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::from_escaped(&text).map_err(D::Error::custom)
    }
}

/// Serde adapter storing a list of byte strings as a list of escaped text
pub mod serde_escaped_list {
    use serde::{de::Error as _, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    /// Write each byte string as escaped text
    pub fn serialize<S: Serializer>(list: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(list.len()))?;
        for bytes in list {
            seq.serialize_element(&super::to_escaped(bytes))?;
        }
        seq.end()
    }

    /// Read a list of escaped text back into byte strings
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let texts = Vec::<String>::deserialize(deserializer)?;
        texts
            .iter()
            .map(|t| super::from_escaped(t).map_err(D::Error::custom))
            .collect()
    }
}
