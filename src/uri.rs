// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A byte-for-byte reimplementation of JavaScript's `encodeURI`/`decodeURI`,
//! used both for the `Raw` action payload (§4.3) and for insert-text
//! encoding inside diff-match-patch delta strings (§4.5/§4.7). This isn't
//! RFC 3986 percent-encoding, nor `application/x-www-form-urlencoded`, so
//! it is hand-written directly from the algorithm.
//!
//! `encodeURI`'s raw (never-escaped) character set is the union of
//! unreserved URI characters, the JS "uriMark" set, and the JS "uriReserved"
//! set plus `#`: `A-Za-z0-9 - _ . ! ~ * ' ( ) ; / ? : @ & = + $ , #`.
//! Getting there in one pass is easiest by first producing a conservative
//! percent-encoding (the `application/x-www-form-urlencoded` style that
//! turns a space into a literal `+`), then restoring the characters
//! `encodeURI` wouldn't have escaped in the first place. The `+`-marks-space
//! convention must be re-escaped to `%20` rather than left as a literal
//! space, since real `encodeURI(" ")` is `"%20"`, not a raw space.

use anyhow::{bail, Result};

/// Characters `application/x-www-form-urlencoded`-style encoders (and this
/// function's first pass) leave unescaped before any restoration.
fn is_base_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'*')
}

/// The 16 percent-escapes `encodeURI` leaves raw, restored in the final
/// pass. Order matters: `%2B` (`+`) must be restored only after the space
/// marker has already been turned into `%20`, or a restored `+` would be
/// mistaken for a space marker.
const RESTORE_TABLE: [(&str, &str); 16] = [
    ("%21", "!"),
    ("%7E", "~"),
    ("%27", "'"),
    ("%28", "("),
    ("%29", ")"),
    ("%3B", ";"),
    ("%2F", "/"),
    ("%3F", "?"),
    ("%3A", ":"),
    ("%40", "@"),
    ("%26", "&"),
    ("%3D", "="),
    ("%2B", "+"),
    ("%24", "$"),
    ("%2C", ","),
    ("%23", "#"),
];

/// Byte-identical to JavaScript's `encodeURI(s)`.
#[must_use]
pub fn encode_uri(s: &str) -> String {
    let mut encoded = String::with_capacity(s.len());
    for byte in s.as_bytes() {
        if is_base_safe(*byte) {
            encoded.push(*byte as char);
        } else if *byte == b' ' {
            encoded.push('+');
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    let with_space_escaped = encoded.replace('+', "%20");

    let mut result = with_space_escaped;
    for (escape, literal) in RESTORE_TABLE {
        result = result.replace(escape, literal);
    }
    result
}

/// Byte-identical to JavaScript's `decodeURI(s)` for well-formed input: `%XX`
/// escapes decode to the corresponding byte (UTF-8 multi-byte sequences
/// reassemble across consecutive escapes), all other characters pass through
/// literally. A lone `+` is never treated as a space.
pub fn decode_uri(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                bail!("Truncated percent-escape in '{s}'");
            }
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .map_err(|_| anyhow::anyhow!("Non-UTF-8 percent-escape in '{s}'"))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| anyhow::anyhow!("Invalid percent-escape '%{hex}' in '{s}'"))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|e| anyhow::anyhow!("Decoded bytes were not valid UTF-8: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_alphanumerics_raw() {
        assert_eq!(encode_uri("Hello123"), "Hello123");
    }

    #[test]
    fn escapes_space_as_percent_20() {
        assert_eq!(encode_uri("Hello World"), "Hello%20World");
    }

    #[test]
    fn leaves_reserved_and_mark_characters_raw() {
        assert_eq!(encode_uri("a+b"), "a+b");
        assert_eq!(encode_uri("don't"), "don't");
        assert_eq!(encode_uri("(paren)"), "(paren)");
        assert_eq!(encode_uri(";/?:@&=+$,#"), ";/?:@&=+$,#");
        assert_eq!(encode_uri("~!*"), "~!*");
    }

    #[test]
    fn escapes_characters_outside_the_raw_set() {
        assert_eq!(encode_uri("50%"), "50%25");
        assert_eq!(encode_uri("<a>"), "%3Ca%3E");
        assert_eq!(encode_uri("\""), "%22");
    }

    #[test]
    fn escapes_non_ascii_as_utf8_bytes() {
        assert_eq!(encode_uri("héllo"), "h%C3%A9llo");
        assert_eq!(encode_uri("日本語"), "%E6%97%A5%E6%9C%AC%E8%AA%9E");
    }

    #[test]
    fn round_trips_through_decode() {
        for input in ["hello world", "a+b=c&d", "日本語 text!", "100% sure?"] {
            assert_eq!(decode_uri(&encode_uri(input)).unwrap(), input);
        }
    }

    #[test]
    fn decode_does_not_treat_plus_as_space() {
        assert_eq!(decode_uri("a+b").unwrap(), "a+b");
    }

    #[test]
    fn decode_rejects_truncated_escape() {
        assert!(decode_uri("abc%2").is_err());
    }
}
