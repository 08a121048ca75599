use base64::Engine as _;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use encoding_rs::{Encoding, UTF_8};
use log::debug;
use mailparse::{MailHeader, MailHeaderMap};

use crate::error::{ExtractError, Result};

/// Base64 for encoded-word payloads: padding optional, stray low bits ignored.
const WORD_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode a raw header value that may hold several RFC 2047 encoded-words.
///
/// Segments are decoded independently and concatenated in order. Bare text
/// is taken as UTF-8 (latin-1 if it isn't valid UTF-8). An encoded-word that
/// mailparse can't decode (unknown charset, damaged base64) is decoded
/// lossily instead: bytes the charset can't map become U+FFFD.
pub fn decode_mime_words(raw: &[u8]) -> String {
    // mailparse expects a full "Key: value" header line
    let mut line = b"X: ".to_vec();
    line.extend_from_slice(raw);
    line.extend_from_slice(b"\r\n");

    let value = match mailparse::parse_header(&line) {
        Ok((h, _idx)) => h.get_value(),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    };
    decode_leftover_words(&value)
}

/// Decoded value of the first `name` header.
pub fn header_text(headers: &[MailHeader], name: &'static str) -> Result<String> {
    headers
        .get_first_header(name)
        .map(|h| decode_mime_words(h.get_value_raw()))
        .ok_or(ExtractError::MissingHeader(name))
}

/// Decode the encoded-words still present in `value`. Whitespace between two
/// adjacent encoded-words is dropped (RFC 2047 §6.2).
fn decode_leftover_words(value: &str) -> String {
    if !value.contains("=?") {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut after_word = false;
    while let Some(start) = rest.find("=?") {
        let before = &rest[..start];
        match encoded_word(&rest[start..]) {
            Some((text, len)) => {
                if !(after_word && before.trim().is_empty()) {
                    out.push_str(before);
                }
                out.push_str(&text);
                rest = &rest[start + len..];
                after_word = true;
            }
            None => {
                out.push_str(before);
                out.push_str("=?");
                rest = &rest[start + 2..];
                after_word = false;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode the `=?charset?B|Q?payload?=` word at the start of `s`. Returns the
/// text and the number of bytes of `s` it spans.
fn encoded_word(s: &str) -> Option<(String, usize)> {
    let inner = s.strip_prefix("=?")?;
    let (charset, inner) = inner.split_once('?')?;
    let (encoding, inner) = inner.split_once('?')?;
    let end = inner.find("?=")?;
    let payload = &inner[..end];
    if charset.is_empty() || [charset, encoding, payload].iter().any(|p| p.contains(char::is_whitespace)) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => b_payload(payload),
        "Q" | "q" => q_payload(payload),
        _ => return None,
    };
    // RFC 2231 allows a language tag: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);
    let consumed = s.len() - inner.len() + end + 2;
    Some((decode_lossy(&bytes, charset), consumed))
}

/// Bytes of a "B" payload. Characters outside the base64 alphabet are skipped.
fn b_payload(payload: &str) -> Vec<u8> {
    let mut clean: Vec<u8> = payload
        .bytes()
        .filter(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/'))
        .collect();
    // a lone trailing sextet holds no whole byte
    if clean.len() % 4 == 1 {
        clean.pop();
    }
    WORD_BASE64.decode(&clean).unwrap_or_else(|e| {
        debug!("undecodable base64 word {payload:?}: {e}");
        Vec::new()
    })
}

/// Bytes of a "Q" payload: `_` is a space, `=XX` a hex byte.
fn q_payload(payload: &str) -> Vec<u8> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => match (bytes.get(i + 1).and_then(hex), bytes.get(i + 2).and_then(hex)) {
                (Some(hi), Some(lo)) => {
                    out.push((hi << 4) | lo);
                    i += 3;
                    continue;
                }
                _ => out.push(b'='),
            },
            b => out.push(b),
        }
        i += 1;
    }
    out
}

fn hex(b: &u8) -> Option<u8> {
    (*b as char).to_digit(16).map(|d| d as u8)
}

/// Same as [`header_text`], with a missing header read as the empty string.
pub fn header_or_empty(headers: &[MailHeader], name: &'static str) -> String {
    header_text(headers, name).unwrap_or_else(|e| {
        debug!("{e}; using empty string");
        String::new()
    })
}

/// Decode `bytes` under the charset `label`, replacing anything undecodable.
///
/// Unknown labels are decoded as UTF-8. Never fails.
pub fn decode_lossy(bytes: &[u8], label: &str) -> String {
    let encoding = Encoding::for_label(label.trim().as_bytes()).unwrap_or_else(|| {
        debug!("unknown charset {label:?}, decoding as utf-8");
        UTF_8
    });

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        let e = ExtractError::DecodeFailure {
            charset: encoding.name().to_string(),
        };
        debug!("{e}; replaced invalid sequences");
    }
    text.into_owned()
}

/// Collapse every whitespace run to one space and trim the ends.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max_chars` characters of `s`, with an ellipsis when cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    let mut it = s.char_indices();
    match it.nth(max_chars) {
        Some((idx, _)) => {
            let mut out = s[..idx].trim_end().to_string();
            out.push('…');
            out
        }
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_encoded_word() {
        assert_eq!(decode_mime_words(b"=?UTF-8?B?SGVsbG8=?="), "Hello");
    }

    #[test]
    fn concatenates_mixed_segments_in_order() {
        let raw = b"=?UTF-8?Q?Caf=C3=A9?= and =?ISO-8859-1?Q?cr=E8me?=";
        assert_eq!(decode_mime_words(raw), "Café and crème");
    }

    #[test]
    fn bare_utf8_passes_through() {
        assert_eq!(
            decode_mime_words("Jörg <j@example.com>".as_bytes()),
            "Jörg <j@example.com>"
        );
    }

    #[test]
    fn unknown_charset_is_decoded_as_utf8() {
        assert_eq!(decode_mime_words(b"=?x-unknown?B?SGk=?="), "Hi");
        assert_eq!(decode_mime_words(b"=?x-no-such-charset?Q?abc?= tail"), "abc tail");
        assert_eq!(
            decode_mime_words(b"=?x-unknown?Q?caf=E9?= =?x-unknown?Q?_ok?="),
            "caf\u{FFFD} ok"
        );
    }

    #[test]
    fn damaged_base64_word_is_decoded_lossily() {
        assert_eq!(decode_mime_words(b"=?UTF-8?B?SGVsbG8*?= tail"), "Hello tail");
        assert_eq!(decode_mime_words(b"=?UTF-8?B?SGVsbG8?="), "Hello");
    }

    #[test]
    fn text_that_only_looks_like_a_word_is_kept() {
        assert_eq!(decode_mime_words(b"a =? b ?= c"), "a =? b ?= c");
        assert_eq!(decode_mime_words(b"=?utf-8?X?abc?="), "=?utf-8?X?abc?=");
    }

    #[test]
    fn missing_header_is_reported_then_defaulted() {
        let (headers, _) = mailparse::parse_headers(b"From: a@example.com\r\n\r\n").unwrap();
        assert_eq!(
            header_text(&headers, "Subject"),
            Err(ExtractError::MissingHeader("Subject"))
        );
        assert_eq!(header_or_empty(&headers, "Subject"), "");
        assert_eq!(header_or_empty(&headers, "From"), "a@example.com");
    }

    #[test]
    fn header_text_decodes_words_mailparse_leaves_behind() {
        let raw = b"Subject: =?x-unknown?B?SGk=?= and =?UTF-8?Q?th=C3=A9re?=\r\n\r\n";
        let (headers, _) = mailparse::parse_headers(raw).unwrap();
        assert_eq!(header_text(&headers, "Subject").unwrap(), "Hi and thére");
    }

    #[test]
    fn lossy_decode_replaces_invalid_utf8() {
        let out = decode_lossy(b"ok \xff\xfe end", "utf-8");
        assert!(out.starts_with("ok "));
        assert!(out.ends_with(" end"));
        assert!(out.contains('\u{FFFD}'));
    }

    #[test]
    fn lossy_decode_honours_declared_charset() {
        assert_eq!(decode_lossy(b"caf\xe9", "iso-8859-1"), "café");
        assert_eq!(decode_lossy(b"plain", "no-such-charset"), "plain");
    }

    #[test]
    fn normalize_collapses_and_trims() {
        assert_eq!(normalize_text("  a\t\tb \n\n c  "), "a b c");
        assert_eq!(normalize_text(" \n\t "), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in ["", "x", "  hello\r\n  world ", "a\u{00A0}b", "\tone\ntwo  three\n"] {
            let once = normalize_text(s);
            assert_eq!(normalize_text(&once), once);
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo world", 5), "héllo…");
    }
}
