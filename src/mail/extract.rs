//! Raw RFC 822 bytes -> [`EmailRecord`].

use log::debug;
use mailparse::body::Body;
use mailparse::{DispositionType, ParsedMail};
use serde::{Deserialize, Serialize};

use crate::domain::email::EmailRecord;
use crate::error::{ExtractError, Result};
use crate::mail::decoders::{decode_lossy, header_or_empty, normalize_text};
use crate::mail::html::{HtmlOptions, html_to_text};

/// Which representation wins when a message carries both plain and HTML text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyPreference {
    /// The first HTML part, converted, beats any plain part.
    #[default]
    Html,
    /// The last plain part beats HTML; HTML is used only when no plain part exists.
    Plain,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    pub prefer: BodyPreference,
    #[serde(flatten)]
    pub html: HtmlOptions,
}

/// Parse one message and build its record. Fails only if the bytes are not
/// a message at all.
pub fn extract_record(raw_rfc822: &[u8], opts: &ExtractOptions) -> Result<EmailRecord> {
    let parsed = mailparse::parse_mail(raw_rfc822).map_err(|e| ExtractError::Parse(e.to_string()))?;

    let subject = header_or_empty(&parsed.headers, "Subject");
    let sender = header_or_empty(&parsed.headers, "From");
    let date = header_or_empty(&parsed.headers, "Date");
    let body = extract_body(&parsed, opts);

    Ok(EmailRecord::assemble(
        Some(subject),
        Some(sender),
        Some(body),
        Some(date),
    ))
}

/// Pick exactly one textual body and return it normalized.
///
/// Empty when the message has no usable text part.
pub fn extract_body(parsed: &ParsedMail, opts: &ExtractOptions) -> String {
    let text = if parsed.subparts.is_empty() {
        match TextKind::of(parsed) {
            Some(TextKind::Html) => html_to_text(&part_text(parsed), &opts.html),
            Some(TextKind::Plain) => part_text(parsed),
            None => String::new(),
        }
    } else {
        let mut found = Candidates::default();
        walk_parts(parsed, &mut found);
        found.select(opts)
    };
    normalize_text(&text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextKind {
    Plain,
    Html,
}

impl TextKind {
    fn of(part: &ParsedMail) -> Option<Self> {
        match part.ctype.mimetype.to_ascii_lowercase().as_str() {
            "text/plain" => Some(Self::Plain),
            "text/html" => Some(Self::Html),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Candidates {
    /// Last plain part seen.
    plain: Option<String>,
    /// First HTML part seen, still as markup.
    html: Option<String>,
}

impl Candidates {
    fn select(self, opts: &ExtractOptions) -> String {
        let convert = |html: String| html_to_text(&html, &opts.html);
        match opts.prefer {
            BodyPreference::Html => self.html.map(convert).or(self.plain),
            BodyPreference::Plain => self.plain.or_else(|| self.html.map(convert)),
        }
        .unwrap_or_default()
    }
}

fn walk_parts(part: &ParsedMail, found: &mut Candidates) {
    if is_attachment(part) {
        debug!("skipping attachment part ({})", part.ctype.mimetype);
        return;
    }

    if !part.subparts.is_empty() {
        for sp in &part.subparts {
            walk_parts(sp, found);
        }
        return;
    }

    match TextKind::of(part) {
        Some(TextKind::Plain) => found.plain = Some(part_text(part)),
        Some(TextKind::Html) if found.html.is_none() => found.html = Some(part_text(part)),
        _ => {}
    }
}

fn is_attachment(part: &ParsedMail) -> bool {
    matches!(
        part.get_content_disposition().disposition,
        DispositionType::Attachment
    )
}

/// Transfer-decode and charset-decode one leaf part, replacing bad bytes.
fn part_text(part: &ParsedMail) -> String {
    let bytes = part.get_body_raw().unwrap_or_else(|e| {
        debug!("transfer decoding failed ({e}); using the raw payload");
        raw_payload(part)
    });
    decode_lossy(&bytes, declared_charset(part))
}

fn raw_payload(part: &ParsedMail) -> Vec<u8> {
    match part.get_body_encoded() {
        Body::Base64(b) | Body::QuotedPrintable(b) => b.get_raw().to_vec(),
        Body::SevenBit(b) | Body::EightBit(b) => b.get_raw().to_vec(),
        Body::Binary(b) => b.get_raw().to_vec(),
    }
}

/// mailparse fills in `us-ascii` when no charset is declared; UTF-8 is a
/// superset of it and is what undeclared mail usually turns out to be.
fn declared_charset<'p>(part: &'p ParsedMail) -> &'p str {
    let charset = part.ctype.charset.as_str();
    if !part.ctype.params.contains_key("charset") || charset.eq_ignore_ascii_case("us-ascii") {
        "utf-8"
    } else {
        charset
    }
}
