use crate::types::FeedDocument;
use quick_xml::escape::resolve_html5_entity;
use std::borrow::Cow;

/// Nested encodings deeper than this are left partly escaped.
const MAX_UNESCAPE_PASSES: usize = 8;

/// Entities HTML still resolves without a trailing `;`.
const LEGACY_ENTITIES: &[&str] = &[
    "AElig", "AMP", "Aacute", "Acirc", "Agrave", "Aring", "Atilde", "Auml", "COPY", "Ccedil",
    "ETH", "Eacute", "Ecirc", "Egrave", "Euml", "GT", "Iacute", "Icirc", "Igrave", "Iuml", "LT",
    "Ntilde", "Oacute", "Ocirc", "Ograve", "Oslash", "Otilde", "Ouml", "QUOT", "REG", "THORN",
    "Uacute", "Ucirc", "Ugrave", "Uuml", "Yacute", "aacute", "acirc", "acute", "aelig", "agrave",
    "amp", "aring", "atilde", "auml", "brvbar", "ccedil", "cedil", "cent", "copy", "curren", "deg",
    "divide", "eacute", "ecirc", "egrave", "eth", "euml", "frac12", "frac14", "frac34", "gt",
    "iacute", "icirc", "iexcl", "igrave", "iquest", "iuml", "laquo", "lt", "macr", "micro",
    "middot", "nbsp", "not", "ntilde", "oacute", "ocirc", "ograve", "ordf", "ordm", "oslash",
    "otilde", "ouml", "para", "plusmn", "pound", "quot", "raquo", "reg", "sect", "shy", "sup1",
    "sup2", "sup3", "szlig", "thorn", "times", "uacute", "ucirc", "ugrave", "uml", "uuml",
    "yacute", "yen", "yuml",
];

const LONGEST_LEGACY_ENTITY: usize = 6;

/// Numeric references `&#128;` to `&#159;` name Windows-1252 characters, not C1 controls.
const WINDOWS_1252: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

/// Repairs a freshly decoded document.
///
/// An empty channel link falls back to `source_url`, and HTML character
/// references in every title and description are resolved. Item order is kept.
pub fn normalize(mut doc: FeedDocument, source_url: &str) -> FeedDocument {
    if doc.link.trim().is_empty() {
        doc.link = source_url.to_string();
    }

    doc.title = unescape_html(&doc.title).into_owned();
    doc.description = unescape_html(&doc.description).into_owned();

    for item in doc.items.iter_mut() {
        item.title = unescape_html(&item.title).into_owned();
        item.description = unescape_html(&item.description).into_owned();
    }

    doc
}

/// Resolves named and numeric HTML character references until the text is stable.
///
/// Each pass follows the HTML5 rules: numeric references may omit the `;`,
/// legacy names like `&amp` and `&copy` match as the longest known prefix,
/// and unknown references are kept as written. Feeds routinely double-encode
/// (`&amp;amp;`), so a single pass is not enough.
pub fn unescape_html(input: &str) -> Cow<'_, str> {
    let mut current = match unescape_once(input) {
        Some(next) => next,
        None => return Cow::Borrowed(input),
    };

    for _ in 1..MAX_UNESCAPE_PASSES {
        match unescape_once(&current) {
            Some(next) => current = next,
            None => break,
        }
    }

    Cow::Owned(current)
}

/// One left-to-right pass. `None` when nothing was replaced.
fn unescape_once(input: &str) -> Option<String> {
    if !input.contains('&') {
        return None;
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut replaced = false;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];

        match resolve_reference(tail) {
            Some((value, consumed)) => {
                out.push_str(&value);
                rest = &tail[consumed..];
                replaced = true;
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);

    replaced.then_some(out)
}

/// Resolves the reference opening `tail`, the text right after a `&`.
///
/// Returns the replacement and how many bytes of `tail` it used up.
fn resolve_reference(tail: &str) -> Option<(Cow<'static, str>, usize)> {
    match tail.strip_prefix('#') {
        Some(number) => {
            let (ch, len) = resolve_numeric(number)?;
            Some((Cow::Owned(ch.to_string()), len + 1))
        }
        None => resolve_named(tail),
    }
}

fn resolve_numeric(number: &str) -> Option<(char, usize)> {
    let (radix, prefix) = match number.as_bytes().first() {
        Some(b'x' | b'X') => (16, 1),
        _ => (10, 0),
    };

    let digits = &number[prefix..];
    let digit_count = digits
        .bytes()
        .take_while(|b| char::from(*b).is_digit(radix))
        .count();
    if digit_count == 0 {
        return None;
    }

    let code = digits[..digit_count]
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0u32, |acc, d| acc.saturating_mul(radix).saturating_add(d));

    let mut len = prefix + digit_count;
    if number[len..].starts_with(';') {
        len += 1;
    }

    let ch = match code {
        0x80..=0x9F => WINDOWS_1252[(code - 0x80) as usize],
        0 => char::REPLACEMENT_CHARACTER,
        _ => char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER),
    };
    Some((ch, len))
}

fn resolve_named(tail: &str) -> Option<(Cow<'static, str>, usize)> {
    let name_len = tail.bytes().take_while(u8::is_ascii_alphanumeric).count();
    let name = &tail[..name_len];

    if tail[name_len..].starts_with(';') {
        if let Some(value) = resolve_html5_entity(name) {
            return Some((Cow::Borrowed(value), name_len + 1));
        }
    }

    (2..=name_len.min(LONGEST_LEGACY_ENTITY))
        .rev()
        .map(|len| &name[..len])
        .find(|prefix| LEGACY_ENTITIES.contains(prefix))
        .and_then(|prefix| resolve_html5_entity(prefix).map(|v| (Cow::Borrowed(v), prefix.len())))
}
