//! URL token scanning over raw text.
//!
//! The scanner recognizes absolute (`http://`, `https://`), protocol-relative
//! (`//`) and backslash-escaped (`https:\/\/`, `\/\/`) URL spellings. Escaped
//! forms occur inside JSON payloads embedded in HTML, so tokens keep their
//! original escaping; [`canonicalize`] collapses all spellings of the same
//! resource onto one absolute URL.
//!
//! Scanning is pure text processing with no I/O, so the grammar is testable in
//! isolation. Garbage that happens to look URL-shaped is excluded later by the
//! classifier rather than erroring here.

pub mod classifier;

pub use classifier::DomainClassifier;

use std::borrow::Cow;
use std::collections::BTreeSet;

use html_escape::decode_html_entities;
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches http(s)://..., //..., and the escaped variants https:\/\/..., \/\/...
static URL_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:(?:https?:)?(?://|\\/\\/))[A-Za-z0-9.-]+[^\s"'<>\]),;]+"#)
        .expect("URL token pattern is valid")
});

/// HTML entities that terminate a token when they survive one round of decoding
/// (double-encoded markup such as `&amp;quot;`).
const ENTITY_STOPPERS: [&str; 6] = ["&quot;", "&#34;", "&apos;", "&#39;", "&gt;", "&lt;"];

/// Punctuation that belongs to the surrounding markup, not the URL.
const TRAILING_TRIM: &[char] = &['\\', '.', ',', ')', ']', '}', ';'];

/// Extract the set of URL-shaped tokens from raw text.
///
/// The text is HTML-entity-decoded before scanning. Returned tokens are
/// trimmed of entity stoppers and trailing punctuation but keep their original
/// escaping style. Extraction never fails; malformed input simply yields fewer
/// tokens. Running over already-decoded text yields the same set.
pub fn extract_url_tokens(text: &str) -> BTreeSet<String> {
    let decoded = decode_html_entities(text);
    URL_TOKEN
        .find_iter(&decoded)
        .map(|m| trim_token(m.as_str()))
        .filter(|token| !token.is_empty())
        .collect()
}

/// Cut a raw regex match down to the URL itself.
fn trim_token(raw: &str) -> String {
    let mut value = raw.trim().to_string();
    for stopper in ENTITY_STOPPERS {
        if let Some(pos) = value.find(stopper) {
            value.truncate(pos);
        }
    }
    while value.ends_with(TRAILING_TRIM) {
        value.pop();
    }
    value
}

/// Normalize a token to its absolute `scheme://host/path?query` form.
///
/// Escaped slashes are unescaped and protocol-relative URLs expand to `https:`.
/// Two tokens denote the same remote resource exactly when their canonical
/// forms are equal.
#[must_use]
pub fn canonicalize(token: &str) -> String {
    let plain: Cow<'_, str> = if token.contains("\\/") {
        Cow::Owned(token.replace("\\/", "/"))
    } else {
        Cow::Borrowed(token)
    };
    if plain.starts_with("//") {
        format!("https:{plain}")
    } else {
        plain.into_owned()
    }
}

/// Whether a token used backslash-escaped slashes in its source file.
#[must_use]
pub fn is_escaped_token(token: &str) -> bool {
    token.contains("\\/")
}
