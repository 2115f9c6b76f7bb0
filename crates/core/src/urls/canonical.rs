//! URL canonicalization and root-URL derivation.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Non-breaking space in any of the spellings collectors hand us: the raw
/// code points (U+00A0, U+2007, U+202F), percent-encoded UTF-8, and the
/// HTML entity.
static NON_BREAKING_SPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new("(?i)%c2%a0|%e2%80%87|%e2%80%af|&nbsp;|&#160;|\u{a0}|\u{2007}|\u{202f}")
        .expect("static pattern")
});

/// Canonical form of a URL, used as the uniqueness key.
///
/// Removes every non-breaking-space variant, drops the fragment and trims
/// trailing whitespace. Idempotent.
pub fn canonicalize(url: &str) -> String {
    // Removing one variant can splice two halves into another one, so run
    // to a fixed point.
    let mut current = url.to_string();
    loop {
        let next = NON_BREAKING_SPACE.replace_all(&current, "").into_owned();
        if next == current {
            break;
        }
        current = next;
    }

    if let Some(idx) = current.find('#') {
        current.truncate(idx);
    }

    let trimmed_len = current.trim_end().len();
    current.truncate(trimmed_len);
    current
}

/// Returns `scheme://host[:port]` for the given URL, defaulting the scheme
/// to https when missing. None if the URL has no host.
pub fn root_url(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = url::Url::parse(&with_scheme).ok()?;
    parsed.host_str()?;
    Some(parsed.origin().ascii_serialization())
}

/// Resolves a redirect `Location` header against the URL that produced it.
pub fn resolve_location(base: &str, location: &str) -> Option<String> {
    let base = url::Url::parse(base).ok()?;
    base.join(location).ok().map(|u| u.to_string())
}
