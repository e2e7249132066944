//! Output path placeholders.

use once_cell::sync::Lazy;
use regex::Regex;

static GSV_PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"%\{([^}]+)\}").unwrap());

/// Whether a path references any `%{key}` scoped variable.
pub fn has_gsv_placeholders(path: &str) -> bool {
    GSV_PLACEHOLDER_RE.is_match(path)
}

/// Replace `%{key}` placeholders using `lookup`.
///
/// Placeholders without a value are kept verbatim. Frame placeholders
/// (`####`, `%04d`) are never touched.
pub fn substitute_gsv_placeholders<F>(path: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    GSV_PLACEHOLDER_RE
        .replace_all(path, |caps: &regex::Captures<'_>| {
            lookup(caps[1].trim()).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
