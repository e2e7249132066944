//! Caller-facing frame selection.

use once_cell::sync::Lazy;
use regex::Regex;

use super::range::{Frame, FrameRange};

static ALIAS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(first|middle|last|h)\b").unwrap());

/// Symbolic expressions that stay meaningful when every output renders as
/// its own task.
const SYMBOLIC: &[&str] = &["f", "l", "first", "last", "h", "hero"];

/// What frames the caller asked to render.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FrameRequest {
    /// The project's global range (`f-l`, or nothing supplied).
    #[default]
    ProjectRange,
    /// Each output's upstream range (`i` / `input`).
    InputRange,
    /// Any other expression, aliases already rewritten to canonical tokens.
    Expression(String),
}

impl FrameRequest {
    /// Classify a raw expression.
    ///
    /// `first`, `middle`, `last` and `h` are rewritten to `f`, `m`, `l` and
    /// `hero` so the rest of the crate only deals with canonical tokens.
    pub fn parse(raw: Option<&str>) -> Self {
        let raw = raw.map(str::trim).unwrap_or_default();
        match raw {
            "" | "f-l" | "first-last" => Self::ProjectRange,
            "i" | "input" => Self::InputRange,
            other => {
                let canonical = ALIAS_RE.replace_all(other, |caps: &regex::Captures<'_>| {
                    match &caps[1] {
                        "first" => "f",
                        "middle" => "m",
                        "last" => "l",
                        _ => "hero",
                    }
                    .to_string()
                });
                Self::Expression(canonical.into_owned())
            }
        }
    }

    /// Whether this request is one of the recognised symbolic ranges.
    pub fn is_symbolic(&self, raw: &str) -> bool {
        match self {
            Self::ProjectRange | Self::InputRange => true,
            Self::Expression(_) => SYMBOLIC.contains(&raw.trim()),
        }
    }

    /// Render the request against a project range.
    ///
    /// `InputRange` falls back to the supplied range here; per-output input
    /// ranges are resolved by the analyzer.
    pub fn to_frame_range(&self, first: Frame, last: Frame, hero: Option<&str>) -> FrameRange {
        let mut range = match self {
            Self::ProjectRange | Self::InputRange => FrameRange::new("f-l"),
            Self::Expression(expr) => FrameRange::new(expr.clone()),
        };
        range.substitute_tokens(Some(first), Some(last), hero);
        range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_symbolic_values() {
        assert_eq!(FrameRequest::parse(None), FrameRequest::ProjectRange);
        assert_eq!(FrameRequest::parse(Some("first-last")), FrameRequest::ProjectRange);
        assert_eq!(FrameRequest::parse(Some("input")), FrameRequest::InputRange);
        assert_eq!(
            FrameRequest::parse(Some("first,last")),
            FrameRequest::Expression("f,l".to_string())
        );
        assert_eq!(
            FrameRequest::parse(Some("h")),
            FrameRequest::Expression("hero".to_string())
        );
    }

    #[test]
    fn symbolic_detection() {
        let hero = FrameRequest::parse(Some("hero"));
        assert!(hero.is_symbolic("hero"));

        let custom = FrameRequest::parse(Some("1-10x2"));
        assert!(!custom.is_symbolic("1-10x2"));
    }

    #[test]
    fn renders_against_project_range() {
        let range = FrameRequest::ProjectRange.to_frame_range(1001, 1010, None);
        assert_eq!(range.as_str(), "1001-1010");

        let range = FrameRequest::parse(Some("first,middle")).to_frame_range(1, 101, None);
        assert_eq!(range.expand().unwrap(), vec![1, 51]);
    }
}
