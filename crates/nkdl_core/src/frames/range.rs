//! Frame range expressions.
//!
//! Grammar (whitespace around commas is ignored):
//!
//! ```text
//! expression := segment ("," segment)*
//! segment    := frame | frame "-" frame [("x" | "/") step]
//! ```
//!
//! Before expansion the whole-word tokens `f`, `m`, `l` and `hero` may be
//! substituted with project values.

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// A single frame number.
pub type Frame = i64;

/// Most frames one expression may expand to.
pub const MAX_EXPANDED_FRAMES: u64 = 1_000_000;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(f|m|l|hero)\b").unwrap());

static SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)(?:-(\d+)(?:[x/](-?\d+))?)?$").unwrap());

static HERO_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\s]+").unwrap());

/// Errors produced while validating or expanding a frame range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameRangeError {
    /// The expression does not match the grammar.
    #[error("Invalid frame range syntax: '{0}'")]
    InvalidSyntax(String),

    /// Tokens are still present; `substitute_tokens` has to run first.
    #[error("Token substitution needed before expanding range: '{0}'")]
    NeedsSubstitution(String),

    /// A segment parsed but its values are out of bounds.
    #[error("{reason} in range: {segment}")]
    InvalidSegment { segment: String, reason: String },
}

impl FrameRangeError {
    fn invalid_segment(segment: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSegment {
            segment: segment.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for frame range operations.
pub type FrameResult<T> = Result<T, FrameRangeError>;

/// A frame range expression, optionally carrying unresolved tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRange {
    raw: String,
    resolved: String,
}

impl FrameRange {
    /// Wrap a raw expression. Nothing is validated until `expand`.
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            raw: expression.into().trim().to_string(),
            resolved: String::new(),
        }
    }

    /// The expression as originally supplied.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The expression in its current state: resolved if substitution ran,
    /// raw otherwise.
    pub fn as_str(&self) -> &str {
        if self.resolved.is_empty() {
            &self.raw
        } else {
            &self.resolved
        }
    }

    /// Whether the current expression still contains a token.
    pub fn has_tokens(&self) -> bool {
        TOKEN_RE.is_match(self.as_str())
    }

    /// Replace tokens with project values.
    ///
    /// Each token is only replaced when its source value is supplied; `m`
    /// needs both `first` and `last`. Hero frame lists may mix commas and
    /// whitespace and are normalised to commas.
    pub fn substitute_tokens(
        &mut self,
        first: Option<Frame>,
        last: Option<Frame>,
        hero: Option<&str>,
    ) -> &str {
        if !TOKEN_RE.is_match(&self.raw) {
            self.resolved = self.raw.clone();
            return &self.resolved;
        }

        // Widened so the sum cannot overflow; the mean always fits.
        let middle = match (first, last) {
            (Some(f), Some(l)) => Some(((i128::from(f) + i128::from(l)) / 2) as Frame),
            _ => None,
        };
        let hero = hero.map(normalize_hero_list).filter(|h| !h.is_empty());

        let replaced = TOKEN_RE.replace_all(&self.raw, |caps: &regex::Captures<'_>| {
            let token = &caps[1];
            let value = match token {
                "f" => first.map(|v| v.to_string()),
                "m" => middle.map(|v| v.to_string()),
                "l" => last.map(|v| v.to_string()),
                "hero" => hero.clone(),
                _ => None,
            };
            value.unwrap_or_else(|| token.to_string())
        });

        self.resolved = replaced.into_owned();
        &self.resolved
    }

    /// Whether the current expression matches the grammar.
    pub fn is_valid_syntax(&self) -> bool {
        let expr = self.as_str();
        if expr.trim().is_empty() {
            return false;
        }
        expr.split(',')
            .all(|segment| SEGMENT_RE.is_match(segment.trim()))
    }

    /// Expand into a sorted list of distinct frames.
    pub fn expand(&self) -> FrameResult<Vec<Frame>> {
        let expr = self.as_str();
        if self.has_tokens() {
            return Err(FrameRangeError::NeedsSubstitution(expr.to_string()));
        }
        if !self.is_valid_syntax() {
            return Err(FrameRangeError::InvalidSyntax(expr.to_string()));
        }

        let mut frames = BTreeSet::new();
        for segment in expr.split(',').map(str::trim) {
            expand_segment(segment, &mut frames)?;
        }
        Ok(frames.into_iter().collect())
    }

    /// First and last frame of the expansion.
    pub fn bounds(&self) -> FrameResult<(Frame, Frame)> {
        let frames = self.expand()?;
        match (frames.first(), frames.last()) {
            (Some(first), Some(last)) => Ok((*first, *last)),
            _ => Err(FrameRangeError::InvalidSyntax(self.as_str().to_string())),
        }
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn expand_segment(segment: &str, frames: &mut BTreeSet<Frame>) -> FrameResult<()> {
    let caps = SEGMENT_RE
        .captures(segment)
        .ok_or_else(|| FrameRangeError::InvalidSyntax(segment.to_string()))?;

    let parse = |text: &str| {
        text.parse::<Frame>()
            .map_err(|_| FrameRangeError::InvalidSyntax(segment.to_string()))
    };

    let start = parse(&caps[1])?;
    let Some(end) = caps.get(2) else {
        frames.insert(start);
        return Ok(());
    };
    let end = parse(end.as_str())?;
    let step = match caps.get(3) {
        Some(step) => parse(step.as_str())?,
        None => 1,
    };

    if step <= 0 {
        return Err(FrameRangeError::invalid_segment(
            segment,
            "Step value must be positive",
        ));
    }
    if start > end {
        return Err(FrameRangeError::invalid_segment(
            segment,
            "Start frame must be less than or equal to end frame",
        ));
    }

    let count = (i128::from(end) - i128::from(start)) / i128::from(step) + 1;
    let total = count + frames.len() as i128;
    if total > i128::from(MAX_EXPANDED_FRAMES) {
        return Err(FrameRangeError::invalid_segment(
            segment,
            format!("More than {} frames", MAX_EXPANDED_FRAMES),
        ));
    }

    let step = usize::try_from(step)
        .map_err(|_| FrameRangeError::invalid_segment(segment, "Step value is too large"))?;
    frames.extend((start..=end).step_by(step));
    Ok(())
}

/// Collapse a hero frame list that mixes commas and whitespace.
pub fn normalize_hero_list(hero: &str) -> String {
    HERO_SEPARATOR_RE
        .split(hero.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}
