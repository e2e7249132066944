//! Core enums used throughout the crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How outputs are mapped onto farm jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    /// One job renders every selected output.
    #[default]
    SingleJob,
    /// One job, one task per output.
    OutputsAsTasks,
    /// One job per output, optionally chained by render order.
    OutputsAsJobs,
}

impl SubmissionMode {
    /// Whether outputs are decomposed into separate units of work.
    pub fn is_per_output(&self) -> bool {
        !matches!(self, SubmissionMode::SingleJob)
    }
}

impl fmt::Display for SubmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionMode::SingleJob => write!(f, "single job"),
            SubmissionMode::OutputsAsTasks => write!(f, "outputs as tasks"),
            SubmissionMode::OutputsAsJobs => write!(f, "outputs as jobs"),
        }
    }
}

/// Ordering applied to discovered outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPolicy {
    /// Keep the order outputs appear in the script.
    #[default]
    Declaration,
    /// Sort by fully-qualified name.
    Alphabetical,
    /// Sort by render order, ties kept in declaration order.
    RenderOrder,
    /// Sort by render order, ties broken by name.
    RenderOrderThenAlphabetical,
}

impl SortPolicy {
    /// Build a policy from the two independent switches callers expose.
    pub fn from_flags(alphabetical: bool, by_render_order: bool) -> Self {
        match (alphabetical, by_render_order) {
            (false, false) => SortPolicy::Declaration,
            (true, false) => SortPolicy::Alphabetical,
            (false, true) => SortPolicy::RenderOrder,
            (true, true) => SortPolicy::RenderOrderThenAlphabetical,
        }
    }

    /// Whether ties inside a render-order group are broken by name.
    pub fn alphabetical(&self) -> bool {
        matches!(
            self,
            SortPolicy::Alphabetical | SortPolicy::RenderOrderThenAlphabetical
        )
    }
}

impl fmt::Display for SortPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortPolicy::Declaration => write!(f, "declaration"),
            SortPolicy::Alphabetical => write!(f, "alphabetical"),
            SortPolicy::RenderOrder => write!(f, "render order"),
            SortPolicy::RenderOrderThenAlphabetical => write!(f, "render order, alphabetical"),
        }
    }
}

/// Resolution the render plugin works at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Full,
    Proxy,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Full => write!(f, "Use Scene Settings"),
            RenderMode::Proxy => write!(f, "Render Proxy"),
        }
    }
}

/// What the farm does with a job once every task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OnJobComplete {
    #[default]
    Nothing,
    Archive,
    Delete,
}

impl fmt::Display for OnJobComplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnJobComplete::Nothing => write!(f, "Nothing"),
            OnJobComplete::Archive => write!(f, "Archive"),
            OnJobComplete::Delete => write!(f, "Delete"),
        }
    }
}

impl FromStr for OnJobComplete {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nothing" => Ok(OnJobComplete::Nothing),
            "archive" => Ok(OnJobComplete::Archive),
            "delete" => Ok(OnJobComplete::Delete),
            other => Err(format!(
                "unknown on-complete action '{}' (expected Nothing, Archive or Delete)",
                other
            )),
        }
    }
}
