//! The project interface the engine depends on.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::node::OutputNode;
use super::path::substitute_gsv_placeholders;
use crate::frames::Frame;

/// Errors raised while loading or mutating a project.
#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Failed to read project '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse project '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported project format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Value '{value}' is not valid for variable '{key}' (valid: {valid})")]
    InvalidGsvValue {
        key: String,
        value: String,
        valid: String,
    },
}

impl ProjectError {
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for project operations.
pub type ProjectResult<T> = Result<T, ProjectError>;

/// `MAJOR.MINOR` version of the application that wrote the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
}

impl FormatVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for FormatVersion {
    type Err = String;

    /// Accepts `16`, `16.0`, and trailing release suffixes like `15.1v3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = s.splitn(2, '.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| format!("invalid version '{}'", s))?;
        let minor = match parts.next() {
            Some(rest) => {
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits
                    .parse::<u32>()
                    .map_err(|_| format!("invalid version '{}'", s))?
            }
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for FormatVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FormatVersion> for String {
    fn from(version: FormatVersion) -> Self {
        version.to_string()
    }
}

/// Read access to a compositing project, plus the one mutation the engine
/// needs: setting scoped-variable values between submission passes.
pub trait ProjectModel {
    /// Path of the script on disk; the farm renders this file.
    fn script_path(&self) -> &Path;

    /// Version the script was saved with, if known.
    fn format_version(&self) -> Option<FormatVersion>;

    /// Every output node in declaration order, disabled ones included.
    fn output_nodes(&self) -> Vec<OutputNode>;

    /// Whether the container with this fully-qualified name is selected.
    fn container_selected(&self, container: &str) -> bool;

    /// Project-wide first and last frame.
    fn global_range(&self) -> (Frame, Frame);

    /// Hero frame list, if the project defines one.
    fn hero_frames(&self) -> Option<String>;

    /// Frame range arriving at the node's input, when it can be evaluated.
    fn input_range(&self, node: &str) -> Option<(Frame, Frame)>;

    /// Values a scoped variable can take. Empty means unconstrained.
    fn gsv_options(&self, key: &str) -> Vec<String>;

    /// Current value of a scoped variable.
    fn gsv_value(&self, key: &str) -> Option<String>;

    /// Set a scoped variable for subsequent evaluation.
    fn set_gsv_value(&mut self, key: &str, value: &str) -> ProjectResult<()>;

    /// Output path of a node with scoped variables evaluated and frame
    /// placeholders left intact.
    fn evaluated_output_path(&self, node: &str) -> Option<String> {
        let node = self.output_nodes().into_iter().find(|n| n.name == node)?;
        if node.file.is_empty() {
            return None;
        }
        Some(substitute_gsv_placeholders(&node.file, |key| {
            self.gsv_value(key)
        }))
    }

    /// File stem of the script, e.g. `comp_v003` for `comp_v003.nk`.
    fn script_stem(&self) -> String {
        self.script_path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name of the script, e.g. `comp_v003.nk`.
    fn script_name(&self) -> String {
        self.script_path()
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parsing() {
        assert_eq!("16.0".parse::<FormatVersion>(), Ok(FormatVersion::new(16, 0)));
        assert_eq!("15.1v3".parse::<FormatVersion>(), Ok(FormatVersion::new(15, 1)));
        assert_eq!("14".parse::<FormatVersion>(), Ok(FormatVersion::new(14, 0)));
        assert!("nuke".parse::<FormatVersion>().is_err());
    }

    #[test]
    fn version_ordering() {
        assert!(FormatVersion::new(15, 2) < FormatVersion::new(16, 0));
        assert!(FormatVersion::new(16, 1) > FormatVersion::new(16, 0));
    }
}
