//! Output-producing nodes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::frames::Frame;

/// Extensions written as a single container file rather than a sequence.
const MOVIE_EXTENSIONS: &[&str] = &["mov", "mp4", "mxf", "avi", "m4v", "webm"];

/// Per-node frame override (`use_limit` in the script).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLimit {
    pub first: Frame,
    pub last: Frame,
}

/// An output-producing node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputNode {
    /// Fully-qualified name, containers joined with `.`.
    pub name: String,

    /// Node class, `Write` for every node the loaders produce.
    #[serde(default = "default_class")]
    pub class: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub selected: bool,

    #[serde(default)]
    pub render_order: i32,

    /// Output path template, frame and GSV placeholders unexpanded.
    #[serde(default)]
    pub file: String,

    #[serde(default)]
    pub file_type: Option<String>,

    /// Set only when the node's limit override is switched on.
    #[serde(default)]
    pub frame_limit: Option<FrameLimit>,
}

fn default_class() -> String {
    "Write".to_string()
}

fn default_true() -> bool {
    true
}

impl OutputNode {
    /// Create an enabled, unselected node with render order 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: default_class(),
            enabled: true,
            selected: false,
            render_order: 0,
            file: String::new(),
            file_type: None,
            frame_limit: None,
        }
    }

    pub fn with_render_order(mut self, order: i32) -> Self {
        self.render_order = order;
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    pub fn with_limit(mut self, first: Frame, last: Frame) -> Self {
        self.frame_limit = Some(FrameLimit { first, last });
        self
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Fully-qualified names of every enclosing container, innermost last.
    ///
    /// `A.B.Write1` yields `["A", "A.B"]`.
    pub fn containers(&self) -> Vec<String> {
        let parts: Vec<&str> = self.name.split('.').collect();
        (1..parts.len()).map(|n| parts[..n].join(".")).collect()
    }

    /// Whether the node writes a single movie file rather than a sequence.
    pub fn is_movie(&self) -> bool {
        let by_type = self
            .file_type
            .as_deref()
            .map(|t| MOVIE_EXTENSIONS.contains(&t.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        let by_extension = Path::new(&self.file)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| MOVIE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        by_type || by_extension
    }
}
