//! In-memory project, loadable from `.nk` scripts or JSON descriptions.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::model::{FormatVersion, ProjectError, ProjectModel, ProjectResult};
use super::nk;
use super::node::OutputNode;
use crate::frames::Frame;

/// Enumerable domain and current value of one scoped variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GsvDomain {
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// A project held entirely in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptProject {
    /// Script the farm renders. For JSON descriptions this is the `script`
    /// field, falling back to the description file itself.
    #[serde(default, rename = "script")]
    pub path: PathBuf,

    #[serde(default)]
    pub version: Option<FormatVersion>,

    #[serde(default = "default_first_frame")]
    pub first_frame: Frame,

    #[serde(default = "default_last_frame")]
    pub last_frame: Frame,

    #[serde(default)]
    pub hero_frames: Option<String>,

    #[serde(default)]
    pub nodes: Vec<OutputNode>,

    /// Selection state of containers, keyed by fully-qualified name.
    #[serde(default)]
    pub containers: BTreeMap<String, bool>,

    #[serde(default)]
    pub gsv: BTreeMap<String, GsvDomain>,

    /// Upstream frame ranges, keyed by node name.
    #[serde(default)]
    pub input_ranges: BTreeMap<String, (Frame, Frame)>,
}

fn default_first_frame() -> Frame {
    1
}

fn default_last_frame() -> Frame {
    100
}

impl ScriptProject {
    /// Empty project for the given script path, frames 1-100.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            version: None,
            first_frame: default_first_frame(),
            last_frame: default_last_frame(),
            hero_frames: None,
            nodes: Vec::new(),
            containers: BTreeMap::new(),
            gsv: BTreeMap::new(),
            input_ranges: BTreeMap::new(),
        }
    }

    pub fn with_version(mut self, major: u32, minor: u32) -> Self {
        self.version = Some(FormatVersion::new(major, minor));
        self
    }

    pub fn with_range(mut self, first: Frame, last: Frame) -> Self {
        self.first_frame = first;
        self.last_frame = last;
        self
    }

    pub fn with_hero_frames(mut self, hero: impl Into<String>) -> Self {
        self.hero_frames = Some(hero.into());
        self
    }

    pub fn with_node(mut self, node: OutputNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_container(mut self, name: impl Into<String>, selected: bool) -> Self {
        self.containers.insert(name.into(), selected);
        self
    }

    pub fn with_input_range(mut self, node: impl Into<String>, first: Frame, last: Frame) -> Self {
        self.input_ranges.insert(node.into(), (first, last));
        self
    }

    pub fn with_gsv<I, S>(mut self, key: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options: Vec<String> = options.into_iter().map(Into::into).collect();
        let value = options.first().cloned();
        self.gsv.insert(key.into(), GsvDomain { options, value });
        self
    }

    /// Parse a JSON project description.
    pub fn from_json(content: &str, source: &Path) -> ProjectResult<Self> {
        let mut project: ScriptProject = serde_json::from_str(content)
            .map_err(|e| ProjectError::parse(source, e.to_string()))?;
        if project.path.as_os_str().is_empty() {
            project.path = source.to_path_buf();
        } else if project.path.is_relative() {
            if let Some(parent) = source.parent() {
                project.path = parent.join(&project.path);
            }
        }
        Ok(project)
    }
}

impl ProjectModel for ScriptProject {
    fn script_path(&self) -> &Path {
        &self.path
    }

    fn format_version(&self) -> Option<FormatVersion> {
        self.version
    }

    fn output_nodes(&self) -> Vec<OutputNode> {
        self.nodes.clone()
    }

    fn container_selected(&self, container: &str) -> bool {
        self.containers.get(container).copied().unwrap_or(false)
    }

    fn global_range(&self) -> (Frame, Frame) {
        (self.first_frame, self.last_frame)
    }

    fn hero_frames(&self) -> Option<String> {
        self.hero_frames.clone()
    }

    fn input_range(&self, node: &str) -> Option<(Frame, Frame)> {
        self.input_ranges.get(node).copied()
    }

    fn gsv_options(&self, key: &str) -> Vec<String> {
        self.gsv
            .get(key)
            .map(|domain| domain.options.clone())
            .unwrap_or_default()
    }

    fn gsv_value(&self, key: &str) -> Option<String> {
        self.gsv.get(key).and_then(|domain| domain.value.clone())
    }

    fn set_gsv_value(&mut self, key: &str, value: &str) -> ProjectResult<()> {
        let domain = self.gsv.entry(key.to_string()).or_default();
        if !domain.options.is_empty() && !domain.options.iter().any(|o| o == value) {
            return Err(ProjectError::InvalidGsvValue {
                key: key.to_string(),
                value: value.to_string(),
                valid: domain.options.join(", "),
            });
        }
        domain.value = Some(value.to_string());
        Ok(())
    }
}

/// Load a project from disk, choosing the reader by file extension.
///
/// `.nk` files go through the script reader; `.json` files are read as a
/// project description.
pub fn load_project(path: impl AsRef<Path>) -> ProjectResult<ScriptProject> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let project = match extension.as_deref() {
        Some("nk") | Some("nknc") => nk::parse_script(&content, path)?,
        Some("json") => ScriptProject::from_json(&content, path)?,
        _ => return Err(ProjectError::UnsupportedFormat(path.to_path_buf())),
    };

    tracing::debug!(
        "Loaded project {} ({} output nodes, version {})",
        path.display(),
        project.nodes.len(),
        project
            .version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );

    Ok(project)
}
