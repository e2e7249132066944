//! Output discovery and per-node frame resolution.

use thiserror::Error;

use super::groups::RenderOrderGroups;
use crate::frames::{Frame, FrameRange, FrameRangeError};
use crate::models::SortPolicy;
use crate::project::{OutputNode, ProjectModel};

/// Errors raised while analysing a project's outputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Output node '{0}' not found in script")]
    UnknownOutput(String),

    #[error("Invalid frame range for '{node}': {source}")]
    Frames {
        node: String,
        #[source]
        source: FrameRangeError,
    },
}

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// How each node's frames are chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameMode {
    /// The same caller-supplied expression for every node. Tokens must
    /// already be substituted.
    Explicit(FrameRange),
    /// The node's own limit when switched on, otherwise `InputDerived`.
    PerNodeLimit,
    /// The range arriving at the node's input, otherwise the project range.
    InputDerived,
}

/// Frames a single node renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFrameRange {
    pub first: Frame,
    pub last: Frame,
    /// Expression handed to the farm, e.g. `1001-1100` or `1,10,20-30x2`.
    pub expression: String,
}

impl NodeFrameRange {
    pub fn span(first: Frame, last: Frame) -> Self {
        Self {
            first,
            last,
            expression: format!("{}-{}", first, last),
        }
    }
}

/// Read-only analysis over a project's output nodes.
pub struct OutputGraphAnalyzer<'a, P: ProjectModel + ?Sized> {
    project: &'a P,
}

impl<'a, P: ProjectModel + ?Sized> OutputGraphAnalyzer<'a, P> {
    pub fn new(project: &'a P) -> Self {
        Self { project }
    }

    /// Enabled output nodes in declaration order.
    ///
    /// With `selected_only`, a node qualifies when it is selected itself or
    /// when any container above it is selected.
    pub fn discover(&self, selected_only: bool) -> Vec<OutputNode> {
        let nodes: Vec<OutputNode> = self
            .project
            .output_nodes()
            .into_iter()
            .filter(|node| {
                if !node.enabled {
                    tracing::debug!("Skipping disabled output {}", node.name);
                    return false;
                }
                !selected_only || self.is_effectively_selected(node)
            })
            .collect();

        tracing::debug!(
            "Discovered {} output node(s){}",
            nodes.len(),
            if selected_only { " (selected only)" } else { "" }
        );
        nodes
    }

    /// Look up an explicit list of outputs by fully-qualified name.
    ///
    /// Unknown names are an error; disabled nodes are dropped with a warning.
    /// The result keeps declaration order.
    pub fn select(&self, names: &[String]) -> AnalysisResult<Vec<OutputNode>> {
        let all = self.project.output_nodes();
        for name in names {
            if !all.iter().any(|node| &node.name == name) {
                return Err(AnalysisError::UnknownOutput(name.clone()));
            }
        }

        Ok(all
            .into_iter()
            .filter(|node| names.contains(&node.name))
            .filter(|node| {
                if !node.enabled {
                    tracing::warn!("Requested output {} is disabled, skipping", node.name);
                }
                node.enabled
            })
            .collect())
    }

    /// Partition nodes by render order.
    pub fn group_by_render_order(
        &self,
        nodes: Vec<OutputNode>,
        policy: SortPolicy,
    ) -> RenderOrderGroups {
        RenderOrderGroups::new(nodes, policy)
    }

    /// Frames `node` renders under `mode`.
    pub fn resolve_frame_range(
        &self,
        node: &OutputNode,
        mode: &FrameMode,
    ) -> AnalysisResult<NodeFrameRange> {
        match mode {
            FrameMode::Explicit(range) => {
                let (first, last) = range.bounds().map_err(|source| AnalysisError::Frames {
                    node: node.name.clone(),
                    source,
                })?;
                Ok(NodeFrameRange {
                    first,
                    last,
                    expression: range.as_str().to_string(),
                })
            }
            FrameMode::PerNodeLimit => match node.frame_limit {
                Some(limit) => Ok(NodeFrameRange::span(limit.first, limit.last)),
                None => Ok(self.input_range(node)),
            },
            FrameMode::InputDerived => Ok(self.input_range(node)),
        }
    }

    fn input_range(&self, node: &OutputNode) -> NodeFrameRange {
        let (first, last) = self
            .project
            .input_range(&node.name)
            .unwrap_or_else(|| self.project.global_range());
        NodeFrameRange::span(first, last)
    }

    fn is_effectively_selected(&self, node: &OutputNode) -> bool {
        node.selected
            || node
                .containers()
                .iter()
                .any(|container| self.project.container_selected(container))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ScriptProject;

    fn project() -> ScriptProject {
        ScriptProject::new("/tmp/comp.nk")
            .with_range(1001, 1100)
            .with_node(OutputNode::new("WriteA").with_selected(true))
            .with_node(OutputNode::new("WriteOff").with_enabled(false))
            .with_node(OutputNode::new("Grp.WriteB").with_limit(1010, 1020))
            .with_node(OutputNode::new("Other.Inner.WriteC"))
            .with_container("Grp", true)
            .with_container("Other", false)
            .with_input_range("Other.Inner.WriteC", 1050, 1060)
    }

    fn names(nodes: &[OutputNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn discover_skips_disabled() {
        let project = project();
        let analyzer = OutputGraphAnalyzer::new(&project);
        assert_eq!(
            names(&analyzer.discover(false)),
            vec!["WriteA", "Grp.WriteB", "Other.Inner.WriteC"]
        );
    }

    #[test]
    fn selected_only_walks_containers() {
        let project = project();
        let analyzer = OutputGraphAnalyzer::new(&project);
        assert_eq!(names(&analyzer.discover(true)), vec!["WriteA", "Grp.WriteB"]);
    }

    #[test]
    fn nested_container_selection_is_inherited() {
        let project = project().with_container("Other.Inner", true);
        let analyzer = OutputGraphAnalyzer::new(&project);
        assert!(names(&analyzer.discover(true)).contains(&"Other.Inner.WriteC"));
    }

    #[test]
    fn select_rejects_unknown_names() {
        let project = project();
        let analyzer = OutputGraphAnalyzer::new(&project);
        assert_eq!(
            analyzer.select(&["Nope".to_string()]),
            Err(AnalysisError::UnknownOutput("Nope".to_string()))
        );

        let picked = analyzer
            .select(&["Grp.WriteB".to_string(), "WriteOff".to_string(), "WriteA".to_string()])
            .unwrap();
        assert_eq!(names(&picked), vec!["WriteA", "Grp.WriteB"]);
    }

    #[test]
    fn frame_modes() {
        let project = project();
        let analyzer = OutputGraphAnalyzer::new(&project);
        let nodes = project.output_nodes();
        let (a, b, c) = (&nodes[0], &nodes[2], &nodes[3]);

        let explicit = FrameMode::Explicit(FrameRange::new("1-10x2,20"));
        let range = analyzer.resolve_frame_range(a, &explicit).unwrap();
        assert_eq!((range.first, range.last), (1, 20));
        assert_eq!(range.expression, "1-10x2,20");

        let limit = analyzer.resolve_frame_range(b, &FrameMode::PerNodeLimit).unwrap();
        assert_eq!(limit.expression, "1010-1020");

        // No limit: input range, then the global range.
        let input = analyzer.resolve_frame_range(c, &FrameMode::PerNodeLimit).unwrap();
        assert_eq!(input.expression, "1050-1060");
        let global = analyzer.resolve_frame_range(a, &FrameMode::InputDerived).unwrap();
        assert_eq!(global.expression, "1001-1100");
    }

    #[test]
    fn explicit_range_errors_name_the_node() {
        let project = project();
        let analyzer = OutputGraphAnalyzer::new(&project);
        let node = OutputNode::new("WriteA");
        let err = analyzer
            .resolve_frame_range(&node, &FrameMode::Explicit(FrameRange::new("9-1")))
            .unwrap_err();
        assert!(err.to_string().contains("WriteA"));
    }
}
