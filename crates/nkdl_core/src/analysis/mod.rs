//! Output graph analysis.
//!
//! Finds the output nodes a submission covers, partitions them by render
//! order and works out which frames each one renders.
//!
//! # Architecture
//!
//! ```text
//! ProjectModel ──► OutputGraphAnalyzer::discover / select
//!                        │
//!                        ▼
//!                 group_by_render_order ──► RenderOrderGroups
//!                        │                        │
//!                        ▼                        ▼
//!                 resolve_frame_range      dependency_edges
//! ```

mod analyzer;
mod groups;

pub use analyzer::{AnalysisError, AnalysisResult, FrameMode, NodeFrameRange, OutputGraphAnalyzer};
pub use groups::{dependency_edges, sort_nodes, RenderOrderGroups};
