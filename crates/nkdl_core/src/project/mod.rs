//! Project and output-node model.
//!
//! The engine only talks to a project through [`ProjectModel`]. The crate
//! ships one implementation, [`ScriptProject`], which can be read from a
//! `.nk` script or from a JSON project description.
//!
//! # Example
//!
//! ```no_run
//! use nkdl_core::project::{load_project, ProjectModel};
//!
//! let project = load_project("/shots/sh010/comp_v003.nk").unwrap();
//! for node in project.output_nodes() {
//!     println!("{} (order {})", node.name, node.render_order);
//! }
//! ```

mod model;
pub mod nk;
mod node;
mod path;
mod script;

pub use model::{FormatVersion, ProjectError, ProjectModel, ProjectResult};
pub use node::{FrameLimit, OutputNode};
pub use path::{has_gsv_placeholders, substitute_gsv_placeholders};
pub use script::{load_project, GsvDomain, ScriptProject};
