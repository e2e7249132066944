//! Job planning.
//!
//! Turns analysed outputs into farm job records. Three shapes are produced:
//!
//! | mode             | jobs | tasks per job          | dependencies            |
//! |------------------|------|------------------------|-------------------------|
//! | single job       | 1    | by chunk size          | user supplied only      |
//! | outputs as tasks | 1    | one per output         | user supplied only      |
//! | outputs as jobs  | N    | by chunk size (movies 1) | previous render order |
//!
//! Job and plugin records are typed ([`JobInfo`], [`PluginInfo`]) and only
//! flattened into `Key=Value` maps at the transport boundary.

mod builder;
mod job_info;
mod plugin_info;
mod template;

pub use builder::{
    JobPlan, JobPlanBuilder, PlanDefaults, PlanInput, PlannedJob, PlannedOutput, MOVIE_CHUNK_SIZE,
};
pub use job_info::{JobInfo, MachineList, MAX_EXTRA_INFO};
pub use plugin_info::{OutputSelection, PluginInfo, TaskOutput};
pub use template::{FieldKind, Template, TemplateContext, TemplateToken};

pub(crate) use job_info::{parse_bool, split_list};

use thiserror::Error;

/// Errors raised while editing job records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Unknown job info field '{0}'")]
    UnknownField(String),

    /// The field is filled per job from templates or frame options.
    #[error("Job info field '{0}' is set per job; use its template or frame option instead")]
    PlannedField(String),

    #[error("Invalid value '{value}' for job info field '{key}'")]
    InvalidValue { key: String, value: String },
}

impl PlanError {
    pub fn invalid_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
        }
    }
}
