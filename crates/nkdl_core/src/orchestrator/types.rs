//! Submission request and result types.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::gsv::{GsvCombination, GsvRequest};
use crate::models::{SortPolicy, SubmissionMode};
use crate::plan::JobPlan;

/// What the caller wants submitted. Job defaults come from settings.
#[derive(Debug, Clone, Default)]
pub struct SubmissionRequest {
    /// Fully-qualified output names; empty means discover.
    pub outputs: Vec<String>,
    pub selected_only: bool,
    /// One farm job per output.
    pub outputs_as_jobs: bool,
    /// One farm job with one task per output.
    pub outputs_as_tasks: bool,
    /// Make each render order wait for the previous one. Implies
    /// `outputs_as_jobs`.
    pub render_order_dependencies: bool,
    /// Frame expression; `None` renders the project range.
    pub frames: Option<String>,
    pub use_nodes_frame_list: bool,
    pub sort: SortPolicy,
    /// Scoped variables to iterate. `None` falls back to the configured
    /// defaults, which are skipped on scripts without GSV support.
    pub gsv: Option<GsvRequest>,
    /// Existing farm job ids every job waits for, comma or space separated.
    pub job_dependencies: Option<String>,
    /// Job record fields by farm key, e.g. `("Priority", "80")`.
    pub job_fields: Vec<(String, String)>,
    /// Free-form `ExtraInfoKeyValue` pairs.
    pub extra_key_values: Vec<(String, String)>,
    pub suspended: bool,
}

impl SubmissionRequest {
    /// Requested mode before any demotion.
    pub fn mode(&self) -> SubmissionMode {
        if self.outputs_as_tasks {
            SubmissionMode::OutputsAsTasks
        } else if self.outputs_as_jobs || self.render_order_dependencies {
            SubmissionMode::OutputsAsJobs
        } else {
            SubmissionMode::SingleJob
        }
    }
}

/// The jobs of one pass, ready to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassPlan {
    /// `pass 2/3 (shot=A,res=hi)` style label for logs and errors.
    pub label: String,
    pub gsv: Option<GsvCombination>,
    pub mode: SubmissionMode,
    pub plan: JobPlan,
    /// Render order → render orders it waits for. Empty when unwired.
    pub edges: BTreeMap<i32, Vec<i32>>,
}

/// Job ids by render order, accumulated over every pass of an invocation.
/// Order 0 holds the jobs of single-job and tasks submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SubmittedJobs(BTreeMap<i32, Vec<String>>);

impl SubmittedJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, render_order: i32, job_id: impl Into<String>) {
        self.0.entry(render_order).or_default().push(job_id.into());
    }

    pub fn get(&self, render_order: i32) -> &[String] {
        self.0.get(&render_order).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn job_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &[String])> {
        self.0.iter().map(|(order, ids)| (*order, ids.as_slice()))
    }

    pub fn into_inner(self) -> BTreeMap<i32, Vec<String>> {
        self.0
    }
}
