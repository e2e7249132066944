//! Job plan construction.

use std::collections::BTreeMap;

use serde::Serialize;

use super::job_info::{JobInfo, MAX_EXTRA_INFO};
use super::plugin_info::{OutputSelection, PluginInfo, TaskOutput};
use super::template::{FieldKind, Template, TemplateContext, TemplateToken};
use crate::analysis::NodeFrameRange;
use crate::gsv::GsvCombination;
use crate::models::SubmissionMode;
use crate::project::OutputNode;

/// Chunk size that keeps a whole frame range in one task.
pub const MOVIE_CHUNK_SIZE: u32 = 1_000_000;

/// Per-invocation settings shared by every job of every pass.
#[derive(Debug, Clone)]
pub struct PlanDefaults {
    /// Base job record; name, frames and outputs are filled per job.
    pub job: JobInfo,
    /// Base plugin record; scene, outputs and GSVs are filled per job.
    pub plugin: PluginInfo,
    pub job_name: Template,
    pub batch_name: Template,
    pub comment: Template,
    pub extra_info: Vec<Template>,
    /// Publish output paths as `OutputFilename<N>`.
    pub output_paths: bool,
}

impl PlanDefaults {
    pub fn new(job: JobInfo, plugin: PluginInfo) -> Self {
        Self {
            job,
            plugin,
            job_name: Template::parse("{batch} / {write} / {file}", FieldKind::JobName),
            batch_name: Template::parse("{stem}", FieldKind::BatchName),
            comment: Template::parse("", FieldKind::Comment),
            extra_info: Vec::new(),
            output_paths: true,
        }
    }

    pub fn with_templates(
        mut self,
        job_name: &str,
        batch_name: &str,
        comment: &str,
        extra_info: &[String],
    ) -> Self {
        self.job_name = Template::parse(job_name, FieldKind::JobName);
        self.batch_name = Template::parse(batch_name, FieldKind::BatchName);
        self.comment = Template::parse(comment, FieldKind::Comment);
        self.extra_info = extra_info
            .iter()
            .take(MAX_EXTRA_INFO)
            .map(|t| Template::parse(t, FieldKind::ExtraInfo))
            .collect();
        self
    }
}

/// An output with its frames and evaluated path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOutput {
    pub node: OutputNode,
    pub frames: NodeFrameRange,
    pub output_path: Option<String>,
}

/// Everything one pass contributes to its plan.
#[derive(Debug, Clone)]
pub struct PlanInput<'a> {
    pub scene_file: &'a str,
    pub script_stem: &'a str,
    pub script_name: &'a str,
    /// Application version sent to the plugin.
    pub version: &'a str,
    pub mode: SubmissionMode,
    /// Outputs in submission order.
    pub outputs: &'a [PlannedOutput],
    /// Job-level frame expression for the single-job shape.
    pub frames: &'a str,
    /// List outputs explicitly in the single-job shape instead of letting the
    /// plugin render every enabled output.
    pub name_outputs: bool,
    pub use_node_frame_list: bool,
    /// Chain per-output jobs by render order.
    pub wire_dependencies: bool,
    pub gsv: Option<&'a GsvCombination>,
}

/// One job ready for submission, dependencies still to be filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedJob {
    pub render_order: i32,
    pub outputs: Vec<String>,
    pub job_info: JobInfo,
    pub plugin_info: PluginInfo,
}

impl PlannedJob {
    pub fn job_records(&self) -> BTreeMap<String, String> {
        self.job_info.to_records()
    }

    pub fn plugin_records(&self) -> BTreeMap<String, String> {
        self.plugin_info.to_records()
    }
}

/// Jobs for one pass, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobPlan {
    pub entries: Vec<PlannedJob>,
    /// Whether later render orders wait on earlier ones.
    pub wire_dependencies: bool,
}

impl JobPlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Distinct render orders in ascending order.
    pub fn orders(&self) -> Vec<i32> {
        let mut orders: Vec<i32> = self.entries.iter().map(|e| e.render_order).collect();
        orders.sort_unstable();
        orders.dedup();
        orders
    }
}

/// Builds job plans from analysed outputs.
pub struct JobPlanBuilder<'a> {
    defaults: &'a PlanDefaults,
}

impl<'a> JobPlanBuilder<'a> {
    pub fn new(defaults: &'a PlanDefaults) -> Self {
        Self { defaults }
    }

    /// Build the plan for one pass. Pure: identical input gives an identical
    /// plan.
    pub fn build(&self, input: &PlanInput<'_>) -> JobPlan {
        let batch_name = self.batch_name(input);

        let entries = match input.mode {
            SubmissionMode::SingleJob => vec![self.single_job(input, &batch_name)],
            SubmissionMode::OutputsAsTasks => vec![self.task_job(input, &batch_name)],
            SubmissionMode::OutputsAsJobs => input
                .outputs
                .iter()
                .map(|output| self.output_job(input, &batch_name, output))
                .collect(),
        };

        tracing::debug!(
            "Planned {} job(s) in {} mode{}",
            entries.len(),
            input.mode,
            input
                .gsv
                .map(|g| format!(" for {}", g))
                .unwrap_or_default()
        );

        JobPlan {
            entries,
            wire_dependencies: input.wire_dependencies
                && input.mode == SubmissionMode::OutputsAsJobs,
        }
    }

    fn batch_name(&self, input: &PlanInput<'_>) -> String {
        let context = TemplateContext {
            script_stem: input.script_stem,
            script_name: input.script_name,
            ..Default::default()
        };
        let rendered = self.defaults.batch_name.render(&context);
        let rendered = rendered.trim();
        if rendered.is_empty() {
            input.script_stem.to_string()
        } else {
            rendered.to_string()
        }
    }

    fn single_job(&self, input: &PlanInput<'_>, batch_name: &str) -> PlannedJob {
        let names: Vec<String> = input.outputs.iter().map(|o| o.node.name.clone()).collect();
        let joined = names.join(",");
        let (output_name, output_path) = match input.outputs {
            [only] => (Some(only.node.name.as_str()), only.output_path.as_deref()),
            [] => (None, None),
            _ => (Some(joined.as_str()), None),
        };

        let context = TemplateContext {
            script_stem: input.script_stem,
            script_name: input.script_name,
            batch_name: Some(batch_name),
            output_name,
            output_path,
            render_order: Some(0),
            frame_range: Some(input.frames),
            gsv: input.gsv,
        };

        let mut job = self.base_job(input, batch_name, &context, input.outputs);
        job.frames = input.frames.to_string();

        let outputs = if input.name_outputs && !names.is_empty() {
            OutputSelection::Named(names.clone())
        } else {
            OutputSelection::All
        };

        PlannedJob {
            render_order: 0,
            outputs: names,
            job_info: job,
            plugin_info: self.base_plugin(input, outputs),
        }
    }

    fn task_job(&self, input: &PlanInput<'_>, batch_name: &str) -> PlannedJob {
        let names: Vec<String> = input.outputs.iter().map(|o| o.node.name.clone()).collect();
        let joined = names.join(",");
        let frames = format!("0-{}", input.outputs.len().saturating_sub(1));

        let context = TemplateContext {
            script_stem: input.script_stem,
            script_name: input.script_name,
            batch_name: Some(batch_name),
            output_name: Some(joined.as_str()),
            output_path: None,
            render_order: Some(0),
            frame_range: Some(input.frames),
            gsv: input.gsv,
        };

        let mut job = self.base_job(input, batch_name, &context, input.outputs);
        job.frames = frames;
        job.chunk_size = 1;

        let tasks = input
            .outputs
            .iter()
            .map(|o| TaskOutput {
                name: o.node.name.clone(),
                first: o.frames.first,
                last: o.frames.last,
            })
            .collect();

        PlannedJob {
            render_order: 0,
            outputs: names,
            job_info: job,
            plugin_info: self.base_plugin(
                input,
                OutputSelection::Tasks {
                    outputs: tasks,
                    use_node_frame_list: input.use_node_frame_list,
                },
            ),
        }
    }

    fn output_job(
        &self,
        input: &PlanInput<'_>,
        batch_name: &str,
        output: &PlannedOutput,
    ) -> PlannedJob {
        let context = TemplateContext {
            script_stem: input.script_stem,
            script_name: input.script_name,
            batch_name: Some(batch_name),
            output_name: Some(output.node.name.as_str()),
            output_path: output.output_path.as_deref(),
            render_order: Some(output.node.render_order),
            frame_range: Some(output.frames.expression.as_str()),
            gsv: input.gsv,
        };

        let mut job = self.base_job(input, batch_name, &context, std::slice::from_ref(output));
        job.frames = output.frames.expression.clone();
        if output.node.is_movie() {
            job.chunk_size = MOVIE_CHUNK_SIZE;
        }

        PlannedJob {
            render_order: output.node.render_order,
            outputs: vec![output.node.name.clone()],
            job_info: job,
            plugin_info: self.base_plugin(
                input,
                OutputSelection::Named(vec![output.node.name.clone()]),
            ),
        }
    }

    fn base_job(
        &self,
        input: &PlanInput<'_>,
        batch_name: &str,
        context: &TemplateContext<'_>,
        outputs: &[PlannedOutput],
    ) -> JobInfo {
        let mut job = self.defaults.job.clone();
        job.name = self.job_name(input, context);
        job.batch_name = Some(batch_name.to_string());

        let comment = self.defaults.comment.render(context);
        if !comment.trim().is_empty() {
            job.comment = comment.trim().to_string();
        }
        job.extra_info = self
            .defaults
            .extra_info
            .iter()
            .map(|t| t.render(context))
            .collect();
        if self.defaults.output_paths {
            job.output_filenames = outputs
                .iter()
                .filter_map(|o| o.output_path.clone())
                .collect();
        }
        job
    }

    /// Render the job name. Jobs of different GSV passes would otherwise
    /// share a name, so the combination is appended when the template does
    /// not already include it.
    fn job_name(&self, input: &PlanInput<'_>, context: &TemplateContext<'_>) -> String {
        let rendered = self.defaults.job_name.render(context);
        let trimmed = rendered
            .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '/' | '-' | '_' | '|'))
            .trim();
        let mut name = if trimmed.is_empty() {
            input.script_stem.to_string()
        } else {
            trimmed.to_string()
        };

        if let Some(gsv) = input.gsv.filter(|g| !g.is_empty()) {
            if !self.defaults.job_name.contains(TemplateToken::Gsv) {
                name.push_str(&format!(" [{}]", gsv));
            }
        }
        name
    }

    fn base_plugin(&self, input: &PlanInput<'_>, outputs: OutputSelection) -> PluginInfo {
        let mut plugin = self.defaults.plugin.clone();
        plugin.scene_file = input.scene_file.to_string();
        plugin.version = input.version.to_string();
        plugin.outputs = outputs;
        plugin.gsv = input.gsv.cloned();
        plugin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(name: &str, order: i32, first: i64, last: i64, file: &str) -> PlannedOutput {
        PlannedOutput {
            node: OutputNode::new(name).with_render_order(order).with_file(file),
            frames: NodeFrameRange::span(first, last),
            output_path: Some(file.to_string()),
        }
    }

    fn outputs() -> Vec<PlannedOutput> {
        vec![
            output("WriteA", 0, 1001, 1010, "/out/a/a.####.exr"),
            output("WriteB", 0, 1001, 1020, "/out/b/b.####.exr"),
            output("WriteC", 1, 1001, 1100, "/out/c/c.mov"),
        ]
    }

    fn input<'a>(mode: SubmissionMode, outputs: &'a [PlannedOutput]) -> PlanInput<'a> {
        PlanInput {
            scene_file: "/shots/comp_v003.nk",
            script_stem: "comp_v003",
            script_name: "comp_v003.nk",
            version: "15.1",
            mode,
            outputs,
            frames: "1001-1100",
            name_outputs: true,
            use_node_frame_list: false,
            wire_dependencies: true,
            gsv: None,
        }
    }

    fn defaults() -> PlanDefaults {
        PlanDefaults::new(JobInfo::default(), PluginInfo::default())
    }

    #[test]
    fn single_job_lists_every_output() {
        let defaults = defaults();
        let outputs = outputs();
        let plan =
            JobPlanBuilder::new(&defaults).build(&input(SubmissionMode::SingleJob, &outputs));

        assert_eq!(plan.len(), 1);
        assert!(!plan.wire_dependencies);
        let job = plan.entries[0].job_records();
        assert_eq!(job["Frames"], "1001-1100");
        assert_eq!(job["BatchName"], "comp_v003");
        assert_eq!(job["Name"], "comp_v003 / WriteA,WriteB,WriteC");
        assert_eq!(job["OutputFilename2"], "/out/c/c.mov");

        let plugin = plan.entries[0].plugin_records();
        assert_eq!(plugin["WriteNode"], "WriteA,WriteB,WriteC");
        assert_eq!(plugin["SceneFile"], "/shots/comp_v003.nk");
        assert_eq!(plugin["Version"], "15.1");
    }

    #[test]
    fn tasks_shape() {
        let defaults = defaults();
        let outputs = outputs();
        let plan =
            JobPlanBuilder::new(&defaults).build(&input(SubmissionMode::OutputsAsTasks, &outputs));

        assert_eq!(plan.len(), 1);
        let job = plan.entries[0].job_records();
        assert_eq!(job["Frames"], "0-2");
        assert_eq!(job["ChunkSize"], "1");

        let plugin = plan.entries[0].plugin_records();
        assert_eq!(plugin["WriteNode0"], "WriteA");
        assert_eq!(plugin["WriteNode2"], "WriteC");
        assert_eq!(plugin["WriteNode0StartFrame"], "0");
    }

    #[test]
    fn per_output_jobs() {
        let defaults = defaults();
        let outputs = outputs();
        let plan =
            JobPlanBuilder::new(&defaults).build(&input(SubmissionMode::OutputsAsJobs, &outputs));

        assert_eq!(plan.len(), 3);
        assert!(plan.wire_dependencies);
        assert_eq!(plan.orders(), vec![0, 1]);

        let b = plan.entries[1].job_records();
        assert_eq!(b["Name"], "comp_v003 / WriteB / b.####.exr");
        assert_eq!(b["Frames"], "1001-1020");
        assert_eq!(b["OutputFilename0"], "/out/b/b.####.exr");
        assert!(!b.contains_key("JobDependency0"));

        // Movie output keeps the whole range in one task.
        let c = &plan.entries[2];
        assert_eq!(c.render_order, 1);
        assert_eq!(c.job_info.chunk_size, MOVIE_CHUNK_SIZE);
        assert_eq!(c.plugin_records()["WriteNode"], "WriteC");
    }

    #[test]
    fn gsv_is_added_to_names_and_plugin() {
        let defaults = defaults();
        let outputs = outputs();
        let gsv = GsvCombination::new(vec![("shot".to_string(), "A".to_string())]);
        let mut input = input(SubmissionMode::OutputsAsJobs, &outputs);
        input.gsv = Some(&gsv);

        let plan = JobPlanBuilder::new(&defaults).build(&input);
        let job = plan.entries[0].job_records();
        assert_eq!(job["Name"], "comp_v003 / WriteA / a.####.exr [shot=A]");
        assert_eq!(plan.entries[0].plugin_records()["GraphScopeVariables"], "shot=A");

        let defaults = defaults_with_names("{stem} {gsv}");
        let plan = JobPlanBuilder::new(&defaults).build(&input);
        assert_eq!(plan.entries[0].job_info.name, "comp_v003 shot=A");
    }

    fn defaults_with_names(job_name: &str) -> PlanDefaults {
        defaults().with_templates(job_name, "{stem}", "{w} at {ro}", &["{fs}".to_string()])
    }

    #[test]
    fn comment_and_extra_info_templates() {
        let defaults = defaults_with_names("{w}");
        let outputs = outputs();
        let plan =
            JobPlanBuilder::new(&defaults).build(&input(SubmissionMode::OutputsAsJobs, &outputs));
        let job = plan.entries[2].job_records();
        assert_eq!(job["Name"], "WriteC");
        assert_eq!(job["Comment"], "WriteC at 1");
        assert_eq!(job["ExtraInfo0"], "c");
    }

    #[test]
    fn building_twice_is_identical() {
        let defaults = defaults();
        let outputs = outputs();
        let input = input(SubmissionMode::OutputsAsJobs, &outputs);
        let builder = JobPlanBuilder::new(&defaults);

        let first: Vec<_> = builder
            .build(&input)
            .entries
            .iter()
            .map(|e| (e.job_records(), e.plugin_records()))
            .collect();
        let second: Vec<_> = builder
            .build(&input)
            .entries
            .iter()
            .map(|e| (e.job_records(), e.plugin_records()))
            .collect();
        assert_eq!(first, second);
    }
}
