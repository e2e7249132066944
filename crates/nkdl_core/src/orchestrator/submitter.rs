//! Submission orchestration.
//!
//! Every pass is planned before the first farm call, so option, variable
//! and frame errors never leave a half-submitted batch behind.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::errors::{SubmissionError, SubmissionResult};
use super::types::{PassPlan, SubmissionRequest, SubmittedJobs};
use crate::analysis::{dependency_edges, sort_nodes, FrameMode, OutputGraphAnalyzer};
use crate::config::Settings;
use crate::farm::Connection;
use crate::frames::FrameRequest;
use crate::gsv::{GsvCombination, GsvRequest, ScopedVariableResolver};
use crate::models::SubmissionMode;
use crate::plan::{
    split_list, JobInfo, JobPlanBuilder, MachineList, PlanDefaults, PlanInput, PlannedOutput,
    PluginInfo,
};
use crate::project::{has_gsv_placeholders, ProjectModel};

/// Drives one submission: validation, variable passes, planning and farm
/// calls.
pub struct SubmissionOrchestrator<'a> {
    connection: &'a mut dyn Connection,
    settings: &'a Settings,
}

impl<'a> SubmissionOrchestrator<'a> {
    pub fn new(connection: &'a mut dyn Connection, settings: &'a Settings) -> Self {
        Self {
            connection,
            settings,
        }
    }

    /// Reject option combinations that cannot be planned.
    pub fn validate(request: &SubmissionRequest) -> SubmissionResult<()> {
        if request.outputs_as_tasks && request.outputs_as_jobs {
            return Err(SubmissionError::validation(
                "outputs cannot be submitted both as tasks of one job and as separate jobs",
            ));
        }
        if request.outputs_as_tasks && request.render_order_dependencies {
            return Err(SubmissionError::validation(
                "render order dependencies need one job per output and cannot be combined \
                 with outputs as tasks",
            ));
        }
        if request.outputs_as_tasks && !request.use_nodes_frame_list {
            if let Some(raw) = request.frames.as_deref() {
                if !FrameRequest::parse(Some(raw)).is_symbolic(raw) {
                    return Err(SubmissionError::validation(format!(
                        "custom frame list '{}' cannot be used with outputs as tasks; use \
                         f-l, input, hero or the nodes' frame lists",
                        raw.trim()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Job and plugin defaults for this invocation.
    pub fn plan_defaults(&self, request: &SubmissionRequest) -> SubmissionResult<PlanDefaults> {
        let s = &self.settings.submission;

        let machine_list = MachineList::parse(&s.machine_list);
        if machine_list.is_none() && !s.machine_list.trim().is_empty() {
            tracing::warn!("Ignoring unreadable machine list '{}'", s.machine_list);
        }

        let mut job = JobInfo {
            plugin: s.plugin.clone(),
            chunk_size: s.chunk_size.max(1),
            concurrent_tasks: s.concurrent_tasks.max(1),
            limit_tasks_to_cpus: s.limit_tasks_to_cpus,
            pool: s.pool.clone(),
            secondary_pool: Some(s.secondary_pool.clone()).filter(|p| !p.is_empty()),
            group: s.group.clone(),
            priority: s.priority,
            department: s.department.clone(),
            machine_limit: s.machine_limit,
            machine_list,
            limit_groups: s.limit_groups.clone(),
            task_timeout_minutes: s.task_timeout_minutes,
            enable_auto_timeout: s.enable_auto_timeout,
            on_job_complete: s.on_job_complete,
            suspended: request.suspended,
            ..Default::default()
        };
        for (key, value) in &request.job_fields {
            job.set_field(key, value)?;
        }
        for (key, value) in &request.extra_key_values {
            job.set_extra(key.clone(), value.clone());
        }

        let plugin = PluginInfo {
            nukex: s.use_nukex,
            batch_mode: s.batch_mode,
            threads: s.render_threads,
            ram_use_mb: s.ram_use_mb,
            use_gpu: s.use_gpu,
            gpu_override: s.gpu_override,
            render_mode: s.render_mode,
            enforce_render_order: s.enforce_render_order,
            continue_on_error: s.continue_on_error,
            reload_plugins: s.reload_plugins,
            performance_profiler: s.performance_profiler,
            performance_profiler_dir: s.performance_profiler_dir.clone(),
            stack_size: s.stack_size,
            views: s.views.clone(),
            ..Default::default()
        };

        let mut defaults = PlanDefaults::new(job, plugin).with_templates(
            &s.job_name_template,
            &s.batch_name_template,
            &s.comment_template,
            &s.extra_info_templates,
        );
        defaults.output_paths = s.parse_output_paths;
        Ok(defaults)
    }

    /// Plan every pass without touching the farm.
    ///
    /// Variable values changed for a pass are put back afterwards, whether
    /// planning succeeded or not.
    pub fn plan<P: ProjectModel + ?Sized>(
        &self,
        project: &mut P,
        request: &SubmissionRequest,
    ) -> SubmissionResult<Vec<PassPlan>> {
        Self::validate(request)?;
        let defaults = self.plan_defaults(request)?;
        let combinations = self.resolve_combinations(&*project, request)?;

        let keys: BTreeSet<String> = combinations
            .iter()
            .flat_map(|c| c.iter().map(|(k, _)| k.to_string()))
            .collect();
        let saved: Vec<(String, Option<String>)> = keys
            .into_iter()
            .map(|key| {
                let value = project.gsv_value(&key);
                (key, value)
            })
            .collect();

        let result = self.plan_passes(project, request, &defaults, &combinations, &saved);
        restore_gsv_values(project, &saved);
        result
    }

    /// Plan, then submit every pass in order.
    ///
    /// Stops at the first farm failure; the error carries the ids of every
    /// job of the invocation that already reached the farm.
    pub fn submit<P: ProjectModel + ?Sized>(
        &mut self,
        project: &mut P,
        request: &SubmissionRequest,
    ) -> SubmissionResult<SubmittedJobs> {
        let passes = self.plan(project, request)?;
        let user_dependencies = request
            .job_dependencies
            .as_deref()
            .map(split_list)
            .unwrap_or_default();

        tracing::info!(
            "Submitting {} pass(es) through the {} connection",
            passes.len(),
            self.connection.name()
        );

        let mut jobs = SubmittedJobs::new();
        for pass in &passes {
            self.submit_pass(pass, &user_dependencies, &mut jobs)?;
        }

        tracing::info!("Submitted {} job(s)", jobs.job_count());
        Ok(jobs)
    }

    fn submit_pass(
        &mut self,
        pass: &PassPlan,
        user_dependencies: &[String],
        jobs: &mut SubmittedJobs,
    ) -> SubmissionResult<()> {
        tracing::info!("Submitting {}: {} job(s)", pass.label, pass.plan.len());

        // Entries are in ascending render order, so every job of an order is
        // in `ids_by_order` before the next order starts.
        let mut ids_by_order: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        for entry in &pass.plan.entries {
            let mut job_info = entry.job_info.clone();
            job_info.dependencies = user_dependencies.to_vec();
            if pass.plan.wire_dependencies {
                for order in pass.edges.get(&entry.render_order).into_iter().flatten() {
                    if let Some(ids) = ids_by_order.get(order) {
                        job_info.dependencies.extend(ids.iter().cloned());
                    }
                }
            }

            let id = self
                .connection
                .submit(&job_info.to_records(), &entry.plugin_records())
                .map_err(|source| {
                    SubmissionError::pass_failed(&pass.label, jobs.clone(), source)
                })?;

            tracing::info!(
                "{} -> {} (order {}, {} dependencies)",
                job_info.name,
                id,
                entry.render_order,
                job_info.dependencies.len()
            );
            ids_by_order
                .entry(entry.render_order)
                .or_default()
                .push(id.clone());
            jobs.record(entry.render_order, id);
        }
        Ok(())
    }

    fn resolve_combinations<P: ProjectModel + ?Sized>(
        &self,
        project: &P,
        request: &SubmissionRequest,
    ) -> SubmissionResult<Vec<GsvCombination>> {
        let defaults = &self.settings.gsv.default_variables;
        let (gsv_request, explicit) = match &request.gsv {
            Some(gsv) if !gsv.is_empty() => (Some(gsv.clone()), true),
            _ if !defaults.is_empty() => (Some(GsvRequest::Flat(defaults.clone())), false),
            _ => (None, false),
        };

        let resolver = ScopedVariableResolver::new(project, self.settings.gsv.min_version());
        Ok(resolver.resolve(gsv_request.as_ref(), explicit)?)
    }

    fn plan_passes<P: ProjectModel + ?Sized>(
        &self,
        project: &mut P,
        request: &SubmissionRequest,
        defaults: &PlanDefaults,
        combinations: &[GsvCombination],
        saved: &[(String, Option<String>)],
    ) -> SubmissionResult<Vec<PassPlan>> {
        if combinations.is_empty() {
            let pass = self.plan_pass(&*project, request, defaults, None, "submission".into())?;
            return Ok(vec![pass]);
        }

        let total = combinations.len();
        let mut passes = Vec::with_capacity(total);
        for (index, combination) in combinations.iter().enumerate() {
            // Each pass starts from the script's own values.
            restore_gsv_values(project, saved);
            for (key, value) in combination.iter() {
                project.set_gsv_value(key, value)?;
            }
            let label = format!(
                "pass {}/{} [{}] ({})",
                index + 1,
                total,
                combination.values_label(),
                combination
            );
            tracing::info!("Planning {}", label);
            passes.push(self.plan_pass(&*project, request, defaults, Some(combination), label)?);
        }
        Ok(passes)
    }

    fn plan_pass<P: ProjectModel + ?Sized>(
        &self,
        project: &P,
        request: &SubmissionRequest,
        defaults: &PlanDefaults,
        gsv: Option<&GsvCombination>,
        label: String,
    ) -> SubmissionResult<PassPlan> {
        let analyzer = OutputGraphAnalyzer::new(project);
        let nodes = if request.outputs.is_empty() {
            analyzer.discover(request.selected_only)
        } else {
            analyzer.select(&request.outputs)?
        };
        // An unnamed job renders every enabled output.
        if nodes.is_empty() && !request.outputs.is_empty() {
            return Err(SubmissionError::validation(format!(
                "none of the requested outputs is enabled: {}",
                request.outputs.join(", ")
            )));
        }
        if nodes.is_empty() && request.selected_only {
            return Err(SubmissionError::validation("no enabled output is selected"));
        }

        let mut mode = request.mode();
        if mode.is_per_output() && nodes.is_empty() {
            tracing::info!("No outputs to split for {}; submitting a single job", mode);
            mode = SubmissionMode::SingleJob;
        }
        let wire = request.render_order_dependencies && mode == SubmissionMode::OutputsAsJobs;

        let (ordered, edges) = if wire {
            let groups = analyzer.group_by_render_order(nodes, request.sort);
            let edges = dependency_edges(&groups);
            (groups.nodes().cloned().collect::<Vec<_>>(), edges)
        } else {
            (sort_nodes(nodes, request.sort), BTreeMap::new())
        };

        let (first, last) = project.global_range();
        let hero = project.hero_frames();
        let frame_request = FrameRequest::parse(request.frames.as_deref());
        let requested = frame_request.to_frame_range(first, last, hero.as_deref());
        requested.bounds()?;

        let frame_mode = if request.use_nodes_frame_list {
            FrameMode::PerNodeLimit
        } else if frame_request == FrameRequest::InputRange {
            FrameMode::InputDerived
        } else {
            FrameMode::Explicit(requested.clone())
        };

        let outputs = ordered
            .into_iter()
            .map(|node| {
                let frames = analyzer.resolve_frame_range(&node, &frame_mode)?;
                let output_path = project.evaluated_output_path(&node.name);
                if let Some(path) = output_path.as_deref().filter(|p| has_gsv_placeholders(p)) {
                    tracing::warn!("{}: unresolved variables in output path {}", node.name, path);
                }
                Ok(PlannedOutput {
                    node,
                    frames,
                    output_path,
                })
            })
            .collect::<SubmissionResult<Vec<_>>>()?;

        let job_frames = match (&frame_mode, &frame_request) {
            (FrameMode::Explicit(range), _) => range.as_str().to_string(),
            (_, FrameRequest::Expression(_)) => requested.as_str().to_string(),
            _ => covering_range(&outputs).unwrap_or_else(|| requested.as_str().to_string()),
        };

        let scene_file = scene_file(project.script_path());
        let script_stem = project.script_stem();
        let script_name = project.script_name();
        let version = if self.settings.submission.nuke_version.is_empty() {
            project
                .format_version()
                .map(|v| v.to_string())
                .unwrap_or_default()
        } else {
            self.settings.submission.nuke_version.clone()
        };

        let input = PlanInput {
            scene_file: &scene_file,
            script_stem: &script_stem,
            script_name: &script_name,
            version: &version,
            mode,
            outputs: &outputs,
            frames: &job_frames,
            name_outputs: !request.outputs.is_empty() || request.selected_only,
            use_node_frame_list: request.use_nodes_frame_list,
            wire_dependencies: wire,
            gsv,
        };
        let plan = JobPlanBuilder::new(defaults).build(&input);

        Ok(PassPlan {
            label,
            gsv: gsv.cloned(),
            mode,
            plan,
            edges,
        })
    }
}

/// Put back the values a script had before any pass touched them.
fn restore_gsv_values<P: ProjectModel + ?Sized>(
    project: &mut P,
    saved: &[(String, Option<String>)],
) {
    for (key, value) in saved {
        if let Some(value) = value {
            if let Err(e) = project.set_gsv_value(key, value) {
                tracing::warn!("Could not restore {} to '{}': {}", key, value, e);
            }
        }
    }
}

/// `min-max` over every output's frames.
fn covering_range(outputs: &[PlannedOutput]) -> Option<String> {
    let first = outputs.iter().map(|o| o.frames.first).min()?;
    let last = outputs.iter().map(|o| o.frames.last).max()?;
    Some(format!("{}-{}", first, last))
}

fn scene_file(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}
