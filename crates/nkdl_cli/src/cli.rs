use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use nkdl_core::config::SubmissionSettings;
use nkdl_core::gsv::GsvRequest;
use nkdl_core::models::{OnJobComplete, RenderMode, SortPolicy};
use nkdl_core::orchestrator::SubmissionRequest;

/// Submit compositing scripts to a render farm
#[derive(Parser, Debug)]
#[command(name = "nkdl", author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity (-v: debug, -vv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Project config file (default: $NKDL_CONFIG, then ./.nkdl.toml)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit a script to the farm.
    Submit(Box<SubmitArgs>),
    /// Inspect or edit the user config.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective settings as `section.key = value`.
    List,
    /// Write the user config with defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Set one key, e.g. `submission.pool comp`.
    Set { key: String, value: String },
    /// Print the user config path.
    Path,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Script to submit (.nk or .json project description)
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    // Outputs and job layout
    /// Fully-qualified output names, comma separated (default: all enabled)
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    pub outputs: Vec<String>,

    /// Only outputs that are selected or sit inside a selected group
    #[arg(long)]
    pub selected_only: bool,

    /// One farm job per output
    #[arg(long)]
    pub outputs_as_jobs: bool,

    /// One farm job with one task per output
    #[arg(long)]
    pub outputs_as_tasks: bool,

    /// Make each render order wait for the previous one (implies --outputs-as-jobs)
    #[arg(long)]
    pub render_order_dependencies: bool,

    /// Frames to render, e.g. `1001-1100`, `f-l`, `input`, `hero`
    #[arg(long, value_name = "EXPR")]
    pub frames: Option<String>,

    /// Use each output's own frame range when it has one
    #[arg(long)]
    pub node_frame_range: bool,

    /// Submit outputs sorted by name
    #[arg(long)]
    pub alphabetical: bool,

    /// Submit outputs sorted by render order
    #[arg(long)]
    pub render_order_sort: bool,

    /// Graph scope variables, e.g. `shot:sh010,sh020` (repeatable)
    #[arg(long, value_name = "KEY:VALUES")]
    pub gsv: Vec<String>,

    /// Treat each --gsv as its own group; keys inside a group are separated by `;`
    #[arg(long)]
    pub gsv_nested: bool,

    /// Print the job records instead of submitting
    #[arg(long)]
    pub dry_run: bool,

    // Job info
    /// Existing job ids every job waits for, comma separated
    #[arg(long, value_name = "IDS")]
    pub dependencies: Option<String>,

    #[arg(long)]
    pub pool: Option<String>,

    #[arg(long)]
    pub secondary_pool: Option<String>,

    #[arg(long)]
    pub group: Option<String>,

    #[arg(long)]
    pub priority: Option<u32>,

    #[arg(long)]
    pub chunk_size: Option<u32>,

    #[arg(long)]
    pub concurrent_tasks: Option<u32>,

    /// Cap concurrent tasks at the worker's CPU count
    #[arg(long)]
    pub limit_tasks_to_cpus: bool,

    #[arg(long)]
    pub department: Option<String>,

    /// Job name template, e.g. `{batch} / {write}`
    #[arg(long, value_name = "TEMPLATE")]
    pub job_name: Option<String>,

    /// Batch name template
    #[arg(long, value_name = "TEMPLATE")]
    pub batch_name: Option<String>,

    /// Comment template
    #[arg(long, value_name = "TEMPLATE")]
    pub comment: Option<String>,

    /// ExtraInfo<N> template, one per occurrence in slot order (up to 10)
    #[arg(long = "extra-info", value_name = "TEMPLATE")]
    pub extra_info: Vec<String>,

    /// Maximum workers rendering the job at once
    #[arg(long, value_name = "N")]
    pub machine_limit: Option<u32>,

    /// `allow:a,b` or `deny:a,b`
    #[arg(long, value_name = "LIST")]
    pub machine_list: Option<String>,

    #[arg(long, value_delimiter = ',', value_name = "GROUPS")]
    pub limit_groups: Vec<String>,

    #[arg(long, value_name = "MINUTES")]
    pub task_timeout: Option<u32>,

    #[arg(long)]
    pub auto_timeout: bool,

    /// Nothing, Archive or Delete
    #[arg(long, value_name = "ACTION")]
    pub on_job_complete: Option<OnJobComplete>,

    /// Submit jobs suspended
    #[arg(long)]
    pub suspended: bool,

    /// Any job info field, e.g. `--job-info Whitelist=render01` (repeatable)
    #[arg(long = "job-info", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub job_info: Vec<(String, String)>,

    /// Free-form ExtraInfoKeyValue pair (repeatable)
    #[arg(long = "extra-info-kv", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub extra_info_kv: Vec<(String, String)>,

    // Plugin info
    /// Product version sent to the farm (default: the script's version)
    #[arg(long, value_name = "VERSION")]
    pub nuke_version: Option<String>,

    #[arg(long)]
    pub nukex: bool,

    #[arg(long)]
    pub no_batch_mode: bool,

    /// Render threads (0: let the renderer decide)
    #[arg(long, value_name = "N")]
    pub threads: Option<u32>,

    /// RAM limit in MB (0: unlimited)
    #[arg(long, value_name = "MB")]
    pub ram: Option<u32>,

    #[arg(long)]
    pub gpu: bool,

    /// GPU index to render on
    #[arg(long, value_name = "INDEX")]
    pub gpu_override: Option<u32>,

    #[arg(long, value_name = "BYTES")]
    pub stack_size: Option<u32>,

    #[arg(long)]
    pub no_enforce_render_order: bool,

    #[arg(long)]
    pub continue_on_error: bool,

    #[arg(long)]
    pub reload_plugins: bool,

    #[arg(long)]
    pub profile: bool,

    /// Where profiler output goes
    #[arg(long, value_name = "DIR")]
    pub profile_dir: Option<String>,

    /// Render at proxy resolution
    #[arg(long)]
    pub proxy: bool,

    #[arg(long, value_delimiter = ',', value_name = "VIEWS")]
    pub views: Vec<String>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

impl SubmitArgs {
    /// Overlay command-line values on the configured submission defaults.
    pub fn apply_to(&self, s: &mut SubmissionSettings) {
        let set = |target: &mut String, value: &Option<String>| {
            if let Some(value) = value {
                *target = value.clone();
            }
        };
        set(&mut s.pool, &self.pool);
        set(&mut s.secondary_pool, &self.secondary_pool);
        set(&mut s.group, &self.group);
        set(&mut s.department, &self.department);
        set(&mut s.job_name_template, &self.job_name);
        set(&mut s.batch_name_template, &self.batch_name);
        set(&mut s.comment_template, &self.comment);
        set(&mut s.machine_list, &self.machine_list);
        set(&mut s.nuke_version, &self.nuke_version);

        if let Some(v) = self.priority {
            s.priority = v;
        }
        if let Some(v) = self.chunk_size {
            s.chunk_size = v;
        }
        if let Some(v) = self.concurrent_tasks {
            s.concurrent_tasks = v;
        }
        if let Some(v) = self.machine_limit {
            s.machine_limit = v;
        }
        if let Some(v) = self.task_timeout {
            s.task_timeout_minutes = v;
        }
        if let Some(v) = self.on_job_complete {
            s.on_job_complete = v;
        }
        if let Some(v) = self.threads {
            s.render_threads = v;
        }
        if let Some(v) = self.ram {
            s.ram_use_mb = v;
        }
        if let Some(v) = self.stack_size {
            s.stack_size = v;
        }
        if self.gpu_override.is_some() {
            s.gpu_override = self.gpu_override;
        }
        if self.profile_dir.is_some() {
            s.performance_profiler_dir = self.profile_dir.clone();
        }
        if !self.limit_groups.is_empty() {
            s.limit_groups = self.limit_groups.clone();
        }
        if !self.views.is_empty() {
            s.views = self.views.clone();
        }
        if !self.extra_info.is_empty() {
            s.extra_info_templates = self.extra_info.clone();
        }

        s.limit_tasks_to_cpus |= self.limit_tasks_to_cpus;
        s.enable_auto_timeout |= self.auto_timeout;
        s.use_nukex |= self.nukex;
        s.use_gpu |= self.gpu;
        s.continue_on_error |= self.continue_on_error;
        s.reload_plugins |= self.reload_plugins;
        s.performance_profiler |= self.profile;
        s.use_nodes_frame_list |= self.node_frame_range;
        s.submit_alphabetically |= self.alphabetical;
        s.submit_in_render_order |= self.render_order_sort;
        if self.no_batch_mode {
            s.batch_mode = false;
        }
        if self.no_enforce_render_order {
            s.enforce_render_order = false;
        }
        if self.proxy {
            s.render_mode = RenderMode::Proxy;
        }
    }

    /// The request for these arguments, with sort and frame-list switches
    /// taken from the merged settings.
    pub fn to_request(&self, s: &SubmissionSettings) -> SubmissionRequest {
        SubmissionRequest {
            outputs: self
                .outputs
                .iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            selected_only: self.selected_only,
            outputs_as_jobs: self.outputs_as_jobs,
            outputs_as_tasks: self.outputs_as_tasks,
            render_order_dependencies: self.render_order_dependencies,
            frames: self.frames.clone(),
            use_nodes_frame_list: s.use_nodes_frame_list,
            sort: SortPolicy::from_flags(s.submit_alphabetically, s.submit_in_render_order),
            gsv: self.gsv_request(),
            job_dependencies: self.dependencies.clone(),
            job_fields: self.job_info.clone(),
            extra_key_values: self.extra_info_kv.clone(),
            suspended: self.suspended,
        }
    }

    fn gsv_request(&self) -> Option<GsvRequest> {
        if self.gsv.is_empty() {
            return None;
        }
        if self.gsv_nested {
            Some(GsvRequest::Nested(
                self.gsv
                    .iter()
                    .map(|group| {
                        group
                            .split(';')
                            .map(str::trim)
                            .filter(|e| !e.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .collect(),
            ))
        } else {
            Some(GsvRequest::Flat(self.gsv.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submit_args(args: &[&str]) -> SubmitArgs {
        let mut argv = vec!["nkdl", "submit"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Submit(args) => *args,
            other => panic!("expected submit, got {:?}", other),
        }
    }

    #[test]
    fn parses_layout_flags() {
        let args = submit_args(&[
            "comp.nk",
            "--outputs",
            "Write1,Group1.Write2",
            "--render-order-dependencies",
            "--frames",
            "1001-1100",
            "--dependencies",
            "abc, def",
        ]);
        assert_eq!(args.script, PathBuf::from("comp.nk"));

        let request = args.to_request(&SubmissionSettings::default());
        assert_eq!(request.outputs, vec!["Write1", "Group1.Write2"]);
        assert!(request.render_order_dependencies);
        assert_eq!(request.frames.as_deref(), Some("1001-1100"));
        assert_eq!(request.job_dependencies.as_deref(), Some("abc, def"));
        assert_eq!(request.sort, SortPolicy::Declaration);
    }

    #[test]
    fn gsv_groups() {
        let flat = submit_args(&["comp.nk", "--gsv", "shot:A,B", "--gsv", "res:hi"]);
        assert_eq!(
            flat.to_request(&SubmissionSettings::default()).gsv,
            Some(GsvRequest::Flat(vec!["shot:A,B".into(), "res:hi".into()]))
        );

        let nested = submit_args(&[
            "comp.nk",
            "--gsv-nested",
            "--gsv",
            "shot:A",
            "--gsv",
            "shot:B; res:hi",
        ]);
        assert_eq!(
            nested.to_request(&SubmissionSettings::default()).gsv,
            Some(GsvRequest::Nested(vec![
                vec!["shot:A".into()],
                vec!["shot:B".into(), "res:hi".into()],
            ]))
        );
    }

    #[test]
    fn overrides_land_in_settings() {
        let args = submit_args(&[
            "comp.nk",
            "--pool",
            "comp",
            "--priority",
            "80",
            "--on-job-complete",
            "archive",
            "--no-batch-mode",
            "--proxy",
            "--alphabetical",
            "--limit-groups",
            "nuke,gpu",
        ]);
        let mut settings = SubmissionSettings::default();
        args.apply_to(&mut settings);

        assert_eq!(settings.pool, "comp");
        assert_eq!(settings.priority, 80);
        assert_eq!(settings.on_job_complete, OnJobComplete::Archive);
        assert!(!settings.batch_mode);
        assert_eq!(settings.render_mode, RenderMode::Proxy);
        assert_eq!(settings.limit_groups, vec!["nuke", "gpu"]);
        assert_eq!(args.to_request(&settings).sort, SortPolicy::Alphabetical);
    }

    #[test]
    fn extra_info_templates_replace_configured_ones() {
        let args = submit_args(&[
            "comp.nk",
            "--extra-info",
            "{write}",
            "--extra-info",
            "order {ro}",
        ]);
        let mut settings = SubmissionSettings {
            extra_info_templates: vec!["{stem}".to_string()],
            ..Default::default()
        };
        args.apply_to(&mut settings);
        assert_eq!(settings.extra_info_templates, vec!["{write}", "order {ro}"]);

        let mut untouched = SubmissionSettings {
            extra_info_templates: vec!["{stem}".to_string()],
            ..Default::default()
        };
        submit_args(&["comp.nk"]).apply_to(&mut untouched);
        assert_eq!(untouched.extra_info_templates, vec!["{stem}"]);
    }

    #[test]
    fn key_value_pairs() {
        let args = submit_args(&[
            "comp.nk",
            "--job-info",
            "Whitelist=render01",
            "--extra-info-kv",
            "shot=sh010",
        ]);
        assert_eq!(
            args.job_info,
            vec![("Whitelist".to_string(), "render01".to_string())]
        );
        assert_eq!(
            args.extra_info_kv,
            vec![("shot".to_string(), "sh010".to_string())]
        );

        assert!(Cli::try_parse_from(["nkdl", "submit", "comp.nk", "--job-info", "oops"]).is_err());
    }

    #[test]
    fn config_subcommands() {
        let cli = Cli::try_parse_from(["nkdl", "-vv", "config", "set", "submission.pool", "comp"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Set { ref key, ref value })
                if key == "submission.pool" && value == "comp"
        ));
        assert!(Cli::try_parse_from(["nkdl", "submit"]).is_err());
    }
}
