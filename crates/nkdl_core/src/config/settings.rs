//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::models::{OnJobComplete, RenderMode};
use crate::project::FormatVersion;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Farm connection settings.
    #[serde(default)]
    pub farm: FarmSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Job defaults applied to every submission.
    #[serde(default)]
    pub submission: SubmissionSettings,

    /// Graph scope variable handling.
    #[serde(default)]
    pub gsv: GsvSettings,
}

/// Identifies a settings section for section-level updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Farm,
    Logging,
    Submission,
    Gsv,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 4] = [
        ConfigSection::Farm,
        ConfigSection::Logging,
        ConfigSection::Submission,
        ConfigSection::Gsv,
    ];

    /// TOML table name.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Farm => "farm",
            ConfigSection::Logging => "logging",
            ConfigSection::Submission => "submission",
            ConfigSection::Gsv => "gsv",
        }
    }

    /// Heading written above the table in generated files.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSection::Farm => "Render farm connection",
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Submission => "Job defaults",
            ConfigSection::Gsv => "Graph scope variables",
        }
    }

    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.table_name() == name)
    }
}

/// How to reach the farm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmSettings {
    /// Use the web service instead of the command-line client.
    #[serde(default)]
    pub use_web_service: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub ssl: bool,

    /// PEM certificate trusted for web-service TLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_cert: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fall back to the command-line client when the web service fails.
    #[serde(default = "default_true")]
    pub commandline_on_fail: bool,

    /// Explicit path to the command-line client or its directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_path: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for FarmSettings {
    fn default() -> Self {
        Self {
            use_web_service: false,
            host: default_host(),
            port: default_port(),
            ssl: false,
            ssl_cert: None,
            timeout_secs: default_timeout_secs(),
            commandline_on_fail: true,
            command_path: None,
        }
    }
}

impl FarmSettings {
    /// Base URL of the web service.
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub level: LogLevel,

    /// Also write logs to this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
        }
    }
}

/// Job defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionSettings {
    #[serde(default = "default_none")]
    pub pool: String,

    #[serde(default)]
    pub secondary_pool: String,

    #[serde(default = "default_none")]
    pub group: String,

    #[serde(default = "default_priority")]
    pub priority: u32,

    #[serde(default = "default_one")]
    pub chunk_size: u32,

    #[serde(default = "default_one")]
    pub concurrent_tasks: u32,

    #[serde(default)]
    pub department: String,

    #[serde(default = "default_job_name_template")]
    pub job_name_template: String,

    #[serde(default = "default_batch_name_template")]
    pub batch_name_template: String,

    #[serde(default)]
    pub comment_template: String,

    /// Templates for `ExtraInfo0` .. `ExtraInfo9`.
    #[serde(default)]
    pub extra_info_templates: Vec<String>,

    /// Render application version; empty uses the script's own.
    #[serde(default)]
    pub nuke_version: String,

    #[serde(default = "default_plugin")]
    pub plugin: String,

    #[serde(default)]
    pub submit_alphabetically: bool,

    #[serde(default)]
    pub submit_in_render_order: bool,

    /// Publish output paths so the farm can browse renders.
    #[serde(default = "default_true")]
    pub parse_output_paths: bool,

    #[serde(default)]
    pub use_nodes_frame_list: bool,

    #[serde(default)]
    pub use_nukex: bool,

    #[serde(default = "default_true")]
    pub batch_mode: bool,

    #[serde(default = "default_true")]
    pub enforce_render_order: bool,

    #[serde(default)]
    pub continue_on_error: bool,

    #[serde(default)]
    pub reload_plugins: bool,

    /// 0 lets the renderer decide.
    #[serde(default)]
    pub render_threads: u32,

    /// Megabytes, 0 for unlimited.
    #[serde(default)]
    pub ram_use_mb: u32,

    #[serde(default)]
    pub render_mode: RenderMode,

    #[serde(default)]
    pub on_job_complete: OnJobComplete,

    #[serde(default)]
    pub machine_limit: u32,

    #[serde(default)]
    pub task_timeout_minutes: u32,

    #[serde(default)]
    pub limit_groups: Vec<String>,

    #[serde(default)]
    pub limit_tasks_to_cpus: bool,

    #[serde(default)]
    pub enable_auto_timeout: bool,

    /// `allow:a,b` or `deny:a,b`; empty for none.
    #[serde(default)]
    pub machine_list: String,

    #[serde(default)]
    pub use_gpu: bool,

    /// GPU index to render on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_override: Option<u32>,

    /// Megabytes, 0 keeps the renderer default.
    #[serde(default)]
    pub stack_size: u32,

    #[serde(default)]
    pub performance_profiler: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_profiler_dir: Option<String>,

    #[serde(default)]
    pub views: Vec<String>,
}

fn default_none() -> String {
    "none".to_string()
}

fn default_priority() -> u32 {
    50
}

fn default_one() -> u32 {
    1
}

fn default_job_name_template() -> String {
    "{batch} / {write} / {file}".to_string()
}

fn default_batch_name_template() -> String {
    "{stem}".to_string()
}

fn default_plugin() -> String {
    "Nuke".to_string()
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        Self {
            pool: default_none(),
            secondary_pool: String::new(),
            group: default_none(),
            priority: default_priority(),
            chunk_size: default_one(),
            concurrent_tasks: default_one(),
            department: String::new(),
            job_name_template: default_job_name_template(),
            batch_name_template: default_batch_name_template(),
            comment_template: String::new(),
            extra_info_templates: Vec::new(),
            nuke_version: String::new(),
            plugin: default_plugin(),
            submit_alphabetically: false,
            submit_in_render_order: false,
            parse_output_paths: true,
            use_nodes_frame_list: false,
            use_nukex: false,
            batch_mode: true,
            enforce_render_order: true,
            continue_on_error: false,
            reload_plugins: false,
            render_threads: 0,
            ram_use_mb: 0,
            render_mode: RenderMode::Full,
            on_job_complete: OnJobComplete::Nothing,
            machine_limit: 0,
            task_timeout_minutes: 0,
            limit_groups: Vec::new(),
            limit_tasks_to_cpus: false,
            enable_auto_timeout: false,
            machine_list: String::new(),
            use_gpu: false,
            gpu_override: None,
            stack_size: 0,
            performance_profiler: false,
            performance_profiler_dir: None,
            views: Vec::new(),
        }
    }
}

/// Graph scope variable handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GsvSettings {
    /// First script version that carries graph scope variables.
    #[serde(default = "default_gsv_min_version")]
    pub min_version: String,

    /// Variables applied when the caller supplies none. Skipped with a
    /// warning on scripts that predate GSV support.
    #[serde(default)]
    pub default_variables: Vec<String>,
}

fn default_gsv_min_version() -> String {
    "16.0".to_string()
}

impl Default for GsvSettings {
    fn default() -> Self {
        Self {
            min_version: default_gsv_min_version(),
            default_variables: Vec::new(),
        }
    }
}

impl GsvSettings {
    /// Parsed `min_version`, falling back to 16.0 when unreadable.
    pub fn min_version(&self) -> FormatVersion {
        self.min_version.parse().unwrap_or_else(|e| {
            tracing::warn!("Invalid gsv.min_version: {}; using 16.0", e);
            FormatVersion::new(16, 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.submission.priority, 50);
        assert_eq!(settings.farm.port, 8081);
        assert!(settings.farm.commandline_on_fail);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let settings: Settings =
            toml::from_str("[submission]\npool = \"comp\"\nrender_mode = \"proxy\"\n").unwrap();
        assert_eq!(settings.submission.pool, "comp");
        assert_eq!(settings.submission.render_mode, RenderMode::Proxy);
        assert_eq!(settings.submission.group, "none");
    }

    #[test]
    fn base_url_respects_ssl() {
        let mut farm = FarmSettings::default();
        assert_eq!(farm.base_url(), "http://localhost:8081");
        farm.ssl = true;
        farm.host = "farm".to_string();
        assert_eq!(farm.base_url(), "https://farm:8081");
    }

    #[test]
    fn gsv_min_version_falls_back() {
        let gsv = GsvSettings {
            min_version: "latest".to_string(),
            ..Default::default()
        };
        assert_eq!(gsv.min_version(), FormatVersion::new(16, 0));
    }

    #[test]
    fn sections_round_trip_names() {
        for section in ConfigSection::ALL {
            assert_eq!(ConfigSection::from_table_name(section.table_name()), Some(section));
        }
    }
}
