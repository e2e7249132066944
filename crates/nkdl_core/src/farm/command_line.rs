//! Command-line transport.
//!
//! Jobs are written as `Key=Value` files and handed to the farm's command
//! client, which prints `JobID=<id>` on success.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use super::connection::{with_user_name, Connection, FarmError, FarmResult, Records};

const TOOL: &str = "deadlinecommand";

/// File the farm installer writes on macOS instead of setting DEADLINE_PATH.
const MACOS_PATH_FILE: &str = "/Users/Shared/Thinkbox/DEADLINE_PATH";

fn executable_name() -> String {
    if cfg!(windows) {
        format!("{}.exe", TOOL)
    } else {
        TOOL.to_string()
    }
}

/// Find the client: explicit path (file or directory), then `DEADLINE_PATH`,
/// then the macOS path file, then `PATH`.
pub fn find_command(
    explicit: Option<&str>,
    deadline_path: Option<OsString>,
    macos_path_file: &Path,
    search_path: Option<OsString>,
) -> Option<PathBuf> {
    let name = executable_name();

    if let Some(explicit) = explicit {
        let path = PathBuf::from(explicit);
        let candidate = if path.is_dir() { path.join(&name) } else { path };
        return candidate.is_file().then_some(candidate);
    }

    let from_env = deadline_path
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            fs::read_to_string(macos_path_file)
                .ok()
                .map(|content| content.trim().to_string())
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
        });
    if let Some(dir) = from_env {
        let candidate = dir.join(&name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    search_path.and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(&name))
            .find(|candidate| candidate.is_file())
    })
}

/// Pull the job id out of the client's stdout.
pub fn parse_job_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("JobID="))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

pub struct CommandLineConnection {
    program: PathBuf,
    /// Arguments placed before every call, e.g. the client assembly when the
    /// client runs through `dotnet`.
    base_args: Vec<String>,
    connected: bool,
}

impl CommandLineConnection {
    /// Locate the client from configuration and the environment.
    pub fn locate(command_path: Option<&str>) -> FarmResult<Self> {
        let program = find_command(
            command_path,
            std::env::var_os("DEADLINE_PATH"),
            Path::new(MACOS_PATH_FILE),
            std::env::var_os("PATH"),
        )
        .ok_or_else(|| FarmError::CommandNotFound(TOOL.to_string()))?;

        tracing::debug!("Using {}", program.display());
        Ok(Self::with_command(program, Vec::new()))
    }

    pub fn with_command(program: impl Into<PathBuf>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
            connected: false,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Check the client can reach a repository.
    pub fn connect(&mut self) -> FarmResult<()> {
        let output = self.run(&["-GetRepositoryPath".into()])?;
        let repository = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if repository.is_empty() {
            return Err(FarmError::rejected("Empty repository path returned"));
        }

        tracing::info!("Connected to farm repository {}", repository);
        self.connected = true;
        Ok(())
    }

    fn ensure_connected(&mut self) -> FarmResult<()> {
        if !self.connected {
            self.connect()?;
        }
        Ok(())
    }

    fn run(&self, args: &[OsString]) -> FarmResult<Output> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args).args(args);

        tracing::debug!(
            "Running: {} {} {}",
            self.program.display(),
            self.base_args.join(" "),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = cmd
            .output()
            .map_err(|e| FarmError::io(format!("running {}", TOOL), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FarmError::CommandFailed {
                tool: TOOL.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                message: stderr.trim().to_string(),
            });
        }

        Ok(output)
    }
}

fn write_records(path: &Path, records: &Records) -> FarmResult<String> {
    let mut content = String::new();
    for (key, value) in records {
        content.push_str(key);
        content.push('=');
        content.push_str(value);
        content.push('\n');
    }

    let mut file = fs::File::create(path)
        .map_err(|e| FarmError::io(format!("creating {}", path.display()), e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| FarmError::io(format!("writing {}", path.display()), e))?;
    Ok(content)
}

impl Connection for CommandLineConnection {
    fn name(&self) -> &'static str {
        "command line"
    }

    fn submit(&mut self, job_info: &Records, plugin_info: &Records) -> FarmResult<String> {
        self.ensure_connected()?;

        let dir = tempfile::Builder::new()
            .prefix("nkdl-submit")
            .tempdir()
            .map_err(|e| FarmError::io("creating submission directory", e))?;
        let job_path = dir.path().join("job_info.job");
        let plugin_path = dir.path().join("plugin_info.job");

        let job_text = write_records(&job_path, &with_user_name(job_info))?;
        let plugin_text = write_records(&plugin_path, plugin_info)?;
        tracing::debug!("Job info:\n{}", job_text);
        tracing::debug!("Plugin info:\n{}", plugin_text);

        let output = self.run(&[job_path.into_os_string(), plugin_path.into_os_string()])?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.to_ascii_lowercase().contains("error") {
            return Err(FarmError::rejected(stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let id = parse_job_id(&stdout)
            .ok_or_else(|| FarmError::MissingJobId(stdout.trim().to_string()))?;
        tracing::info!("Submitted job {}", id);
        Ok(id)
    }

    fn groups(&mut self) -> FarmResult<Vec<String>> {
        self.ensure_connected()?;
        let output = self.run(&["-Groups".into()])?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}
