//! nkdl - submit compositing scripts to a render farm
//!
//! Usage:
//!   nkdl submit comp_v003.nk --outputs-as-jobs --render-order-dependencies
//!   nkdl submit comp_v003.nk --gsv shot:sh010,sh020 --dry-run
//!   nkdl config set submission.pool comp

mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context as _};
use clap::Parser;
use nkdl_core::config::{
    default_user_config_path, load_layered, ConfigError, ConfigManager, Settings,
};
use nkdl_core::farm::{self, DryRunConnection, FarmError};
use nkdl_core::logging::{init_tracing, LogLevel};
use nkdl_core::orchestrator::{SubmissionError, SubmissionOrchestrator};
use nkdl_core::project::{load_project, ProjectError};

use cli::{Cli, Command, ConfigCommand, SubmitArgs};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

/// 1 for errors the user can act on, 2 for anything unexpected.
fn exit_code(err: &anyhow::Error) -> u8 {
    let expected = err.chain().any(|cause| {
        cause.is::<SubmissionError>()
            || cause.is::<ProjectError>()
            || cause.is::<ConfigError>()
            || cause.is::<FarmError>()
    });
    if expected {
        1
    } else {
        2
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Editing commands may target a file that does not exist yet.
    let needs_settings = matches!(
        cli.command,
        Command::Submit(_) | Command::Config(ConfigCommand::List)
    );
    let settings = if needs_settings {
        load_layered(cli.config.as_deref()).context("loading settings")?
    } else {
        load_layered(cli.config.as_deref()).unwrap_or_default()
    };
    let level = LogLevel::from_verbosity(settings.logging.level, cli.verbose);
    let _guard = init_tracing(level, settings.logging.file.as_deref().map(Path::new));
    tracing::debug!("nkdl {}", nkdl_core::version());

    match cli.command {
        Command::Submit(args) => cmd_submit(&args, settings),
        Command::Config(command) => cmd_config(command, cli.config.as_deref(), &settings),
    }
}

fn cmd_submit(args: &SubmitArgs, mut settings: Settings) -> anyhow::Result<()> {
    args.apply_to(&mut settings.submission);
    let request = args.to_request(&settings.submission);

    let mut project = load_project(&args.script)?;
    tracing::info!("Loaded {}", args.script.display());

    if args.dry_run {
        let mut connection = DryRunConnection::new();
        let jobs = SubmissionOrchestrator::new(&mut connection, &settings)
            .submit(&mut project, &request)?;
        let report = serde_json::json!({
            "jobs": connection.jobs(),
            "submitted": jobs,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut connection = farm::connect(&settings.farm)?;
    let result =
        SubmissionOrchestrator::new(connection.as_mut(), &settings).submit(&mut project, &request);
    match result {
        Ok(jobs) => {
            println!("{}", serde_json::to_string_pretty(&jobs)?);
            Ok(())
        }
        Err(err) => {
            report_partial(&err)?;
            Err(err.into())
        }
    }
}

/// Print the ids that reached the farm before a failure, so they can be
/// found and cleaned up.
fn report_partial(err: &SubmissionError) -> anyhow::Result<()> {
    if let Some(jobs) = err.submitted_jobs().filter(|jobs| !jobs.is_empty()) {
        tracing::warn!("{} job(s) were submitted before the failure", jobs.job_count());
        println!("{}", serde_json::to_string_pretty(jobs)?);
    }
    Ok(())
}

fn cmd_config(
    command: ConfigCommand,
    explicit: Option<&Path>,
    settings: &Settings,
) -> anyhow::Result<()> {
    match command {
        ConfigCommand::List => {
            for (key, value) in ConfigManager::flatten(settings)? {
                println!("{} = {}", key, value);
            }
        }
        ConfigCommand::Path => {
            println!("{}", config_file(explicit)?.display());
        }
        ConfigCommand::Init { force } => {
            let path = config_file(explicit)?;
            let manager = ConfigManager::new(&path);
            if path.exists() && !force {
                return Err(anyhow!(
                    "{} already exists; use --force to overwrite",
                    path.display()
                ));
            }
            manager.save()?;
            println!("Wrote {}", path.display());
        }
        ConfigCommand::Set { key, value } => {
            let path = config_file(explicit)?;
            let mut manager = ConfigManager::new(&path);
            manager.load_or_create()?;
            manager.set_value(&key, &value)?;
            println!("{} = {}", key, value);
        }
    }
    Ok(())
}

/// The file `config init/set/path` work on: `--config` when given,
/// otherwise the user config.
fn config_file(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_user_config_path()
            .ok_or_else(|| anyhow!("could not determine the user config directory")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let validation = anyhow::Error::new(SubmissionError::validation("bad"));
        assert_eq!(exit_code(&validation), 1);

        let wrapped =
            anyhow::Error::new(FarmError::CommandNotFound("x".into())).context("connecting");
        assert_eq!(exit_code(&wrapped), 1);

        assert_eq!(exit_code(&anyhow!("broken pipe")), 2);
    }
}
