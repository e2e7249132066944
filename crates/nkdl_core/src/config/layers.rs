//! Layered settings resolution.
//!
//! Later layers win, key by key:
//!
//! 1. built-in defaults
//! 2. project config (`--config`, else `NKDL_CONFIG`, else `./.nkdl.toml`)
//! 3. user config (`<config dir>/nkdl/config.toml`)
//! 4. environment (`NKDL_<SECTION>_<KEY>`)

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use super::manager::{ConfigError, ConfigResult};
use super::settings::{ConfigSection, Settings};
use crate::plan::{parse_bool, split_list};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "NKDL_";

/// Environment variable naming the project config file.
pub const CONFIG_ENV: &str = "NKDL_CONFIG";

/// Project config picked up from the working directory.
pub const PROJECT_CONFIG_NAME: &str = ".nkdl.toml";

/// The user config file: `<config dir>/nkdl/config.toml`.
pub fn default_user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "nkdl").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Files that feed the layered settings.
#[derive(Debug, Clone, Default)]
pub struct ConfigLayers {
    pub project: Option<PathBuf>,
    /// An explicitly named project file must exist.
    pub project_required: bool,
    pub user: Option<PathBuf>,
}

impl ConfigLayers {
    /// Find the config files for this process.
    pub fn discover(explicit: Option<&Path>) -> Self {
        let (project, project_required) = match explicit {
            Some(path) => (Some(path.to_path_buf()), true),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(path) => (Some(PathBuf::from(path)), true),
                None => (Some(PathBuf::from(PROJECT_CONFIG_NAME)), false),
            },
        };

        Self {
            project,
            project_required,
            user: default_user_config_path(),
        }
    }

    /// Resolve settings from the files and the process environment.
    pub fn load(&self) -> ConfigResult<Settings> {
        self.load_with_env(std::env::vars())
    }

    /// Resolve settings from the files and the given variables.
    pub fn load_with_env<I>(&self, vars: I) -> ConfigResult<Settings>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut merged = toml::Table::try_from(Settings::default())?;

        if let Some(path) = &self.project {
            if let Some(table) = read_layer(path, self.project_required)? {
                tracing::debug!("Applying project config {}", path.display());
                merge_tables(&mut merged, table);
            }
        }
        if let Some(path) = &self.user {
            if let Some(table) = read_layer(path, false)? {
                tracing::debug!("Applying user config {}", path.display());
                merge_tables(&mut merged, table);
            }
        }

        apply_env(&mut merged, vars);

        Ok(toml::Value::Table(merged).try_into()?)
    }
}

/// Resolve settings the way the CLI does.
pub fn load_layered(explicit: Option<&Path>) -> ConfigResult<Settings> {
    ConfigLayers::discover(explicit).load()
}

fn read_layer(path: &Path, required: bool) -> ConfigResult<Option<toml::Table>> {
    if !path.exists() {
        if required {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(toml::from_str(&content)?))
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn apply_env<I>(merged: &mut toml::Table, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (name, raw) in vars {
        let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        if name == CONFIG_ENV {
            continue;
        }
        let rest = rest.to_ascii_lowercase();
        let Some((section_name, key)) = rest.split_once('_') else {
            tracing::warn!("Ignoring {}: expected {}<SECTION>_<KEY>", name, ENV_PREFIX);
            continue;
        };
        let key = key.replace("__", "_");
        let Some(section) = ConfigSection::from_table_name(section_name) else {
            tracing::warn!("Ignoring {}: unknown section '{}'", name, section_name);
            continue;
        };
        let Some(current) = current_value(merged, section, &key) else {
            tracing::warn!("Ignoring {}: unknown key '{}.{}'", name, section_name, key);
            continue;
        };
        match coerce_like(&current, &raw) {
            Ok(value) => {
                tracing::debug!("{} overrides {}.{}", name, section_name, key);
                if let Some(table) = merged
                    .entry(section.table_name())
                    .or_insert_with(|| toml::Value::Table(toml::Table::new()))
                    .as_table_mut()
                {
                    table.insert(key, value);
                }
            }
            Err(message) => tracing::warn!("Ignoring {}: {}", name, message),
        }
    }
}

/// Current value of `section.key` in a serialized settings table.
///
/// Optional keys are absent when unset; they get a typed placeholder.
pub(crate) fn current_value(
    table: &toml::Table,
    section: ConfigSection,
    key: &str,
) -> Option<toml::Value> {
    let existing = table
        .get(section.table_name())
        .and_then(|t| t.as_table())
        .and_then(|t| t.get(key).cloned());
    if existing.is_some() {
        return existing;
    }

    match (section, key) {
        (ConfigSection::Farm, "ssl_cert" | "command_path")
        | (ConfigSection::Logging, "file")
        | (ConfigSection::Submission, "performance_profiler_dir") => {
            Some(toml::Value::String(String::new()))
        }
        (ConfigSection::Submission, "gpu_override") => Some(toml::Value::Integer(0)),
        _ => None,
    }
}

/// Parse `raw` into the same TOML type as `current`.
pub(crate) fn coerce_like(current: &toml::Value, raw: &str) -> Result<toml::Value, String> {
    match current {
        toml::Value::String(_) => Ok(toml::Value::String(raw.to_string())),
        toml::Value::Integer(_) => raw
            .trim()
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|_| format!("expected an integer, got '{}'", raw)),
        toml::Value::Float(_) => raw
            .trim()
            .parse::<f64>()
            .map(toml::Value::Float)
            .map_err(|_| format!("expected a number, got '{}'", raw)),
        toml::Value::Boolean(_) => parse_bool(raw)
            .map(toml::Value::Boolean)
            .ok_or_else(|| format!("expected true/false, got '{}'", raw)),
        toml::Value::Array(_) => Ok(toml::Value::Array(
            split_list(raw).into_iter().map(toml::Value::String).collect(),
        )),
        _ => Err("value type cannot be set from text".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use tempfile::tempdir;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_files() {
        let layers = ConfigLayers::default();
        let settings = layers.load_with_env(Vec::new()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn user_overrides_project_per_key() {
        let dir = tempdir().unwrap();
        let project = dir.path().join(".nkdl.toml");
        let user = dir.path().join("config.toml");
        fs::write(
            &project,
            "[submission]\npool = \"comp\"\npriority = 70\n[farm]\nhost = \"farm01\"\n",
        )
        .unwrap();
        fs::write(&user, "[submission]\npriority = 90\n").unwrap();

        let layers = ConfigLayers {
            project: Some(project),
            project_required: true,
            user: Some(user),
        };
        let settings = layers.load_with_env(Vec::new()).unwrap();
        assert_eq!(settings.submission.pool, "comp");
        assert_eq!(settings.submission.priority, 90);
        assert_eq!(settings.farm.host, "farm01");
        assert_eq!(settings.submission.group, "none");
    }

    #[test]
    fn env_overrides_are_typed() {
        let layers = ConfigLayers::default();
        let settings = layers
            .load_with_env(vars(&[
                ("NKDL_SUBMISSION_PRIORITY", "75"),
                ("NKDL_FARM_USE_WEB_SERVICE", "yes"),
                ("NKDL_FARM_PORT", "9090"),
                ("NKDL_SUBMISSION_LIMIT__GROUPS", "nuke, gpu"),
                ("NKDL_LOGGING_LEVEL", "debug"),
                ("NKDL_LOGGING_FILE", "/tmp/nkdl.log"),
                ("NKDL_CONFIG", "/ignored.toml"),
                ("HOME", "/root"),
            ]))
            .unwrap();
        assert_eq!(settings.submission.priority, 75);
        assert!(settings.farm.use_web_service);
        assert_eq!(settings.farm.port, 9090);
        assert_eq!(settings.submission.limit_groups, vec!["nuke", "gpu"]);
        assert_eq!(settings.logging.level, LogLevel::Debug);
        assert_eq!(settings.logging.file.as_deref(), Some("/tmp/nkdl.log"));
    }

    #[test]
    fn unset_optional_keys_keep_their_type() {
        let layers = ConfigLayers::default();
        let settings = layers
            .load_with_env(vars(&[("NKDL_SUBMISSION_GPU_OVERRIDE", "1")]))
            .unwrap();
        assert_eq!(settings.submission.gpu_override, Some(1));
    }

    #[test]
    fn bad_env_values_are_skipped() {
        let layers = ConfigLayers::default();
        let settings = layers
            .load_with_env(vars(&[
                ("NKDL_SUBMISSION_PRIORITY", "urgent"),
                ("NKDL_NOPE_KEY", "1"),
                ("NKDL_SUBMISSION_NOPE", "1"),
            ]))
            .unwrap();
        assert_eq!(settings.submission.priority, 50);
    }

    #[test]
    fn missing_explicit_project_config_fails() {
        let dir = tempdir().unwrap();
        let layers = ConfigLayers {
            project: Some(dir.path().join("absent.toml")),
            project_required: true,
            user: None,
        };
        assert!(matches!(
            layers.load_with_env(Vec::new()),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn missing_implicit_project_config_is_skipped() {
        let dir = tempdir().unwrap();
        let layers = ConfigLayers {
            project: Some(dir.path().join(PROJECT_CONFIG_NAME)),
            project_required: false,
            user: None,
        };
        assert!(layers.load_with_env(Vec::new()).is_ok());
    }

    #[test]
    fn discover_prefers_explicit_path() {
        let layers = ConfigLayers::discover(Some(Path::new("/shows/abc/.nkdl.toml")));
        assert_eq!(layers.project.as_deref(), Some(Path::new("/shows/abc/.nkdl.toml")));
        assert!(layers.project_required);
    }

    #[test]
    fn coerce_follows_current_type() {
        let int = toml::Value::Integer(1);
        assert_eq!(coerce_like(&int, " 12 ").unwrap(), toml::Value::Integer(12));
        assert!(coerce_like(&int, "x").is_err());
        let flag = toml::Value::Boolean(false);
        assert_eq!(coerce_like(&flag, "on").unwrap(), toml::Value::Boolean(true));
        let text = toml::Value::String(String::new());
        assert_eq!(
            coerce_like(&text, "42").unwrap(),
            toml::Value::String("42".to_string())
        );
    }
}
