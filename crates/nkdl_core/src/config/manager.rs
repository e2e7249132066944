//! Config manager for loading, saving, and atomic updates.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Section-level and single-key updates that leave the rest of the file
//!   untouched, comments included (via toml_edit)
//! - Flattened `section.key = value` listing

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::layers::{coerce_like, current_value};
use super::settings::{ConfigSection, Settings};

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Unknown config key '{0}' (expected section.key)")]
    UnknownKey(String),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages one configuration file.
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Current settings loaded in memory.
    settings: Settings,
}

impl ConfigManager {
    /// Create a new config manager with the given config file path.
    ///
    /// Does not load the config - call `load()` or `load_or_create()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get a reference to the current settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get a mutable reference to the current settings.
    ///
    /// Note: Changes made here are only in memory until `save()` or
    /// `update_section()` is called.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Load config from file.
    ///
    /// Returns error if file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = toml::from_str(&content)?;
        Ok(())
    }

    /// Load config from file, creating it with defaults if it doesn't exist.
    ///
    /// An existing file is never rewritten here; user comments survive.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            self.load()?;
        } else {
            self.settings = Settings::default();
            self.save()?;
            tracing::info!("Created default config at {}", self.config_path.display());
        }
        Ok(())
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Update a specific section atomically.
    ///
    /// Re-reads the file from disk, replaces only the given table and writes
    /// back atomically.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let mut doc = self.read_document()?;

        let section_toml = self.section_toml(section)?;
        let section_doc: DocumentMut = section_toml.parse()?;
        doc[section.table_name()] = Item::Table(section_doc.as_table().clone());

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    /// Set one `section.key` in the file, leaving every other line alone.
    ///
    /// The value is typed after the key's current type, so `priority 80`
    /// is written as an integer and `pool 80` as a string.
    pub fn set_value(&mut self, dotted_key: &str, value: &str) -> ConfigResult<()> {
        let (section, key) = split_key(dotted_key)?;

        let serialized = toml::Table::try_from(&self.settings)?;
        let current = current_value(&serialized, section, key)
            .ok_or_else(|| ConfigError::UnknownKey(dotted_key.to_string()))?;
        let typed = coerce_like(&current, value).map_err(|message| {
            ConfigError::InvalidValue {
                key: dotted_key.to_string(),
                message,
            }
        })?;

        let mut doc = self.read_document()?;
        if !doc.contains_table(section.table_name()) {
            doc[section.table_name()] = toml_edit::table();
        }
        doc[section.table_name()][key] = toml_edit::value(toml_value_to_edit(&typed));

        let updated: Settings = toml::from_str(&doc.to_string())?;
        self.atomic_write(&doc.to_string())?;
        self.settings = updated;
        Ok(())
    }

    /// Every setting as `section.key = value`, in file order.
    pub fn flatten(settings: &Settings) -> ConfigResult<Vec<(String, String)>> {
        let table = toml::Table::try_from(settings)?;
        let mut entries = Vec::new();
        for section in ConfigSection::ALL {
            let Some(values) = table.get(section.table_name()).and_then(|t| t.as_table()) else {
                continue;
            };
            for (key, value) in values {
                entries.push((format!("{}.{}", section.table_name(), key), value.to_string()));
            }
        }
        Ok(entries)
    }

    fn read_document(&self) -> ConfigResult<DocumentMut> {
        let content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };
        if content.trim().is_empty() {
            Ok(DocumentMut::new())
        } else {
            Ok(content.parse()?)
        }
    }

    fn section_toml(&self, section: ConfigSection) -> ConfigResult<String> {
        Ok(match section {
            ConfigSection::Farm => toml::to_string_pretty(&self.settings.farm)?,
            ConfigSection::Logging => toml::to_string_pretty(&self.settings.logging)?,
            ConfigSection::Submission => toml::to_string_pretty(&self.settings.submission)?,
            ConfigSection::Gsv => toml::to_string_pretty(&self.settings.gsv)?,
        })
    }

    /// Generate config content with a heading per section.
    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();

        output.push_str("# nkdl configuration\n");
        output.push_str("# Environment variables NKDL_<SECTION>_<KEY> override these values.\n\n");

        for (index, section) in ConfigSection::ALL.into_iter().enumerate() {
            if index > 0 {
                output.push('\n');
            }
            output.push_str(&format!("# {}\n", section.description()));
            output.push_str(&format!("[{}]\n", section.table_name()));
            for line in self.section_toml(section)?.lines() {
                output.push_str(line);
                output.push('\n');
            }
        }

        Ok(output)
    }

    /// Write content to config file atomically.
    ///
    /// Writes to a temp file first, then renames.
    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.config_path.with_extension("toml.tmp");

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn split_key(dotted_key: &str) -> ConfigResult<(ConfigSection, &str)> {
    let (section, key) = dotted_key
        .split_once('.')
        .ok_or_else(|| ConfigError::UnknownKey(dotted_key.to_string()))?;
    let section = ConfigSection::from_table_name(section)
        .ok_or_else(|| ConfigError::UnknownKey(dotted_key.to_string()))?;
    if key.is_empty() {
        return Err(ConfigError::UnknownKey(dotted_key.to_string()));
    }
    Ok((section, key))
}

fn toml_value_to_edit(value: &toml::Value) -> toml_edit::Value {
    match value {
        toml::Value::String(s) => s.as_str().into(),
        toml::Value::Integer(i) => (*i).into(),
        toml::Value::Float(f) => (*f).into(),
        toml::Value::Boolean(b) => (*b).into(),
        toml::Value::Array(items) => {
            let mut array = toml_edit::Array::new();
            for item in items {
                array.push(toml_value_to_edit(item));
            }
            toml_edit::Value::Array(array)
        }
        other => other.to_string().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_or_create_creates_default() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nkdl").join("config.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(config_path.exists());
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[farm]"));
        assert!(content.contains("[submission]"));
        assert!(content.contains("# Job defaults"));

        // The generated file reads back as the defaults.
        let reread: Settings = toml::from_str(&content).unwrap();
        assert_eq!(reread, Settings::default());
    }

    #[test]
    fn load_or_create_preserves_existing() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "# mine\n[submission]\npool = \"comp\"\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert_eq!(manager.settings().submission.pool, "comp");
        assert!(fs::read_to_string(&config_path).unwrap().starts_with("# mine"));
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("absent.toml"));
        assert!(matches!(manager.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn update_section_only_changes_target() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[farm]\nhost = \"farm01\"\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load().unwrap();
        manager.settings_mut().submission.priority = 90;
        manager.update_section(ConfigSection::Submission).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("priority = 90"));
        assert!(content.contains("host = \"farm01\""));
    }

    #[test]
    fn set_value_types_by_key() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "# keep me\n[submission]\npool = \"comp\"\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load().unwrap();
        manager.set_value("submission.priority", "80").unwrap();
        manager.set_value("submission.group", "42").unwrap();
        manager.set_value("farm.use_web_service", "yes").unwrap();
        manager.set_value("farm.command_path", "/opt/farm/bin").unwrap();

        assert_eq!(manager.settings().submission.priority, 80);
        assert_eq!(manager.settings().submission.group, "42");
        assert!(manager.settings().farm.use_web_service);
        assert_eq!(
            manager.settings().farm.command_path.as_deref(),
            Some("/opt/farm/bin")
        );

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.starts_with("# keep me"));
        assert!(content.contains("priority = 80"));
        assert!(content.contains("group = \"42\""));
    }

    #[test]
    fn set_value_rejects_bad_input() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("config.toml"));

        assert!(matches!(
            manager.set_value("submission.nope", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            manager.set_value("nosection", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            manager.set_value("submission.priority", "high"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn flatten_lists_every_section() {
        let entries = ConfigManager::flatten(&Settings::default()).unwrap();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"farm.host"));
        assert!(keys.contains(&"submission.job_name_template"));
        assert!(keys.contains(&"gsv.min_version"));
        let priority = entries.iter().find(|(k, _)| k == "submission.priority").unwrap();
        assert_eq!(priority.1, "50");
    }

    #[test]
    fn atomic_write_creates_no_temp_on_success() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        let temp_path = config_path.with_extension("toml.tmp");
        assert!(!temp_path.exists());
    }
}
