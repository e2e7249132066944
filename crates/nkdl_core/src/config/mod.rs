//! Configuration management for nkdl.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Layered resolution (defaults, project file, user file, environment)
//! - Atomic file writes (write to temp, then rename)
//! - Single-key and section-level updates that keep the rest of the file
//!
//! # Example
//!
//! ```no_run
//! use nkdl_core::config::{load_layered, ConfigManager, ConfigSection};
//!
//! // Effective settings for this process
//! let settings = load_layered(None).unwrap();
//! println!("Pool: {}", settings.submission.pool);
//!
//! // Edit the user file
//! let mut config = ConfigManager::new("/home/me/.config/nkdl/config.toml");
//! config.load_or_create().unwrap();
//! config.set_value("submission.priority", "80").unwrap();
//! config.settings_mut().farm.use_web_service = true;
//! config.update_section(ConfigSection::Farm).unwrap();
//! ```

mod layers;
mod manager;
mod settings;

pub use layers::{
    default_user_config_path, load_layered, ConfigLayers, CONFIG_ENV, ENV_PREFIX,
    PROJECT_CONFIG_NAME,
};
pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, FarmSettings, GsvSettings, LoggingSettings, Settings, SubmissionSettings,
};
