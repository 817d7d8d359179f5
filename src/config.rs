use crate::personas::Persona;
use anyhow::Result;
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub persona: Persona,
    #[serde(default = "default_reveal_interval_ms")]
    pub reveal_interval_ms: u64,
    #[serde(default = "default_page_char_limit")]
    pub page_char_limit: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Overrides the location of the settings store.
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_reveal_interval_ms() -> u64 {
    12
}

fn default_page_char_limit() -> usize {
    12000
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            persona: Persona::default(),
            reveal_interval_ms: default_reveal_interval_ms(),
            page_char_limit: default_page_char_limit(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
            settings_path: None,
        }
    }
}

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "pagelens", "pagelens")
}

impl Config {
    /// Loads `config.toml` from the platform config dir, or defaults.
    pub fn load() -> Result<Self> {
        if let Some(proj_dirs) = project_dirs() {
            let config_path = proj_dirs.config_dir().join("config.toml");
            if config_path.exists() {
                return Self::load_from(&config_path);
            }
        }

        Ok(Config::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn reveal_interval(&self) -> Duration {
        Duration::from_millis(self.reveal_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Settings file location: explicit override, then the platform config dir.
    pub fn resolve_settings_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.settings_path {
            return Some(path.clone());
        }
        project_dirs().map(|dirs| dirs.config_dir().join("settings.json"))
    }
}
