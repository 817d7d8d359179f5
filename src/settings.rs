//! Persistent key-value settings shared by the chat panel and the CLI.
//!
//! The store is the single source of truth for API keys and the selected
//! model. Readers are expected to call [`SettingsStore::snapshot`] every time
//! they need a value so that edits made by another process (for example
//! `pagelens settings set-key` in a second terminal) apply on the next turn.

use crate::providers::{self, MODEL_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.95;
pub const MAX_TEMPERATURE: f64 = 2.0;
pub const MAX_TOP_P: f64 = 1.0;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub api_keys: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Configured providers, in the order they were added.
    #[serde(default)]
    pub selected: Vec<String>,
    #[serde(default)]
    pub models_by_provider: BTreeMap<String, Vec<String>>,
}

impl Settings {
    pub fn temperature_or_default(&self) -> f64 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn top_p_or_default(&self) -> f64 {
        self.top_p.unwrap_or(DEFAULT_TOP_P)
    }

    pub fn api_key(&self, provider: &str) -> String {
        self.api_keys.get(provider).cloned().unwrap_or_default()
    }

    /// Every `"<provider> > <model>"` the user can pick, in display order.
    pub fn model_choices(&self) -> Vec<String> {
        self.selected
            .iter()
            .flat_map(|name| {
                self.models_by_provider
                    .get(name)
                    .into_iter()
                    .flatten()
                    .map(move |model| providers::format_base_model(name, model))
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    state: watch::Sender<Settings>,
}

impl SettingsStore {
    /// A store that lives only as long as the process.
    pub fn in_memory(initial: Settings) -> Self {
        let (state, _) = watch::channel(initial);
        Self { path: None, state }
    }

    /// Opens a file-backed store. A missing file starts out empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let initial = if path.exists() {
            read_settings(&path)?
        } else {
            Settings::default()
        };
        let (state, _) = watch::channel(initial);
        Ok(Self {
            path: Some(path),
            state,
        })
    }

    /// Current settings, re-read from disk when file-backed.
    pub fn snapshot(&self) -> Settings {
        if let Some(path) = &self.path {
            if path.exists() {
                match read_settings(path) {
                    Ok(fresh) => {
                        self.state.send_if_modified(|current| {
                            if *current != fresh {
                                *current = fresh.clone();
                                true
                            } else {
                                false
                            }
                        });
                        return fresh;
                    }
                    Err(e) => warn!("Keeping cached settings, reload failed: {}", e),
                }
            }
        }
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.state.subscribe()
    }

    fn update<F>(&self, edit: F) -> Result<Settings, SettingsError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut next = self.snapshot();
        edit(&mut next);
        if let Some(path) = &self.path {
            write_settings(path, &next)?;
        }
        self.state.send_replace(next.clone());
        Ok(next)
    }

    pub fn add_provider(&self, name: &str) -> Result<Settings, SettingsError> {
        debug!("Adding provider {}", name);
        self.update(|s| {
            if !s.selected.iter().any(|n| n == name) {
                s.selected.push(name.to_string());
            }
            s.models_by_provider
                .entry(name.to_string())
                .or_insert_with(|| providers::default_models(name));
        })
    }

    /// Stores a provider's model list and key and marks it configured.
    pub fn save_provider(
        &self,
        name: &str,
        models: Vec<String>,
        api_key: &str,
    ) -> Result<Settings, SettingsError> {
        debug!("Saving provider {} with {} models", name, models.len());
        self.update(|s| {
            if !s.selected.iter().any(|n| n == name) {
                s.selected.push(name.to_string());
            }
            s.models_by_provider.insert(name.to_string(), models);
            s.api_keys.insert(name.to_string(), api_key.to_string());
        })
    }

    pub fn set_api_key(&self, name: &str, api_key: &str) -> Result<Settings, SettingsError> {
        self.update(|s| {
            s.api_keys.insert(name.to_string(), api_key.to_string());
        })
    }

    /// Forgets a provider entirely. A base model pointing at it is cleared too.
    pub fn remove_provider(&self, name: &str) -> Result<Settings, SettingsError> {
        debug!("Removing provider {}", name);
        let prefix = format!("{}{}", name, MODEL_SEPARATOR);
        self.update(|s| {
            s.selected.retain(|n| n != name);
            s.models_by_provider.remove(name);
            s.api_keys.remove(name);
            if s
                .base_model
                .as_deref()
                .is_some_and(|base| base.starts_with(&prefix))
            {
                s.base_model = None;
            }
        })
    }

    pub fn set_base_model(&self, base_model: Option<String>) -> Result<Settings, SettingsError> {
        self.update(|s| s.base_model = base_model.filter(|m| !m.trim().is_empty()))
    }

    pub fn set_temperature(&self, value: f64) -> Result<Settings, SettingsError> {
        let value = clamp(value, MAX_TEMPERATURE);
        self.update(|s| s.temperature = Some(value))
    }

    pub fn set_top_p(&self, value: f64) -> Result<Settings, SettingsError> {
        let value = clamp(value, MAX_TOP_P);
        self.update(|s| s.top_p = Some(value))
    }
}

fn clamp(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max)
    }
}

fn read_settings(path: &Path) -> Result<Settings, SettingsError> {
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    Ok(serde_json::from_str(&contents)?)
}

fn write_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let json = serde_json::to_string_pretty(settings)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_unset() {
        let s = Settings::default();
        assert_eq!(s.temperature_or_default(), 0.7);
        assert_eq!(s.top_p_or_default(), 0.95);
        assert_eq!(s.api_key("Google"), "");
    }

    #[test]
    fn test_json_uses_storage_key_names() {
        let store = SettingsStore::in_memory(Settings::default());
        store.set_api_key("Gemini", "abc").unwrap();
        let s = store.set_top_p(0.5).unwrap();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["apiKeys"]["Gemini"], "abc");
        assert_eq!(json["topP"], 0.5);
        assert!(json.get("baseModel").is_none());
    }

    #[test]
    fn test_remove_provider_clears_matching_base_model() {
        let store = SettingsStore::in_memory(Settings::default());
        store
            .save_provider("Gemini", vec!["gemini-2.5-pro".to_string()], "key")
            .unwrap();
        store
            .set_base_model(Some("Gemini > gemini-2.5-pro".to_string()))
            .unwrap();

        let s = store.remove_provider("Gemini").unwrap();
        assert!(s.selected.is_empty());
        assert!(s.api_keys.is_empty());
        assert!(s.models_by_provider.is_empty());
        assert_eq!(s.base_model, None);
    }

    #[test]
    fn test_remove_provider_keeps_unrelated_base_model() {
        let store = SettingsStore::in_memory(Settings::default());
        store.add_provider("OpenAI").unwrap();
        store.add_provider("Gemini").unwrap();
        store
            .set_base_model(Some("Gemini > gemini-2.5-flash".to_string()))
            .unwrap();

        let s = store.remove_provider("OpenAI").unwrap();
        assert_eq!(s.selected, vec!["Gemini".to_string()]);
        assert_eq!(s.base_model.as_deref(), Some("Gemini > gemini-2.5-flash"));
    }

    #[test]
    fn test_add_provider_seeds_catalog_models_once() {
        let store = SettingsStore::in_memory(Settings::default());
        store
            .save_provider("Gemini", vec!["custom".to_string()], "k")
            .unwrap();
        let s = store.add_provider("Gemini").unwrap();
        assert_eq!(s.selected, vec!["Gemini".to_string()]);
        assert_eq!(s.models_by_provider["Gemini"], vec!["custom".to_string()]);
        assert_eq!(s.model_choices(), vec!["Gemini > custom".to_string()]);
    }

    #[test]
    fn test_sampling_values_are_clamped() {
        let store = SettingsStore::in_memory(Settings::default());
        assert_eq!(store.set_temperature(5.0).unwrap().temperature, Some(2.0));
        assert_eq!(store.set_temperature(-1.0).unwrap().temperature, Some(0.0));
        assert_eq!(store.set_top_p(1.5).unwrap().top_p, Some(1.0));
    }

    #[test]
    fn test_blank_base_model_is_cleared() {
        let store = SettingsStore::in_memory(Settings::default());
        store.set_base_model(Some("gemini-2.5-pro".to_string())).unwrap();
        let s = store.set_base_model(Some("  ".to_string())).unwrap();
        assert_eq!(s.base_model, None);
    }

    #[test]
    fn test_file_store_persists_and_rereads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = SettingsStore::open(&path).unwrap();
        store.set_api_key("Google", "first").unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        // Another process edits the file behind our back.
        let other = SettingsStore::open(&path).unwrap();
        other.set_api_key("Google", "second").unwrap();

        assert_eq!(store.snapshot().api_key("Google"), "second");
    }

    #[test]
    fn test_corrupt_file_keeps_cached_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::open(&path).unwrap();
        store.set_temperature(1.0).unwrap();

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(store.snapshot().temperature, Some(1.0));
        assert!(SettingsStore::open(&path).is_err());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let store = SettingsStore::in_memory(Settings::default());
        let mut rx = store.subscribe();
        store
            .set_base_model(Some("Gemini > gemini-2.5-pro".to_string()))
            .unwrap();
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow().base_model.as_deref(),
            Some("Gemini > gemini-2.5-pro")
        );
    }
}
