use crate::settings::{Settings, SettingsStore};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pagelens", version, about = "Chat with an LLM about the page you are reading")]
pub struct Cli {
    /// Page to open on startup.
    pub url: Option<String>,

    /// Use this config.toml instead of the platform default.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use this settings.json instead of the platform default.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect or edit the settings store without starting the UI.
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Print the stored settings with keys masked.
    Show,
    /// Configure a provider, with its catalog models unless --models is given.
    AddProvider {
        name: String,
        /// Comma separated model ids.
        #[arg(long, value_delimiter = ',')]
        models: Option<Vec<String>>,
        #[arg(long)]
        key: Option<String>,
    },
    SetKey {
        name: String,
        key: String,
    },
    RemoveProvider {
        name: String,
    },
    /// Set the base model as "<provider> > <model>"; omit to clear it.
    BaseModel {
        model: Option<String>,
    },
    Temperature {
        value: f64,
    },
    TopP {
        value: f64,
    },
}

fn mask(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        "*".repeat(count)
    } else {
        let tail: String = key.chars().skip(count - 4).collect();
        format!("{}{}", "*".repeat(count - 4), tail)
    }
}

pub fn render_settings(settings: &Settings) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "base model:  {}\n",
        settings.base_model.as_deref().unwrap_or("(none)")
    ));
    out.push_str(&format!("temperature: {}\n", settings.temperature_or_default()));
    out.push_str(&format!("top p:       {}\n", settings.top_p_or_default()));
    if settings.selected.is_empty() {
        out.push_str("providers:   (none)\n");
    }
    for name in &settings.selected {
        let key = settings.api_key(name);
        let key = if key.is_empty() { "(no key)".to_string() } else { mask(&key) };
        let models = settings
            .models_by_provider
            .get(name)
            .map(|m| m.join(", "))
            .unwrap_or_default();
        out.push_str(&format!("{} [{}]: {}\n", name, key, models));
    }
    out
}

/// Applies one `settings` subcommand and returns what to print.
pub fn run_settings_command(store: &SettingsStore, command: SettingsCommand) -> anyhow::Result<String> {
    let settings = match command {
        SettingsCommand::Show => store.snapshot(),
        SettingsCommand::AddProvider { name, models, key } => {
            let settings = match models {
                Some(models) => {
                    let key = key.clone().unwrap_or_else(|| store.snapshot().api_key(&name));
                    store.save_provider(&name, models, &key)?
                }
                None => store.add_provider(&name)?,
            };
            match key {
                Some(key) => store.set_api_key(&name, &key)?,
                None => settings,
            }
        }
        SettingsCommand::SetKey { name, key } => store.set_api_key(&name, &key)?,
        SettingsCommand::RemoveProvider { name } => store.remove_provider(&name)?,
        SettingsCommand::BaseModel { model } => store.set_base_model(model)?,
        SettingsCommand::Temperature { value } => store.set_temperature(value)?,
        SettingsCommand::TopP { value } => store.set_top_p(value)?,
    };
    Ok(render_settings(&settings))
}
