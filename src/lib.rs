pub mod app;
pub mod browser;
pub mod cli;
pub mod config;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod personas;
pub mod providers;
pub mod session;
pub mod settings;
pub mod ui;
