use crate::config::project_dirs;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, Registry};

/// Where the log file goes: the platform data dir, if there is one.
pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}

/// Unknown level names fall back to `info`.
pub fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::INFO)
}

/// Logs to `pagelens.log` in the data dir. The TUI owns stdout, so nothing
/// is written to the terminal.
pub fn init_logging(level: &str) -> anyhow::Result<Option<PathBuf>> {
    let Some(dir) = log_dir() else {
        return Ok(None);
    };
    let path = init_logging_in(&dir, parse_level(level))?;
    Ok(Some(path))
}

pub fn init_logging_in(dir: &Path, level: LevelFilter) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let log_file = dir.join("pagelens.log");
    let file = File::create(&log_file)?;

    let file_layer = fmt::layer()
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .with_filter(level);

    Registry::default().with(file_layer).try_init()?;
    Ok(log_file)
}
