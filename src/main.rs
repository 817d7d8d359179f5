use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind, MouseEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

use pagelens::app::{Action, App};
use pagelens::cli::{run_settings_command, Cli, Command};
use pagelens::config::Config;
use pagelens::logging::init_logging;
use pagelens::settings::SettingsStore;
use pagelens::ui::ui;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path).map_err(|e| eyre!("{:#}", e))?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config, using defaults. Error: {}", e);
            Config::default()
        }),
    };
    if cli.settings.is_some() {
        config.settings_path = cli.settings.clone();
    }

    let settings = Arc::new(match config.resolve_settings_path() {
        Some(path) => SettingsStore::open(path)?,
        None => SettingsStore::in_memory(Default::default()),
    });

    if let Some(Command::Settings(command)) = cli.command {
        let out = run_settings_command(&settings, command).map_err(|e| eyre!("{:#}", e))?;
        print!("{}", out);
        return Ok(());
    }

    if let Err(e) = init_logging(&config.log_level) {
        eprintln!("Warning: logging disabled: {}", e);
    }
    info!(endpoint = %config.endpoint, "Starting pagelens");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (action_tx, mut action_rx) = mpsc::unbounded_channel();
    let mut app = App::new(action_tx.clone(), config, settings);

    let input_handle = {
        let tx = action_tx.clone();
        tokio::spawn(async move {
            loop {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => match event::read() {
                        Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                            let _ = tx.send(Action::UserInput(key));
                        }
                        Ok(Event::Mouse(mouse)) => match mouse.kind {
                            MouseEventKind::ScrollUp => {
                                let _ = tx.send(Action::Scroll(-3));
                            }
                            MouseEventKind::ScrollDown => {
                                let _ = tx.send(Action::Scroll(3));
                            }
                            _ => {}
                        },
                        Ok(Event::Resize(w, h)) => {
                            let _ = tx.send(Action::Resize(w, h));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            let _ = tx.send(Action::Error(e.to_string()));
                            break;
                        }
                    },
                    Ok(false) => {}
                    Err(e) => {
                        let _ = tx.send(Action::Error(e.to_string()));
                        break;
                    }
                }
            }
        })
    };

    if let Some(url) = cli.url {
        let _ = action_tx.send(Action::OpenPage(url));
    }
    let _ = action_tx.send(Action::Render);

    let res = run_app(&mut terminal, &mut app, &mut action_rx).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    input_handle.abort();
    app.session.stop();

    if let Err(err) = &res {
        error!("Exited with error: {}", err);
    }
    res
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App<'_>,
    action_rx: &mut mpsc::UnboundedReceiver<Action>,
) -> Result<()> {
    let mut spinner = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            maybe_action = action_rx.recv() => {
                let Some(action) = maybe_action else { return Ok(()) };
                match action {
                    Action::Render => {
                        terminal.draw(|f| ui(f, app))?;
                    }
                    Action::Resize(_, _) => {
                        terminal.autoresize()?;
                        terminal.draw(|f| ui(f, app))?;
                    }
                    Action::Quit => return Ok(()),
                    _ => {
                        if app.update(action).await {
                            terminal.draw(|f| ui(f, app))?;
                        }
                    }
                }
            }
            _ = spinner.tick() => {
                if app.is_busy() {
                    app.spinner_state.calc_next();
                    terminal.draw(|f| ui(f, app))?;
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
