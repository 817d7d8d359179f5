use crate::browser::{PageError, PageReader, Tabs};
use crate::config::Config;
use crate::llm::{ModelClient, ModelError};
use crate::providers;
use crate::session::{ReplyOutcome, RunId, Session, TurnRequest};
use crate::settings::{Settings, SettingsStore};
use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::style::Style;
use std::sync::Arc;
use std::time::Duration;
use throbber_widgets_tui::ThrobberState;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tui_textarea::{Input, TextArea};

pub const NO_MODEL_LABEL: &str = "Choose model";

#[derive(Debug)]
pub enum Action {
    Render,
    Resize(u16, u16),
    Quit,
    Error(String),
    UserInput(crossterm::event::KeyEvent),
    Scroll(i16),
    SendMessage,
    Ask(String),
    Summarize,
    PageExtracted(Result<String, PageError>),
    ModelReply {
        run_id: RunId,
        result: Result<String, ModelError>,
    },
    RevealTick(RunId),
    Stop,
    ClearChat,
    OpenPage(String),
    EnterModelSelect,
    SelectBaseModel(Option<String>),
    SettingsChanged(Settings),
    SwitchMode(Mode),
    CopyLastReply,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Mode {
    Insert,
    Normal,
    ModelSelect,
}

pub struct App<'a> {
    pub session: Session,
    pub model_client: ModelClient,
    pub page_reader: PageReader,
    pub tabs: Tabs,
    pub action_tx: mpsc::UnboundedSender<Action>,
    pub input: TextArea<'a>,
    pub mode: Mode,
    pub vertical_scroll: u16,
    pub auto_scroll: bool,
    pub show_help: bool,
    pub spinner_state: ThrobberState,
    pub error: Option<String>,
    pub status: Option<String>,
    pub extracting: bool,
    pub model_label: String,
    pub model_choices: Vec<String>,
    pub selected_choice: usize,
    persona: String,
    reveal_interval: Duration,
    page_char_limit: usize,
}

fn new_input<'a>() -> TextArea<'a> {
    let mut textarea = TextArea::default();
    textarea.set_cursor_line_style(Style::default());
    textarea.set_placeholder_text("Ask anything about the current page...");
    textarea
}

fn model_label(settings: &Settings) -> String {
    settings
        .base_model
        .clone()
        .unwrap_or_else(|| NO_MODEL_LABEL.to_string())
}

impl<'a> App<'a> {
    pub fn new(
        action_tx: mpsc::UnboundedSender<Action>,
        config: Config,
        settings: Arc<SettingsStore>,
    ) -> Self {
        let label = model_label(&settings.snapshot());
        let model_client = ModelClient::new(
            config.endpoint.clone(),
            settings.clone(),
            config.request_timeout(),
        );

        let app = Self {
            session: Session::new(),
            model_client,
            page_reader: PageReader::default(),
            tabs: Tabs::new(),
            action_tx,
            input: new_input(),
            mode: Mode::Insert,
            vertical_scroll: 0,
            auto_scroll: true,
            show_help: false,
            spinner_state: ThrobberState::default(),
            error: None,
            status: None,
            extracting: false,
            model_label: label,
            model_choices: Vec::new(),
            selected_choice: 0,
            persona: config.persona.prompt().to_string(),
            reveal_interval: config.reveal_interval(),
            page_char_limit: config.page_char_limit,
        };
        app.watch_settings(settings);
        app
    }

    /// Forwards settings writes made elsewhere in the process to the loop.
    fn watch_settings(&self, settings: Arc<SettingsStore>) {
        let mut rx = settings.subscribe();
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let next = rx.borrow_and_update().clone();
                if tx.send(Action::SettingsChanged(next)).is_err() {
                    break;
                }
            }
        });
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_busy() || self.extracting
    }

    fn reset_input(&mut self) {
        self.input = new_input();
    }

    fn scroll_to_bottom(&mut self) {
        self.auto_scroll = true;
    }

    fn start_turn(&mut self, request: TurnRequest) {
        self.error = None;
        self.scroll_to_bottom();

        let client = self.model_client.clone();
        let persona = self.persona.clone();
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            let result = client
                .chat_once(&request.history, &request.cancel, &persona)
                .await;
            let _ = tx.send(Action::ModelReply {
                run_id: request.run_id,
                result,
            });
        });
    }

    fn start_reveal(&self, run_id: RunId, timer: CancellationToken) {
        let tx = self.action_tx.clone();
        let period = self.reveal_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = timer.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(Action::RevealTick(run_id)).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn summarize(&mut self) {
        if self.is_busy() {
            return;
        }
        let tab = match self.tabs.active_tab_id() {
            Ok(id) => self.tabs.get(id).cloned().ok_or(PageError::UnknownTab(id)),
            Err(e) => Err(e),
        };
        let tab = match tab {
            Ok(tab) => tab,
            Err(e) => {
                self.session.report_page_error(&e);
                self.scroll_to_bottom();
                return;
            }
        };

        self.extracting = true;
        let reader = self.page_reader.clone();
        let limit = self.page_char_limit;
        let tx = self.action_tx.clone();
        debug!(url = %tab.url, "Extracting page for summary");
        tokio::spawn(async move {
            let result = reader.extract_page_text(&tab, limit).await;
            let _ = tx.send(Action::PageExtracted(result));
        });
    }

    fn run_command(&mut self, line: &str) {
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((c, rest)) => (c, rest.trim()),
            None => (line, ""),
        };
        match command {
            "/open" if !arg.is_empty() => {
                let _ = self.action_tx.send(Action::OpenPage(arg.to_string()));
            }
            "/select" => match self.tabs.select_text(arg) {
                Ok(()) if arg.is_empty() => self.status = Some("Selection cleared".to_string()),
                Ok(()) => self.status = Some(format!("Selected {} characters", arg.chars().count())),
                Err(e) => self.error = Some(e.to_string()),
            },
            "/tabs" => {
                let listing: Vec<String> = self
                    .tabs
                    .list()
                    .iter()
                    .map(|t| format!("{}: {}", t.id, t.url))
                    .collect();
                self.status = Some(if listing.is_empty() {
                    "No tabs open".to_string()
                } else {
                    listing.join("  |  ")
                });
            }
            "/tab" => match arg.parse() {
                Ok(id) => {
                    if let Err(e) = self.tabs.focus(id) {
                        self.error = Some(e.to_string());
                    }
                }
                Err(_) => self.error = Some(format!("Not a tab id: '{}'", arg)),
            },
            "/close" => {
                if let Some(tab) = self.tabs.close_active() {
                    self.status = Some(format!("Closed {}", tab.url));
                }
            }
            "/summarize" => {
                let _ = self.action_tx.send(Action::Summarize);
            }
            "/stop" => {
                let _ = self.action_tx.send(Action::Stop);
            }
            "/clear" => {
                let _ = self.action_tx.send(Action::ClearChat);
            }
            _ => self.error = Some(format!("Unknown command: {}", line)),
        }
    }

    fn send_text(&mut self, content: &str) -> bool {
        if let Some(request) = self.session.send(content) {
            self.start_turn(request);
            true
        } else {
            false
        }
    }

    fn submit_input(&mut self) {
        let content = self.input.lines().join("\n");
        let trimmed = content.trim();
        if trimmed.starts_with('/') {
            let line = trimmed.to_string();
            self.reset_input();
            self.run_command(&line);
            return;
        }
        // Busy or empty: keep whatever was typed.
        if self.send_text(&content) {
            self.reset_input();
        }
    }

    fn open_model_select(&mut self) {
        let settings = self.model_client.settings().snapshot();
        self.model_choices = settings.model_choices();
        self.selected_choice = settings
            .base_model
            .as_ref()
            .and_then(|current| self.model_choices.iter().position(|m| m == current))
            .map(|i| i + 1)
            .unwrap_or(0);
        self.mode = Mode::ModelSelect;
    }

    pub async fn update(&mut self, action: Action) -> bool {
        match action {
            Action::Error(e) => {
                self.error = Some(e);
                true
            }
            Action::Scroll(delta) => {
                if delta > 0 {
                    self.vertical_scroll = self.vertical_scroll.saturating_add(delta as u16);
                } else {
                    self.vertical_scroll = self.vertical_scroll.saturating_sub(delta.unsigned_abs());
                }
                self.auto_scroll = false;
                true
            }
            Action::SendMessage => {
                self.submit_input();
                true
            }
            Action::Ask(text) => {
                self.send_text(&text);
                true
            }
            Action::Summarize => {
                self.summarize();
                true
            }
            Action::PageExtracted(result) => {
                self.extracting = false;
                match result {
                    Ok(text) => {
                        if let Some(request) = self.session.send_summary(&text) {
                            self.start_turn(request);
                        }
                    }
                    Err(e) => self.session.report_page_error(&e),
                }
                self.scroll_to_bottom();
                true
            }
            Action::ModelReply { run_id, result } => {
                match self.session.finish_request(run_id, result) {
                    ReplyOutcome::Reveal { run_id, timer } => self.start_reveal(run_id, timer),
                    ReplyOutcome::Failed => self.scroll_to_bottom(),
                    ReplyOutcome::Discarded => return false,
                }
                true
            }
            Action::RevealTick(run_id) => {
                self.session.reveal_tick(run_id);
                true
            }
            Action::Stop => {
                self.session.stop();
                true
            }
            Action::ClearChat => {
                self.session.clear();
                self.vertical_scroll = 0;
                self.status = None;
                true
            }
            Action::OpenPage(url) => {
                let id = self.tabs.open(&url);
                info!(id, "Page opened");
                self.status = self.tabs.get(id).map(|t| format!("Opened {}", t.url));
                true
            }
            Action::EnterModelSelect => {
                self.open_model_select();
                true
            }
            Action::SelectBaseModel(choice) => {
                match self.model_client.settings().set_base_model(choice) {
                    Ok(settings) => self.model_label = model_label(&settings),
                    Err(e) => {
                        warn!("Failed to save base model: {}", e);
                        self.error = Some(e.to_string());
                    }
                }
                self.mode = Mode::Insert;
                true
            }
            Action::SettingsChanged(settings) => {
                self.model_label = model_label(&settings);
                true
            }
            Action::SwitchMode(mode) => {
                self.mode = mode;
                true
            }
            Action::CopyLastReply => {
                let Some(reply) = self.session.last_reply().map(str::to_string) else {
                    return false;
                };
                match arboard::Clipboard::new().and_then(|mut c| c.set_text(reply)) {
                    Ok(()) => self.status = Some("Copied last reply".to_string()),
                    Err(e) => self.error = Some(format!("Clipboard: {}", e)),
                }
                true
            }
            Action::UserInput(key) => {
                self.handle_key(key);
                true
            }
            _ => false,
        }
    }

    fn handle_key(&mut self, key: crossterm::event::KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        if ctrl {
            let action = match key.code {
                KeyCode::Char('c') => Some(Action::Quit),
                KeyCode::Char('l') => Some(Action::ClearChat),
                KeyCode::Char('s') => Some(Action::Summarize),
                KeyCode::Char('o') => Some(Action::EnterModelSelect),
                KeyCode::Char('y') => Some(Action::CopyLastReply),
                _ => None,
            };
            if let Some(action) = action {
                let _ = self.action_tx.send(action);
                return;
            }
        }

        if self.show_help {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::F(1)) {
                self.show_help = false;
            }
            return;
        }

        match self.mode {
            Mode::Insert => match key.code {
                KeyCode::Esc if self.session.is_busy() => {
                    let _ = self.action_tx.send(Action::Stop);
                }
                KeyCode::Esc => {
                    let _ = self.action_tx.send(Action::SwitchMode(Mode::Normal));
                }
                KeyCode::F(1) => self.show_help = true,
                KeyCode::PageUp => {
                    self.vertical_scroll = self.vertical_scroll.saturating_sub(5);
                    self.auto_scroll = false;
                }
                KeyCode::PageDown => {
                    self.vertical_scroll = self.vertical_scroll.saturating_add(5);
                    self.auto_scroll = false;
                }
                KeyCode::Enter if !key.modifiers.contains(KeyModifiers::SHIFT) => {
                    let _ = self.action_tx.send(Action::SendMessage);
                }
                _ => {
                    self.input.input(Input::from(key));
                }
            },
            Mode::Normal => match key.code {
                KeyCode::Char('i') | KeyCode::Enter => {
                    let _ = self.action_tx.send(Action::SwitchMode(Mode::Insert));
                }
                KeyCode::Char('q') => {
                    let _ = self.action_tx.send(Action::Quit);
                }
                KeyCode::Char('s') => {
                    let _ = self.action_tx.send(Action::Summarize);
                }
                KeyCode::Char('x') | KeyCode::Esc => {
                    let _ = self.action_tx.send(Action::Stop);
                }
                KeyCode::Char('j') | KeyCode::Down => {
                    self.vertical_scroll = self.vertical_scroll.saturating_add(1);
                    self.auto_scroll = false;
                }
                KeyCode::Char('k') | KeyCode::Up => {
                    self.vertical_scroll = self.vertical_scroll.saturating_sub(1);
                    self.auto_scroll = false;
                }
                KeyCode::PageUp => {
                    self.vertical_scroll = self.vertical_scroll.saturating_sub(10);
                    self.auto_scroll = false;
                }
                KeyCode::PageDown => {
                    self.vertical_scroll = self.vertical_scroll.saturating_add(10);
                    self.auto_scroll = false;
                }
                KeyCode::F(1) => self.show_help = true,
                _ => {}
            },
            Mode::ModelSelect => {
                // Index 0 is the "no model" entry.
                let entries = self.model_choices.len() + 1;
                match key.code {
                    KeyCode::Esc => {
                        let _ = self.action_tx.send(Action::SwitchMode(Mode::Insert));
                    }
                    KeyCode::Up | KeyCode::Char('k') => {
                        self.selected_choice = self.selected_choice.saturating_sub(1);
                    }
                    KeyCode::Down | KeyCode::Char('j') => {
                        if self.selected_choice + 1 < entries {
                            self.selected_choice += 1;
                        }
                    }
                    KeyCode::Enter => {
                        let choice = self
                            .selected_choice
                            .checked_sub(1)
                            .and_then(|i| self.model_choices.get(i).cloned());
                        let _ = self.action_tx.send(Action::SelectBaseModel(choice));
                    }
                    _ => {}
                }
            }
        }
    }

    /// Header label for the model the next turn will use.
    pub fn effective_model(&self) -> String {
        if self.model_label == NO_MODEL_LABEL {
            let (provider, model) = providers::parse_base_model(None);
            format!("{} (default)", providers::format_base_model(&provider, &model))
        } else {
            self.model_label.clone()
        }
    }
}
