use crate::app::{App, Mode, NO_MODEL_LABEL};
use crate::session::{Role, TurnState};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Span, Text},
    widgets::{Block, BorderType, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};
use throbber_widgets_tui::Throbber;

const REVEAL_CURSOR: &str = "▌";

enum Bubble<'t> {
    Message { is_user: bool, text: Text<'t> },
    Thinking(&'static str),
}

pub fn ui(f: &mut Frame, app: &mut App) {
    let size = f.area();

    if app.show_help {
        let block = Block::default()
            .title(" Help ")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded);
        let area = centered_rect(60, 70, size);
        f.render_widget(Clear, area);
        let help_text = "Controls:\n\nGeneral:\n Ctrl+s: Summarize active page\n Ctrl+l: Clear chat\n Ctrl+o: Model select\n Ctrl+y: Copy last reply\n Ctrl+c: Quit\n F1: Help\n\nInsert Mode:\n Enter: Ask\n Shift+Enter: New line\n Esc: Stop reply (or Normal mode when idle)\n\nNormal Mode:\n j/k: Scroll\n s: Summarize\n x: Stop\n i: Insert mode\n q: Quit\n\nCommands:\n /open <url>   /select <text>\n /tabs   /tab <id>   /close\n /summarize   /stop   /clear";
        f.render_widget(Paragraph::new(help_text).block(block), area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length((3 + app.input.lines().len().saturating_sub(1) as u16).min(10)),
        ])
        .split(size);

    render_header(f, app, chunks[0]);
    render_history(f, app, chunks[1]);
    render_input(f, app, chunks[2]);

    if app.mode == Mode::ModelSelect {
        render_model_select(f, app, size);
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let page = app
        .tabs
        .active()
        .map(|t| format!("[{}] {}", t.id, t.url))
        .unwrap_or_else(|| "no page open (/open <url>)".to_string());
    let title = format!(" PAGE SUMMARY / Q&A - {} ", app.effective_model());

    let header = Paragraph::new(page)
        .style(Style::default().fg(Color::Gray))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .title_alignment(Alignment::Left)
                .style(Style::default().fg(Color::Cyan))
                .border_type(BorderType::Rounded),
        );
    f.render_widget(header, area);
}

fn render_history(f: &mut Frame, app: &mut App, history_area: Rect) {
    let width = history_area.width;
    let bubble_max_width = (width as f32 * 0.80) as u16;
    let transcript = app.session.transcript();

    if transcript.is_empty() && !app.is_busy() {
        let empty_text = "Ask anything about the current page.\n\nOpen one with /open <url>, then press Ctrl+s to summarize it.\n(F1 for help)";
        let p = Paragraph::new(empty_text)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(p, centered_rect(80, 50, history_area));
        return;
    }

    let revealing = app.session.is_revealing();
    let last = transcript.len().saturating_sub(1);

    let mut bubbles: Vec<(u16, Bubble)> = Vec::new();
    let content_width = bubble_max_width.saturating_sub(2);
    for (i, msg) in transcript.iter().enumerate() {
        let is_user = msg.role == Role::User;
        let text = if revealing && i == last && !is_user {
            Text::from(format!("{}{}", msg.content, REVEAL_CURSOR))
        } else {
            tui_markdown::from_str(&msg.content)
        };
        let height = estimate_wrapped_height(&text, content_width).max(1) + 2;
        bubbles.push((height, Bubble::Message { is_user, text }));
    }
    if app.extracting {
        bubbles.push((3, Bubble::Thinking("Reading page...")));
    } else if app.session.state() == TurnState::AwaitingReply {
        bubbles.push((3, Bubble::Thinking("Thinking...")));
    }

    let mut total_height: u16 = bubbles.iter().map(|(h, _)| *h).sum();
    total_height += (bubbles.len() as u16).saturating_sub(1);

    let viewport_height = history_area.height;
    let max_scroll = total_height.saturating_sub(viewport_height);
    if app.auto_scroll || app.vertical_scroll > max_scroll {
        app.vertical_scroll = max_scroll;
    }

    let mut current_y = -(app.vertical_scroll as i32);
    for (height, bubble) in bubbles {
        if current_y + (height as i32) > 0 && current_y < (viewport_height as i32) {
            let is_user = matches!(bubble, Bubble::Message { is_user: true, .. });
            let x = if is_user {
                width.saturating_sub(bubble_max_width)
            } else {
                0
            };

            let area_top = history_area.y as i32;
            let item_top = area_top + current_y;
            let visible_top = item_top.max(area_top);
            let visible_bottom = (item_top + height as i32).min(history_area.bottom() as i32);

            if visible_bottom > visible_top {
                let rect = Rect::new(
                    history_area.x + x,
                    visible_top as u16,
                    bubble_max_width,
                    (visible_bottom - visible_top) as u16,
                );
                let (border_color, title) = if is_user {
                    (Color::Green, " You ")
                } else {
                    (Color::Cyan, " AI ")
                };
                let block = Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(border_color))
                    .title(title);

                match bubble {
                    Bubble::Thinking(label) => {
                        let throbber = Throbber::default().label(label).throbber_style(
                            Style::default()
                                .fg(Color::LightCyan)
                                .add_modifier(Modifier::BOLD),
                        );
                        let inner = block.inner(rect);
                        f.render_widget(block, rect);
                        f.render_stateful_widget(throbber, inner, &mut app.spinner_state);
                    }
                    Bubble::Message { text, .. } => {
                        let scroll_offset = (area_top - item_top).max(0) as u16;
                        let p = Paragraph::new(text)
                            .block(block)
                            .wrap(Wrap { trim: false })
                            .scroll((scroll_offset, 0));
                        f.render_widget(p, rect);
                    }
                }
            }
        }
        current_y += height as i32 + 1;
    }
}

fn render_input(f: &mut Frame, app: &mut App, area: Rect) {
    let (border_color, title) = if let Some(err) = &app.error {
        (Color::Red, format!(" Error: {} ", err))
    } else if let Some(status) = &app.status {
        (Color::Yellow, format!(" {} ", status))
    } else if app.extracting {
        (Color::Magenta, " Reading page... ".to_string())
    } else if app.session.is_busy() {
        (Color::Magenta, " Working... Esc to stop ".to_string())
    } else {
        match app.mode {
            Mode::Normal => (Color::Blue, " Normal mode - i to type ".to_string()),
            _ => (Color::Green, " Ask (Enter) - Ctrl+s summarize ".to_string()),
        }
    };

    match app.mode {
        Mode::Insert => app.input.set_style(Style::default()),
        _ => app
            .input
            .set_style(Style::default().add_modifier(Modifier::DIM)),
    }
    app.input.set_block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(border_color)),
    );
    f.render_widget(&app.input, area);
}

fn render_model_select(f: &mut Frame, app: &App, size: Rect) {
    let area = centered_rect(60, 50, size);
    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Base Model (Enter: select, Esc: cancel) ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded);

    let entries = std::iter::once(NO_MODEL_LABEL.to_string()).chain(app.model_choices.iter().cloned());
    let mut items: Vec<ListItem> = entries
        .enumerate()
        .map(|(i, m)| {
            let style = if i == app.selected_choice {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Span::styled(m, style))
        })
        .collect();
    if app.model_choices.is_empty() {
        items.push(ListItem::new(Span::styled(
            "No providers configured. Run `pagelens settings add-provider`.",
            Style::default().fg(Color::DarkGray),
        )));
    }
    f.render_widget(List::new(items).block(block), area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

pub fn estimate_wrapped_height(text: &Text, width: u16) -> u16 {
    if width == 0 {
        return 0;
    }
    let mut height = 0;
    for line in &text.lines {
        let line_width = line.width() as u16;
        if line_width == 0 {
            height += 1;
        } else {
            height += (line_width as f32 / width as f32).ceil() as u16;
        }
    }
    height
}
