pub mod cards;
pub mod dialog;
mod header;

use crate::app::{App, Mode};
use chrono::Utc;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let now = Utc::now();
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Cards
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  header::draw_header(frame, chunks[0], app.server(), app.last_refresh(), now);

  let cards = app.cards();
  if cards.is_empty() {
    let hint = Paragraph::new(Line::from(vec![
      Span::styled(" No sites yet. Press ", Style::default().fg(Color::DarkGray)),
      Span::styled("a", Style::default().fg(Color::Cyan)),
      Span::styled(" to add one.", Style::default().fg(Color::DarkGray)),
    ]));
    frame.render_widget(hint, chunks[1]);
  } else {
    cards::draw_cards(frame, chunks[1], &cards, now);
  }

  if *app.mode() == Mode::AddSite {
    app.dialog().draw(frame, chunks[1]);
  }

  draw_status_bar(frame, chunks[2], app);
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App) {
  let (content, style) = match (app.mode(), app.status()) {
    (Mode::AddSite, _) => (
      " Add a site to the dashboard".to_string(),
      Style::default().fg(Color::Yellow),
    ),
    (Mode::Normal, Some(status)) => (format!(" {}", status), Style::default().fg(Color::White)),
    (Mode::Normal, None) => (
      " j/k:nav  r:refresh  a:add  d:remove  q:quit".to_string(),
      Style::default().fg(Color::DarkGray),
    ),
  };

  let paragraph = Paragraph::new(content).style(style);
  frame.render_widget(paragraph, area);
}
