use chrono::{DateTime, Utc};
use ratatui::prelude::*;
use ratatui::widgets::{Block, BorderType, Borders, LineGauge, Paragraph};

use crate::codes::CodeRecord;
use crate::registry::Site;

/// Height of one card including borders
pub const CARD_HEIGHT: u16 = 5;

/// Seconds left at which the countdown turns red
const WARN_SECONDS: i64 = 15;

/// Everything needed to draw one site's card
pub struct CardView<'a> {
  pub site: &'a Site,
  pub record: Option<&'a CodeRecord>,
  pub error: Option<&'a str>,
  pub selected: bool,
}

/// Draw as many cards as fit, keeping the selected one visible
pub fn draw_cards(frame: &mut Frame, area: Rect, cards: &[CardView], now: DateTime<Utc>) {
  let visible = (area.height / CARD_HEIGHT).max(1) as usize;
  let selected = cards.iter().position(|c| c.selected).unwrap_or(0);
  let first = selected.saturating_sub(visible - 1);

  for (i, card) in cards.iter().skip(first).take(visible).enumerate() {
    let y = area.y + (i as u16) * CARD_HEIGHT;
    if y + CARD_HEIGHT > area.y + area.height {
      break;
    }
    let rect = Rect {
      x: area.x,
      y,
      width: area.width,
      height: CARD_HEIGHT,
    };
    draw_card(frame, rect, card, now);
  }
}

fn draw_card(frame: &mut Frame, area: Rect, card: &CardView, now: DateTime<Utc>) {
  let border_style = if card.selected {
    Style::default().fg(Color::Cyan)
  } else {
    Style::default().fg(Color::DarkGray)
  };

  let title_width = area.width.saturating_sub(4) as usize;
  let block = Block::default()
    .title(Span::styled(
      format!(" {} ", truncate(&card.site.label, title_width)),
      Style::default().fg(Color::White).bold(),
    ))
    .borders(Borders::ALL)
    .border_type(BorderType::Rounded)
    .border_style(border_style);

  let inner = block.inner(area);
  frame.render_widget(block, area);

  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Code
      Constraint::Length(1), // Countdown
      Constraint::Length(1), // Status
    ])
    .split(inner);

  let Some(record) = card.record else {
    frame.render_widget(
      Paragraph::new(Span::styled(
        " waiting for code...",
        Style::default().fg(Color::DarkGray),
      )),
      rows[0],
    );
    draw_status(frame, rows[2], card, now);
    return;
  };

  let remaining = record.remaining(now).num_seconds();
  let color = countdown_color(remaining);
  let code_style = if record.is_expired(now) {
    Style::default().fg(Color::DarkGray).crossed_out()
  } else {
    Style::default().fg(Color::Yellow).bold()
  };

  frame.render_widget(
    Paragraph::new(Line::from(vec![
      Span::raw(" "),
      Span::styled(group_code(&record.code), code_style),
    ])),
    rows[0],
  );

  let gauge = LineGauge::default()
    .filled_style(Style::default().fg(color))
    .unfilled_style(Style::default().fg(Color::DarkGray))
    .label(Span::styled(
      format!(" {:>3}s ", remaining),
      Style::default().fg(color),
    ))
    .ratio(countdown_ratio(remaining, record.ttl_seconds));
  frame.render_widget(gauge, rows[1]);

  draw_status(frame, rows[2], card, now);
}

fn draw_status(frame: &mut Frame, area: Rect, card: &CardView, now: DateTime<Utc>) {
  let line = match (card.error, card.record) {
    (Some(error), _) => Span::styled(
      format!(" refresh failed: {}", truncate(error, area.width.saturating_sub(18) as usize)),
      Style::default().fg(Color::Red),
    ),
    (None, Some(record)) => Span::styled(
      format!(" updated {}", format_age(now, record.issued_at)),
      Style::default().fg(Color::DarkGray),
    ),
    (None, None) => Span::raw(""),
  };
  frame.render_widget(Paragraph::new(line), area);
}

/// Countdown color: green, then red for the last seconds
pub fn countdown_color(remaining_secs: i64) -> Color {
  if remaining_secs <= WARN_SECONDS {
    Color::Red
  } else {
    Color::Green
  }
}

/// Fraction of the validity window left, clamped to [0, 1]
pub fn countdown_ratio(remaining_secs: i64, ttl_seconds: u32) -> f64 {
  if ttl_seconds == 0 {
    return 0.0;
  }
  (remaining_secs as f64 / f64::from(ttl_seconds)).clamp(0.0, 1.0)
}

/// Split long numeric codes in two halves for readability ("123 456")
pub fn group_code(code: &str) -> String {
  let chars: Vec<char> = code.chars().collect();
  if chars.len() < 6 || chars.len() % 2 != 0 {
    return code.to_string();
  }
  let (a, b) = chars.split_at(chars.len() / 2);
  format!("{} {}", a.iter().collect::<String>(), b.iter().collect::<String>())
}

/// Human readable age of a timestamp ("12s ago", "3m ago")
pub fn format_age(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
  let secs = (now - then).num_seconds();
  match secs {
    s if s < 0 => "just now".to_string(),
    s if s < 60 => format!("{}s ago", s),
    s if s < 3600 => format!("{}m ago", s / 60),
    s => format!("{}h ago", s / 3600),
  }
}

/// Truncate a string to a maximum number of chars, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
  }

  #[test]
  fn test_countdown_turns_red_at_fifteen_seconds() {
    assert_eq!(countdown_color(16), Color::Green);
    assert_eq!(countdown_color(15), Color::Red);
    assert_eq!(countdown_color(0), Color::Red);
  }

  #[test]
  fn test_countdown_ratio() {
    assert_eq!(countdown_ratio(15, 30), 0.5);
    assert_eq!(countdown_ratio(60, 30), 1.0);
    assert_eq!(countdown_ratio(-5, 30), 0.0);
    assert_eq!(countdown_ratio(10, 0), 0.0);
  }

  #[test]
  fn test_group_code() {
    assert_eq!(group_code("123456"), "123 456");
    assert_eq!(group_code("11331133"), "1133 1133");
    assert_eq!(group_code("12345"), "12345");
    assert_eq!(group_code("1234567"), "1234567");
  }

  #[test]
  fn test_format_age() {
    assert_eq!(format_age(at(100), at(88)), "12s ago");
    assert_eq!(format_age(at(400), at(100)), "5m ago");
    assert_eq!(format_age(at(8000), at(100)), "2h ago");
    assert_eq!(format_age(at(100), at(105)), "just now");
  }

  #[test]
  fn test_truncate() {
    assert_eq!(truncate("hello", 10), "hello");
    assert_eq!(truncate("hello world", 8), "hello...");
    assert_eq!(truncate("héllo wörld", 8), "héllo...");
  }
}
