use chrono::{DateTime, Utc};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::refresh::RefreshSummary;

use super::cards::format_age;

/// Draw the header bar with logo, server, last refresh and shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  server: &str,
  last_refresh: Option<&(DateTime<Utc>, RefreshSummary)>,
  now: DateTime<Utc>,
) {
  let refresh = match last_refresh {
    Some((at, summary)) if summary.failed > 0 => Span::styled(
      format!(" refreshed {}, {} failed ", format_age(now, *at), summary.failed),
      Style::default().fg(Color::Red),
    ),
    Some((at, _)) => Span::styled(
      format!(" refreshed {} ", format_age(now, *at)),
      Style::default().fg(Color::Green),
    ),
    None => Span::styled(" loading... ", Style::default().fg(Color::DarkGray)),
  };

  let header = Line::from(vec![
    Span::styled(" codeboard ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", server_host(server)), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    refresh,
    Span::raw("  "),
    // Shortcuts - keys highlighted, descriptions dimmed
    Span::styled("<r>", Style::default().fg(Color::Cyan)),
    Span::styled(" refresh", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<a>", Style::default().fg(Color::Cyan)),
    Span::styled(" add", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<d>", Style::default().fg(Color::Cyan)),
    Span::styled(" remove", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<q>", Style::default().fg(Color::Cyan)),
    Span::styled(" quit", Style::default().fg(Color::DarkGray)),
  ]);

  let paragraph = Paragraph::new(header).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}

/// Host and port of the server URL
fn server_host(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}
