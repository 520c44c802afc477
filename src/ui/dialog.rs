//! The add-site dialog: a key field and a label field.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, BorderType, Borders, Clear, Paragraph};

/// Result of handling a key event in the dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogResult {
  /// Key was handled, dialog stays open
  Consumed,
  /// Both fields filled and confirmed
  Submitted { key: String, label: String },
  /// Escape pressed, dialog closed
  Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Field {
  #[default]
  Key,
  Label,
}

/// Single-line editor with a cursor, counted in chars
#[derive(Debug, Clone, Default)]
struct LineEdit {
  chars: Vec<char>,
  cursor: usize,
}

impl LineEdit {
  fn value(&self) -> String {
    self.chars.iter().collect()
  }

  fn handle(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Backspace if self.cursor > 0 => {
        self.cursor -= 1;
        self.chars.remove(self.cursor);
      }
      KeyCode::Delete if self.cursor < self.chars.len() => {
        self.chars.remove(self.cursor);
      }
      KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
      KeyCode::Right => self.cursor = (self.cursor + 1).min(self.chars.len()),
      KeyCode::Home => self.cursor = 0,
      KeyCode::End => self.cursor = self.chars.len(),
      KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        // Clear line before cursor
        self.chars.drain(..self.cursor);
        self.cursor = 0;
      }
      KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
      }
      _ => {}
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct AddSiteDialog {
  key: LineEdit,
  label: LineEdit,
  focus: Field,
  error: Option<String>,
}

impl AddSiteDialog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> DialogResult {
    match key.code {
      KeyCode::Esc => DialogResult::Cancelled,
      KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
        self.focus = match self.focus {
          Field::Key => Field::Label,
          Field::Label => Field::Key,
        };
        DialogResult::Consumed
      }
      KeyCode::Enter => self.submit(),
      _ => {
        self.error = None;
        match self.focus {
          Field::Key => self.key.handle(key),
          Field::Label => self.label.handle(key),
        }
        DialogResult::Consumed
      }
    }
  }

  /// Enter on the key field moves to the label; on the label it submits.
  fn submit(&mut self) -> DialogResult {
    let key = self.key.value().trim().to_string();
    if key.is_empty() {
      self.focus = Field::Key;
      self.error = Some("key is required".to_string());
      return DialogResult::Consumed;
    }

    if self.focus == Field::Key {
      self.focus = Field::Label;
      return DialogResult::Consumed;
    }

    // The label defaults to the key
    let label = match self.label.value().trim() {
      "" => key.clone(),
      l => l.to_string(),
    };
    DialogResult::Submitted { key, label }
  }

  pub fn draw(&self, frame: &mut Frame, area: Rect) {
    let area = centered(area, 60, 7);
    frame.render_widget(Clear, area);

    let block = Block::default()
      .title(" Add site ")
      .borders(Borders::ALL)
      .border_type(BorderType::Rounded)
      .border_style(Style::default().fg(Color::Cyan));

    let field_line = |name: &str, edit: &LineEdit, focused: bool| {
      let style = if focused {
        Style::default().fg(Color::Yellow)
      } else {
        Style::default().fg(Color::White)
      };
      let mut spans = vec![
        Span::styled(format!(" {:<6} ", name), Style::default().fg(Color::DarkGray)),
        Span::styled(edit.value(), style),
      ];
      if focused {
        spans.push(Span::styled("▏", Style::default().fg(Color::Yellow)));
      }
      Line::from(spans)
    };

    let hint = match &self.error {
      Some(e) => Line::from(Span::styled(format!(" {}", e), Style::default().fg(Color::Red))),
      None => Line::from(Span::styled(
        " <Tab> switch  <Enter> confirm  <Esc> cancel",
        Style::default().fg(Color::DarkGray),
      )),
    };

    let lines = vec![
      field_line("key", &self.key, self.focus == Field::Key),
      field_line("label", &self.label, self.focus == Field::Label),
      Line::default(),
      hint,
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
  }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
  let width = width.min(area.width);
  let height = height.min(area.height);
  Rect {
    x: area.x + (area.width - width) / 2,
    y: area.y + (area.height - height) / 2,
    width,
    height,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_str(dialog: &mut AddSiteDialog, s: &str) {
    for c in s.chars() {
      dialog.handle_key(key(KeyCode::Char(c)));
    }
  }

  #[test]
  fn test_enter_moves_from_key_to_label_then_submits() {
    let mut dialog = AddSiteDialog::new();
    type_str(&mut dialog, "2459115");
    assert_eq!(dialog.handle_key(key(KeyCode::Enter)), DialogResult::Consumed);

    type_str(&mut dialog, "localhost:9019");
    assert_eq!(
      dialog.handle_key(key(KeyCode::Enter)),
      DialogResult::Submitted {
        key: "2459115".to_string(),
        label: "localhost:9019".to_string(),
      }
    );
  }

  #[test]
  fn test_label_defaults_to_key() {
    let mut dialog = AddSiteDialog::new();
    type_str(&mut dialog, "abc");
    dialog.handle_key(key(KeyCode::Tab));
    assert_eq!(
      dialog.handle_key(key(KeyCode::Enter)),
      DialogResult::Submitted {
        key: "abc".to_string(),
        label: "abc".to_string(),
      }
    );
  }

  #[test]
  fn test_empty_key_is_not_submitted() {
    let mut dialog = AddSiteDialog::new();
    dialog.handle_key(key(KeyCode::Tab));
    type_str(&mut dialog, "label only");

    assert_eq!(dialog.handle_key(key(KeyCode::Enter)), DialogResult::Consumed);
    assert!(dialog.error.is_some());
    assert_eq!(dialog.focus, Field::Key);
  }

  #[test]
  fn test_editing_keys() {
    let mut dialog = AddSiteDialog::new();
    type_str(&mut dialog, "ac");
    dialog.handle_key(key(KeyCode::Left));
    type_str(&mut dialog, "b");
    assert_eq!(dialog.key.value(), "abc");

    dialog.handle_key(key(KeyCode::End));
    dialog.handle_key(key(KeyCode::Backspace));
    assert_eq!(dialog.key.value(), "ab");

    dialog.handle_key(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL));
    assert_eq!(dialog.key.value(), "");
  }

  #[test]
  fn test_escape_cancels() {
    let mut dialog = AddSiteDialog::new();
    type_str(&mut dialog, "x");
    assert_eq!(dialog.handle_key(key(KeyCode::Esc)), DialogResult::Cancelled);
  }
}
