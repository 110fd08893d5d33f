use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Result of handling a key event in a text field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputResult {
  /// The value changed
  Edited,
  /// Cursor moved, value unchanged
  Moved,
  Submitted,
  NotHandled,
}

/// Single-line text field. The cursor counts characters, not bytes, so
/// Hangul and other multi-byte input edits cleanly.
#[derive(Debug, Clone, Default)]
pub struct TextInput {
  buffer: String,
  cursor: usize,
}

impl TextInput {
  pub fn with_value(value: &str) -> Self {
    let mut input = Self::default();
    input.set_value(value);
    input
  }

  pub fn value(&self) -> &str {
    &self.buffer
  }

  /// Replace the value, moving the cursor to the end.
  pub fn set_value(&mut self, value: &str) {
    self.buffer = value.to_string();
    self.cursor = self.buffer.chars().count();
  }

  pub fn cursor_position(&self) -> usize {
    self.cursor
  }

  fn byte_index(&self, char_index: usize) -> usize {
    self
      .buffer
      .char_indices()
      .nth(char_index)
      .map(|(i, _)| i)
      .unwrap_or(self.buffer.len())
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> InputResult {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let len = self.buffer.chars().count();

    match key.code {
      KeyCode::Enter => InputResult::Submitted,
      KeyCode::Backspace if self.cursor > 0 => {
        self.cursor -= 1;
        let at = self.byte_index(self.cursor);
        self.buffer.remove(at);
        InputResult::Edited
      }
      KeyCode::Delete if self.cursor < len => {
        let at = self.byte_index(self.cursor);
        self.buffer.remove(at);
        InputResult::Edited
      }
      KeyCode::Backspace | KeyCode::Delete => InputResult::Moved,
      KeyCode::Left => {
        self.cursor = self.cursor.saturating_sub(1);
        InputResult::Moved
      }
      KeyCode::Right => {
        self.cursor = (self.cursor + 1).min(len);
        InputResult::Moved
      }
      KeyCode::Home => {
        self.cursor = 0;
        InputResult::Moved
      }
      KeyCode::Char('a') if ctrl => {
        self.cursor = 0;
        InputResult::Moved
      }
      KeyCode::End => {
        self.cursor = len;
        InputResult::Moved
      }
      KeyCode::Char('e') if ctrl => {
        self.cursor = len;
        InputResult::Moved
      }
      KeyCode::Char('u') if ctrl => {
        // Clear line before cursor
        let at = self.byte_index(self.cursor);
        self.buffer.replace_range(..at, "");
        self.cursor = 0;
        InputResult::Edited
      }
      KeyCode::Char(_) if ctrl => InputResult::NotHandled,
      KeyCode::Char(c) => {
        let at = self.byte_index(self.cursor);
        self.buffer.insert(at, c);
        self.cursor += 1;
        InputResult::Edited
      }
      _ => InputResult::NotHandled,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn ctrl_key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::CONTROL)
  }

  fn type_str(input: &mut TextInput, text: &str) {
    for c in text.chars() {
      input.handle_key(key(KeyCode::Char(c)));
    }
  }

  #[test]
  fn test_basic_input_and_submit() {
    let mut input = TextInput::default();
    type_str(&mut input, "30");
    assert_eq!(input.value(), "30");
    assert_eq!(input.handle_key(key(KeyCode::Enter)), InputResult::Submitted);
  }

  #[test]
  fn test_multibyte_editing() {
    let mut input = TextInput::default();
    type_str(&mut input, "로그인");
    input.handle_key(key(KeyCode::Left));
    assert_eq!(input.handle_key(key(KeyCode::Backspace)), InputResult::Edited);
    assert_eq!(input.value(), "로인");
    input.handle_key(key(KeyCode::Char('그')));
    assert_eq!(input.value(), "로그인");
    assert_eq!(input.cursor_position(), 2);
  }

  #[test]
  fn test_backspace_at_start_is_not_an_edit() {
    let mut input = TextInput::with_value("ab");
    input.handle_key(key(KeyCode::Home));
    assert_eq!(input.handle_key(key(KeyCode::Backspace)), InputResult::Moved);
    assert_eq!(input.value(), "ab");
  }

  #[test]
  fn test_ctrl_u_clear_before_cursor() {
    let mut input = TextInput::with_value("hello world");
    for _ in 0..5 {
      input.handle_key(key(KeyCode::Left));
    }
    input.handle_key(ctrl_key(KeyCode::Char('u')));
    assert_eq!(input.value(), "world");
    assert_eq!(input.cursor_position(), 0);
  }

  #[test]
  fn test_ctrl_chars_are_not_typed() {
    let mut input = TextInput::default();
    assert_eq!(
      input.handle_key(ctrl_key(KeyCode::Char('c'))),
      InputResult::NotHandled
    );
    assert!(input.value().is_empty());
  }
}
