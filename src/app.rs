use crate::event::{Event, EventHandler};
use crate::ui::{self, InputResult, TextInput};
use crate::worklog::WorklogPanel;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;

/// Which field receives typed keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
  Search,
  Minutes,
  Date,
}

impl Focus {
  fn next(self) -> Self {
    match self {
      Focus::Search => Focus::Minutes,
      Focus::Minutes => Focus::Date,
      Focus::Date => Focus::Search,
    }
  }

  fn previous(self) -> Self {
    match self {
      Focus::Search => Focus::Date,
      Focus::Minutes => Focus::Search,
      Focus::Date => Focus::Minutes,
    }
  }
}

/// Interactive worklog panel
pub struct App {
  panel: WorklogPanel,
  focus: Focus,
  search_input: TextInput,
  minutes_input: TextInput,
  date_input: TextInput,
  /// Greeting shown in the header
  user: String,
  should_quit: bool,
}

impl App {
  pub fn new(panel: WorklogPanel, user: impl Into<String>, today: &str) -> Self {
    let mut app = Self {
      panel,
      focus: Focus::Search,
      search_input: TextInput::default(),
      minutes_input: TextInput::default(),
      date_input: TextInput::with_value(today),
      user: user.into(),
      should_quit: false,
    };
    app.panel.form.date = today.to_string();
    app
  }

  pub fn panel(&self) -> &WorklogPanel {
    &self.panel
  }

  pub fn focus(&self) -> Focus {
    self.focus
  }

  pub fn user(&self) -> &str {
    &self.user
  }

  pub fn input(&self, focus: Focus) -> &TextInput {
    match focus {
      Focus::Search => &self.search_input,
      Focus::Minutes => &self.minutes_input,
      Focus::Date => &self.date_input,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(100));
    let result = self.event_loop(&mut terminal, &mut events).await;

    // Restore the terminal even when the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    result
  }

  async fn event_loop<B: Backend>(
    &mut self,
    terminal: &mut Terminal<B>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Tick) => self.tick(),
        None => break,
      }
    }
    Ok(())
  }

  /// Apply background results and mirror the form back into the fields.
  fn tick(&mut self) {
    if !self.panel.poll() {
      return;
    }
    if self.minutes_input.value() != self.panel.form.minutes {
      self.minutes_input.set_value(&self.panel.form.minutes);
    }
    if self.date_input.value() != self.panel.form.date {
      self.date_input.set_value(&self.panel.form.date);
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
      KeyCode::Char('c') | KeyCode::Char('q') if ctrl => {
        self.should_quit = true;
        return;
      }
      KeyCode::Tab => {
        self.panel.search.dismiss();
        self.focus = self.focus.next();
        return;
      }
      KeyCode::BackTab => {
        self.panel.search.dismiss();
        self.focus = self.focus.previous();
        return;
      }
      _ => {}
    }

    match self.focus {
      Focus::Search => self.handle_search_key(key),
      Focus::Minutes | Focus::Date => self.handle_form_key(key),
    }
  }

  fn handle_search_key(&mut self, key: KeyEvent) {
    let open = self.panel.search.is_open();
    match key.code {
      KeyCode::Down if open => self.panel.search.move_highlight(1),
      KeyCode::Up if open => self.panel.search.move_highlight(-1),
      KeyCode::Esc if open => self.panel.search.dismiss(),
      KeyCode::Esc => self.should_quit = true,
      _ => match self.search_input.handle_key(key) {
        InputResult::Edited => {
          let text = self.search_input.value().to_string();
          self.panel.input(&text);
        }
        InputResult::Submitted => {
          if self.panel.select_highlighted().is_some() {
            let pinned = self.panel.search.query().to_string();
            self.search_input.set_value(&pinned);
            self.focus = Focus::Minutes;
          }
        }
        InputResult::Moved | InputResult::NotHandled => {}
      },
    }
  }

  fn handle_form_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Esc {
      self.focus = Focus::Search;
      return;
    }

    let input = match self.focus {
      Focus::Minutes => &mut self.minutes_input,
      _ => &mut self.date_input,
    };
    match input.handle_key(key) {
      InputResult::Edited => {
        let value = input.value().to_string();
        match self.focus {
          Focus::Minutes => self.panel.form.minutes = value,
          _ => self.panel.form.date = value,
        }
      }
      InputResult::Submitted => self.panel.submit(),
      InputResult::Moved | InputResult::NotHandled => {}
    }
  }
}
