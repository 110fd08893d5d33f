mod input;

pub use input::{InputResult, TextInput};

use crate::app::{App, Focus};
use crate::search::SearchPhase;
use crate::worklog::{format_duration, FormMessage};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Row, Table};

/// Dropdown rows shown at most
const DROPDOWN_ROWS: u16 = 10;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Length(3), // Issue search
      Constraint::Length(3), // Minutes + date
      Constraint::Length(1), // Form message
      Constraint::Min(3),    // History
      Constraint::Length(1), // Key hints
    ])
    .split(frame.area());

  draw_header(frame, chunks[0], app);
  draw_search(frame, chunks[1], app);
  draw_form(frame, chunks[2], app);
  draw_message(frame, chunks[3], app);
  draw_history(frame, chunks[4], app);
  draw_hints(frame, chunks[5]);

  // Last, so the dropdown covers the form
  draw_dropdown(frame, chunks[1], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
  let header = Line::from(vec![
    Span::styled(" jtk ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(" worklog ", Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", app.user()),
      Style::default().fg(Color::Yellow).bold(),
    ),
  ]);
  frame.render_widget(
    Paragraph::new(header).style(Style::default().bg(Color::Black)),
    area,
  );
}

fn field_block(title: &str, focused: bool) -> Block<'_> {
  let color = if focused { Color::Yellow } else { Color::Blue };
  Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(color))
}

fn field_line(input: &TextInput, focused: bool) -> Line<'_> {
  if !focused {
    return Line::from(input.value());
  }

  let value = input.value();
  let split = value
    .char_indices()
    .nth(input.cursor_position())
    .map(|(i, _)| i)
    .unwrap_or(value.len());
  let (before, rest) = value.split_at(split);
  let mut chars = rest.chars();
  let cursor = Style::default().fg(Color::Black).bg(Color::Yellow);
  match chars.next() {
    Some(c) => Line::from(vec![
      Span::raw(before),
      Span::styled(c.to_string(), cursor),
      Span::raw(chars.as_str()),
    ]),
    None => Line::from(vec![
      Span::raw(before),
      Span::styled("_", Style::default().fg(Color::Yellow)),
    ]),
  }
}

fn draw_search(frame: &mut Frame, area: Rect, app: &App) {
  let focused = app.focus() == Focus::Search;
  let search = &app.panel().search;
  let title = match search.phase() {
    SearchPhase::Waiting | SearchPhase::Querying => " Issue (searching...) ".to_string(),
    _ => match app.panel().selected_issue() {
      Some(key) => format!(" Issue [{}] ", key),
      None => " Issue ".to_string(),
    },
  };

  let paragraph =
    Paragraph::new(field_line(app.input(Focus::Search), focused)).block(field_block(&title, focused));
  frame.render_widget(paragraph, area);
}

fn draw_dropdown(frame: &mut Frame, anchor: Rect, app: &App) {
  let search = &app.panel().search;
  if !search.is_open() {
    return;
  }

  let rows = (search.results().len() as u16).min(DROPDOWN_ROWS);
  let area = Rect::new(
    anchor.x + 1,
    anchor.y + anchor.height,
    anchor.width.saturating_sub(2),
    rows + 2,
  )
  .intersection(frame.area());
  frame.render_widget(Clear, area);

  let width = area.width.saturating_sub(16) as usize;
  let items: Vec<ListItem> = search
    .results()
    .iter()
    .map(|hit| {
      ListItem::new(Line::from(vec![
        Span::styled(format!("{:<12}", hit.key), Style::default().fg(Color::Cyan)),
        Span::raw(" "),
        Span::raw(truncate(&hit.summary, width)),
      ]))
    })
    .collect();

  let list = List::new(items)
    .block(
      Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow)),
    )
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    );

  let mut state = ListState::default();
  state.select(Some(search.highlighted()));
  frame.render_stateful_widget(list, area, &mut state);
}

fn draw_form(frame: &mut Frame, area: Rect, app: &App) {
  let columns = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
    .split(area);

  for (focus, title, column) in [
    (Focus::Minutes, " Minutes ", columns[0]),
    (Focus::Date, " Date (YYYY-MM-DD) ", columns[1]),
  ] {
    let focused = app.focus() == focus;
    let paragraph = Paragraph::new(field_line(app.input(focus), focused))
      .block(field_block(title, focused));
    frame.render_widget(paragraph, column);
  }
}

fn draw_message(frame: &mut Frame, area: Rect, app: &App) {
  let panel = app.panel();
  let line = if panel.is_submitting() {
    Line::styled(" Logging...", Style::default().fg(Color::DarkGray))
  } else {
    match &panel.form.message {
      Some(FormMessage::Success(msg)) => {
        Line::styled(format!(" {}", msg), Style::default().fg(Color::Green))
      }
      Some(FormMessage::Error(msg)) => {
        Line::styled(format!(" {}", msg), Style::default().fg(Color::Red))
      }
      None => Line::default(),
    }
  };
  frame.render_widget(Paragraph::new(line), area);
}

fn draw_history(frame: &mut Frame, area: Rect, app: &App) {
  let panel = app.panel();
  let title = format!(
    " History ({} entries, {}) ",
    panel.history().len(),
    format_duration(panel.total_seconds())
  );
  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if panel.history().is_empty() {
    let content = if panel.selected_issue().is_some() {
      "No worklogs on this issue yet."
    } else {
      "Search for an issue and press Enter to pick it."
    };
    frame.render_widget(
      Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray)),
      area,
    );
    return;
  }

  let header = Row::new(vec!["Started", "Author", "Spent", "Total"])
    .style(Style::default().fg(Color::Yellow).bold());
  // Newest first on screen; totals are computed oldest first
  let rows: Vec<Row> = panel
    .history()
    .iter()
    .rev()
    .map(|total| {
      Row::new(vec![
        total.entry.started.format("%Y-%m-%d %H:%M").to_string(),
        truncate(&total.entry.author, 24),
        format_duration(total.entry.time_spent_seconds),
        format_duration(total.cumulative_seconds),
      ])
    })
    .collect();

  let table = Table::new(
    rows,
    [
      Constraint::Length(17),
      Constraint::Min(12),
      Constraint::Length(8),
      Constraint::Length(9),
    ],
  )
  .header(header)
  .block(block);
  frame.render_widget(table, area);
}

fn draw_hints(frame: &mut Frame, area: Rect) {
  let hint = " Tab:next field  ↑/↓:pick  Enter:select/log  Esc:close  Ctrl-C:quit";
  frame.render_widget(
    Paragraph::new(hint).style(Style::default().fg(Color::DarkGray)),
    area,
  );
}

/// Truncate to `max_chars` characters, adding "..." if truncated
pub fn truncate(s: &str, max_chars: usize) -> String {
  if s.chars().count() <= max_chars {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn spans(line: &Line) -> Vec<String> {
    line.spans.iter().map(|span| span.content.to_string()).collect()
  }

  #[test]
  fn test_field_line_marks_cursor() {
    let mut input = TextInput::with_value("로그인");
    assert_eq!(spans(&field_line(&input, true)), vec!["로그인", "_"]);

    input.handle_key(crossterm::event::KeyEvent::new(
      crossterm::event::KeyCode::Left,
      crossterm::event::KeyModifiers::NONE,
    ));
    assert_eq!(spans(&field_line(&input, true)), vec!["로그", "인", ""]);
    assert_eq!(spans(&field_line(&input, false)), vec!["로그인"]);
  }

  #[test]
  fn test_truncate_counts_chars() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a long summary", 8), "a lon...");
    assert_eq!(truncate("로그인 페이지 수정", 6), "로그인...");
  }
}
