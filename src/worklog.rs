//! Worklog logging and history.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::jira::{Credential, GatewayError, Result, TrackerGateway, WorklogEntry};
use crate::search::SearchDebouncer;

/// Accepts `YYYY-MM-DD` and `YYYY.MM.DD`.
pub fn parse_calendar_date(text: &str) -> Option<NaiveDate> {
  let text = text.trim();
  NaiveDate::parse_from_str(text, "%Y-%m-%d")
    .or_else(|_| NaiveDate::parse_from_str(text, "%Y.%m.%d"))
    .ok()
}

pub fn parse_minutes(text: &str) -> Result<u32> {
  match text.trim().parse::<u32>() {
    Ok(minutes) if minutes > 0 => Ok(minutes),
    _ => Err(GatewayError::validation(format!(
      "Minutes must be a positive whole number, got {:?}",
      text.trim()
    ))),
  }
}

/// `45m`, `1h`, `1h 30m`
pub fn format_duration(seconds: u64) -> String {
  let minutes = (seconds + 30) / 60;
  let (hours, rest) = (minutes / 60, minutes % 60);
  match (hours, rest) {
    (0, m) => format!("{}m", m),
    (h, 0) => format!("{}h", h),
    (h, m) => format!("{}h {}m", h, m),
  }
}

/// A worklog entry with the time logged up to and including it
#[derive(Debug, Clone, PartialEq)]
pub struct RunningTotal {
  pub entry: WorklogEntry,
  pub cumulative_seconds: u64,
}

pub fn running_totals(entries: &[WorklogEntry]) -> Vec<RunningTotal> {
  let mut sorted = entries.to_vec();
  sorted.sort_by_key(|entry| entry.started);

  let mut total = 0;
  sorted
    .into_iter()
    .map(|entry| {
      total += entry.time_spent_seconds;
      RunningTotal {
        entry,
        cumulative_seconds: total,
      }
    })
    .collect()
}

/// Writes worklogs and reloads the affected issue's history.
pub struct WorklogMutator {
  gateway: Arc<dyn TrackerGateway>,
  cred: Credential,
}

impl WorklogMutator {
  pub fn new(gateway: Arc<dyn TrackerGateway>, cred: Credential) -> Self {
    Self { gateway, cred }
  }

  pub async fn history(&self, issue_key: &str) -> Result<Vec<WorklogEntry>> {
    self.gateway.read_worklogs(&self.cred, issue_key).await
  }

  /// Log time and return the full, freshly read history of the issue.
  pub async fn add_entry(
    &self,
    issue_key: &str,
    minutes_text: &str,
    date_text: &str,
  ) -> Result<Vec<WorklogEntry>> {
    if issue_key.trim().is_empty() || minutes_text.trim().is_empty() || date_text.trim().is_empty() {
      return Err(GatewayError::validation(
        "Pick an issue and enter minutes and a date",
      ));
    }
    let minutes = parse_minutes(minutes_text)?;
    let date = parse_calendar_date(date_text).ok_or_else(|| {
      GatewayError::validation(format!(
        "Date must be YYYY-MM-DD or YYYY.MM.DD, got {:?}",
        date_text.trim()
      ))
    })?;

    self
      .gateway
      .write_worklog(&self.cred, issue_key, minutes, date)
      .await?;
    info!(issue = issue_key, minutes, %date, "worklog added");

    self.history(issue_key).await
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMessage {
  Success(String),
  Error(String),
}

#[derive(Debug, Clone, Default)]
pub struct WorklogForm {
  pub minutes: String,
  pub date: String,
  pub message: Option<FormMessage>,
}

enum PanelEvent {
  History(u64, String, Result<Vec<WorklogEntry>>),
  Submitted {
    generation: u64,
    key: String,
    minutes: String,
    result: Result<Vec<WorklogEntry>>,
  },
}

/// State behind the interactive worklog panel: issue search, the entry form
/// and the selected issue's history.
pub struct WorklogPanel {
  pub search: SearchDebouncer,
  pub form: WorklogForm,
  mutator: Arc<WorklogMutator>,
  history: Vec<RunningTotal>,
  history_key: Option<String>,
  /// Bumped by every history read and every submission; older reads are stale
  history_generation: u64,
  submitting: bool,
  sender: mpsc::UnboundedSender<PanelEvent>,
  receiver: mpsc::UnboundedReceiver<PanelEvent>,
}

impl WorklogPanel {
  pub fn new(search: SearchDebouncer, mutator: WorklogMutator) -> Self {
    let (sender, receiver) = mpsc::unbounded_channel();
    Self {
      search,
      form: WorklogForm::default(),
      mutator: Arc::new(mutator),
      history: Vec::new(),
      history_key: None,
      history_generation: 0,
      submitting: false,
      sender,
      receiver,
    }
  }

  pub fn history(&self) -> &[RunningTotal] {
    &self.history
  }

  pub fn total_seconds(&self) -> u64 {
    self.history.last().map(|t| t.cumulative_seconds).unwrap_or(0)
  }

  pub fn is_submitting(&self) -> bool {
    self.submitting
  }

  pub fn selected_issue(&self) -> Option<&str> {
    self.search.selected()
  }

  /// Edit the search text; leaving the pinned key drops the history.
  pub fn input(&mut self, text: &str) {
    self.search.input(text);
    if self.search.selected().is_none() {
      self.history.clear();
      self.history_key = None;
    }
  }

  /// Pick a dropdown row and load its history.
  pub fn select(&mut self, index: usize) -> Option<String> {
    let key = self.search.select(index)?;
    self.load_history(&key);
    Some(key)
  }

  pub fn select_highlighted(&mut self) -> Option<String> {
    let index = self.search.highlighted();
    if !self.search.is_open() {
      return None;
    }
    self.select(index)
  }

  fn load_history(&mut self, key: &str) {
    self.history.clear();
    self.history_key = Some(key.to_string());
    self.request_history(key);
  }

  fn request_history(&mut self, key: &str) {
    self.history_generation += 1;

    let generation = self.history_generation;
    let mutator = self.mutator.clone();
    let sender = self.sender.clone();
    let key = key.to_string();
    tokio::spawn(async move {
      let result = mutator.history(&key).await;
      let _ = sender.send(PanelEvent::History(generation, key, result));
    });
  }

  /// Send the form. Ignored while a submission is in flight.
  pub fn submit(&mut self) {
    if self.submitting {
      return;
    }
    let key = self.search.selected().unwrap_or_default().to_string();
    let minutes = self.form.minutes.clone();
    let date = self.form.date.clone();
    self.submitting = true;
    self.form.message = None;
    self.history_generation += 1;

    let generation = self.history_generation;
    let mutator = self.mutator.clone();
    let sender = self.sender.clone();
    tokio::spawn(async move {
      let result = mutator.add_entry(&key, &minutes, &date).await;
      let _ = sender.send(PanelEvent::Submitted {
        generation,
        key,
        minutes,
        result,
      });
    });
  }

  /// Drain search and panel events. Returns `true` when anything changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = self.search.poll();

    while let Ok(event) = self.receiver.try_recv() {
      match event {
        PanelEvent::History(generation, key, result) => {
          if self.history_key.as_deref() != Some(key.as_str()) {
            debug!(issue = %key, "dropping history for deselected issue");
            continue;
          }
          if generation < self.history_generation {
            debug!(issue = %key, generation, "dropping superseded history");
            continue;
          }
          match result {
            Ok(entries) => self.history = running_totals(&entries),
            Err(err) => warn!(issue = %key, error = %err, "worklog history unavailable"),
          }
          changed = true;
        }
        PanelEvent::Submitted {
          generation,
          key,
          minutes,
          result,
        } => {
          self.submitting = false;
          match result {
            Ok(entries) => {
              self.form.minutes.clear();
              self.form.date.clear();
              self.form.message = Some(FormMessage::Success(format!(
                "{} — {}m logged",
                key,
                minutes.trim()
              )));
              if self.history_key.as_deref() == Some(key.as_str())
                && generation >= self.history_generation
              {
                self.history = running_totals(&entries);
              }
            }
            Err(err) => {
              self.form.message = Some(FormMessage::Error(err.to_string()));
              // The submission superseded any read still in flight
              if self.history_key.as_deref() == Some(key.as_str()) {
                self.request_history(&key);
              }
            }
          }
          changed = true;
        }
      }
    }
    changed
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::jira::types::{parse_timestamp, PickedIssue, Profile, SearchPage};
  use crate::jira::{Issue, SearchRequest};
  use async_trait::async_trait;
  use std::sync::Mutex;
  use std::time::Duration;

  fn entry(started: &str, seconds: u64) -> WorklogEntry {
    WorklogEntry {
      started: parse_timestamp(started).unwrap(),
      time_spent_seconds: seconds,
      author: "Kim".into(),
    }
  }

  /// In-memory worklog store keyed by issue.
  #[derive(Default)]
  struct WorklogFake {
    logs: Mutex<Vec<(String, WorklogEntry)>>,
    writes: Mutex<u32>,
    reads: Mutex<u32>,
    reject_writes: bool,
    /// The first history read answers 150ms late with what it saw at the start
    slow_first_read: bool,
  }

  #[async_trait]
  impl TrackerGateway for WorklogFake {
    async fn verify_identity(&self, _: &Credential) -> Result<Profile> {
      unimplemented!()
    }

    async fn search(&self, _: &Credential, _: &SearchRequest) -> Result<SearchPage> {
      let issue = Issue {
        key: "VAN-7".into(),
        summary: "login page".into(),
        status: "Open".into(),
        project: "VAN".into(),
        time_spent_seconds: None,
        resolved_at: None,
      };
      Ok(SearchPage {
        issues: vec![issue],
        total: 1,
        start_at: 0,
        max_results: 10,
      })
    }

    async fn pick_issues(&self, _: &Credential, _: &str) -> Result<Vec<PickedIssue>> {
      unimplemented!()
    }

    async fn read_worklogs(&self, _: &Credential, key: &str) -> Result<Vec<WorklogEntry>> {
      let first = {
        let mut reads = self.reads.lock().unwrap();
        *reads += 1;
        *reads == 1
      };
      let snapshot: Vec<WorklogEntry> = self
        .logs
        .lock()
        .unwrap()
        .iter()
        .filter(|(k, _)| k == key)
        .map(|(_, e)| e.clone())
        .collect();
      if first && self.slow_first_read {
        tokio::time::sleep(Duration::from_millis(150)).await;
      }
      Ok(snapshot)
    }

    async fn write_worklog(
      &self,
      _: &Credential,
      key: &str,
      minutes: u32,
      date: NaiveDate,
    ) -> Result<Option<WorklogEntry>> {
      *self.writes.lock().unwrap() += 1;
      if self.reject_writes {
        return Err(GatewayError::from_status(
          reqwest::StatusCode::BAD_REQUEST,
          "Worklog must not be null",
        ));
      }
      let started = format!("{}T09:00:00.000+0900", date.format("%Y-%m-%d"));
      let created = entry(&started, u64::from(minutes) * 60);
      self.logs.lock().unwrap().push((key.to_string(), created.clone()));
      Ok(Some(created))
    }
  }

  fn cred() -> Credential {
    Credential::new("acme.atlassian.net", "me", "tok")
  }

  #[test]
  fn test_running_totals_sort_and_accumulate() {
    let totals = running_totals(&[
      entry("2025-03-02T09:00:00.000+0900", 1800),
      entry("2025-03-01T09:00:00.000+0900", 3600),
    ]);
    let cumulative: Vec<u64> = totals.iter().map(|t| t.cumulative_seconds).collect();
    assert_eq!(cumulative, vec![3600, 5400]);
    assert_eq!(totals[0].entry.time_spent_seconds, 3600);
  }

  #[test]
  fn test_format_duration() {
    assert_eq!(format_duration(45 * 60), "45m");
    assert_eq!(format_duration(3600), "1h");
    assert_eq!(format_duration(5400), "1h 30m");
    assert_eq!(format_duration(89), "1m");
    assert_eq!(format_duration(0), "0m");
  }

  #[test]
  fn test_parse_inputs() {
    let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
    assert_eq!(parse_calendar_date("2025-06-02"), Some(date));
    assert_eq!(parse_calendar_date(" 2025.06.02 "), Some(date));
    assert_eq!(parse_calendar_date("06/02/2025"), None);

    assert_eq!(parse_minutes(" 30 ").unwrap(), 30);
    assert!(parse_minutes("0").is_err());
    assert!(parse_minutes("-5").is_err());
    assert!(parse_minutes("1.5").is_err());
  }

  #[tokio::test]
  async fn test_add_entry_writes_then_rereads() {
    let fake = Arc::new(WorklogFake::default());
    fake
      .logs
      .lock()
      .unwrap()
      .push(("VAN-7".into(), entry("2025-03-01T09:00:00.000+0900", 3600)));
    let mutator = WorklogMutator::new(fake.clone(), cred());

    let history = mutator.add_entry("VAN-7", "30", "2025.03.02").await.unwrap();

    assert_eq!(history.len(), 2);
    assert_eq!(*fake.writes.lock().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_add_entry_validates_before_writing() {
    let fake = Arc::new(WorklogFake::default());
    let mutator = WorklogMutator::new(fake.clone(), cred());

    for (key, minutes, date) in [
      ("", "30", "2025-03-02"),
      ("VAN-7", "", "2025-03-02"),
      ("VAN-7", "abc", "2025-03-02"),
      ("VAN-7", "30", "March 2nd"),
    ] {
      let err = mutator.add_entry(key, minutes, date).await.unwrap_err();
      assert!(matches!(err, GatewayError::Validation(_)));
    }
    assert_eq!(*fake.writes.lock().unwrap(), 0);
  }

  fn panel(fake: Arc<WorklogFake>) -> WorklogPanel {
    let search = SearchDebouncer::new(fake.clone(), cred()).with_delay(Duration::from_millis(10));
    WorklogPanel::new(search, WorklogMutator::new(fake, cred()))
  }

  #[tokio::test]
  async fn test_panel_select_submit_and_clear() {
    let fake = Arc::new(WorklogFake::default());
    fake
      .logs
      .lock()
      .unwrap()
      .push(("VAN-7".into(), entry("2025-03-01T09:00:00.000+0900", 3600)));
    let mut panel = panel(fake);

    panel.input("login");
    tokio::time::sleep(Duration::from_millis(40)).await;
    panel.poll();
    assert_eq!(panel.select_highlighted(), Some("VAN-7".to_string()));
    tokio::time::sleep(Duration::from_millis(20)).await;
    panel.poll();
    assert_eq!(panel.total_seconds(), 3600);

    panel.form.minutes = "30".into();
    panel.form.date = "2025-03-02".into();
    panel.submit();
    assert!(panel.is_submitting());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(panel.poll());

    assert_eq!(
      panel.form.message,
      Some(FormMessage::Success("VAN-7 — 30m logged".into()))
    );
    assert!(panel.form.minutes.is_empty());
    assert!(panel.form.date.is_empty());
    assert_eq!(panel.total_seconds(), 5400);
  }

  #[tokio::test]
  async fn test_panel_failure_keeps_fields() {
    let fake = Arc::new(WorklogFake {
      reject_writes: true,
      ..Default::default()
    });
    let mut panel = panel(fake.clone());

    panel.input("VAN-7");
    tokio::time::sleep(Duration::from_millis(40)).await;
    panel.poll();
    panel.select(0);

    panel.form.minutes = "45".into();
    panel.form.date = "2025-03-02".into();
    panel.submit();
    tokio::time::sleep(Duration::from_millis(20)).await;
    panel.poll();

    assert_eq!(
      panel.form.message,
      Some(FormMessage::Error("Worklog must not be null".into()))
    );
    assert_eq!(panel.form.minutes, "45");
    assert_eq!(panel.form.date, "2025-03-02");
    assert!(!panel.is_submitting());

    fake
      .logs
      .lock()
      .unwrap()
      .push(("VAN-7".into(), entry("2025-03-01T09:00:00.000+0900", 600)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    panel.poll();
    assert_eq!(panel.total_seconds(), 600);
  }

  #[tokio::test]
  async fn test_panel_late_history_does_not_overwrite_submission() {
    let fake = Arc::new(WorklogFake {
      slow_first_read: true,
      ..Default::default()
    });
    fake
      .logs
      .lock()
      .unwrap()
      .push(("VAN-7".into(), entry("2025-03-01T09:00:00.000+0900", 3600)));
    let mut panel = panel(fake.clone());

    panel.input("login");
    tokio::time::sleep(Duration::from_millis(40)).await;
    panel.poll();
    panel.select(0);

    // Submit while the selection's history read is still out
    panel.form.minutes = "30".into();
    panel.form.date = "2025-03-02".into();
    panel.submit();
    tokio::time::sleep(Duration::from_millis(30)).await;
    panel.poll();
    assert_eq!(panel.total_seconds(), 5400);

    tokio::time::sleep(Duration::from_millis(200)).await;
    panel.poll();
    assert_eq!(*fake.reads.lock().unwrap(), 2);
    assert_eq!(panel.total_seconds(), 5400);
    assert_eq!(panel.history().len(), 2);
  }
}
