//! Search-as-you-type with a debounce window.
//!
//! Keystrokes restart a timer; only when it fires is a single-page search
//! issued. Every timer carries a generation number and responses from an
//! older generation are dropped, so a slow early response can never replace
//! the results of a later query.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::jira::{Credential, Issue, Result, SearchRequest, TrackerGateway};

pub const DEFAULT_DELAY: Duration = Duration::from_millis(300);
const RESULT_LIMIT: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
  Idle,
  Waiting,
  Querying,
  ResultsShown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
  pub key: String,
  pub summary: String,
}

impl From<Issue> for SearchHit {
  fn from(issue: Issue) -> Self {
    Self {
      key: issue.key,
      summary: issue.summary,
    }
  }
}

/// `ABC-123`, any letter case
pub fn is_issue_key(text: &str) -> bool {
  match text.split_once('-') {
    Some((project, number)) => {
      !project.is_empty()
        && project.chars().all(|c| c.is_ascii_alphabetic())
        && !number.is_empty()
        && number.chars().all(|c| c.is_ascii_digit())
    }
    None => false,
  }
}

fn escape_jql(text: &str) -> String {
  text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Exact key lookup for key-shaped input, otherwise a fuzzy summary match.
pub fn build_filter(text: &str) -> String {
  let text = text.trim();
  if is_issue_key(text) {
    format!("key = \"{}\"", text.to_uppercase())
  } else {
    format!("summary ~ \"{}\" ORDER BY updated DESC", escape_jql(text))
  }
}

enum SearchEvent {
  Fired(u64),
  Results(u64, Result<Vec<SearchHit>>),
}

pub struct SearchDebouncer {
  gateway: Arc<dyn TrackerGateway>,
  cred: Credential,
  delay: Duration,

  query: String,
  phase: SearchPhase,
  results: Vec<SearchHit>,
  open: bool,
  highlighted: usize,
  selected: Option<String>,

  generation: u64,
  timer: Option<JoinHandle<()>>,
  sender: mpsc::UnboundedSender<SearchEvent>,
  receiver: mpsc::UnboundedReceiver<SearchEvent>,
}

impl SearchDebouncer {
  pub fn new(gateway: Arc<dyn TrackerGateway>, cred: Credential) -> Self {
    let (sender, receiver) = mpsc::unbounded_channel();
    Self {
      gateway,
      cred,
      delay: DEFAULT_DELAY,
      query: String::new(),
      phase: SearchPhase::Idle,
      results: Vec::new(),
      open: false,
      highlighted: 0,
      selected: None,
      generation: 0,
      timer: None,
      sender,
      receiver,
    }
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn query(&self) -> &str {
    &self.query
  }

  pub fn phase(&self) -> SearchPhase {
    self.phase
  }

  pub fn results(&self) -> &[SearchHit] {
    &self.results
  }

  pub fn is_open(&self) -> bool {
    self.open
  }

  pub fn highlighted(&self) -> usize {
    self.highlighted
  }

  pub fn selected(&self) -> Option<&str> {
    self.selected.as_deref()
  }

  /// Replace the query text and restart the debounce window.
  pub fn input(&mut self, text: &str) {
    self.query = text.to_string();
    if self.selected.as_deref().is_some_and(|key| key != text) {
      self.selected = None;
    }

    if let Some(timer) = self.timer.take() {
      timer.abort();
    }
    self.generation += 1;

    if text.trim().is_empty() {
      self.phase = SearchPhase::Idle;
      self.results.clear();
      self.open = false;
      return;
    }

    self.phase = SearchPhase::Waiting;
    let generation = self.generation;
    let delay = self.delay;
    let request = SearchRequest::new(build_filter(text))
      .with_fields(&["summary"])
      .with_page(0, RESULT_LIMIT);
    let gateway = self.gateway.clone();
    let cred = self.cred.clone();
    let sender = self.sender.clone();

    self.timer = Some(tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      let _ = sender.send(SearchEvent::Fired(generation));

      // Detached so a later keystroke aborting the timer leaves it running
      tokio::spawn(async move {
        debug!(jql = %request.jql, generation, "searching");
        let result = gateway
          .search(&cred, &request)
          .await
          .map(|page| page.issues.into_iter().map(SearchHit::from).collect());
        let _ = sender.send(SearchEvent::Results(generation, result));
      });
    }));
  }

  /// Apply timer and response events. Returns `true` when anything changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(event) = self.receiver.try_recv() {
      match event {
        SearchEvent::Fired(generation) if generation == self.generation => {
          self.timer = None;
          self.phase = SearchPhase::Querying;
          changed = true;
        }
        SearchEvent::Results(generation, result) if generation == self.generation => {
          match result {
            Ok(hits) => {
              self.open = !hits.is_empty();
              self.results = hits;
              self.highlighted = 0;
              self.phase = SearchPhase::ResultsShown;
            }
            Err(err) => {
              warn!(error = %err, "search failed");
              self.results.clear();
              self.open = false;
              self.phase = SearchPhase::Idle;
            }
          }
          changed = true;
        }
        SearchEvent::Fired(generation) | SearchEvent::Results(generation, _) => {
          debug!(generation, current = self.generation, "dropping stale search event");
        }
      }
    }
    changed
  }

  /// Pin the query to a result and return its key.
  ///
  /// A timer still pending from later typing is aborted and anything already
  /// in flight becomes stale, so the dropdown stays closed.
  pub fn select(&mut self, index: usize) -> Option<String> {
    let key = self.results.get(index)?.key.clone();
    if let Some(timer) = self.timer.take() {
      timer.abort();
    }
    self.generation += 1;
    self.phase = SearchPhase::ResultsShown;
    self.query = key.clone();
    self.selected = Some(key.clone());
    self.open = false;
    Some(key)
  }

  /// Close the dropdown, keeping query and selection.
  pub fn dismiss(&mut self) {
    self.open = false;
  }

  /// Move the dropdown highlight, wrapping at both ends.
  pub fn move_highlight(&mut self, delta: isize) {
    if self.results.is_empty() {
      return;
    }
    let len = self.results.len() as isize;
    self.highlighted = (self.highlighted as isize + delta).rem_euclid(len) as usize;
  }
}

impl Drop for SearchDebouncer {
  fn drop(&mut self) {
    if let Some(timer) = self.timer.take() {
      timer.abort();
    }
  }
}
