//! Report refresh driver.
//!
//! A refresh runs the worklog and closed-ticket searches concurrently and
//! builds a [`Report`] only when both complete. Results come back over a
//! channel and are picked up by [`Dashboard::poll`] on the caller's tick.

use std::sync::Arc;

use futures::future::try_join;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::jira::{Credential, Result, TrackerGateway};
use crate::pager::fetch_all;
use crate::report::{Report, ReportWindow, REPORT_FIELDS};

/// Fetch both halves of a report and aggregate them.
pub async fn load_report(
  gateway: &dyn TrackerGateway,
  cred: &Credential,
  window: ReportWindow,
) -> Result<Report> {
  let worklog_filter = window.worklog_filter();
  let closed_filter = window.closed_filter();
  debug!(%window, "loading report");

  let (worked, closed) = try_join(
    fetch_all(gateway, cred, &worklog_filter, REPORT_FIELDS),
    fetch_all(gateway, cred, &closed_filter, REPORT_FIELDS),
  )
  .await?;

  Ok(Report::build(window, &worked, &closed))
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportState {
  Idle,
  Loading,
  Ready(Report),
  /// A failed refresh replaces whatever was shown before
  Failed(String),
}

pub struct Dashboard {
  gateway: Arc<dyn TrackerGateway>,
  cred: Credential,
  window: ReportWindow,
  state: ReportState,
  receiver: Option<mpsc::UnboundedReceiver<Result<Report>>>,
}

impl Dashboard {
  pub fn new(gateway: Arc<dyn TrackerGateway>, cred: Credential, window: ReportWindow) -> Self {
    Self {
      gateway,
      cred,
      window,
      state: ReportState::Idle,
      receiver: None,
    }
  }

  pub fn state(&self) -> &ReportState {
    &self.state
  }

  pub fn window(&self) -> ReportWindow {
    self.window
  }

  /// Switch months and reload everything.
  pub fn set_window(&mut self, window: ReportWindow) {
    self.window = window;
    self.refresh();
  }

  /// Start a refresh; an in-flight one is abandoned.
  pub fn refresh(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = ReportState::Loading;

    let gateway = self.gateway.clone();
    let cred = self.cred.clone();
    let window = self.window;
    tokio::spawn(async move {
      let result = load_report(gateway.as_ref(), &cred, window).await;
      let _ = tx.send(result);
    });
  }

  /// Returns `true` when the state changed.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(report)) => {
        self.state = ReportState::Ready(report);
        self.receiver = None;
        true
      }
      Ok(Err(err)) => {
        warn!(error = %err, window = %self.window, "report refresh failed");
        self.state = ReportState::Failed(err.to_string());
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.state = ReportState::Failed("Report refresh was cancelled".to_string());
        self.receiver = None;
        true
      }
    }
  }
}
