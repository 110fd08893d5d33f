//! Monthly effort report: pure aggregation over issue collections.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, FixedOffset, Local};
use color_eyre::{eyre::eyre, Result};

use crate::jira::Issue;

/// How many recently closed tickets a report keeps
pub const RECENT_CLOSURES: usize = 5;

/// Fields requested for both report queries
pub const REPORT_FIELDS: &[&str] = &[
  "summary",
  "status",
  "project",
  "timespent",
  "resolutiondate",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectEffort {
  pub project: String,
  pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCount {
  pub status: String,
  pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTicket {
  pub key: String,
  pub summary: String,
  pub status: String,
  pub resolved_at: Option<DateTime<FixedOffset>>,
}

/// Collapse case variants of the done-like statuses.
pub fn normalize_status(status: &str) -> String {
  match status.to_uppercase().as_str() {
    "QA DONE" => "QA Done".to_string(),
    "DEPLOYMENT DONE" => "Deployment Done".to_string(),
    "DONE" => "Done".to_string(),
    _ => status.to_string(),
  }
}

fn round_tenth(value: f64) -> f64 {
  (value * 10.0).round() / 10.0
}

/// Logged hours per project, largest first.
pub fn project_effort(issues: &[Issue]) -> Vec<ProjectEffort> {
  let mut seconds: HashMap<&str, u64> = HashMap::new();
  for issue in issues {
    *seconds.entry(issue.project.as_str()).or_default() += issue.time_spent_seconds.unwrap_or(0);
  }

  let mut effort: Vec<ProjectEffort> = seconds
    .into_iter()
    .map(|(project, secs)| ProjectEffort {
      project: project.to_string(),
      hours: round_tenth(secs as f64 / 3600.0),
    })
    .collect();
  effort.sort_by(|a, b| {
    b.hours
      .total_cmp(&a.hours)
      .then_with(|| a.project.cmp(&b.project))
  });
  effort
}

/// Issue count per normalized status, most common first.
pub fn status_counts(issues: &[Issue]) -> Vec<StatusCount> {
  let mut counts: Vec<StatusCount> = Vec::new();
  for issue in issues {
    let status = normalize_status(&issue.status);
    match counts.iter_mut().find(|c| c.status == status) {
      Some(entry) => entry.count += 1,
      None => counts.push(StatusCount { status, count: 1 }),
    }
  }
  // Stable sort keeps first-seen order among equal counts
  counts.sort_by(|a, b| b.count.cmp(&a.count));
  counts
}

/// The most recently resolved tickets; unresolved ones sort last.
pub fn recent_closures(issues: &[Issue]) -> Vec<ClosedTicket> {
  let mut closed: Vec<ClosedTicket> = issues
    .iter()
    .map(|issue| ClosedTicket {
      key: issue.key.clone(),
      summary: issue.summary.clone(),
      status: normalize_status(&issue.status),
      resolved_at: issue.resolved_at,
    })
    .collect();
  closed.sort_by(|a, b| match (a.resolved_at, b.resolved_at) {
    (Some(a), Some(b)) => b.cmp(&a),
    (Some(_), None) => std::cmp::Ordering::Less,
    (None, Some(_)) => std::cmp::Ordering::Greater,
    (None, None) => std::cmp::Ordering::Equal,
  });
  closed.truncate(RECENT_CLOSURES);
  closed
}

/// A calendar month to report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
  pub year: i32,
  pub month: u32,
}

impl ReportWindow {
  pub fn new(year: i32, month: u32) -> Result<Self> {
    if !(1..=12).contains(&month) {
      return Err(eyre!("Month must be between 1 and 12, got {}", month));
    }
    Ok(Self { year, month })
  }

  pub fn current() -> Self {
    let today = Local::now().date_naive();
    Self {
      year: today.year(),
      month: today.month(),
    }
  }

  /// Parse `YYYY-MM`
  pub fn parse(value: &str) -> Result<Self> {
    let (year, month) = value
      .trim()
      .split_once('-')
      .ok_or_else(|| eyre!("Expected YYYY-MM, got {}", value))?;
    let year = year
      .parse()
      .map_err(|_| eyre!("Invalid year in {}", value))?;
    let month = month
      .parse()
      .map_err(|_| eyre!("Invalid month in {}", value))?;
    Self::new(year, month)
  }

  pub fn next(&self) -> Self {
    if self.month == 12 {
      Self {
        year: self.year + 1,
        month: 1,
      }
    } else {
      Self {
        year: self.year,
        month: self.month + 1,
      }
    }
  }

  pub fn previous(&self) -> Self {
    if self.month == 1 {
      Self {
        year: self.year - 1,
        month: 12,
      }
    } else {
      Self {
        year: self.year,
        month: self.month - 1,
      }
    }
  }

  fn first_day(&self) -> String {
    format!("{}-{:02}-01", self.year, self.month)
  }

  pub fn worklog_filter(&self) -> String {
    format!(
      "worklogDate >= \"{}\" AND worklogDate < \"{}\" AND worklogAuthor = currentUser()",
      self.first_day(),
      self.next().first_day()
    )
  }

  pub fn closed_filter(&self) -> String {
    format!(
      "resolved >= \"{}\" AND resolved < \"{}\" AND assignee = currentUser() AND status in (Done, \"QA Done\", \"QA DONE\", \"Deployment Done\")",
      self.first_day(),
      self.next().first_day()
    )
  }
}

impl std::fmt::Display for ReportWindow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}-{:02}", self.year, self.month)
  }
}

/// Everything derived from one refresh
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
  pub window: ReportWindow,
  pub project_effort: Vec<ProjectEffort>,
  pub status_counts: Vec<StatusCount>,
  pub recent_closures: Vec<ClosedTicket>,
  pub total_hours: f64,
  pub total_closed: usize,
}

impl Report {
  pub fn build(window: ReportWindow, worklog_issues: &[Issue], closed_issues: &[Issue]) -> Self {
    let project_effort = project_effort(worklog_issues);
    let total_hours = round_tenth(project_effort.iter().map(|p| p.hours).sum());

    Self {
      window,
      project_effort,
      status_counts: status_counts(closed_issues),
      recent_closures: recent_closures(closed_issues),
      total_hours,
      total_closed: closed_issues.len(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::jira::types::parse_timestamp;

  fn worked(project: &str, seconds: u64) -> Issue {
    Issue {
      key: format!("{}-1", project),
      summary: String::new(),
      status: "In Progress".into(),
      project: project.into(),
      time_spent_seconds: Some(seconds),
      resolved_at: None,
    }
  }

  fn closed(key: &str, status: &str, resolved: Option<&str>) -> Issue {
    Issue {
      key: key.into(),
      summary: format!("summary of {}", key),
      status: status.into(),
      project: "VAN".into(),
      time_spent_seconds: None,
      resolved_at: resolved.and_then(parse_timestamp),
    }
  }

  #[test]
  fn test_project_effort_sums_and_sorts() {
    let issues = vec![worked("A", 3600), worked("A", 1800), worked("B", 7200)];
    assert_eq!(
      project_effort(&issues),
      vec![
        ProjectEffort {
          project: "B".into(),
          hours: 2.0
        },
        ProjectEffort {
          project: "A".into(),
          hours: 1.5
        },
      ]
    );
  }

  #[test]
  fn test_project_effort_missing_time_counts_zero() {
    let mut issue = worked("C", 0);
    issue.time_spent_seconds = None;
    let effort = project_effort(&[issue, worked("C", 1000)]);
    assert_eq!(effort.len(), 1);
    assert_eq!(effort[0].hours, 0.3);
  }

  #[test]
  fn test_status_counts_normalize_aliases() {
    let issues = vec![
      closed("A-1", "QA DONE", None),
      closed("A-2", "qa done", None),
      closed("A-3", "Done", None),
    ];
    assert_eq!(
      status_counts(&issues),
      vec![
        StatusCount {
          status: "QA Done".into(),
          count: 2
        },
        StatusCount {
          status: "Done".into(),
          count: 1
        },
      ]
    );
  }

  #[test]
  fn test_unknown_status_passes_through() {
    assert_eq!(normalize_status("DEPLOYMENT done"), "Deployment Done");
    assert_eq!(normalize_status("Won't Fix"), "Won't Fix");
  }

  #[test]
  fn test_recent_closures_newest_first_unresolved_last() {
    let issues = vec![
      closed("A-1", "Done", Some("2025-03-01T10:00:00.000+0900")),
      closed("A-2", "DONE", None),
      closed("A-3", "Done", Some("2025-03-09T10:00:00.000+0900")),
      closed("A-4", "Done", Some("2025-03-05T10:00:00.000+0900")),
      closed("A-5", "Done", Some("2025-03-02T10:00:00.000+0900")),
      closed("A-6", "Done", Some("2025-03-03T10:00:00.000+0900")),
    ];
    let recent = recent_closures(&issues);
    let keys: Vec<&str> = recent.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys, vec!["A-3", "A-4", "A-6", "A-5", "A-1"]);

    let with_missing = recent_closures(&issues[..3]);
    assert_eq!(with_missing.last().unwrap().key, "A-2");
    assert_eq!(with_missing.last().unwrap().status, "Done");
  }

  #[test]
  fn test_window_filters_roll_over_december() {
    let window = ReportWindow::new(2024, 12).unwrap();
    assert_eq!(
      window.worklog_filter(),
      r#"worklogDate >= "2024-12-01" AND worklogDate < "2025-01-01" AND worklogAuthor = currentUser()"#
    );
    assert!(window
      .closed_filter()
      .starts_with(r#"resolved >= "2024-12-01" AND resolved < "2025-01-01""#));
    assert_eq!(ReportWindow::new(2025, 1).unwrap().previous(), window);
  }

  #[test]
  fn test_window_rejects_bad_month() {
    assert!(ReportWindow::new(2025, 0).is_err());
    assert!(ReportWindow::new(2025, 13).is_err());
    assert_eq!(
      ReportWindow::parse("2025-07").unwrap(),
      ReportWindow::new(2025, 7).unwrap()
    );
    assert!(ReportWindow::parse("July").is_err());
  }

  #[test]
  fn test_report_totals() {
    let window = ReportWindow::new(2025, 3).unwrap();
    let report = Report::build(
      window,
      &[worked("A", 5400), worked("B", 1800)],
      &[closed("A-1", "Done", None), closed("A-2", "QA Done", None)],
    );
    assert_eq!(report.total_hours, 2.0);
    assert_eq!(report.total_closed, 2);
    assert_eq!(report.window.to_string(), "2025-03");
  }
}
