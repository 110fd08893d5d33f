//! Serde types matching Jira REST payloads.
//!
//! The relay forwards most upstream bodies untouched, so both the direct
//! client and the relay client decode the same JSON through these types and
//! convert them into domain types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::Result;
use super::types::{parse_timestamp, Issue, PickedIssue, Profile, SearchPage, WorklogEntry};

/// Fields requested when a search does not name its own
pub const DEFAULT_SEARCH_FIELDS: &[&str] = &[
  "summary",
  "status",
  "project",
  "issuetype",
  "timespent",
  "resolutiondate",
  "updated",
  "customfield_10020", // sprint
];

// ============================================================================
// Common nested field types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiStatus {
  pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiProject {
  pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  #[serde(rename = "displayName", default)]
  pub display_name: String,
}

// ============================================================================
// Search
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ApiIssueFields {
  #[serde(default)]
  pub summary: String,
  pub status: Option<ApiStatus>,
  pub project: Option<ApiProject>,
  pub timespent: Option<u64>,
  pub resolutiondate: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiIssue {
  pub key: String,
  #[serde(default)]
  pub fields: ApiIssueFields,
}

#[derive(Debug, Deserialize)]
pub struct ApiSearchResponse {
  #[serde(default)]
  pub issues: Vec<ApiIssue>,
  #[serde(rename = "startAt", default)]
  pub start_at: u64,
  #[serde(rename = "maxResults", default)]
  pub max_results: u64,
  #[serde(default)]
  pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiSearchBody<'a> {
  pub jql: &'a str,
  pub fields: Vec<&'a str>,
  #[serde(rename = "maxResults")]
  pub max_results: u64,
  #[serde(rename = "startAt")]
  pub start_at: u64,
}

// ============================================================================
// Identity
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiMyself {
  #[serde(rename = "displayName", default)]
  pub display_name: String,
  #[serde(rename = "emailAddress")]
  pub email_address: Option<String>,
  #[serde(rename = "accountId", default)]
  pub account_id: String,
}

// ============================================================================
// Issue picker
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiPickerIssue {
  pub key: String,
  #[serde(rename = "summaryText")]
  pub summary_text: Option<String>,
  pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiPickerSection {
  #[serde(default)]
  pub issues: Vec<ApiPickerIssue>,
}

#[derive(Debug, Deserialize)]
pub struct ApiPickerResponse {
  #[serde(default)]
  pub sections: Vec<ApiPickerSection>,
}

// ============================================================================
// Worklogs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiWorklog {
  #[serde(default)]
  pub started: String,
  #[serde(rename = "timeSpentSeconds", default)]
  pub time_spent_seconds: u64,
  pub author: Option<ApiUser>,
}

#[derive(Debug, Deserialize)]
pub struct ApiWorklogList {
  #[serde(default)]
  pub worklogs: Vec<ApiWorklog>,
}

#[derive(Debug, Serialize)]
pub struct ApiWorklogBody {
  #[serde(rename = "timeSpentSeconds")]
  pub time_spent_seconds: u64,
  pub started: String,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl ApiIssue {
  pub fn into_issue(self) -> Issue {
    let f = self.fields;
    Issue {
      key: self.key,
      summary: f.summary,
      status: f.status.map(|s| s.name).unwrap_or_default(),
      project: f.project.map(|p| p.key).unwrap_or_default(),
      time_spent_seconds: f.timespent,
      resolved_at: f.resolutiondate.as_deref().and_then(parse_timestamp),
    }
  }
}

impl From<ApiSearchResponse> for SearchPage {
  fn from(resp: ApiSearchResponse) -> Self {
    SearchPage {
      issues: resp.issues.into_iter().map(ApiIssue::into_issue).collect(),
      total: resp.total,
      start_at: resp.start_at,
      max_results: resp.max_results,
    }
  }
}

impl From<ApiMyself> for Profile {
  fn from(me: ApiMyself) -> Self {
    Profile {
      display_name: me.display_name,
      email_address: me.email_address,
      account_id: me.account_id,
    }
  }
}

impl ApiPickerResponse {
  /// Sections flattened into one list, keeping upstream order.
  pub fn flatten(self) -> Vec<PickedIssue> {
    self
      .sections
      .into_iter()
      .flat_map(|section| section.issues)
      .map(|issue| PickedIssue {
        key: issue.key,
        summary: issue.summary_text.or(issue.summary).unwrap_or_default(),
      })
      .collect()
  }
}

impl ApiWorklog {
  /// None when `started` is not a timestamp we can order by
  pub fn into_entry(self) -> Option<WorklogEntry> {
    Some(WorklogEntry {
      started: parse_timestamp(&self.started)?,
      time_spent_seconds: self.time_spent_seconds,
      author: self.author.map(|a| a.display_name).unwrap_or_default(),
    })
  }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn parse_search_page(value: Value) -> Result<SearchPage> {
  let resp: ApiSearchResponse = serde_json::from_value(value)?;
  Ok(resp.into())
}

pub fn parse_worklogs(value: Value) -> Result<Vec<WorklogEntry>> {
  let list: ApiWorklogList = serde_json::from_value(value)?;
  Ok(list.worklogs.into_iter().filter_map(ApiWorklog::into_entry).collect())
}

pub fn parse_worklog(value: Value) -> Result<Option<WorklogEntry>> {
  let worklog: ApiWorklog = serde_json::from_value(value)?;
  Ok(worklog.into_entry())
}
