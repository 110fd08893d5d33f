use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Connection triple for one Jira site, plus the display name Jira reported
/// when it was verified.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
  pub host: String,
  pub email: String,
  pub token: String,
  pub display_name: Option<String>,
}

impl Credential {
  pub fn new(host: impl Into<String>, email: impl Into<String>, token: impl Into<String>) -> Self {
    Self {
      host: host.into(),
      email: email.into(),
      token: token.into(),
      display_name: None,
    }
  }

  /// True when host, email and token are all non-blank.
  pub fn is_complete(&self) -> bool {
    !self.host.trim().is_empty() && !self.email.trim().is_empty() && !self.token.trim().is_empty()
  }

  /// Short stable identifier of the token, safe to log.
  pub fn fingerprint(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.token.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
  }

  /// Name to greet the user with
  pub fn label(&self) -> &str {
    self.display_name.as_deref().unwrap_or(&self.email)
  }
}

impl fmt::Debug for Credential {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Credential")
      .field("host", &self.host)
      .field("email", &self.email)
      .field("token", &format_args!("sha256:{}", self.fingerprint()))
      .field("display_name", &self.display_name)
      .finish()
  }
}

/// Profile returned by identity verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
  pub display_name: String,
  pub email_address: Option<String>,
  pub account_id: String,
}

/// Issue fields the reporting views care about
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
  pub key: String,
  pub summary: String,
  pub status: String,
  pub project: String,
  pub time_spent_seconds: Option<u64>,
  pub resolved_at: Option<DateTime<FixedOffset>>,
}

/// One page of a search
#[derive(Debug, Clone)]
pub struct SearchPage {
  pub issues: Vec<Issue>,
  pub total: u64,
  pub start_at: u64,
  pub max_results: u64,
}

/// Parameters for one search page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
  pub jql: String,
  /// None lets the relay pick its default field list
  pub fields: Option<Vec<String>>,
  pub max_results: u64,
  pub start_at: u64,
}

impl SearchRequest {
  pub fn new(jql: impl Into<String>) -> Self {
    Self {
      jql: jql.into(),
      fields: None,
      max_results: 100,
      start_at: 0,
    }
  }

  pub fn with_fields(mut self, fields: &[&str]) -> Self {
    self.fields = Some(fields.iter().map(|f| f.to_string()).collect());
    self
  }

  pub fn with_page(mut self, start_at: u64, max_results: u64) -> Self {
    self.start_at = start_at;
    self.max_results = max_results;
    self
  }
}

/// Flattened issue-picker hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickedIssue {
  pub key: String,
  pub summary: String,
}

/// A logged block of time on one issue
#[derive(Debug, Clone, PartialEq)]
pub struct WorklogEntry {
  pub started: DateTime<FixedOffset>,
  pub time_spent_seconds: u64,
  pub author: String,
}

/// Parse a Jira timestamp such as `2024-03-05T10:22:33.000+0900`.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
  DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
    .or_else(|_| DateTime::parse_from_rfc3339(value))
    .ok()
}
