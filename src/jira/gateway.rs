//! The capability every client-side component talks to Jira through.
//!
//! Two implementations: [`JiraClient`] calls Jira directly, [`RelayClient`]
//! goes through a `jtk serve` relay. Engines are written against the trait so
//! tests can substitute scripted fakes.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

use super::api_types::{parse_search_page, parse_worklog, parse_worklogs};
use super::client::JiraClient;
use super::error::{GatewayError, Result};
use super::types::{Credential, PickedIssue, Profile, SearchPage, SearchRequest, WorklogEntry};

#[async_trait]
pub trait TrackerGateway: Send + Sync {
  async fn verify_identity(&self, cred: &Credential) -> Result<Profile>;

  async fn search(&self, cred: &Credential, request: &SearchRequest) -> Result<SearchPage>;

  async fn pick_issues(&self, cred: &Credential, partial: &str) -> Result<Vec<PickedIssue>>;

  async fn read_worklogs(&self, cred: &Credential, issue_key: &str) -> Result<Vec<WorklogEntry>>;

  /// Returns the created entry when Jira echoed a usable one
  async fn write_worklog(
    &self,
    cred: &Credential,
    issue_key: &str,
    minutes: u32,
    date: NaiveDate,
  ) -> Result<Option<WorklogEntry>>;
}

#[async_trait]
impl TrackerGateway for JiraClient {
  async fn verify_identity(&self, cred: &Credential) -> Result<Profile> {
    self.myself(cred).await
  }

  async fn search(&self, cred: &Credential, request: &SearchRequest) -> Result<SearchPage> {
    parse_search_page(JiraClient::search(self, cred, request).await?)
  }

  async fn pick_issues(&self, cred: &Credential, partial: &str) -> Result<Vec<PickedIssue>> {
    self.pick(cred, partial).await
  }

  async fn read_worklogs(&self, cred: &Credential, issue_key: &str) -> Result<Vec<WorklogEntry>> {
    parse_worklogs(self.worklogs(cred, issue_key).await?)
  }

  async fn write_worklog(
    &self,
    cred: &Credential,
    issue_key: &str,
    minutes: u32,
    date: NaiveDate,
  ) -> Result<Option<WorklogEntry>> {
    parse_worklog(self.add_worklog(cred, issue_key, minutes, date).await?)
  }
}

/// Client for the routes served by [`crate::relay`].
#[derive(Clone)]
pub struct RelayClient {
  http: reqwest::Client,
  base_url: String,
}

impl RelayClient {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      http: reqwest::Client::new(),
      base_url: base_url.into().trim_end_matches('/').to_string(),
    }
  }

  async fn post(&self, route: &str, body: Value) -> Result<Value> {
    let url = format!("{}{}", self.base_url, route);
    debug!(%url, "relay call");

    let response = self
      .http
      .post(&url)
      .json(&body)
      .send()
      .await
      .map_err(|e| GatewayError::Network(format!("Cannot reach relay at {}: {}", self.base_url, e)))?;

    let status = response.status();
    let text = response.text().await?;
    let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
    if status.is_success() {
      return Ok(body);
    }

    let message = body
      .get("error")
      .and_then(|e| e.as_str())
      .unwrap_or("relay request failed")
      .to_string();
    Err(relay_error(status, message))
  }
}

/// Map a relay status back into the error taxonomy
fn relay_error(status: StatusCode, message: String) -> GatewayError {
  match status {
    StatusCode::BAD_REQUEST => GatewayError::Validation(message),
    StatusCode::INTERNAL_SERVER_ERROR => GatewayError::Network(message),
    _ => GatewayError::from_status(status, message),
  }
}

fn credential_body(cred: &Credential) -> serde_json::Map<String, Value> {
  let mut body = serde_json::Map::new();
  body.insert("domain".into(), json!(cred.host));
  body.insert("email".into(), json!(cred.email));
  body.insert("token".into(), json!(cred.token));
  body
}

#[async_trait]
impl TrackerGateway for RelayClient {
  async fn verify_identity(&self, cred: &Credential) -> Result<Profile> {
    let body = self.post("/api/jira/myself", Value::Object(credential_body(cred))).await?;
    Ok(serde_json::from_value(body)?)
  }

  async fn search(&self, cred: &Credential, request: &SearchRequest) -> Result<SearchPage> {
    let mut body = credential_body(cred);
    body.insert("jql".into(), json!(request.jql));
    if let Some(fields) = &request.fields {
      body.insert("fields".into(), json!(fields));
    }
    body.insert("maxResults".into(), json!(request.max_results));
    body.insert("startAt".into(), json!(request.start_at));

    parse_search_page(self.post("/api/jira/search", Value::Object(body)).await?)
  }

  async fn pick_issues(&self, cred: &Credential, partial: &str) -> Result<Vec<PickedIssue>> {
    let mut body = credential_body(cred);
    body.insert("query".into(), json!(partial));

    let resp = self.post("/api/jira/picker", Value::Object(body)).await?;
    let issues = resp.get("issues").cloned().unwrap_or_else(|| json!([]));
    Ok(serde_json::from_value(issues)?)
  }

  async fn read_worklogs(&self, cred: &Credential, issue_key: &str) -> Result<Vec<WorklogEntry>> {
    let mut body = credential_body(cred);
    body.insert("issueKey".into(), json!(issue_key));

    parse_worklogs(self.post("/api/jira/issue-worklogs", Value::Object(body)).await?)
  }

  async fn write_worklog(
    &self,
    cred: &Credential,
    issue_key: &str,
    minutes: u32,
    date: NaiveDate,
  ) -> Result<Option<WorklogEntry>> {
    let mut body = credential_body(cred);
    body.insert("issueKey".into(), json!(issue_key));
    body.insert("timeSpentMinutes".into(), json!(minutes));
    body.insert("startDate".into(), json!(date.format("%Y-%m-%d").to_string()));

    let resp = self.post("/api/jira/worklog", Value::Object(body)).await?;
    match resp.get("worklog") {
      Some(worklog) => parse_worklog(worklog.clone()),
      None => Ok(None),
    }
  }
}
