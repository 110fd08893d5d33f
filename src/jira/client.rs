use chrono::NaiveDate;
use reqwest::{Response, Url};
use serde_json::Value;
use tracing::debug;

use super::api_types::{
  ApiMyself, ApiPickerResponse, ApiSearchBody, ApiWorklogBody, DEFAULT_SEARCH_FIELDS,
};
use super::error::{upstream_message, GatewayError, Result};
use super::types::{Credential, PickedIssue, Profile, SearchRequest};

/// Worklogs are always logged as starting at this local time (KST).
const WORKLOG_START_TIME: &str = "T09:00:00.000+0900";
const WORKLOG_PAGE_LIMIT: &str = "1000";

/// Stateless Jira REST client.
///
/// Holds no credentials: every call attaches Basic auth built from the
/// credential it is given, so one instance can serve any number of users.
#[derive(Clone)]
pub struct JiraClient {
  http: reqwest::Client,
}

impl JiraClient {
  pub fn new() -> Result<Self> {
    let http = reqwest::Client::builder()
      .user_agent(concat!("jtk/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| GatewayError::Network(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self { http })
  }

  /// Verify credentials against `/myself`
  pub async fn myself(&self, cred: &Credential) -> Result<Profile> {
    require_credential(cred, &[])?;
    let url = endpoint(&cred.host, &["rest", "api", "3", "myself"])?;
    debug!(host = %cred.host, token = %cred.fingerprint(), "verifying identity");

    let response = self
      .http
      .get(url)
      .basic_auth(&cred.email, Some(&cred.token))
      .header("Accept", "application/json")
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(GatewayError::from_status(
        status,
        "Jira connection failed, check your API token",
      ));
    }

    let me: ApiMyself = response.json().await?;
    Ok(me.into())
  }

  /// Run one search page and return the upstream body untouched
  pub async fn search(&self, cred: &Credential, request: &SearchRequest) -> Result<Value> {
    require_credential(cred, &[("jql", &request.jql)])?;
    let url = endpoint(&cred.host, &["rest", "api", "3", "search"])?;

    let fields: Vec<&str> = match &request.fields {
      Some(fields) if !fields.is_empty() => fields.iter().map(String::as_str).collect(),
      _ => DEFAULT_SEARCH_FIELDS.to_vec(),
    };
    let body = ApiSearchBody {
      jql: &request.jql,
      fields,
      max_results: request.max_results,
      start_at: request.start_at,
    };
    debug!(jql = %request.jql, start_at = request.start_at, "search page");

    let response = self
      .http
      .post(url)
      .basic_auth(&cred.email, Some(&cred.token))
      .header("Accept", "application/json")
      .json(&body)
      .send()
      .await?;

    read_json(response, "Jira API error").await
  }

  /// Issue picker, flattened into a single list
  pub async fn pick(&self, cred: &Credential, query: &str) -> Result<Vec<PickedIssue>> {
    require_credential(cred, &[("query", query)])?;
    let url = endpoint(&cred.host, &["rest", "api", "2", "issue", "picker"])?;

    let response = self
      .http
      .get(url)
      .basic_auth(&cred.email, Some(&cred.token))
      .header("Accept", "application/json")
      .query(&[
        ("query", query),
        ("showSubTasks", "true"),
        ("showSubTaskParent", "true"),
      ])
      .send()
      .await?;

    let body = read_json(response, "Picker API error").await?;
    let picker: ApiPickerResponse = serde_json::from_value(body)?;
    Ok(picker.flatten())
  }

  /// Worklogs of one issue (first 1000), upstream body untouched
  pub async fn worklogs(&self, cred: &Credential, issue_key: &str) -> Result<Value> {
    require_credential(cred, &[("issueKey", issue_key)])?;
    let url = endpoint(
      &cred.host,
      &["rest", "api", "3", "issue", issue_key, "worklog"],
    )?;

    let response = self
      .http
      .get(url)
      .basic_auth(&cred.email, Some(&cred.token))
      .header("Accept", "application/json")
      .query(&[("maxResults", WORKLOG_PAGE_LIMIT)])
      .send()
      .await?;

    read_json(response, "Failed to read worklogs").await
  }

  /// Log `minutes` on `date`, starting at 09:00 KST. Returns the created worklog.
  pub async fn add_worklog(
    &self,
    cred: &Credential,
    issue_key: &str,
    minutes: u32,
    date: NaiveDate,
  ) -> Result<Value> {
    require_credential(cred, &[("issueKey", issue_key)])?;
    if minutes == 0 {
      return Err(GatewayError::validation("timeSpentMinutes must be positive"));
    }
    let url = endpoint(
      &cred.host,
      &["rest", "api", "3", "issue", issue_key, "worklog"],
    )?;

    let body = ApiWorklogBody {
      time_spent_seconds: u64::from(minutes) * 60,
      started: worklog_started(date),
    };
    debug!(issue = issue_key, minutes, started = %body.started, "adding worklog");

    let response = self
      .http
      .post(url)
      .basic_auth(&cred.email, Some(&cred.token))
      .header("Accept", "application/json")
      .json(&body)
      .send()
      .await?;

    read_json(response, "Failed to add worklog").await
  }
}

/// `started` value for a worklog logged on `date`
pub fn worklog_started(date: NaiveDate) -> String {
  format!("{}{}", date.format("%Y-%m-%d"), WORKLOG_START_TIME)
}

/// Reject blank required inputs before anything touches the network.
/// `fields` are `(wire name, value)` pairs.
pub fn require_fields(fields: &[(&str, &str)]) -> Result<()> {
  if fields.iter().any(|(_, value)| value.trim().is_empty()) {
    let names: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
    return Err(GatewayError::validation(format!(
      "{} are required",
      names.join(", ")
    )));
  }
  Ok(())
}

fn require_credential(cred: &Credential, extra: &[(&str, &str)]) -> Result<()> {
  let mut fields = vec![
    ("domain", cred.host.as_str()),
    ("email", cred.email.as_str()),
    ("token", cred.token.as_str()),
  ];
  fields.extend_from_slice(extra);
  require_fields(&fields)
}

/// Build `https://<host>/<segments...>`, keeping an explicit scheme if given.
fn endpoint(host: &str, segments: &[&str]) -> Result<Url> {
  let host = host.trim().trim_end_matches('/');
  let base = if host.starts_with("http://") || host.starts_with("https://") {
    host.to_string()
  } else {
    format!("https://{}", host)
  };

  let mut url =
    Url::parse(&base).map_err(|e| GatewayError::validation(format!("Invalid domain {}: {}", host, e)))?;
  url
    .path_segments_mut()
    .map_err(|_| GatewayError::validation(format!("Invalid domain {}", host)))?
    .pop_if_empty()
    .extend(segments);
  Ok(url)
}

/// Decode a JSON body, turning non-2xx answers into normalized errors.
async fn read_json(response: Response, fallback: &str) -> Result<Value> {
  let status = response.status();
  let text = response.text().await?;

  if status.is_success() {
    return Ok(serde_json::from_str(&text)?);
  }

  let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
  Err(GatewayError::from_status(
    status,
    upstream_message(&body, fallback),
  ))
}
