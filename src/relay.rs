//! Stateless HTTP relay in front of the Jira REST API.
//!
//! Every request carries its own credentials; the server keeps nothing
//! between requests beyond its HTTP clients.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::jira::client::require_fields;
use crate::jira::{Credential, GatewayError, JiraClient, SearchRequest};
use crate::redirect::RedirectResolver;
use crate::worklog::parse_calendar_date;

// ── App State ──

struct RelayState {
  jira: JiraClient,
  resolver: RedirectResolver,
}

// ── Error Handling ──

struct RelayError(GatewayError);

impl IntoResponse for RelayError {
  fn into_response(self) -> Response {
    let status = self.0.status();
    if status.is_server_error() {
      warn!(%status, error = %self.0, "relay call failed");
    }
    let body = json!({ "error": self.0.to_string() });
    (status, Json(body)).into_response()
  }
}

impl From<GatewayError> for RelayError {
  fn from(err: GatewayError) -> Self {
    Self(err)
  }
}

// ── Entrypoint ──

pub async fn serve(bind: &str, port: u16) -> Result<()> {
  let app = router()?;

  let addr = format!("{}:{}", bind, port);
  let listener = tokio::net::TcpListener::bind(&addr)
    .await
    .map_err(|e| eyre!("Failed to bind {}: {}", addr, e))?;
  info!("jtk relay listening on http://{addr}");
  axum::serve(listener, app).await?;
  Ok(())
}

/// Build the router (for testing without binding to a port).
pub fn router() -> Result<Router> {
  let state = Arc::new(RelayState {
    jira: JiraClient::new()?,
    resolver: RedirectResolver::new()?,
  });

  Ok(
    Router::new()
      .route("/api/health", only(get(health)))
      .route("/api/jira/myself", only(post(post_myself)))
      .route("/api/jira/search", only(post(post_search)))
      .route("/api/jira/picker", only(post(post_picker)))
      .route("/api/jira/issue-worklogs", only(post(post_issue_worklogs)))
      .route("/api/jira/worklog", only(post(post_worklog)))
      .route("/api/resolve-url", only(get(get_resolve_url)))
      .layer(TraceLayer::new_for_http())
      .layer(CorsLayer::permissive())
      .with_state(state),
  )
}

/// Answer every method the route does not define with a JSON 405.
///
/// axum serves HEAD from a GET handler unless HEAD has its own endpoint.
fn only(route: MethodRouter<Arc<RelayState>>) -> MethodRouter<Arc<RelayState>> {
  route.head(method_not_allowed).fallback(method_not_allowed)
}

async fn method_not_allowed() -> Response {
  (
    StatusCode::METHOD_NOT_ALLOWED,
    Json(json!({ "error": "method not allowed" })),
  )
    .into_response()
}

/// Missing or malformed JSON bodies count as `{}` so that validation,
/// not the extractor, decides the answer.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> T {
  serde_json::from_slice(body).unwrap_or_default()
}

// ── Health ──

async fn health() -> Json<Value> {
  Json(json!({ "ok": true }))
}

// ── Request bodies ──

#[derive(Deserialize, Default)]
struct CredentialFields {
  #[serde(default)]
  domain: String,
  #[serde(default)]
  email: String,
  #[serde(default)]
  token: String,
}

impl CredentialFields {
  fn require(&self, extra: &[(&str, &str)]) -> Result<Credential, GatewayError> {
    let mut fields = vec![
      ("domain", self.domain.as_str()),
      ("email", self.email.as_str()),
      ("token", self.token.as_str()),
    ];
    fields.extend_from_slice(extra);
    require_fields(&fields)?;
    Ok(Credential::new(&self.domain, &self.email, &self.token))
  }
}

#[derive(Deserialize, Default)]
struct SearchBody {
  #[serde(flatten)]
  cred: CredentialFields,
  #[serde(default)]
  jql: String,
  fields: Option<Vec<String>>,
  #[serde(rename = "maxResults")]
  max_results: Option<u64>,
  #[serde(rename = "startAt")]
  start_at: Option<u64>,
}

#[derive(Deserialize, Default)]
struct PickerBody {
  #[serde(flatten)]
  cred: CredentialFields,
  #[serde(default)]
  query: String,
}

#[derive(Deserialize, Default)]
struct IssueBody {
  #[serde(flatten)]
  cred: CredentialFields,
  #[serde(rename = "issueKey", default)]
  issue_key: String,
}

#[derive(Deserialize, Default)]
struct WorklogBody {
  #[serde(flatten)]
  cred: CredentialFields,
  #[serde(rename = "issueKey", default)]
  issue_key: String,
  /// Number or numeric string
  #[serde(rename = "timeSpentMinutes")]
  time_spent_minutes: Option<Value>,
  #[serde(rename = "startDate", default)]
  start_date: String,
}

fn minutes_value(value: Option<&Value>) -> Option<u32> {
  match value? {
    Value::Number(n) => n.as_u64().and_then(|m| u32::try_from(m).ok()),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
  .filter(|m| *m > 0)
}

// ── POST /api/jira/myself ──

async fn post_myself(
  State(state): State<Arc<RelayState>>,
  body: Bytes,
) -> Result<Json<Value>, RelayError> {
  let body: CredentialFields = parse_body(&body);
  let cred = body.require(&[])?;
  let profile = state.jira.myself(&cred).await?;
  Ok(Json(json!({
    "displayName": profile.display_name,
    "emailAddress": profile.email_address,
    "accountId": profile.account_id,
  })))
}

// ── POST /api/jira/search ──

async fn post_search(
  State(state): State<Arc<RelayState>>,
  body: Bytes,
) -> Result<Json<Value>, RelayError> {
  let body: SearchBody = parse_body(&body);
  let cred = body.cred.require(&[("jql", &body.jql)])?;
  let request = SearchRequest {
    jql: body.jql,
    fields: body.fields,
    max_results: body.max_results.unwrap_or(100),
    start_at: body.start_at.unwrap_or(0),
  };
  Ok(Json(state.jira.search(&cred, &request).await?))
}

// ── POST /api/jira/picker ──

async fn post_picker(
  State(state): State<Arc<RelayState>>,
  body: Bytes,
) -> Result<Json<Value>, RelayError> {
  let body: PickerBody = parse_body(&body);
  let cred = body.cred.require(&[("query", &body.query)])?;
  let issues = state.jira.pick(&cred, &body.query).await?;
  Ok(Json(json!({ "issues": issues })))
}

// ── POST /api/jira/issue-worklogs ──

async fn post_issue_worklogs(
  State(state): State<Arc<RelayState>>,
  body: Bytes,
) -> Result<Json<Value>, RelayError> {
  let body: IssueBody = parse_body(&body);
  let cred = body.cred.require(&[("issueKey", &body.issue_key)])?;
  Ok(Json(state.jira.worklogs(&cred, &body.issue_key).await?))
}

// ── POST /api/jira/worklog ──

async fn post_worklog(
  State(state): State<Arc<RelayState>>,
  body: Bytes,
) -> Result<Response, RelayError> {
  let body: WorklogBody = parse_body(&body);
  let cred = body.cred.require(&[])?;

  let minutes = minutes_value(body.time_spent_minutes.as_ref());
  let date = parse_calendar_date(&body.start_date);
  let (minutes, date) = match (minutes, date, body.issue_key.trim().is_empty()) {
    (Some(minutes), Some(date), false) => (minutes, date),
    _ => {
      return Err(
        GatewayError::validation("issueKey, timeSpentMinutes, startDate are required").into(),
      )
    }
  };

  let worklog = state
    .jira
    .add_worklog(&cred, &body.issue_key, minutes, date)
    .await?;
  Ok(
    (
      StatusCode::CREATED,
      Json(json!({ "success": true, "worklog": worklog })),
    )
      .into_response(),
  )
}

// ── GET /api/resolve-url ──

async fn get_resolve_url(
  State(state): State<Arc<RelayState>>,
  RawQuery(query): RawQuery,
) -> Result<Response, RelayError> {
  let url = query.as_deref().and_then(|q| {
    url::form_urlencoded::parse(q.as_bytes())
      .find(|(key, _)| key == "url")
      .map(|(_, value)| value.into_owned())
  });
  let url = match url {
    Some(url) if !url.trim().is_empty() => url,
    _ => return Err(GatewayError::validation("url parameter is required").into()),
  };

  let chain = state.resolver.resolve(&url).await?;
  Ok(Json(chain).into_response())
}

// ── Tests ──

#[cfg(test)]
mod tests {
  use super::*;
  use axum::body::Body;
  use axum::http::Request;
  use tower::ServiceExt;

  async fn call(method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let app = router().unwrap();
    let resp = app
      .oneshot(
        Request::builder()
          .method(method)
          .uri(uri)
          .header("content-type", "application/json")
          .body(Body::from(body.to_string()))
          .unwrap(),
      )
      .await
      .unwrap();

    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
  }

  #[tokio::test]
  async fn health_returns_ok() {
    let (status, json) = call("GET", "/api/health", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
  }

  #[tokio::test]
  async fn wrong_method_is_405_with_error_body() {
    let (status, json) = call("GET", "/api/jira/search", Value::Null).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(json["error"].is_string());

    let (status, _) = call("POST", "/api/resolve-url?url=http://x", json!({})).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
  }

  #[tokio::test]
  async fn head_on_get_routes_is_405() {
    let (status, _) = call("HEAD", "/api/health", Value::Null).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = call("HEAD", "/api/resolve-url?url=http://x", Value::Null).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = call("HEAD", "/api/jira/search", Value::Null).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
  }

  #[tokio::test]
  async fn missing_fields_are_rejected_before_any_call() {
    // The domain is unroutable; reaching the network would produce a 500
    let partial = json!({"domain": "http://127.0.0.1:9", "email": "me@acme.io"});
    for route in [
      "/api/jira/myself",
      "/api/jira/search",
      "/api/jira/picker",
      "/api/jira/issue-worklogs",
      "/api/jira/worklog",
    ] {
      let (status, json) = call("POST", route, partial.clone()).await;
      assert_eq!(status, StatusCode::BAD_REQUEST, "route {}", route);
      assert!(json["error"].is_string(), "route {}", route);
    }

    let full = json!({"domain": "http://127.0.0.1:9", "email": "me", "token": "t"});
    for route in [
      "/api/jira/search",
      "/api/jira/picker",
      "/api/jira/issue-worklogs",
      "/api/jira/worklog",
    ] {
      let (status, _) = call("POST", route, full.clone()).await;
      assert_eq!(status, StatusCode::BAD_REQUEST, "route {}", route);
    }
  }

  #[tokio::test]
  async fn malformed_body_counts_as_empty() {
    let app = router().unwrap();
    let resp = app
      .oneshot(
        Request::builder()
          .method("POST")
          .uri("/api/jira/myself")
          .body(Body::from("not json"))
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn resolve_url_requires_url() {
    let (status, json) = call("GET", "/api/resolve-url", Value::Null).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
  }

  #[tokio::test]
  async fn search_passes_upstream_body_through() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/rest/api/3/search")
      .with_status(200)
      .with_body(r#"{"issues":[{"key":"VAN-1","fields":{"summary":"x"}}],"total":1,"startAt":0,"maxResults":100}"#)
      .create_async()
      .await;

    let body = json!({
      "domain": server.url(), "email": "me", "token": "t", "jql": "project = VAN"
    });
    let (status, json) = call("POST", "/api/jira/search", body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["issues"][0]["key"], "VAN-1");
  }

  #[tokio::test]
  async fn upstream_rejection_keeps_status() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/rest/api/3/myself")
      .with_status(403)
      .with_body("{}")
      .create_async()
      .await;

    let body = json!({"domain": server.url(), "email": "me", "token": "bad"});
    let (status, json) = call("POST", "/api/jira/myself", body).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(json["error"].as_str().unwrap().contains("API token"));
  }

  #[tokio::test]
  async fn worklog_create_answers_201() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/rest/api/3/issue/VAN-3/worklog")
      .with_status(201)
      .with_body(r#"{"id":"77","timeSpentSeconds":1800,"started":"2025-06-02T09:00:00.000+0900"}"#)
      .create_async()
      .await;

    let body = json!({
      "domain": server.url(), "email": "me", "token": "t",
      "issueKey": "VAN-3", "timeSpentMinutes": "30", "startDate": "2025.06.02"
    });
    let (status, json) = call("POST", "/api/jira/worklog", body).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["worklog"]["id"], "77");
  }

  #[tokio::test]
  async fn unreachable_upstream_is_500() {
    let body = json!({"domain": "http://127.0.0.1:9", "email": "me", "token": "t"});
    let (status, json) = call("POST", "/api/jira/myself", body).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].is_string());
  }

  #[test]
  fn minutes_accept_numbers_and_numeric_strings() {
    assert_eq!(minutes_value(Some(&json!(45))), Some(45));
    assert_eq!(minutes_value(Some(&json!(" 15 "))), Some(15));
    assert_eq!(minutes_value(Some(&json!(0))), None);
    assert_eq!(minutes_value(Some(&json!("abc"))), None);
    assert_eq!(minutes_value(None), None);
  }
}
