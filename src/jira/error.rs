//! Error taxonomy shared by the upstream client, the relay and its clients.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failure of a single gateway operation.
///
/// The relay turns every variant into an `{error}` body with the status from
/// [`GatewayError::status`]; the relay client maps those statuses back.
#[derive(Debug, Error)]
pub enum GatewayError {
  /// Missing or malformed input, rejected before any network call
  #[error("{0}")]
  Validation(String),
  /// Credentials rejected upstream (401/403)
  #[error("{message}")]
  Auth { status: StatusCode, message: String },
  /// Upstream answered a well-formed request with another non-2xx status
  #[error("{message}")]
  Upstream { status: StatusCode, message: String },
  /// The other side could not be reached
  #[error("{0}")]
  Network(String),
  /// A response body was not the JSON we expected
  #[error("unexpected response: {0}")]
  Decode(String),
}

impl GatewayError {
  pub fn validation(message: impl Into<String>) -> Self {
    GatewayError::Validation(message.into())
  }

  /// Classify a non-2xx status: 401/403 are auth failures, the rest upstream.
  pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
    let message = message.into();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
      GatewayError::Auth { status, message }
    } else {
      GatewayError::Upstream { status, message }
    }
  }

  /// HTTP status the relay answers with for this error.
  pub fn status(&self) -> StatusCode {
    match self {
      GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
      GatewayError::Auth { status, .. } | GatewayError::Upstream { status, .. } => *status,
      GatewayError::Network(_) | GatewayError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<reqwest::Error> for GatewayError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      GatewayError::Decode(err.to_string())
    } else {
      GatewayError::Network(err.to_string())
    }
  }
}

impl From<serde_json::Error> for GatewayError {
  fn from(err: serde_json::Error) -> Self {
    GatewayError::Decode(err.to_string())
  }
}

/// Pick the message to surface for a failed upstream call.
///
/// Order: first entry of `errorMessages`, then the serialized `errors`
/// object when it has content, then `fallback`.
pub fn upstream_message(body: &Value, fallback: &str) -> String {
  if let Some(first) = body
    .get("errorMessages")
    .and_then(|v| v.as_array())
    .and_then(|msgs| msgs.first())
    .and_then(|v| v.as_str())
    .filter(|s| !s.is_empty())
  {
    return first.to_string();
  }

  if let Some(errors) = body.get("errors").filter(|e| match e {
    Value::Object(map) => !map.is_empty(),
    Value::Array(list) => !list.is_empty(),
    Value::Null => false,
    _ => true,
  }) {
    if let Ok(serialized) = serde_json::to_string(errors) {
      return serialized;
    }
  }

  fallback.to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_message_prefers_first_error_message() {
    let body = json!({
      "errorMessages": ["Issue does not exist", "second"],
      "errors": {"timeSpent": "bad"}
    });
    assert_eq!(upstream_message(&body, "fallback"), "Issue does not exist");
  }

  #[test]
  fn test_message_falls_back_to_serialized_errors() {
    let body = json!({"errorMessages": [], "errors": {"started": "invalid date"}});
    assert_eq!(
      upstream_message(&body, "fallback"),
      r#"{"started":"invalid date"}"#
    );
  }

  #[test]
  fn test_message_falls_back_to_generic() {
    assert_eq!(upstream_message(&json!({}), "Jira API error"), "Jira API error");
    assert_eq!(
      upstream_message(&json!({"errors": {}}), "Jira API error"),
      "Jira API error"
    );
  }

  #[test]
  fn test_status_classification() {
    let auth = GatewayError::from_status(StatusCode::FORBIDDEN, "nope");
    assert!(matches!(auth, GatewayError::Auth { .. }));
    assert_eq!(auth.status(), StatusCode::FORBIDDEN);

    let upstream = GatewayError::from_status(StatusCode::NOT_FOUND, "missing");
    assert!(matches!(upstream, GatewayError::Upstream { .. }));
    assert_eq!(upstream.status(), StatusCode::NOT_FOUND);

    assert_eq!(
      GatewayError::validation("x").status(),
      StatusCode::BAD_REQUEST
    );
    assert_eq!(
      GatewayError::Network("down".into()).status(),
      StatusCode::INTERNAL_SERVER_ERROR
    );
  }
}
