//! Redirect chain resolution for shortened URLs.

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::Url;
use serde::Serialize;
use tracing::debug;

use crate::jira::{GatewayError, Result};

/// Upper bound on followed `Location` headers
pub const MAX_HOPS: usize = 10;

/// Where a URL ends up after following its redirects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectChain {
  pub original_url: String,
  pub final_url: String,
  /// Full chain including the original URL; empty when nothing redirected
  pub hops: Vec<String>,
}

#[derive(Clone)]
pub struct RedirectResolver {
  http: reqwest::Client,
  max_hops: usize,
}

impl RedirectResolver {
  pub fn new() -> Result<Self> {
    let http = reqwest::Client::builder()
      .redirect(Policy::none())
      .build()
      .map_err(|e| GatewayError::Network(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self {
      http,
      max_hops: MAX_HOPS,
    })
  }

  /// Follow `Location` headers with HEAD requests, at most `MAX_HOPS` times.
  ///
  /// Running out of hops is not an error: the last URL reached is reported
  /// as final.
  pub async fn resolve(&self, url: &str) -> Result<RedirectChain> {
    let mut current =
      Url::parse(url).map_err(|e| GatewayError::validation(format!("Invalid url {}: {}", url, e)))?;
    let mut hops = vec![url.to_string()];
    let mut reached = url.to_string();

    for _ in 0..self.max_hops {
      let response = self
        .http
        .head(current.clone())
        .send()
        .await
        .map_err(|e| GatewayError::Network(format!("URL check failed: {}", e)))?;

      let location = match response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
      {
        Some(location) => location.to_string(),
        None => break,
      };

      // Relative locations resolve against the URL that sent them. Absolute
      // ones are reported exactly as sent.
      let next = current
        .join(&location)
        .map_err(|e| GatewayError::Network(format!("URL check failed: bad location {}: {}", location, e)))?;
      debug!(from = %current, to = %next, status = %response.status(), "redirect hop");

      reached = if Url::parse(&location).is_ok() {
        location
      } else {
        next.to_string()
      };
      hops.push(reached.clone());
      current = next;
    }

    Ok(RedirectChain {
      original_url: url.to_string(),
      final_url: reached,
      hops: if hops.len() > 1 { hops } else { Vec::new() },
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_no_location_reports_empty_hops() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("HEAD", "/landing")
      .with_status(200)
      .create_async()
      .await;

    let url = format!("{}/landing", server.url());
    let chain = RedirectResolver::new().unwrap().resolve(&url).await.unwrap();

    assert_eq!(chain.original_url, url);
    assert_eq!(chain.final_url, url);
    assert!(chain.hops.is_empty());
  }

  #[tokio::test]
  async fn test_follows_relative_and_absolute_locations() {
    let mut server = mockito::Server::new_async().await;
    let landing = format!("{}/final", server.url());
    server
      .mock("HEAD", "/s/abc")
      .with_status(301)
      .with_header("location", "/step")
      .create_async()
      .await;
    server
      .mock("HEAD", "/step")
      .with_status(302)
      .with_header("location", &landing)
      .create_async()
      .await;
    server
      .mock("HEAD", "/final")
      .with_status(200)
      .create_async()
      .await;

    let url = format!("{}/s/abc", server.url());
    let chain = RedirectResolver::new().unwrap().resolve(&url).await.unwrap();

    assert_eq!(chain.final_url, landing);
    assert_eq!(
      chain.hops,
      vec![url.clone(), format!("{}/step", server.url()), landing.clone()]
    );
  }

  #[tokio::test]
  async fn test_absolute_location_is_kept_verbatim() {
    let mut server = mockito::Server::new_async().await;
    // No path, so a normalizing parser would append "/"
    let bare = server.url();
    server
      .mock("HEAD", "/go")
      .with_status(301)
      .with_header("location", &bare)
      .create_async()
      .await;
    server
      .mock("HEAD", "/")
      .with_status(200)
      .create_async()
      .await;

    let url = format!("{}/go", server.url());
    let chain = RedirectResolver::new().unwrap().resolve(&url).await.unwrap();

    assert_eq!(chain.hops, vec![url, bare.clone()]);
    assert_eq!(chain.final_url, bare);
  }

  #[tokio::test]
  async fn test_self_redirect_stops_at_hop_limit() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("HEAD", "/loop")
      .with_status(302)
      .with_header("location", "/loop")
      .expect(MAX_HOPS)
      .create_async()
      .await;

    let url = format!("{}/loop", server.url());
    let chain = RedirectResolver::new().unwrap().resolve(&url).await.unwrap();

    mock.assert_async().await;
    assert_eq!(chain.hops.len(), MAX_HOPS + 1);
    assert_eq!(chain.final_url, url);
  }

  #[tokio::test]
  async fn test_invalid_url_is_validation_error() {
    let err = RedirectResolver::new()
      .unwrap()
      .resolve("not a url")
      .await
      .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));
  }
}
