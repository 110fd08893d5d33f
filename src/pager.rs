use tracing::debug;

use crate::jira::{Credential, Issue, Result, SearchRequest, TrackerGateway};

pub const PAGE_SIZE: u64 = 100;

/// Drive a search to completion, one page after another.
///
/// Issues come back in response order. The first failing page aborts the
/// whole fetch.
pub async fn fetch_all<G>(
  gateway: &G,
  cred: &Credential,
  jql: &str,
  fields: &[&str],
) -> Result<Vec<Issue>>
where
  G: TrackerGateway + ?Sized,
{
  let mut issues = Vec::new();
  let mut offset = 0;

  loop {
    let request = SearchRequest::new(jql)
      .with_fields(fields)
      .with_page(offset, PAGE_SIZE);
    let page = gateway.search(cred, &request).await?;
    debug!(
      offset,
      start_at = page.start_at,
      returned = page.issues.len(),
      total = page.total,
      "fetched page"
    );
    issues.extend(page.issues);

    if page.max_results == 0 || offset + page.max_results >= page.total {
      break;
    }
    offset += page.max_results;
  }

  Ok(issues)
}
