//! The connection credential: verification, local persistence and the
//! optional per-identity remote copy.

pub mod storage;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::jira::{Credential, GatewayError, TrackerGateway};
pub use storage::LocalStore;

#[derive(Debug, Error)]
pub enum CredentialError {
  #[error("{0}")]
  Missing(String),
  #[error(transparent)]
  Gateway(#[from] GatewayError),
  #[error("credential storage failed: {0}")]
  Storage(String),
}

impl From<rusqlite::Error> for CredentialError {
  fn from(err: rusqlite::Error) -> Self {
    CredentialError::Storage(err.to_string())
  }
}

/// A signed-in user of the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySession {
  pub identity: String,
}

// Identity sessions come from an embedding application. The CLI never
// opens one.
#[allow(dead_code)]
impl IdentitySession {
  pub fn new(identity: impl Into<String>) -> Self {
    Self {
      identity: identity.into(),
    }
  }
}

/// Per-identity credential storage provided by the host application.
#[async_trait]
pub trait RemoteCredentialStore: Send + Sync {
  #[allow(dead_code)]
  async fn load(&self, identity: &str) -> Result<Option<Credential>, CredentialError>;

  async fn save(&self, identity: &str, credential: &Credential) -> Result<(), CredentialError>;

  async fn delete(&self, identity: &str) -> Result<(), CredentialError>;
}

/// Strip trailing slashes and a leading `https://`; `http://` is kept.
pub fn normalize_host(host: &str) -> String {
  let host = host.trim().trim_end_matches('/');
  host.strip_prefix("https://").unwrap_or(host).to_string()
}

pub struct CredentialStore {
  local: LocalStore,
  remote: Option<Arc<dyn RemoteCredentialStore>>,
  session: Option<IdentitySession>,
  current: Option<Credential>,
  remembered: bool,
}

impl CredentialStore {
  /// Wrap a local store, picking up whatever it already holds.
  pub fn new(local: LocalStore) -> Result<Self, CredentialError> {
    let stored = local.load()?;
    Ok(Self {
      local,
      remote: None,
      session: None,
      remembered: stored.as_ref().is_some_and(|s| s.remembered),
      current: stored.map(|s| s.credential),
    })
  }

  #[allow(dead_code)]
  pub fn with_remote(mut self, remote: Arc<dyn RemoteCredentialStore>) -> Self {
    self.remote = Some(remote);
    self
  }

  pub fn current(&self) -> Option<&Credential> {
    self.current.as_ref()
  }

  pub fn is_remembered(&self) -> bool {
    self.remembered
  }

  #[allow(dead_code)]
  pub fn session(&self) -> Option<&IdentitySession> {
    self.session.as_ref()
  }

  /// Verify a new credential and make it current.
  ///
  /// Nothing is persisted unless verification succeeds. The remote copy is
  /// written only when `remember` is set and an identity session exists.
  pub async fn connect(
    &mut self,
    gateway: &dyn TrackerGateway,
    host: &str,
    email: &str,
    token: &str,
    remember: bool,
  ) -> Result<Credential, CredentialError> {
    let mut credential = Credential::new(normalize_host(host), email.trim(), token.trim());
    if !credential.is_complete() {
      return Err(CredentialError::Missing(
        "Jira domain, email and API token are all required".into(),
      ));
    }

    let profile = gateway.verify_identity(&credential).await?;
    credential.display_name = Some(profile.display_name);

    let remote_target = match (&self.remote, &self.session) {
      (Some(remote), Some(session)) if remember => Some((remote.clone(), session.identity.clone())),
      _ => None,
    };
    if let Some((remote, identity)) = &remote_target {
      remote.save(identity, &credential).await?;
      debug!(%identity, "credential saved remotely");
    }

    let remembered = remote_target.is_some();
    self.local.save(&credential, remembered)?;
    info!(host = %credential.host, token = %credential.fingerprint(), "connected");

    self.current = Some(credential.clone());
    self.remembered = remembered;
    Ok(credential)
  }

  /// Forget the credential locally and, for a known identity, remotely.
  pub async fn disconnect(&mut self) -> Result<(), CredentialError> {
    self.local.clear()?;
    if let (Some(remote), Some(session)) = (&self.remote, &self.session) {
      remote.delete(&session.identity).await?;
    }
    self.current = None;
    self.remembered = false;
    info!("disconnected");
    Ok(())
  }

  /// Attach an identity; its remote credential, if any, replaces the local one.
  #[allow(dead_code)]
  pub async fn establish_session(
    &mut self,
    session: IdentitySession,
  ) -> Result<Option<&Credential>, CredentialError> {
    let remote_credential = match &self.remote {
      Some(remote) => remote.load(&session.identity).await?,
      None => None,
    };
    self.session = Some(session);

    if let Some(credential) = remote_credential {
      self.local.save(&credential, true)?;
      debug!(host = %credential.host, "remote credential took over");
      self.current = Some(credential);
      self.remembered = true;
    }
    Ok(self.current.as_ref())
  }

  /// Drop the identity; the credential itself stays.
  #[allow(dead_code)]
  pub fn end_session(&mut self) {
    self.session = None;
  }
}
