//! Credentials attached to requests
//!
//! The store accepts a database secret or an ID token as the `auth` query
//! parameter. Streams ask their provider for a credential on every connect,
//! and ask for a refreshed one after the server sends `auth_revoked`.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Failure to produce a credential
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct AuthError(pub String);

/// Source of the `auth` query parameter
#[async_trait]
pub trait AuthProvider: fmt::Debug + Send + Sync {
    /// Credential for the next request, `None` for unauthenticated access.
    ///
    /// `refresh` is true when the server revoked the previous credential; a
    /// provider that cannot mint a new one should return an error so the
    /// stream stops instead of reconnecting with a dead credential.
    async fn credential(&self, refresh: bool) -> Result<Option<String>, AuthError>;
}

/// No credential
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl AuthProvider for NoAuth {
    async fn credential(&self, _refresh: bool) -> Result<Option<String>, AuthError> {
        Ok(None)
    }
}

/// A fixed database secret or long-lived token
#[derive(Clone)]
pub struct StaticSecret(String);

impl StaticSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }
}

impl fmt::Debug for StaticSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticSecret(..)")
    }
}

#[async_trait]
impl AuthProvider for StaticSecret {
    async fn credential(&self, _refresh: bool) -> Result<Option<String>, AuthError> {
        // Nothing to refresh; a revoked secret fails again on the next open.
        Ok(Some(self.0.clone()))
    }
}

/// Add `auth=<credential>` to a request URL
pub(crate) fn apply_credential(url: &mut Url, credential: Option<&str>) {
    if let Some(credential) = credential {
        url.query_pairs_mut().append_pair("auth", credential);
    }
}
