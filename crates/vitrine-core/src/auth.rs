//! Credential collaborator
//!
//! The pipeline never reads session state on its own. Every network write is
//! made with a [`Credential`] obtained from an injected [`CredentialProvider`];
//! refreshing sessions is the provider's job, not the pipeline's.

use async_trait::async_trait;
use std::fmt;

/// Bearer credential for one storage call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value for an `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// No valid credential exists. The pipeline fails closed on this.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("No valid credential: {reason}")]
pub struct Unauthenticated {
    pub reason: String,
}

impl Unauthenticated {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Supplies the credential for the next storage call.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn current_credential(&self) -> Result<Credential, Unauthenticated>;
}

/// Provider backed by a fixed token (service key, CLI token).
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credential: Option<Credential>,
}

impl StaticCredentialProvider {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let credential = if token.trim().is_empty() {
            None
        } else {
            Some(Credential::bearer(token))
        };
        Self { credential }
    }

    /// Provider from an optional token; `None` behaves like [`NoCredentialProvider`].
    pub fn from_optional(token: Option<&str>) -> Self {
        match token {
            Some(token) => Self::new(token),
            None => Self { credential: None },
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn current_credential(&self) -> Result<Credential, Unauthenticated> {
        self.credential
            .clone()
            .ok_or_else(|| Unauthenticated::new("no token configured"))
    }
}

/// Provider that never has a credential.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentialProvider;

#[async_trait]
impl CredentialProvider for NoCredentialProvider {
    async fn current_credential(&self) -> Result<Credential, Unauthenticated> {
        Err(Unauthenticated::new("not signed in"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::bearer("super-secret-token");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("REDACTED"));
        assert_eq!(credential.authorization_header(), "Bearer super-secret-token");
    }

    #[tokio::test]
    async fn test_static_provider_returns_token() {
        let provider = StaticCredentialProvider::new("abc");
        let credential = provider.current_credential().await.unwrap();
        assert_eq!(credential.token(), "abc");
    }

    #[tokio::test]
    async fn test_blank_token_is_unauthenticated() {
        let provider = StaticCredentialProvider::new("   ");
        assert!(provider.current_credential().await.is_err());

        let provider = StaticCredentialProvider::from_optional(None);
        assert!(provider.current_credential().await.is_err());
    }

    #[tokio::test]
    async fn test_no_credential_provider() {
        let err = NoCredentialProvider.current_credential().await.unwrap_err();
        assert_eq!(err.reason, "not signed in");
    }
}
