//! Access tokens for the mail service.
//!
//! A run acquires its token exactly once, before any send, and every send in
//! the run uses that token.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use mailmerge_common::internal;
use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, time::Instant};

use crate::error::TokenError;

/// Tokens this close to expiry are refreshed rather than reused.
const EXPIRY_MARGIN: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AccessToken {
    secret: Arc<str>,
    expires_at: Option<Instant>,
}

impl AccessToken {
    #[must_use]
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: None,
        }
    }

    #[must_use]
    pub fn expiring_in(secret: impl Into<Arc<str>>, lifetime: Duration) -> Self {
        Self {
            secret: secret.into(),
            expires_at: Some(Instant::now() + lifetime),
        }
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    #[must_use]
    pub const fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Whether the token is still usable `margin` from now.
    #[must_use]
    pub fn is_fresh(&self, margin: Duration) -> bool {
        self.expires_at
            .is_none_or(|expires_at| Instant::now() + margin < expires_at)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Somewhere an [`AccessToken`] can be obtained from.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire(&self) -> Result<AccessToken, TokenError>;
}

/// A fixed secret that never expires.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: AccessToken,
}

impl StaticTokenSource {
    #[must_use]
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self {
            token: AccessToken::new(secret),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn acquire(&self) -> Result<AccessToken, TokenError> {
        Ok(self.token.clone())
    }
}

/// Reads the secret from an environment variable on every acquisition, so
/// an externally refreshed token is picked up by the next run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvTokenSource {
    variable: String,
    /// Seconds the token is valid for once read, if it expires at all
    #[serde(default)]
    lifetime_secs: Option<u64>,
}

impl EnvTokenSource {
    #[must_use]
    pub fn new(variable: impl Into<String>, lifetime: Option<Duration>) -> Self {
        Self {
            variable: variable.into(),
            lifetime_secs: lifetime.map(|lifetime| lifetime.as_secs()),
        }
    }
}

#[async_trait]
impl TokenSource for EnvTokenSource {
    async fn acquire(&self) -> Result<AccessToken, TokenError> {
        let secret = std::env::var(&self.variable)
            .map_err(|_| TokenError::MissingVariable(self.variable.clone()))?;

        if secret.trim().is_empty() {
            return Err(TokenError::Unavailable(format!(
                "{} is set but empty",
                self.variable
            )));
        }

        Ok(match self.lifetime_secs {
            Some(secs) => AccessToken::expiring_in(secret, Duration::from_secs(secs)),
            None => AccessToken::new(secret),
        })
    }
}

/// Reuses the last token from `inner` until it is about to expire.
pub struct CachedTokenSource {
    inner: Arc<dyn TokenSource>,
    cached: Mutex<Option<AccessToken>>,
}

impl CachedTokenSource {
    #[must_use]
    pub fn new(inner: Arc<dyn TokenSource>) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

impl fmt::Debug for CachedTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedTokenSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for CachedTokenSource {
    async fn acquire(&self) -> Result<AccessToken, TokenError> {
        // Held across the refresh so concurrent callers share one acquisition
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh(EXPIRY_MARGIN)) {
            return Ok(token.clone());
        }

        internal!("Refreshing access token");
        let token = self.inner.acquire().await?;
        *cached = Some(token.clone());

        Ok(token)
    }
}
