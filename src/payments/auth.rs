//! Lazily refreshed bearer tokens for OAuth-style providers

use crate::error::PaymentResult;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Subtracted from the provider-declared lifetime so an about-to-expire
/// token is never sent.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// Lifetime assumed when the provider does not declare one
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Per-adapter token cache.
///
/// The `(token, expiry)` pair is replaced as a whole under a write lock, so
/// readers never observe a partial update. Two callers may refresh at the
/// same time; the later write wins.
#[derive(Debug, Default)]
pub struct TokenCache {
    inner: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token if it has not reached its (margin-adjusted) expiry
    pub async fn current(&self) -> Option<String> {
        let guard = self.inner.read().await;
        guard
            .as_ref()
            .filter(|cached| Instant::now() < cached.expires_at)
            .map(|cached| cached.token.clone())
    }

    pub async fn store(&self, token: String, ttl: Duration) {
        let expires_at = Instant::now() + ttl.saturating_sub(EXPIRY_MARGIN);
        *self.inner.write().await = Some(CachedToken { token, expires_at });
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    /// Returns the cached token or runs `fetch` on the calling path and
    /// caches its `(token, ttl)` result.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> PaymentResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PaymentResult<(String, Duration)>>,
    {
        if let Some(token) = self.current().await {
            return Ok(token);
        }
        let (token, ttl) = fetch().await?;
        self.store(token.clone(), ttl).await;
        Ok(token)
    }
}
