//! Short-lived bearer tokens for the cloud speech services.
//!
//! The subscription key is exchanged at the token-issuing endpoint for a
//! bearer token valid for ten minutes. The token is fetched before first
//! use, cached, and refreshed once it is within a minute of expiry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kidvox_core::{ProviderError, Settings};
use reqwest::Client;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::http;

/// Lifetime of an issued token.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(600);

/// Refresh this long before a token expires.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}

/// Cache holding one bearer token until shortly before it expires.
#[derive(Debug, Clone)]
pub struct TokenCache {
    token: Arc<RwLock<Option<CachedToken>>>,
    lifetime: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(TOKEN_LIFETIME)
    }
}

impl TokenCache {
    /// Cache for tokens valid for `lifetime`.
    #[must_use]
    pub fn new(lifetime: Duration) -> Self {
        Self {
            token: Arc::new(RwLock::new(None)),
            lifetime,
        }
    }

    /// Return the cached token, calling `fetch` if it is missing or stale.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ProviderError>>,
    {
        {
            let guard = self.token.read().await;
            if let Some(token) = guard.as_ref()
                && token.is_fresh()
            {
                return Ok(token.value.clone());
            }
        }

        let mut guard = self.token.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = guard.as_ref()
            && token.is_fresh()
        {
            return Ok(token.value.clone());
        }

        tracing::debug!("Fetching speech token");
        let value = fetch().await?;
        *guard = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + self.lifetime,
        });
        Ok(value)
    }

    /// Drop the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        *self.token.write().await = None;
    }
}

/// Exchanges the subscription key for bearer tokens.
#[derive(Debug, Clone)]
pub struct SpeechTokenIssuer {
    client: Client,
    endpoint: String,
    key: String,
    cache: TokenCache,
}

impl SpeechTokenIssuer {
    /// Issuer for `endpoint` using subscription `key`.
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::build_client(http::DEFAULT_TIMEOUT)?,
            endpoint: endpoint.into(),
            key: key.into(),
            cache: TokenCache::default(),
        })
    }

    /// Issuer configured from the speech region and key in `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let endpoint = settings.token_endpoint().ok_or_else(|| {
            ProviderError::Unavailable("speech region or token endpoint not configured".to_string())
        })?;
        let key = settings
            .speech_key
            .clone()
            .ok_or_else(|| ProviderError::Unauthorized("speech key not configured".to_string()))?;
        Self::new(endpoint, key)
    }

    /// A valid bearer token, fetched on first use.
    pub async fn bearer(&self) -> Result<String, ProviderError> {
        self.cache.get_or_fetch(|| self.fetch()).await
    }

    /// Forget the cached token (after the service rejected it).
    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    async fn fetch(&self) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header(reqwest::header::CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(|e| http::send_error(&e))?;
        let response = http::check_status(response).await?;
        let token = response
            .text()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to read token: {e}")))?;

        let token = token.trim();
        if token.is_empty() {
            return Err(ProviderError::InvalidResponse("empty token".to_string()));
        }
        tracing::debug!(lifetime_secs = TOKEN_LIFETIME.as_secs(), "Speech token issued");
        Ok(token.to_string())
    }
}
