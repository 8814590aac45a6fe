//! Bearer token acquisition.
//!
//! The relay treats credentials as an opaque "current bearer token"
//! collaborator. Two sources are shipped:
//!
//! - [`StaticTokenProvider`]: a fixed token from configuration, for local
//!   development and tests
//! - [`MetadataTokenProvider`]: the GCE metadata server's default service
//!   account token, cached until shortly before expiry

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::AuthError;

/// Refresh the cached metadata token this long before it expires.
const TOKEN_REFRESH_BUFFER_MS: i64 = 60_000;

/// Default GCE metadata server base URL.
const METADATA_BASE_URL: &str = "http://metadata.google.internal";

/// Metadata path for the default service account's access token.
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Source of the bearer token presented to the upstream service.
///
/// Implementations must be safe to call concurrently; the link fetches a
/// fresh token on every connect and renewal.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// The current bearer token.
    async fn bearer_token(&self) -> Result<String, AuthError>;
}

/// A fixed token supplied at startup.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wrap a pre-acquired token.
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }
}

#[derive(Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    token: String,
    expires_at_ms: i64,
}

/// Access tokens from the GCE metadata server, with expiry caching.
pub struct MetadataTokenProvider {
    client: reqwest::Client,
    base_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenProvider {
    /// Provider against the standard metadata endpoint.
    pub fn new() -> Self {
        Self::with_base_url(METADATA_BASE_URL)
    }

    /// Provider against a custom endpoint (tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            cached: Mutex::new(None),
        }
    }

    fn cached_token(&self) -> Option<String> {
        let cached = self.cached.lock();
        cached
            .as_ref()
            .filter(|c| c.expires_at_ms - TOKEN_REFRESH_BUFFER_MS > now_ms())
            .map(|c| c.token.clone())
    }

    async fn fetch_token(&self) -> Result<CachedToken, AuthError> {
        let url = format!("{}{TOKEN_PATH}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Status { status: status.as_u16() });
        }

        let data: MetadataTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Malformed(e.to_string()))?;
        info!(expires_in = data.expires_in, "fetched service account token");
        Ok(CachedToken {
            token: data.access_token,
            expires_at_ms: now_ms() + data.expires_in * 1000,
        })
    }
}

impl Default for MetadataTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for MetadataTokenProvider {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.cached_token() {
            debug!("using cached service account token");
            return Ok(token);
        }
        let fetched = self.fetch_token().await?;
        let token = fetched.token.clone();
        *self.cached.lock() = Some(fetched);
        Ok(token)
    }
}

/// Milliseconds since the Unix epoch.
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn static_provider_returns_configured_token() {
        let provider = StaticTokenProvider::new("ya29.static");
        assert_eq!(provider.bearer_token().await.unwrap(), "ya29.static");
    }

    #[tokio::test]
    async fn metadata_provider_fetches_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.fresh",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = MetadataTokenProvider::with_base_url(server.uri());
        assert_eq!(provider.bearer_token().await.unwrap(), "ya29.fresh");
    }

    #[tokio::test]
    async fn metadata_provider_caches_until_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.cached",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = MetadataTokenProvider::with_base_url(server.uri());
        assert_eq!(provider.bearer_token().await.unwrap(), "ya29.cached");
        // Second call must be served from cache (mock expects exactly one hit).
        assert_eq!(provider.bearer_token().await.unwrap(), "ya29.cached");
    }

    #[tokio::test]
    async fn metadata_provider_refetches_expired_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.shortlived",
                "expires_in": 1
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider = MetadataTokenProvider::with_base_url(server.uri());
        // One-second lifetime is inside the refresh buffer, so the cache is
        // never considered fresh.
        let _ = provider.bearer_token().await.unwrap();
        let _ = provider.bearer_token().await.unwrap();
    }

    #[tokio::test]
    async fn metadata_provider_surfaces_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let provider = MetadataTokenProvider::with_base_url(server.uri());
        let err = provider.bearer_token().await.unwrap_err();
        assert_matches!(err, AuthError::Status { status: 403 });
    }

    #[tokio::test]
    async fn metadata_provider_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let provider = MetadataTokenProvider::with_base_url(server.uri());
        let err = provider.bearer_token().await.unwrap_err();
        assert_matches!(err, AuthError::Malformed(_));
    }
}
