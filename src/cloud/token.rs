use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::CloudConfig;

/// How long before actual expiry a cached token stops being handed out.
/// Guards against a token expiring mid-flight on a slow upstream call.
const EXPIRY_MARGIN: Duration = Duration::from_secs(10);

/// Errors that can occur during the client-credentials token exchange.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The token endpoint rejected the exchange; carries the status and
    /// raw response body for diagnostics.
    #[error("token endpoint returned error: ({0}) {1}")]
    Status(StatusCode, String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Token lifetime in seconds.
    expires_in: u64,
}

#[derive(Clone, Debug)]
struct Token {
    value: String,
    expires_at: Instant,
}

/// Cached bearer token for the cloud platform, obtained via the OAuth2
/// client-credentials flow.
///
/// The token is created lazily on first use and replaced wholesale on
/// refresh; only the refresh routine writes the cell.
pub struct TokenCache {
    client: reqwest::Client,
    config: CloudConfig,
    cached: RwLock<Option<Token>>,
}

impl TokenCache {
    pub fn new(config: CloudConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            cached: RwLock::new(None),
        }
    }

    /// Returns a usable bearer token, performing a network exchange only
    /// when the cached token is missing or within the safety margin of
    /// expiry.
    ///
    /// There is no single-flight deduplication: concurrent callers that
    /// find the cache stale each run their own exchange. The endpoint is
    /// idempotent and side-effect-free, so the races are harmless and the
    /// cache converges to whichever refresh completes last, at the cost
    /// of redundant requests under burst load.
    pub async fn get(&self) -> Result<String, AuthError> {
        if let Some(token) = self.cached.read().await.as_ref() {
            if Instant::now() + EXPIRY_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        self.refresh().await
    }

    async fn refresh(&self) -> Result<String, AuthError> {
        debug!("requesting fresh access token");

        let response = self
            .client
            .post(self.config.token_endpoint.clone())
            .timeout(self.config.request_timeout)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("audience", self.config.audience.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "token exchange rejected");
            // Nothing is cached on failure; the next caller retries.
            return Err(AuthError::Status(status, body));
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = Instant::now() + Duration::from_secs(token.expires_in);
        let value = token.access_token;

        *self.cached.write().await = Some(Token {
            value: value.clone(),
            expires_at,
        });

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockito::{Matcher, Server, ServerGuard};

    use crate::config::test_cloud_config;

    async fn cache_for(server: &ServerGuard) -> TokenCache {
        TokenCache::new(test_cloud_config(&server.url()))
    }

    #[tokio::test]
    async fn exchange_sends_client_credentials_form() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                Matcher::UrlEncoded("client_id".into(), "test-client".into()),
                Matcher::UrlEncoded("client_secret".into(), "test-secret".into()),
                Matcher::UrlEncoded("audience".into(), "https://cloud.test/aud".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "tok-1", "expires_in": 3600}"#)
            .create_async()
            .await;

        let cache = cache_for(&server).await;
        assert_eq!(cache.get().await.unwrap(), "tok-1");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn token_is_reused_within_margin() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token": "tok-1", "expires_in": 3600}"#)
            .expect(1)
            .create_async()
            .await;

        let cache = cache_for(&server).await;
        assert_eq!(cache.get().await.unwrap(), "tok-1");
        assert_eq!(cache.get().await.unwrap(), "tok-1");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn short_lived_token_forces_a_new_exchange() {
        let mut server = Server::new_async().await;

        // expires_in below the safety margin makes the token stale
        // immediately after caching.
        let mock1 = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token": "tok-1", "expires_in": 5}"#)
            .create_async()
            .await;
        let mock2 = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token": "tok-2", "expires_in": 3600}"#)
            .create_async()
            .await;

        let cache = cache_for(&server).await;
        assert_eq!(cache.get().await.unwrap(), "tok-1");
        assert_eq!(cache.get().await.unwrap(), "tok-2");

        mock1.assert_async().await;
        mock2.assert_async().await;
    }

    #[tokio::test]
    async fn failure_preserves_body_and_caches_nothing() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(403)
            .with_body("invalid client")
            .expect(2)
            .create_async()
            .await;

        let cache = cache_for(&server).await;

        match cache.get().await.unwrap_err() {
            AuthError::Status(status, body) => {
                assert_eq!(status.as_u16(), 403);
                assert_eq!(body, "invalid client");
            }
            other => panic!("expected status error, got {other:?}"),
        }

        // Nothing was cached, so the next call hits the endpoint again.
        assert!(cache.get().await.is_err());

        mock.assert_async().await;
    }
}
