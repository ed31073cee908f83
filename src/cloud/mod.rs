mod format;
pub mod token;

pub use format::format_device_log;
pub use token::{AuthError, TokenCache};

use std::sync::Arc;

use reqwest::{StatusCode, Url};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CloudConfig;

/// Errors that can occur while publishing a property value.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("publish request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The platform rejected the publish; status and raw body are the
    /// only diagnostics operators get, so both are preserved.
    #[error("publish rejected: ({0}) {1}")]
    Status(StatusCode, String),
}

/// Errors that can occur while reading a property snapshot.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("read request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("read rejected: ({0}) {1}")]
    Status(StatusCode, String),
}

/// Last known value of a property and when it was updated.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertySnapshot {
    pub value: Value,
    pub updated_at: Option<String>,
}

impl PropertySnapshot {
    /// The value as display text: strings verbatim, anything else as its
    /// JSON rendering.
    pub fn value_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Field names that may carry the property value, tried in order. The
/// upstream API is not consistent across endpoint variants, so the
/// candidate list is explicit; first present non-null field wins.
const VALUE_FIELDS: [&str; 4] = ["last_value", "value", "lastValue", "current_value"];

/// Field names that may carry the value-updated timestamp, tried in order.
const UPDATED_AT_FIELDS: [&str; 3] = ["value_updated_at", "updated_at", "last_update"];

/// Authenticated client for the cloud platform's property API.
///
/// Every call obtains a token from the [`TokenCache`] immediately before
/// use; tokens are never reused across a hand-off boundary.
pub struct CloudProxy {
    client: reqwest::Client,
    config: CloudConfig,
    tokens: Arc<TokenCache>,
}

impl CloudProxy {
    pub fn new(config: CloudConfig, tokens: Arc<TokenCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            tokens,
        }
    }

    /// Publishes a value to a device property.
    ///
    /// Returns the response body text, or `"OK"` when the platform
    /// replied with an empty body.
    pub async fn publish_value(
        &self,
        thing_id: &str,
        property_id: &str,
        device_id: &str,
        value: Value,
    ) -> Result<String, PublishError> {
        let token = self.tokens.get().await?;
        let url = self.property_url(thing_id, property_id, Some("publish"));

        debug!(%url, "publishing property value");
        let mut request = self
            .client
            .put(url)
            .bearer_auth(&token)
            .timeout(self.config.request_timeout)
            .json(&json!({ "value": value, "device_id": device_id }));
        if let Some(organization) = &self.config.organization {
            request = request.header("X-Organization", organization);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(%status, "publish rejected");
            return Err(PublishError::Status(status, body));
        }

        if body.is_empty() {
            Ok("OK".to_string())
        } else {
            Ok(body)
        }
    }

    /// Publishes boolean `true`, used to pulse a trigger property.
    pub async fn publish_true(
        &self,
        thing_id: &str,
        property_id: &str,
        device_id: &str,
    ) -> Result<String, PublishError> {
        self.publish_value(thing_id, property_id, device_id, Value::Bool(true))
            .await
    }

    /// Fetches the last known value of a property.
    ///
    /// Some endpoint variants reply with plain text instead of JSON; that
    /// body is returned verbatim with no update timestamp.
    pub async fn read_property(
        &self,
        thing_id: &str,
        property_id: &str,
    ) -> Result<PropertySnapshot, ReadError> {
        let token = self.tokens.get().await?;
        let url = self.property_url(thing_id, property_id, None);

        debug!(%url, "reading property");
        let mut request = self
            .client
            .get(url)
            .bearer_auth(&token)
            .timeout(self.config.request_timeout);
        if let Some(organization) = &self.config.organization {
            request = request.header("X-Organization", organization);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(%status, "read rejected");
            return Err(ReadError::Status(status, body));
        }

        let data: Value = match serde_json::from_str(&body) {
            Ok(data) => data,
            Err(_) => {
                return Ok(PropertySnapshot {
                    value: Value::String(body),
                    updated_at: None,
                })
            }
        };

        let value = VALUE_FIELDS
            .iter()
            .find_map(|field| data.get(field).filter(|v| !v.is_null()))
            .cloned()
            .unwrap_or(Value::String(String::new()));
        let updated_at = UPDATED_AT_FIELDS
            .iter()
            .find_map(|field| data.get(field).filter(|v| !v.is_null()))
            .and_then(|v| v.as_str())
            .map(String::from);

        Ok(PropertySnapshot { value, updated_at })
    }

    fn property_url(&self, thing_id: &str, property_id: &str, action: Option<&str>) -> Url {
        let mut url = self.config.api_endpoint.clone();
        // The config parser rejects cannot-be-a-base endpoints, so
        // path_segments_mut always succeeds here. Extending segments
        // percent-encodes the opaque ids.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["things", thing_id, "properties", property_id]);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockito::{Matcher, Server, ServerGuard};
    use pretty_assertions::assert_eq;

    use crate::config::test_cloud_config;

    async fn token_mock(server: &mut ServerGuard) -> mockito::Mock {
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token": "test-token", "expires_in": 3600}"#)
            .create_async()
            .await
    }

    fn proxy_for(server: &ServerGuard) -> CloudProxy {
        let config = test_cloud_config(&server.url());
        let tokens = Arc::new(TokenCache::new(config.clone()));
        CloudProxy::new(config, tokens)
    }

    #[tokio::test]
    async fn publish_true_sends_one_authenticated_publish_call() {
        let mut server = Server::new_async().await;
        let _token = token_mock(&mut server).await;
        let mock = server
            .mock("PUT", "/things/thing-1/properties/p-up/publish")
            .match_header("authorization", "Bearer test-token")
            .match_body(Matcher::Json(
                serde_json::json!({"value": true, "device_id": "dev-1"}),
            ))
            .with_status(200)
            .with_body("accepted")
            .expect(1)
            .create_async()
            .await;

        let proxy = proxy_for(&server);
        let response = proxy.publish_true("thing-1", "p-up", "dev-1").await.unwrap();
        assert_eq!(response, "accepted");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_publish_body_becomes_ok() {
        let mut server = Server::new_async().await;
        let _token = token_mock(&mut server).await;
        let _mock = server
            .mock("PUT", "/things/t/properties/p/publish")
            .with_status(200)
            .create_async()
            .await;

        let proxy = proxy_for(&server);
        assert_eq!(proxy.publish_true("t", "p", "d").await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn publish_failure_preserves_status_and_body() {
        let mut server = Server::new_async().await;
        let _token = token_mock(&mut server).await;
        let _mock = server
            .mock("PUT", "/things/t/properties/p/publish")
            .with_status(422)
            .with_body("bad property type")
            .create_async()
            .await;

        let proxy = proxy_for(&server);
        match proxy.publish_true("t", "p", "d").await.unwrap_err() {
            PublishError::Status(status, body) => {
                assert_eq!(status.as_u16(), 422);
                assert_eq!(body, "bad property type");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn organization_header_is_sent_when_configured() {
        let mut server = Server::new_async().await;
        let _token = token_mock(&mut server).await;
        let mock = server
            .mock("PUT", "/things/t/properties/p/publish")
            .match_header("x-organization", "org-1")
            .with_status(200)
            .create_async()
            .await;

        let mut config = test_cloud_config(&server.url());
        config.organization = Some("org-1".to_string());
        let tokens = Arc::new(TokenCache::new(config.clone()));
        let proxy = CloudProxy::new(config, tokens);

        proxy.publish_true("t", "p", "d").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn path_segments_are_percent_encoded() {
        let mut server = Server::new_async().await;
        let _token = token_mock(&mut server).await;
        let mock = server
            .mock("PUT", "/things/a%20b/properties/p/publish")
            .with_status(200)
            .create_async()
            .await;

        let proxy = proxy_for(&server);
        proxy.publish_true("a b", "p", "d").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn read_prefers_last_value_over_other_fields() {
        let mut server = Server::new_async().await;
        let _token = token_mock(&mut server).await;
        let _mock = server
            .mock("GET", "/things/t/properties/p")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_body(r#"{"last_value": "first", "value": "second", "value_updated_at": "2026-08-08T10:00:00Z"}"#)
            .create_async()
            .await;

        let proxy = proxy_for(&server);
        let snapshot = proxy.read_property("t", "p").await.unwrap();
        assert_eq!(snapshot.value_text(), "first");
        assert_eq!(
            snapshot.updated_at.as_deref(),
            Some("2026-08-08T10:00:00Z")
        );
    }

    #[tokio::test]
    async fn read_skips_null_candidates() {
        let mut server = Server::new_async().await;
        let _token = token_mock(&mut server).await;
        let _mock = server
            .mock("GET", "/things/t/properties/p")
            .with_status(200)
            .with_body(r#"{"last_value": null, "value": "fallback"}"#)
            .create_async()
            .await;

        let proxy = proxy_for(&server);
        let snapshot = proxy.read_property("t", "p").await.unwrap();
        assert_eq!(snapshot.value_text(), "fallback");
        assert_eq!(snapshot.updated_at, None);
    }

    #[tokio::test]
    async fn read_tolerates_plain_text_responses() {
        let mut server = Server::new_async().await;
        let _token = token_mock(&mut server).await;
        let _mock = server
            .mock("GET", "/things/t/properties/p")
            .with_status(200)
            .with_body("not json at all")
            .create_async()
            .await;

        let proxy = proxy_for(&server);
        let snapshot = proxy.read_property("t", "p").await.unwrap();
        assert_eq!(snapshot.value_text(), "not json at all");
        assert_eq!(snapshot.updated_at, None);
    }

    #[tokio::test]
    async fn read_failure_preserves_status_and_body() {
        let mut server = Server::new_async().await;
        let _token = token_mock(&mut server).await;
        let _mock = server
            .mock("GET", "/things/t/properties/p")
            .with_status(404)
            .with_body("no such property")
            .create_async()
            .await;

        let proxy = proxy_for(&server);
        match proxy.read_property("t", "p").await.unwrap_err() {
            ReadError::Status(status, body) => {
                assert_eq!(status.as_u16(), 404);
                assert_eq!(body, "no such property");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
