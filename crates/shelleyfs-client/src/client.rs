//! The backend client interface and its HTTP implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::RetryTransientMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use tracing::{debug, warn};

use crate::cache::{CacheKey, ResponseCache};
use crate::error::BackendError;
use crate::wire::NewConversation;

/// The operation set the core depends on, each mapping roughly 1:1 to a
/// backend HTTP call. `get_conversation`, `list_conversations`, and
/// `list_models` return raw response bytes so they can flow through the
/// shared response cache; callers parse them with the functions in
/// [`crate::wire`] or [`shelleyfs_common`].
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn list_conversations(&self) -> Result<Arc<Vec<u8>>, BackendError>;
    async fn get_conversation(&self, shelley_id: &str) -> Result<Arc<Vec<u8>>, BackendError>;
    async fn list_models(&self) -> Result<Arc<Vec<u8>>, BackendError>;
    async fn start_conversation(
        &self,
        first_message: &str,
        model_id: &str,
        cwd: &str,
    ) -> Result<NewConversation, BackendError>;
    async fn send_message(&self, shelley_id: &str, text: &str, cwd: &str)
    -> Result<(), BackendError>;
    async fn cancel(&self, shelley_id: &str) -> Result<(), BackendError>;
    async fn continue_conversation(&self, shelley_id: &str) -> Result<String, BackendError>;
    async fn delete_conversation(&self, shelley_id: &str) -> Result<(), BackendError>;
    async fn working(&self, shelley_id: &str) -> Result<bool, BackendError>;
}

/// HTTP-backed [`BackendClient`], wrapping the response cache (L0) around
/// the three cacheable read operations.
pub struct HttpBackendClient {
    client: ClientWithMiddleware,
    base_url: String,
    cache: ResponseCache,
}

impl std::fmt::Debug for HttpBackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackendClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpBackendClient {
    /// Builds a client against `base_url`, caching reads for `cache_ttl` and
    /// bounding every call to `call_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] if the underlying `reqwest` client
    /// cannot be constructed.
    pub fn new(
        base_url: impl Into<String>,
        cache_ttl: Duration,
        call_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let reqwest_client = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = reqwest_middleware::ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: base_url.into(),
            cache: ResponseCache::new(cache_ttl),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::check_status(&response)?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    fn check_status(response: &reqwest::Response) -> Result<(), BackendError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound);
        }
        if status.is_server_error() {
            return Err(BackendError::Server {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("server error")
                    .to_string(),
            });
        }
        if !status.is_success() {
            return Err(BackendError::Server {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("error").to_string(),
            });
        }
        Ok(())
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Vec<u8>, BackendError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::NOT_FOUND || !status.is_success()
        {
            let text = response.text().await.unwrap_or_default();
            warn!(%status, "backend call failed: {text}");
            return Err(if status == reqwest::StatusCode::NOT_FOUND {
                BackendError::NotFound
            } else {
                BackendError::Server {
                    status: status.as_u16(),
                    message: text,
                }
            });
        }
        let bytes = response.bytes().await?;
        debug!(path, len = bytes.len(), "backend call succeeded");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn list_conversations(&self) -> Result<Arc<Vec<u8>>, BackendError> {
        self.cache
            .get_or_fetch(CacheKey::ConversationList, || {
                self.fetch_bytes("/conversations")
            })
            .await
    }

    async fn get_conversation(&self, shelley_id: &str) -> Result<Arc<Vec<u8>>, BackendError> {
        let path = format!("/conversations/{shelley_id}");
        self.cache
            .get_or_fetch(CacheKey::Conversation(shelley_id.to_string()), || {
                self.fetch_bytes(&path)
            })
            .await
    }

    async fn list_models(&self) -> Result<Arc<Vec<u8>>, BackendError> {
        self.cache
            .get_or_fetch(CacheKey::ModelList, || self.fetch_bytes("/models"))
            .await
    }

    async fn start_conversation(
        &self,
        first_message: &str,
        model_id: &str,
        cwd: &str,
    ) -> Result<NewConversation, BackendError> {
        let body = serde_json::json!({
            "message": first_message,
            "model_id": model_id,
            "cwd": cwd,
        });
        let bytes = self.post_json("/conversations", &body).await?;
        self.cache.invalidate(&CacheKey::ConversationList);
        let parsed: NewConversation = serde_json::from_slice(&bytes)?;
        Ok(parsed)
    }

    async fn send_message(
        &self,
        shelley_id: &str,
        text: &str,
        cwd: &str,
    ) -> Result<(), BackendError> {
        let body = serde_json::json!({ "text": text, "cwd": cwd });
        self.post_json(&format!("/conversations/{shelley_id}/messages"), &body)
            .await?;
        self.cache
            .invalidate(&CacheKey::Conversation(shelley_id.to_string()));
        Ok(())
    }

    async fn cancel(&self, shelley_id: &str) -> Result<(), BackendError> {
        self.post_json(
            &format!("/conversations/{shelley_id}/cancel"),
            &serde_json::Value::Null,
        )
        .await?;
        self.cache
            .invalidate(&CacheKey::Conversation(shelley_id.to_string()));
        Ok(())
    }

    async fn continue_conversation(&self, shelley_id: &str) -> Result<String, BackendError> {
        let bytes = self
            .post_json(
                &format!("/conversations/{shelley_id}/continue"),
                &serde_json::Value::Null,
            )
            .await?;
        self.cache.invalidate(&CacheKey::ConversationList);
        crate::wire::parse_continue_response(&bytes).map_err(BackendError::Serialization)
    }

    async fn delete_conversation(&self, shelley_id: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .delete(self.url(&format!("/conversations/{shelley_id}")))
            .send()
            .await?;
        Self::check_status(&response)?;
        self.cache
            .invalidate(&CacheKey::Conversation(shelley_id.to_string()));
        self.cache.invalidate(&CacheKey::ConversationList);
        Ok(())
    }

    async fn working(&self, shelley_id: &str) -> Result<bool, BackendError> {
        let bytes = self
            .fetch_bytes(&format!("/conversations/{shelley_id}/working"))
            .await?;
        crate::wire::parse_working_response(&bytes).map_err(BackendError::Serialization)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(base_url: &str) -> HttpBackendClient {
        HttpBackendClient::new(base_url, Duration::from_secs(60), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn list_conversations_caches_byte_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                br#"{"conversations": []}"#.to_vec(),
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let first = client.list_conversations().await.unwrap();
        let second = client.list_conversations().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn get_conversation_not_found_maps_to_not_found_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let err = client.get_conversation("missing").await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound));
    }

    #[tokio::test]
    async fn send_message_invalidates_conversation_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations/c1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                br#"{"messages": []}"#.to_vec(),
                "application/json",
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/conversations/c1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"{}".to_vec(), "application/json"))
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let before = client.get_conversation("c1").await.unwrap();
        client.send_message("c1", "hi", "/tmp").await.unwrap();
        let after = client.get_conversation("c1").await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
