//! HTTP client for the pull/push/conflict-resolution endpoints.

use crate::error::{Result, SyncClientError};
use crate::types::{PullResponse, PushRequest, PushResponse, ResolveConflictRequest};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use sync_core::constants::NETWORK_TIMEOUT_SECS;
use tracing::debug;

#[derive(serde::Deserialize)]
struct ApiErrorBody {
    code: String,
    message: String,
}

pub struct SyncApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl SyncApiClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(NETWORK_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn headers(&self, token: &str, device_id: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| SyncClientError::Auth("invalid access token format".into()))?;
        headers.insert(AUTHORIZATION, auth_value);

        let device_value = HeaderValue::from_str(device_id)
            .map_err(|_| SyncClientError::Auth("invalid device id format".into()))?;
        headers.insert("x-device-id", device_value);

        Ok(headers)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), "sync API response");

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorBody>(&body) {
                return Err(SyncClientError::api(
                    status.as_u16(),
                    format!("{}: {}", error.code, error.message),
                ));
            }
            return Err(SyncClientError::api(status.as_u16(), body));
        }

        serde_json::from_str(&body)
            .map_err(|e| SyncClientError::api(status.as_u16(), format!("failed to parse response: {e}")))
    }

    /// `GET /api/sync/pull/?since=<ms>&limit=<n>`.
    pub async fn pull(
        &self,
        token: &str,
        device_id: &str,
        since_ms: i64,
        limit: i64,
    ) -> Result<PullResponse> {
        let url = format!(
            "{}/api/sync/pull/?since={}&limit={}",
            self.base_url, since_ms, limit
        );
        let response = self
            .client
            .get(&url)
            .headers(self.headers(token, device_id)?)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SyncClientError::Timeout(NETWORK_TIMEOUT_SECS)
                } else {
                    SyncClientError::Http(e)
                }
            })?;
        Self::parse_response(response).await
    }

    /// `POST /api/sync/push/`.
    pub async fn push(&self, token: &str, device_id: &str, request: &PushRequest) -> Result<PushResponse> {
        let url = format!("{}/api/sync/push/", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.headers(token, device_id)?)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SyncClientError::Timeout(NETWORK_TIMEOUT_SECS)
                } else {
                    SyncClientError::Http(e)
                }
            })?;
        Self::parse_response(response).await
    }

    /// `POST /api/sync/conflicts/<id>/resolve/`.
    pub async fn resolve_conflict(
        &self,
        token: &str,
        device_id: &str,
        conflict_id: sync_core::EntityId,
        request: &ResolveConflictRequest,
    ) -> Result<()> {
        let url = format!("{}/api/sync/conflicts/{}/resolve/", self.base_url, conflict_id);
        let response = self
            .client
            .post(&url)
            .headers(self.headers(token, device_id)?)
            .json(request)
            .send()
            .await?;
        Self::parse_response::<serde_json::Value>(response).await?;
        Ok(())
    }
}
