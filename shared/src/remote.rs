//! HTTP client for the remote backend.
//!
//! Speaks the query-param wire form (`?id=`), unwraps the
//! `{success, data}` envelope some deployments answer with, and maps
//! transport faults and rejections into the recoverable error classes the
//! repository falls back on. A missing record (404) is never an error here:
//! it comes back as `None` / `false`.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::errors::{Result, StoreError};
use crate::ResourceKind;

/// Per-operation budget; a slow remote is treated as an unavailable one.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(5);
/// Liveness probes answer fast or not at all.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Client bound to one API root (no trailing slash).
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: Client,
    api_root: String,
}

impl RemoteClient {
    /// Build a client for `api_root`.
    pub fn new(api_root: &str) -> Self {
        let http = Client::builder()
            .timeout(OPERATION_TIMEOUT)
            .build()
            .expect("http client with static configuration");
        RemoteClient {
            http,
            api_root: api_root.trim_end_matches('/').to_string(),
        }
    }

    /// Configured API root.
    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    /// Liveness probe against `/health`. Any failure means "down".
    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.api_root);
        match self.http.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(err) => {
                tracing::debug!(%err, "health probe failed");
                false
            }
        }
    }

    /// List a whole collection. Filters are applied by the caller, which
    /// caches the unfiltered list.
    pub async fn list(&self, kind: ResourceKind) -> Result<Vec<Value>> {
        let request = self.http.get(self.kind_url(kind));
        let value = self.expect_success(request).await?;
        match value {
            Value::Array(records) => Ok(records),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    /// Fetch one record by id; 404 means absent.
    pub async fn get_by_id(&self, kind: ResourceKind, id: &str) -> Result<Option<Value>> {
        let request = self.http.get(self.kind_url(kind)).query(&[("id", id)]);
        self.optional(request).await
    }

    /// Create a record; the populated record comes back.
    pub async fn create(&self, kind: ResourceKind, payload: &Value) -> Result<Value> {
        let request = self.http.post(self.kind_url(kind)).json(payload);
        self.expect_success(request).await
    }

    /// Shallow-merge update; 404 means absent.
    pub async fn update(&self, kind: ResourceKind, id: &str, patch: &Value) -> Result<Option<Value>> {
        let request = self
            .http
            .put(self.kind_url(kind))
            .query(&[("id", id)])
            .json(patch);
        self.optional(request).await
    }

    /// Delete by id; 404 means absent (`false`).
    pub async fn delete(&self, kind: ResourceKind, id: &str) -> Result<bool> {
        let request = self.http.delete(self.kind_url(kind)).query(&[("id", id)]);
        Ok(self.optional(request).await?.is_some())
    }

    /// Fetch the settings singleton.
    pub async fn settings(&self) -> Result<Value> {
        let request = self.http.get(format!("{}/settings", self.api_root));
        self.expect_success(request).await
    }

    /// Replace the settings singleton.
    pub async fn save_settings(&self, settings: &Value) -> Result<Value> {
        let request = self
            .http
            .put(format!("{}/settings", self.api_root))
            .json(settings);
        self.expect_success(request).await
    }

    /// Replace a whole collection (sync push).
    pub async fn replace_collection(&self, kind: ResourceKind, records: &[Value]) -> Result<()> {
        let request = self
            .http
            .post(format!("{}/batch", self.kind_url(kind)))
            .json(records);
        self.expect_success(request).await?;
        Ok(())
    }

    fn kind_url(&self, kind: ResourceKind) -> String {
        format!("{}/{}", self.api_root, kind.as_str())
    }

    /// Send, demand success, unwrap the envelope.
    async fn expect_success(&self, request: RequestBuilder) -> Result<Value> {
        let response = self.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.rejection(status, response).await);
        }
        let value: Value = response
            .json()
            .await
            .map_err(|err| StoreError::NetworkUnavailable(err.to_string()))?;
        Ok(unwrap_envelope(value))
    }

    /// Send; 404 maps to `None`, other failures behave like
    /// [`expect_success`](Self::expect_success).
    async fn optional(&self, request: RequestBuilder) -> Result<Option<Value>> {
        let response = self.send(request).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(self.rejection(status, response).await);
        }
        let value: Value = response
            .json()
            .await
            .map_err(|err| StoreError::NetworkUnavailable(err.to_string()))?;
        Ok(Some(unwrap_envelope(value)))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|err| StoreError::NetworkUnavailable(err.to_string()))
    }

    async fn rejection(&self, status: StatusCode, response: Response) -> StoreError {
        let message = response.text().await.unwrap_or_default();
        StoreError::RemoteRejected {
            status: status.as_u16(),
            message,
        }
    }
}

/// `{success, data}` envelopes collapse to their payload; anything else
/// passes through untouched.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") && map.contains_key("success") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_is_unwrapped() {
        let wrapped = json!({"success": true, "data": [{"id": "1"}]});
        assert_eq!(unwrap_envelope(wrapped), json!([{"id": "1"}]));
    }

    #[test]
    fn plain_payloads_pass_through() {
        let plain = json!([{"id": "1"}]);
        assert_eq!(unwrap_envelope(plain.clone()), plain);
        // An object with a data field but no envelope marker is a record.
        let record = json!({"data": "2025", "title": "年报"});
        assert_eq!(unwrap_envelope(record.clone()), record);
    }

    #[test]
    fn api_root_trailing_slash_is_normalized() {
        let client = RemoteClient::new("http://localhost:3001/api/");
        assert_eq!(client.api_root(), "http://localhost:3001/api");
        assert_eq!(
            client.kind_url(ResourceKind::Articles),
            "http://localhost:3001/api/articles"
        );
    }
}
