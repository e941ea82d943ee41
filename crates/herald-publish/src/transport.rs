use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{PublishError, Result};

/// HTTP seam between the publishers and a Graph-style platform API.
///
/// Every call is one blocking network round-trip. Paths are relative to the
/// transport's base URL (e.g. `"{page_id}/photos"`).
#[async_trait]
pub trait GraphTransport: Send + Sync {
    /// POST `params` as a JSON body and return the decoded response.
    async fn post(&self, path: &str, token: &str, params: &Value) -> Result<Value>;

    /// GET `path` asking only for the comma-separated `fields`.
    async fn get(&self, path: &str, token: &str, fields: &str) -> Result<Value>;
}

/// `reqwest`-backed [`GraphTransport`].
pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl GraphTransport for GraphClient {
    async fn post(&self, path: &str, token: &str, params: &Value) -> Result<Value> {
        debug!(%path, "graph POST");
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(params)
            .send()
            .await?;
        decode(resp).await
    }

    async fn get(&self, path: &str, token: &str, fields: &str) -> Result<Value> {
        debug!(%path, %fields, "graph GET");
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .query(&[("fields", fields)])
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status().as_u16();
    if !resp.status().is_success() {
        let text = resp.text().await.unwrap_or_default();
        warn!(status, body = %text, "graph API error");
        return Err(PublishError::Platform {
            status,
            message: platform_message(&text),
        });
    }
    resp.json()
        .await
        .map_err(|e| PublishError::UnexpectedResponse(e.to_string()))
}

/// Pull `error.message` out of a Graph error body, falling back to the raw text.
fn platform_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Extract the `id` every create/upload/publish call answers with.
pub fn response_id(resp: &Value) -> Result<String> {
    match resp.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(PublishError::UnexpectedResponse(format!(
            "missing id in {resp}"
        ))),
    }
}
