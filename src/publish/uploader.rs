//! Content-addressed storage client: uploads artifacts and resolves
//! previously-uploaded pieces by tag, the way the gateway this service talks
//! to expects (tag-filtered query, best-by-timestamp candidate selection,
//! `{gateway_url}/resolve/{piece_cid}` for retrieval).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::UploaderSettings;
use crate::retry::{with_retries, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum UploaderError {
    #[error("uploader rate limited")]
    RateLimited,
    #[error("uploader transport error: {0}")]
    Transport(String),
    #[error("uploader returned an error: {0}")]
    Api(String),
    #[error("uploader request timed out")]
    Timeout,
}

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, tags: Vec<(String, String)>) -> Result<String, UploaderError>;
    async fn resolve_by_tags(&self, tags: Vec<(String, String)>) -> Result<Option<String>, UploaderError>;
    fn gateway_url(&self, piece_cid: &str) -> String;
}

pub struct HttpUploader {
    client: reqwest::Client,
    settings: UploaderSettings,
    retry_policy: RetryPolicy,
}

impl HttpUploader {
    pub fn new(settings: UploaderSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build uploader http client");
        Self {
            client,
            settings,
            retry_policy: RetryPolicy::default(),
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn classify(status: reqwest::StatusCode) -> bool {
        status.as_u16() == 429
            || status.as_u16() == 502
            || status.as_u16() == 503
            || status.as_u16() == 504
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, bytes: Vec<u8>, tags: Vec<(String, String)>) -> Result<String, UploaderError> {
        let url = format!("{}/upload", self.settings.base_url);
        with_retries(&self.retry_policy, || {
            let url = url.clone();
            let bytes = bytes.clone();
            let tags: Vec<Value> = tags
                .iter()
                .map(|(k, v)| json!({"key": k, "value": v}))
                .collect();
            async move {
                let form = reqwest::multipart::Form::new()
                    .part("file", reqwest::multipart::Part::bytes(bytes))
                    .text("tags", serde_json::to_string(&tags).unwrap());
                let response = self
                    .authed(self.client.post(&url))
                    .multipart(form)
                    .send()
                    .await
                    .map_err(|e| classify_transport(e))?;
                let status = response.status();
                if status.is_success() {
                    let body: Value = response
                        .json()
                        .await
                        .map_err(|e| (false, UploaderError::Api(e.to_string())))?;
                    let piece_cid = body
                        .get("dataitem_id")
                        .or_else(|| body.get("piece_cid"))
                        .or_else(|| body.get("id"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| (false, UploaderError::Api("missing piece id in response".into())))?;
                    Ok(piece_cid)
                } else if status.as_u16() == 429 {
                    Err((true, UploaderError::RateLimited))
                } else {
                    let retryable = Self::classify(status);
                    Err((retryable, UploaderError::Api(format!("status {status}"))))
                }
            }
        })
        .await
    }

    async fn resolve_by_tags(&self, tags: Vec<(String, String)>) -> Result<Option<String>, UploaderError> {
        let url = format!("{}/tags/query", self.settings.base_url);
        let filters: Vec<Value> = tags
            .iter()
            .map(|(k, v)| json!({"key": k, "value": v}))
            .collect();
        let body = with_retries(&self.retry_policy, || {
            let url = url.clone();
            let filters = filters.clone();
            async move {
                let response = self
                    .authed(self.client.post(&url))
                    .json(&json!({"filters": filters, "first": 16, "include_tags": true}))
                    .send()
                    .await
                    .map_err(classify_transport)?;
                let status = response.status();
                if status.is_success() {
                    response
                        .json::<Value>()
                        .await
                        .map_err(|e| (false, UploaderError::Api(e.to_string())))
                } else {
                    Err((Self::classify(status), UploaderError::Api(format!("status {status}"))))
                }
            }
        })
        .await?;

        let items = body.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
        let mut first_candidate: Option<String> = None;
        let mut best: Option<(i64, String)> = None;
        for item in items {
            let id = item
                .get("dataitem_id")
                .or_else(|| item.get("id"))
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default();
            if id.is_empty() {
                continue;
            }
            if first_candidate.is_none() {
                first_candidate = Some(id.to_string());
            }
            if let Some(ts) = item
                .get("created_at")
                .or_else(|| item.get("createdAt"))
                .and_then(|v| v.as_i64())
            {
                if best.as_ref().map(|(best_ts, _)| ts > *best_ts).unwrap_or(true) {
                    best = Some((ts, id.to_string()));
                }
            }
        }
        Ok(best.map(|(_, id)| id).or(first_candidate))
    }

    fn gateway_url(&self, piece_cid: &str) -> String {
        format!("{}/resolve/{}", self.settings.gateway_url, piece_cid)
    }
}

fn classify_transport(e: reqwest::Error) -> (bool, UploaderError) {
    if e.is_timeout() {
        (true, UploaderError::Timeout)
    } else {
        (true, UploaderError::Transport(e.to_string()))
    }
}
