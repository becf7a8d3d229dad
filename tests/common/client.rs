use reqwest::StatusCode;
use serde_json::{json, Value};

use super::constants::TEST_USER_ADDRESS;

/// Thin `reqwest` wrapper with one method per publish-pipeline endpoint.
/// Every call returns the response status alongside the parsed body so
/// tests can assert on error paths without a separate "expect failure" API.
pub struct TestClient {
    client: reqwest::Client,
    base_url: String,
}

impl TestClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }

    async fn json_body(resp: reqwest::Response) -> (StatusCode, Value) {
        let status = resp.status();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn start_job(&self, audio_bytes: &[u8]) -> (StatusCode, Value) {
        let part = reqwest::multipart::Part::bytes(audio_bytes.to_vec())
            .file_name("track.mp3")
            .mime_str("audio/mpeg")
            .unwrap();
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .client
            .post(format!("{}/publish/start", self.base_url))
            .header("x-user-address", TEST_USER_ADDRESS)
            .multipart(form)
            .send()
            .await
            .unwrap();
        Self::json_body(resp).await
    }

    pub async fn preflight(&self, body: &Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}/preflight", self.base_url))
            .json(body)
            .send()
            .await
            .unwrap();
        Self::json_body(resp).await
    }

    pub async fn anchor(&self, job_id: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}/publish/{job_id}/anchor", self.base_url))
            .send()
            .await
            .unwrap();
        Self::json_body(resp).await
    }

    pub async fn metadata(&self, job_id: &str) -> (StatusCode, Value) {
        let body = json!({ "ipMetadataJson": { "name": "t" }, "nftMetadataJson": { "name": "t" } });
        let resp = self
            .client
            .post(format!("{}/publish/{job_id}/metadata", self.base_url))
            .json(&body)
            .send()
            .await
            .unwrap();
        Self::json_body(resp).await
    }

    pub async fn register(&self, job_id: &str, body: &Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}/publish/{job_id}/register", self.base_url))
            .json(body)
            .send()
            .await
            .unwrap();
        Self::json_body(resp).await
    }

    pub async fn finalize(&self, job_id: &str, body: &Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}/publish/{job_id}/finalize", self.base_url))
            .json(body)
            .send()
            .await
            .unwrap();
        Self::json_body(resp).await
    }

    pub async fn get_job(&self, job_id: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(format!("{}/publish/{job_id}", self.base_url))
            .send()
            .await
            .unwrap();
        Self::json_body(resp).await
    }
}
