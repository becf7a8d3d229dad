//! Cascaded track identity resolution: embedded MBID, ISRC lookup, acoustic
//! fingerprint, and (feature-flagged) text search, each layered with caching
//! and retry/backoff and contributing to a `provenance` ledger.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ResolverSettings;
use crate::retry::{with_retries, RetryPolicy};

use super::cache::ResolverCache;
use super::normalize;

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("invalid resolver input: {0}")]
    Validation(String),
    #[error("resolver upstream error: {0}")]
    Upstream(String),
    #[error("resolver internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ResolverError {
    fn from(e: anyhow::Error) -> Self {
        ResolverError::Internal(e.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveInput {
    pub mbid: Option<String>,
    pub isrc: Option<String>,
    pub fingerprint: Option<String>,
    pub duration_s: Option<f64>,
    pub client_key: Option<String>,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResult {
    pub mbid: Option<String>,
    pub track_key: String,
    pub confidence: f64,
    pub provenance: Vec<String>,
}

pub struct TrackResolver {
    client: reqwest::Client,
    settings: ResolverSettings,
    cache: Arc<ResolverCache>,
    retry_policy: RetryPolicy,
}

impl TrackResolver {
    pub fn new(settings: ResolverSettings, cache: Arc<ResolverCache>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("cadence-control-plane/0.1 (+track-resolver)")
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build resolver http client"),
            settings,
            cache,
            retry_policy: RetryPolicy {
                max_retries: 2,
                initial_backoff_ms: 500,
                max_backoff_ms: 4_000,
                backoff_multiplier: 2.0,
            },
        }
    }

    pub async fn resolve(&self, input: &ResolveInput) -> Result<ResolveResult, ResolverError> {
        if input.title.trim().is_empty() || input.artist.trim().is_empty() {
            return Err(ResolverError::Validation("title and artist are required".into()));
        }

        let track_key = normalize::track_key(
            &input.title,
            &input.artist,
            input.album.as_deref(),
            input.duration_s,
        );
        let mut provenance = Vec::new();
        let now = now_unix();

        if let Some(mbid) = input.mbid.as_deref().filter(|m| normalize::is_valid_mbid(m)) {
            provenance.push("mbid_present".to_string());
            if let Some(result) = self.try_embedded_mbid(mbid, &track_key, &mut provenance, now).await? {
                return Ok(result);
            }
        }

        if let Some(isrc) = input.isrc.as_deref().and_then(normalize::normalize_isrc) {
            provenance.push("isrc_present".to_string());
            if let Some(result) = self.try_isrc(&isrc, input, &track_key, &mut provenance).await? {
                return Ok(result);
            }
        }

        if let (Some(fingerprint), Some(duration), Some(client_key)) =
            (&input.fingerprint, input.duration_s, &input.client_key)
        {
            provenance.push("fingerprint_present".to_string());
            if let Some(result) = self
                .try_fingerprint(fingerprint, duration, client_key, &track_key, &mut provenance)
                .await?
            {
                return Ok(result);
            }
        }

        if self.settings.text_search_enabled {
            if let Some(result) = self.try_text_search(input, &track_key, &mut provenance, now).await? {
                return Ok(result);
            }
        }

        provenance.push("unresolved".to_string());
        Ok(ResolveResult {
            mbid: None,
            track_key,
            confidence: 0.0,
            provenance,
        })
    }

    async fn try_embedded_mbid(
        &self,
        mbid: &str,
        track_key: &str,
        provenance: &mut Vec<String>,
        now: i64,
    ) -> Result<Option<ResolveResult>, ResolverError> {
        let cache_key = format!("mbid:{mbid}");
        if let Some(verified) = self.cache.get::<bool>(&cache_key, now) {
            if verified {
                provenance.push("mbid_verified_cached".to_string());
                return Ok(Some(ResolveResult {
                    mbid: Some(mbid.to_string()),
                    track_key: track_key.to_string(),
                    confidence: 0.98,
                    provenance: provenance.clone(),
                }));
            }
            provenance.push("mbid_negative_cached".to_string());
            return Ok(None);
        }

        let url = format!("{}/recording/{mbid}?fmt=json", self.settings.musicbrainz_base_url);
        match self.get_with_retry(&url, "musicbrainz").await? {
            Some(_) => {
                let _ = self.cache.set(&cache_key, &true, now + 30 * 86_400);
                provenance.push("mbid_verified".to_string());
                Ok(Some(ResolveResult {
                    mbid: Some(mbid.to_string()),
                    track_key: track_key.to_string(),
                    confidence: 0.98,
                    provenance: provenance.clone(),
                }))
            }
            None => {
                let _ = self.cache.set(&cache_key, &false, now + 7 * 86_400);
                provenance.push("mbid_not_found".to_string());
                Ok(None)
            }
        }
    }

    async fn try_isrc(
        &self,
        isrc: &str,
        input: &ResolveInput,
        track_key: &str,
        provenance: &mut Vec<String>,
    ) -> Result<Option<ResolveResult>, ResolverError> {
        let url = format!(
            "{}/isrc/{isrc}?inc=recordings+artist-credits&fmt=json",
            self.settings.musicbrainz_base_url
        );
        let Some(body) = self.get_with_retry(&url, "musicbrainz").await? else {
            provenance.push("isrc_not_found".to_string());
            return Ok(None);
        };
        match best_recording_candidate(&body, input) {
            Some((mbid, score)) if score >= 0.72 => {
                let confidence = (0.70 + 0.30 * score).min(0.92);
                provenance.push("isrc_matched".to_string());
                Ok(Some(ResolveResult {
                    mbid: Some(mbid),
                    track_key: track_key.to_string(),
                    confidence,
                    provenance: provenance.clone(),
                }))
            }
            _ => {
                provenance.push("isrc_no_match".to_string());
                Ok(None)
            }
        }
    }

    async fn try_fingerprint(
        &self,
        fingerprint: &str,
        duration_s: f64,
        client_key: &str,
        track_key: &str,
        provenance: &mut Vec<String>,
    ) -> Result<Option<ResolveResult>, ResolverError> {
        let url = format!("{}/lookup", self.settings.acoustid_base_url);
        let body = with_retries(&self.retry_policy, || {
            let url = url.clone();
            async move {
                let response = self
                    .client
                    .post(&url)
                    .form(&[
                        ("client", client_key.to_string()),
                        ("duration", (duration_s.round() as i64).to_string()),
                        ("fingerprint", fingerprint.to_string()),
                        ("meta", "recordingids+recordings".to_string()),
                    ])
                    .send()
                    .await
                    .map_err(|e| (true, ResolverError::Upstream(e.to_string())))?;
                classify_response(response).await
            }
        })
        .await?;

        let Some(body) = body else {
            provenance.push("fingerprint_no_match".to_string());
            return Ok(None);
        };

        let results = body.get("results").and_then(Value::as_array).cloned().unwrap_or_default();
        let best = results
            .iter()
            .filter_map(|r| {
                let score = r.get("score").and_then(Value::as_f64)?;
                let mbid = r
                    .get("recordings")
                    .and_then(Value::as_array)
                    .and_then(|recs| recs.first())
                    .and_then(|rec| rec.get("id"))
                    .and_then(Value::as_str)
                    .filter(|m| normalize::is_valid_mbid(m))?;
                Some((mbid.to_string(), score))
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        match best {
            Some((mbid, score)) if score >= 0.80 => {
                let confidence = (0.75 + 0.25 * score).min(0.95);
                provenance.push("fingerprint_matched".to_string());
                Ok(Some(ResolveResult {
                    mbid: Some(mbid),
                    track_key: track_key.to_string(),
                    confidence,
                    provenance: provenance.clone(),
                }))
            }
            _ => {
                provenance.push("fingerprint_no_match".to_string());
                Ok(None)
            }
        }
    }

    async fn try_text_search(
        &self,
        input: &ResolveInput,
        track_key: &str,
        provenance: &mut Vec<String>,
        now: i64,
    ) -> Result<Option<ResolveResult>, ResolverError> {
        let cache_key = format!("text:{track_key}");
        if let Some(cached) = self.cache.get::<Option<ResolveResult>>(&cache_key, now) {
            provenance.push("text_search_cached".to_string());
            return Ok(cached);
        }

        let query = format!(
            "recording:\"{}\" AND artist:\"{}\"",
            input.title.replace('"', ""),
            input.artist.replace('"', "")
        );
        let url = format!(
            "{}/recording?query={}&fmt=json",
            self.settings.musicbrainz_base_url,
            urlencoding::encode(&query)
        );
        let Some(body) = self.get_with_retry(&url, "musicbrainz").await? else {
            provenance.push("text_search_no_match".to_string());
            let _ = self.cache.set(&cache_key, &Option::<ResolveResult>::None, now + self.settings.cache_ttl.as_secs() as i64);
            return Ok(None);
        };

        let result = match best_recording_candidate(&body, input) {
            Some((mbid, score)) if score >= 0.78 => {
                let confidence = 0.60 + 0.25 * score;
                provenance.push("text_search_matched".to_string());
                Some(ResolveResult {
                    mbid: Some(mbid),
                    track_key: track_key.to_string(),
                    confidence,
                    provenance: provenance.clone(),
                })
            }
            _ => {
                provenance.push("text_search_no_match".to_string());
                None
            }
        };
        let _ = self.cache.set(&cache_key, &result, now + self.settings.cache_ttl.as_secs() as i64);
        Ok(result)
    }

    /// GET with up to 2 retries on 5xx/503, exponential backoff from 500ms.
    /// Returns `Ok(None)` on 404 (a clean "not found", not an error).
    async fn get_with_retry(&self, url: &str, _client_name: &str) -> Result<Option<Value>, ResolverError> {
        with_retries(&self.retry_policy, || {
            let url = url.to_string();
            async move {
                let response = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| (true, ResolverError::Upstream(e.to_string())))?;
                classify_response(response).await
            }
        })
        .await
    }
}

async fn classify_response(response: reqwest::Response) -> Result<Option<Value>, (bool, ResolverError)> {
    let status = response.status();
    if status.as_u16() == 404 {
        return Ok(None);
    }
    if status.as_u16() == 503 || status.is_server_error() {
        return Err((true, ResolverError::Upstream(format!("status {status}"))));
    }
    if !status.is_success() {
        return Err((false, ResolverError::Upstream(format!("status {status}"))));
    }
    let body: Value = response
        .json()
        .await
        .map_err(|e| (false, ResolverError::Upstream(e.to_string())))?;
    Ok(Some(body))
}

fn best_recording_candidate(body: &Value, input: &ResolveInput) -> Option<(String, f64)> {
    let recordings = body
        .get("recordings")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    recordings
        .iter()
        .filter_map(|rec| {
            let id = rec.get("id").and_then(Value::as_str)?;
            let title = rec.get("title").and_then(Value::as_str).unwrap_or_default();
            let artist = rec
                .get("artist-credit")
                .and_then(Value::as_array)
                .and_then(|credits| credits.first())
                .and_then(|c| c.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let length_ms = rec.get("length").and_then(Value::as_f64);

            let title_sim = normalize::similarity(title, &input.title);
            let artist_sim = normalize::similarity(artist, &input.artist);
            let duration_score = match (length_ms, input.duration_s) {
                (Some(ms), Some(expected)) => normalize::duration_score(ms / 1000.0 - expected),
                _ => 0.5,
            };
            let score = 0.5 * title_sim + 0.35 * artist_sim + 0.15 * duration_score;
            Some((id.to_string(), score))
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_recording_candidate_prefers_closer_match() {
        let body = serde_json::json!({
            "recordings": [
                {"id": "123e4567-e89b-12d3-a456-426614174000", "title": "Totally Different", "artist-credit": [{"name": "Nobody"}]},
                {"id": "223e4567-e89b-12d3-a456-426614174000", "title": "Our Song", "artist-credit": [{"name": "The Band"}], "length": 200000.0}
            ]
        });
        let input = ResolveInput {
            title: "Our Song".into(),
            artist: "The Band".into(),
            duration_s: Some(200.0),
            ..Default::default()
        };
        let (id, score) = best_recording_candidate(&body, &input).unwrap();
        assert_eq!(id, "223e4567-e89b-12d3-a456-426614174000");
        assert!(score > 0.9);
    }
}
