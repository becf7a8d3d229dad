//! HTTP handlers for the publish job state machine. Each handler is a thin
//! wrapper: validate input, ask the store for a conditional transition, call
//! out to the uploader/chain adapter, and persist the result.

use std::str::FromStr;

use alloy_primitives::{keccak256, Address, B256, U256};
use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, WithJob};
use crate::server::state::AppState;
use crate::user::extract_user_address;

use super::chain;
use super::ids::derive_track_and_content_id;
use super::model::{JobStatus, PublishType};
use super::policy::{run_preflight, PreflightOutcome};
use super::PublishError;

const ONE_DAY_SECS: i64 = 86_400;
const MAX_METADATA_FIELD_BYTES: usize = 128;

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

async fn require_job(state: &AppState, job_id: &str) -> Result<super::model::PublishJob, ApiError> {
    state
        .publish_store
        .get_job(job_id)?
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id} not found")))
}

fn parse_address(s: &str) -> Result<Address, PublishError> {
    Address::from_str(s).map_err(|_| PublishError::Validation(format!("{s} is not a valid EVM address")))
}

fn parse_b256(s: &str) -> Result<B256, PublishError> {
    B256::from_str(s).map_err(|_| PublishError::Validation(format!("{s} is not a 32-byte hex value")))
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, PublishError> {
    hex::decode(s.trim_start_matches("0x")).map_err(|_| PublishError::Validation(format!("{s} is not valid hex bytes")))
}

/// `max_minting_fee` must be a non-negative integer string, i.e. plain
/// decimal digits with no sign.
fn parse_nonneg_integer(s: &str) -> Result<U256, PublishError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PublishError::Validation(format!("{s} is not a non-negative integer string")));
    }
    U256::from_str(s).map_err(|_| PublishError::Validation(format!("{s} is not a valid integer")))
}

pub async fn start(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let user_address = extract_user_address(&headers)?;

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut content_type = "application/octet-stream".to_string();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                file_bytes = Some(field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?.to_vec());
            }
            "contentType" => {
                content_type = field.text().await.unwrap_or(content_type);
            }
            _ => {}
        }
    }
    let bytes = file_bytes.ok_or_else(|| ApiError::BadRequest("missing multipart field 'file'".into()))?;
    let audio_bytes = bytes.len() as u64;

    let job = state.publish_store.create_job(&user_address, "", "", "")?;

    let piece_cid = state
        .uploader
        .upload(
            bytes,
            vec![
                ("job_id".to_string(), job.job_id.clone()),
                ("content_type".to_string(), content_type),
                ("kind".to_string(), "audio".to_string()),
            ],
        )
        .await
        .map_err(PublishError::from)?;

    state
        .publish_store
        .stage_artifacts(&job.job_id, Some(&piece_cid), None, None, Some(audio_bytes))?;

    let job = require_job(&state, &job.job_id).await?;
    Ok(Json(json!({ "job": job.to_json() })))
}

pub async fn stage_artifacts(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let job = require_job(&state, &job_id).await?;
    if job.status != JobStatus::Staged {
        return Err(PublishError::Conflict(format!("job is {:?}, expected staged", job.status)).into());
    }

    let mut cover_cid: Option<String> = None;
    let mut lyrics_cid: Option<String> = None;
    let mut cover_content_type = "image/jpeg".to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "coverContentType" => cover_content_type = field.text().await.unwrap_or(cover_content_type),
            "cover" => {
                let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?.to_vec();
                let cid = state
                    .uploader
                    .upload(
                        bytes,
                        vec![
                            ("job_id".to_string(), job_id.clone()),
                            ("content_type".to_string(), cover_content_type.clone()),
                            ("kind".to_string(), "cover".to_string()),
                        ],
                    )
                    .await
                    .map_err(PublishError::from)?;
                cover_cid = Some(cid);
            }
            "lyricsText" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                let cid = state
                    .uploader
                    .upload(
                        text.into_bytes(),
                        vec![
                            ("job_id".to_string(), job_id.clone()),
                            ("content_type".to_string(), "text/plain".to_string()),
                            ("kind".to_string(), "lyrics".to_string()),
                        ],
                    )
                    .await
                    .map_err(PublishError::from)?;
                lyrics_cid = Some(cid);
            }
            _ => {}
        }
    }

    state
        .publish_store
        .stage_artifacts(&job_id, None, cover_cid.as_deref(), lyrics_cid.as_deref(), None)?;

    let job = require_job(&state, &job_id).await?;
    Ok(Json(json!({ "job": job.to_json() })))
}

#[derive(Debug, Deserialize)]
pub struct PreflightRequest {
    pub job_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(rename = "publishType", default)]
    pub publish_type: Option<String>,
    #[serde(rename = "parentIpIds", default)]
    pub parent_ip_ids: Option<Vec<String>>,
    #[serde(rename = "licenseTermsIds", default)]
    pub license_terms_ids: Option<Vec<String>>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(rename = "durationS", default)]
    pub duration_s: Option<f64>,
}

pub async fn preflight(
    State(state): State<AppState>,
    Json(req): Json<PreflightRequest>,
) -> Result<Json<Value>, WithJob> {
    run_preflight_handler(state, req).await
}

async fn run_preflight_handler(state: AppState, req: PreflightRequest) -> Result<Json<Value>, WithJob> {
    let mut job = require_job(&state, &req.job_id).await?;
    if job.status != JobStatus::Staged {
        return Err(PublishError::Conflict(format!("job is {:?}, expected staged", job.status)).into());
    }
    if !state.publish_store.transition(&job.job_id, &[JobStatus::Staged], JobStatus::Checking)? {
        return Err(PublishError::Conflict("lost the transition race to checking".into()).into());
    }

    if let Some(title) = &req.title {
        job.title = Some(title.clone());
    }
    if let Some(artist) = &req.artist {
        job.artist = Some(artist.clone());
    }
    if let Some(album) = &req.album {
        job.album = Some(album.clone());
    }
    state.publish_store.set_metadata(
        &job.job_id,
        job.title.as_deref().unwrap_or_default(),
        job.artist.as_deref().unwrap_or_default(),
        job.album.as_deref().unwrap_or_default(),
    )?;

    let publish_type = req.publish_type.as_deref().unwrap_or("original");
    if PublishType::parse(publish_type).is_none() {
        let _ = state.publish_store.transition(&job.job_id, &[JobStatus::Checking], JobStatus::Staged);
        return Err(PublishError::Validation(format!("unknown publish_type {publish_type}")).into());
    }
    state.publish_store.set_policy_input(
        &job.job_id,
        publish_type,
        req.parent_ip_ids.as_deref(),
        req.license_terms_ids.as_deref(),
    )?;
    job = require_job(&state, &job.job_id).await?;

    let since = now_unix() - ONE_DAY_SECS;
    let (jobs_in_window, bytes_in_window) = state.publish_store.usage_since(&job.user_address, since)?;
    let outcome = run_preflight(&job, &state.config.publish, jobs_in_window, bytes_in_window);

    let ok = state
        .publish_store
        .set_preflight_result(&job.job_id, outcome.next_status(), outcome.reason())?;
    if !ok {
        return Err(PublishError::Conflict("lost the preflight race".into()).into());
    }

    let job = require_job(&state, &job.job_id).await?;
    if matches!(outcome, PreflightOutcome::Rejected(_)) {
        return Err(PublishError::Gone(outcome.reason().unwrap_or("rejected").to_string()).with_job_err(job));
    }
    Ok(Json(json!({ "job": job.to_json() })))
}

pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<Value>, ApiError> {
    let job = require_job(&state, &job_id).await?;
    Ok(Json(json!({ "job": job.to_json() })))
}

pub async fn anchor(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<Value>, WithJob> {
    anchor_inner(state, job_id).await.map_err(to_with_job)
}

async fn anchor_inner(state: AppState, job_id: String) -> Result<Json<Value>, ApiError> {
    let job = require_job(&state, &job_id).await?;
    if job.status != JobStatus::PolicyPassed {
        return Err(PublishError::Conflict(format!("job is {:?}, expected policy_passed", job.status)).into());
    }
    let audio_piece_cid = job
        .audio_piece_cid
        .clone()
        .ok_or_else(|| PublishError::InvalidState("job has no staged audio artifact".into()))?;

    // The append-only store is keyed off the job, not the title/artist/album
    // metadata — that identity belongs to `finalize`'s track/content ids.
    let anchor_key = keccak256(job_id.as_bytes());

    if !state.publish_store.transition(&job_id, &[JobStatus::PolicyPassed], JobStatus::Anchoring)? {
        return Err(PublishError::Conflict("lost the transition race to anchoring".into()).into());
    }

    let receipt = match state.chain.anchor_content(anchor_key, &audio_piece_cid).await {
        Ok(r) => r,
        Err(e) => {
            let _ = state.publish_store.transition(&job_id, &[JobStatus::Anchoring], JobStatus::PolicyPassed);
            return Err(PublishError::from(e).into());
        }
    };

    let ok = state
        .publish_store
        .set_anchor_result(&job_id, &receipt.tx_hash, receipt.block_number)?;
    if !ok {
        return Err(PublishError::Conflict("lost the anchor-result race".into()).into());
    }

    let job = require_job(&state, &job_id).await?;
    Ok(Json(json!({ "job": job.to_json() })))
}

#[derive(Debug, Deserialize)]
pub struct MetadataRequest {
    #[serde(rename = "ipMetadataJson")]
    pub ip_metadata_json: Value,
    #[serde(rename = "nftMetadataJson")]
    pub nft_metadata_json: Value,
}

pub async fn metadata(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<MetadataRequest>,
) -> Result<Json<Value>, ApiError> {
    let job = require_job(&state, &job_id).await?;
    if job.status != JobStatus::Anchored {
        return Err(PublishError::Conflict(format!("job is {:?}, expected anchored", job.status)).into());
    }

    let (ip_result, nft_result) = tokio::join!(
        state.uploader.upload(
            serde_json::to_vec(&req.ip_metadata_json).unwrap_or_default(),
            vec![
                ("job_id".to_string(), job_id.clone()),
                ("content_type".to_string(), "application/json".to_string()),
                ("kind".to_string(), "ip_metadata".to_string()),
            ],
        ),
        state.uploader.upload(
            serde_json::to_vec(&req.nft_metadata_json).unwrap_or_default(),
            vec![
                ("job_id".to_string(), job_id.clone()),
                ("content_type".to_string(), "application/json".to_string()),
                ("kind".to_string(), "nft_metadata".to_string()),
            ],
        ),
    );

    let ip_metadata_cid = ip_result.map_err(PublishError::from)?;
    let nft_metadata_cid = nft_result.map_err(PublishError::from)?;

    let job = require_job(&state, &job_id).await?;
    Ok(Json(json!({
        "job": job.to_json(),
        "ipMetadataCid": ip_metadata_cid,
        "nftMetadataCid": nft_metadata_cid,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "ipMetadataUri", default)]
    pub ip_metadata_uri: String,
    #[serde(rename = "ipMetadataHash", default)]
    pub ip_metadata_hash: String,
    #[serde(rename = "nftMetadataUri", default)]
    pub nft_metadata_uri: String,
    #[serde(rename = "nftMetadataHash", default)]
    pub nft_metadata_hash: String,
    /// Accepted and validated for shape-compliance but not yet wired into
    /// the chain adapter's simplified ABI surface.
    #[serde(rename = "commercialRevShare", default)]
    pub commercial_rev_share: Option<u32>,
    #[serde(rename = "maxMintingFee", default)]
    pub max_minting_fee: Option<String>,
    #[serde(rename = "parentIpIds", default)]
    pub parent_ip_ids: Option<Vec<String>>,
    #[serde(rename = "licenseTermsIds", default)]
    pub license_terms_ids: Option<Vec<String>>,
    #[serde(rename = "licenseTemplate", default)]
    pub license_template: Option<String>,
    #[serde(rename = "royaltyContext", default)]
    pub royalty_context: Option<String>,
    #[serde(rename = "maxRts", default)]
    pub max_rts: Option<u32>,
    #[serde(rename = "maxRevenueShare", default)]
    pub max_revenue_share: Option<u32>,
    #[serde(rename = "allowDuplicates", default)]
    pub allow_duplicates: bool,
}

pub async fn register(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<Value>, WithJob> {
    register_inner(state, job_id, req).await.map_err(to_with_job)
}

async fn register_inner(state: AppState, job_id: String, req: RegisterRequest) -> Result<Json<Value>, ApiError> {
    let job = require_job(&state, &job_id).await?;
    if job.status != JobStatus::Anchored {
        return Err(PublishError::Conflict(format!("job is {:?}, expected anchored", job.status)).into());
    }

    let publish_type = PublishType::parse(&job.publish_type)
        .ok_or_else(|| PublishError::Internal(format!("job has unrecognized publish_type {}", job.publish_type)))?;
    let recipient = parse_address(&job.user_address)
        .map_err(|_| PublishError::Validation("job user_address is not a valid EVM address".into()))?;
    let ip_metadata_hash = parse_b256(&req.ip_metadata_hash)?;
    let nft_metadata_hash = parse_b256(&req.nft_metadata_hash)?;

    // Derivative workflow inputs are validated up front: failures here are
    // surfaced without mutating job state.
    let derivative_inputs = if publish_type.requires_parent_license() {
        let parent_strs = req.parent_ip_ids.clone().unwrap_or_default();
        let terms_strs = req.license_terms_ids.clone().unwrap_or_default();
        if parent_strs.is_empty() || parent_strs.len() != terms_strs.len() {
            return Err(PublishError::Validation(
                "parent_ip_ids and license_terms_ids must be non-empty and equal length".into(),
            )
            .into());
        }
        let parent_ip_ids = parent_strs
            .iter()
            .map(|s| parse_address(s))
            .collect::<Result<Vec<_>, _>>()?;
        let license_terms_ids = terms_strs
            .iter()
            .map(|s| parse_nonneg_integer(s))
            .collect::<Result<Vec<_>, _>>()?;
        let license_template = parse_address(req.license_template.as_deref().unwrap_or(""))?;
        let royalty_context = parse_hex_bytes(req.royalty_context.as_deref().unwrap_or("0x"))?;
        let max_minting_fee = parse_nonneg_integer(req.max_minting_fee.as_deref().unwrap_or("0"))?;
        let max_rts = req.max_rts.unwrap_or(0);
        let max_revenue_share = req.max_revenue_share.unwrap_or(0);
        Some((
            parent_ip_ids,
            license_terms_ids,
            license_template,
            royalty_context,
            max_minting_fee,
            max_rts,
            max_revenue_share,
        ))
    } else {
        None
    };

    if !state.publish_store.transition(&job_id, &[JobStatus::Anchored], JobStatus::Registering)? {
        return Err(PublishError::Conflict("lost the transition race to registering".into()).into());
    }

    let receipt = match &derivative_inputs {
        Some((parent_ip_ids, license_terms_ids, license_template, royalty_context, max_minting_fee, max_rts, max_revenue_share)) => {
            state
                .chain
                .mint_and_register_derivative_ip(
                    recipient,
                    &req.ip_metadata_uri,
                    ip_metadata_hash,
                    &req.nft_metadata_uri,
                    nft_metadata_hash,
                    parent_ip_ids,
                    license_terms_ids,
                    *license_template,
                    royalty_context,
                    *max_minting_fee,
                    *max_rts,
                    *max_revenue_share,
                    req.allow_duplicates,
                )
                .await
        }
        None => {
            state
                .chain
                .mint_and_register_ip(
                    recipient,
                    &req.ip_metadata_uri,
                    ip_metadata_hash,
                    &req.nft_metadata_uri,
                    nft_metadata_hash,
                    req.allow_duplicates,
                )
                .await
        }
    };
    let receipt = match receipt {
        Ok(r) => r,
        Err(e) => return Err(rollback_register(&state, &job_id, "register_chain_error", PublishError::from(e).into()).await),
    };

    let Some(token_id) = chain::extract_minted_token_id(&receipt.logs, state.chain.collection_address()) else {
        return Err(rollback_register(
            &state,
            &job_id,
            "mint_log_not_found",
            PublishError::Internal("mint transaction did not emit a recognizable Transfer log".into()).into(),
        )
        .await);
    };

    let ip_id = match state.chain.resolve_ip_id(token_id).await {
        Ok(id) => id,
        Err(e) => return Err(rollback_register(&state, &job_id, "ip_id_resolve_failed", PublishError::from(e).into()).await),
    };
    let license_terms_ids = match state.chain.attached_license_terms(ip_id).await {
        Ok(ids) => ids,
        Err(e) => return Err(rollback_register(&state, &job_id, "license_terms_lookup_failed", PublishError::from(e).into()).await),
    };

    let story_ip_id = ip_id.to_string();
    let story_token_id = token_id.to_string();
    let story_license_terms_ids: Vec<String> = license_terms_ids.iter().map(ToString::to_string).collect();

    let ok = state.publish_store.set_register_result(
        &job_id,
        &receipt.tx_hash,
        receipt.block_number,
        &story_ip_id,
        &story_token_id,
        &story_license_terms_ids,
    )?;
    if !ok {
        return Err(PublishError::Conflict("lost the register-result race".into()).into());
    }
    if !state.publish_store.transition(&job_id, &[JobStatus::Registering], JobStatus::Registered)? {
        return Err(PublishError::Conflict("lost the transition race to registered".into()).into());
    }

    let job = require_job(&state, &job_id).await?;
    Ok(Json(json!({ "job": job.to_json() })))
}

async fn rollback_register(state: &AppState, job_id: &str, code: &str, err: ApiError) -> ApiError {
    let _ = state.publish_store.transition(job_id, &[JobStatus::Registering], JobStatus::Anchored);
    let _ = state.publish_store.set_error(job_id, code, &err.to_string());
    err
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(rename = "durationS", default)]
    pub duration_s: Option<f64>,
    #[serde(rename = "pieceCid", default)]
    pub piece_cid: Option<String>,
    #[serde(rename = "datasetOwner", default)]
    pub dataset_owner: Option<String>,
    #[serde(default = "default_algo")]
    pub algo: u8,
}

fn default_algo() -> u8 {
    1
}

pub async fn finalize(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<FinalizeRequest>,
) -> Result<Json<Value>, WithJob> {
    finalize_inner(state, job_id, req).await.map_err(to_with_job)
}

async fn finalize_inner(state: AppState, job_id: String, req: FinalizeRequest) -> Result<Json<Value>, ApiError> {
    let job = require_job(&state, &job_id).await?;

    if job.status == JobStatus::Registered && job.finalize_tx_hash.is_some() {
        return Ok(Json(json!({
            "job": job.to_json(),
            "trackRegistered": false,
            "contentRegistered": false,
        })));
    }

    const ALLOWED: &[JobStatus] = &[JobStatus::PolicyPassed, JobStatus::Anchored, JobStatus::Registered];
    if !ALLOWED.contains(&job.status) {
        return Err(PublishError::Conflict(format!(
            "job is {:?}, expected one of policy_passed, anchored, registered",
            job.status
        ))
        .into());
    }

    if req.title.len() > MAX_METADATA_FIELD_BYTES
        || req.artist.len() > MAX_METADATA_FIELD_BYTES
        || req.album.as_deref().map(str::len).unwrap_or(0) > MAX_METADATA_FIELD_BYTES
    {
        return Err(PublishError::Validation("title/artist/album must each be at most 128 bytes".into()).into());
    }
    if req.piece_cid.as_deref().map(str::len).unwrap_or(0) > MAX_METADATA_FIELD_BYTES {
        return Err(PublishError::Validation("piece_cid must be at most 128 bytes".into()).into());
    }
    if req.algo == 0 {
        return Err(PublishError::Validation("algo must be in [1,255]".into()).into());
    }

    let owner = match req.dataset_owner.as_deref() {
        Some(addr) => parse_address(addr)?,
        None => parse_address(&job.user_address)
            .map_err(|_| PublishError::Validation("job user_address is not a valid EVM address".into()))?,
    };

    let (track_id, content_id) = derive_track_and_content_id(
        &req.title,
        &req.artist,
        req.album.as_deref().unwrap_or(""),
        owner,
    );

    let prior_status = job.status;
    if !state.publish_store.transition(&job_id, &[prior_status], JobStatus::Registering)? {
        return Err(PublishError::Conflict("lost the transition race to registering".into()).into());
    }
    state.publish_store.set_finalize_ids(
        &job_id,
        &super::ids::to_hex_prefixed(track_id.as_slice()),
        &super::ids::to_hex_prefixed(content_id.as_slice()),
    )?;

    let track_outcome = chain::ensure_onchain(
        || state.chain.is_track_registered(track_id),
        || state.chain.register_track(track_id, owner),
    )
    .await;
    let track_registered = match track_outcome {
        Ok(outcome) => outcome.is_some(),
        Err(e) => {
            return Err(rollback_finalize(&state, &job_id, prior_status, "track_register_failed", PublishError::from(e).into()).await)
        }
    };

    if let Some(cover_ref) = req.piece_cid.as_deref() {
        if let Err(e) = state.chain.set_track_cover(track_id, cover_ref).await {
            tracing::warn!(job_id = %job_id, error = %e, "non-fatal: failed to set track cover during finalize");
        }
    }

    let content_outcome = chain::ensure_onchain(
        || state.chain.is_content_active(content_id),
        || state.chain.register_content_for(content_id, track_id, owner),
    )
    .await;
    let (content_registered, finalize_tx_hash) = match content_outcome {
        Ok(Some(receipt)) => (true, Some(receipt.tx_hash)),
        Ok(None) => (false, None),
        Err(e) => {
            return Err(rollback_finalize(&state, &job_id, prior_status, "content_register_failed", PublishError::from(e).into()).await)
        }
    };

    state.publish_store.set_finalize_result(&job_id, finalize_tx_hash.as_deref())?;
    let ok = state.publish_store.transition(&job_id, &[JobStatus::Registering], JobStatus::Registered)?;
    if !ok {
        return Err(PublishError::Conflict("lost the finalize-result race".into()).into());
    }

    let job = require_job(&state, &job_id).await?;
    Ok(Json(json!({
        "job": job.to_json(),
        "trackRegistered": track_registered,
        "contentRegistered": content_registered,
    })))
}

async fn rollback_finalize(
    state: &AppState,
    job_id: &str,
    prior_status: JobStatus,
    code: &str,
    err: ApiError,
) -> ApiError {
    let _ = state.publish_store.transition(job_id, &[JobStatus::Registering], prior_status);
    let _ = state.publish_store.set_error(job_id, code, &err.to_string());
    err
}

fn to_with_job(err: ApiError) -> WithJob {
    err.with_job(Value::Null)
}

impl PublishError {
    fn with_job_err(self, job: super::model::PublishJob) -> WithJob {
        let api: ApiError = self.into();
        api.with_job(job.to_json())
    }
}
