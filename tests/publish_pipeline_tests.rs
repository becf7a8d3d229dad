//! Integration tests for the music publish pipeline, exercised end to end
//! over real HTTP against an in-process server backed by fake chain/uploader
//! adapters.

mod common;

use std::sync::Arc;

use common::{
    FakeChain, TestClient, TestServer, IP_METADATA_HASH, LICENSE_TEMPLATE, LICENSE_TERMS_ID,
    NFT_METADATA_HASH, PARENT_IP_ID, SAMPLE_AUDIO_BYTES,
};
use reqwest::StatusCode;
use serde_json::json;

fn job_id(body: &serde_json::Value) -> String {
    body["job"]["jobId"].as_str().unwrap().to_string()
}

/// Drives an `original` publish from `start` through `register`, leaving the
/// job `registered` with no finalize transaction yet — the shared setup for
/// the happy-path and finalize-idempotence scenarios.
async fn publish_through_register(client: &TestClient) -> String {
    let (status, body) = client.start_job(SAMPLE_AUDIO_BYTES).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = job_id(&body);
    assert_eq!(body["job"]["status"], "staged");

    let (status, body) = client
        .preflight(&json!({
            "job_id": job_id,
            "title": "Song Title",
            "artist": "The Artist",
            "album": "The Album",
            "publishType": "original",
        }))
        .await;
    assert_eq!(status, StatusCode::OK, "preflight failed: {body}");
    assert_eq!(body["job"]["status"], "policy_passed");

    let (status, body) = client.anchor(&job_id).await;
    assert_eq!(status, StatusCode::OK, "anchor failed: {body}");
    assert_eq!(body["job"]["status"], "anchored");
    assert!(body["job"]["anchorTxHash"].is_string());

    let (status, _) = client.metadata(&job_id).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = client
        .register(
            &job_id,
            &json!({
                "ipMetadataUri": "ipfs://ip-meta",
                "ipMetadataHash": IP_METADATA_HASH,
                "nftMetadataUri": "ipfs://nft-meta",
                "nftMetadataHash": NFT_METADATA_HASH,
                "allowDuplicates": false,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "register failed: {body}");
    assert_eq!(body["job"]["status"], "registered");
    assert!(body["job"]["storyIpId"].as_str().unwrap_or_default().starts_with("0x"));
    assert!(body["job"]["storyTokenId"].is_string());
    assert!(body["job"]["storyLicenseTermsIds"].as_array().is_some());
    assert!(body["job"]["finalizeTxHash"].is_null());

    job_id
}

#[tokio::test]
async fn happy_path_publish_reaches_registered_with_story_registration() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let job_id = publish_through_register(&client).await;

    let (status, body) = client
        .finalize(
            &job_id,
            &json!({
                "title": "Song Title",
                "artist": "The Artist",
                "album": "The Album",
                "pieceCid": "bafy-cover",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "finalize failed: {body}");
    assert_eq!(body["job"]["status"], "registered");
    assert_eq!(body["trackRegistered"], true);
    assert_eq!(body["contentRegistered"], true);
    assert!(body["job"]["finalizeTxHash"].is_string());
    assert!(body["job"]["trackId"].as_str().unwrap_or_default().starts_with("0x"));
    assert!(body["job"]["contentId"].as_str().unwrap_or_default().starts_with("0x"));

    let (status, get_body) = client.get_job(&job_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(get_body["job"]["finalizeTxHash"], body["job"]["finalizeTxHash"]);
}

#[tokio::test]
async fn concurrent_anchor_calls_one_wins_one_conflicts() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let (status, body) = client.start_job(SAMPLE_AUDIO_BYTES).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = job_id(&body);

    let (status, body) = client
        .preflight(&json!({
            "job_id": job_id,
            "title": "Song Title",
            "artist": "The Artist",
            "publishType": "original",
        }))
        .await;
    assert_eq!(status, StatusCode::OK, "preflight failed: {body}");

    let (first, second) = tokio::join!(client.anchor(&job_id), client.anchor(&job_id));
    let statuses = [first.0, second.0];
    let ok_count = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let conflict_count = statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count();
    assert_eq!(ok_count, 1, "expected exactly one winner, got {statuses:?}");
    assert_eq!(conflict_count, 1, "expected exactly one loser, got {statuses:?}");

    let (status, get_body) = client.get_job(&job_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(get_body["job"]["status"], "anchored");
}

#[tokio::test]
async fn finalize_is_idempotent_after_a_client_side_timeout() {
    let chain = Arc::new(FakeChain::with_content_register_timeout_once());
    let server = TestServer::spawn_with_chain(chain).await;
    let client = TestClient::new(&server.base_url);

    let job_id = publish_through_register(&client).await;

    // First attempt: the on-chain content registration times out client-side,
    // but `ensure_onchain`'s recheck finds it landed anyway, so the call
    // still succeeds and leaves the job `registered`.
    let (status, body) = client
        .finalize(
            &job_id,
            &json!({
                "title": "Song Title",
                "artist": "The Artist",
                "album": "The Album",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "first finalize failed: {body}");
    assert_eq!(body["job"]["status"], "registered");
    assert_eq!(body["trackRegistered"], true);
    assert_eq!(body["contentRegistered"], false, "recheck should have absorbed the timeout");
    let finalize_tx_hash = body["job"]["finalizeTxHash"].clone();

    // Calling finalize again re-checks track/content state, finds both
    // already done, and skips the on-chain actions a second time.
    let (status, body) = client
        .finalize(
            &job_id,
            &json!({
                "title": "Song Title",
                "artist": "The Artist",
                "album": "The Album",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "second finalize failed: {body}");
    assert_eq!(body["trackRegistered"], false);
    assert_eq!(body["contentRegistered"], false);
    assert_eq!(body["job"]["finalizeTxHash"], finalize_tx_hash);
}

#[tokio::test]
async fn derivative_publish_without_parent_link_is_rejected() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let (status, body) = client.start_job(SAMPLE_AUDIO_BYTES).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = job_id(&body);

    let (status, body) = client
        .preflight(&json!({
            "job_id": job_id,
            "title": "A Remix",
            "artist": "The Artist",
            "publishType": "derivative",
        }))
        .await;
    assert_eq!(status, StatusCode::GONE, "expected rejection, got: {body}");
    assert_eq!(body["job"]["status"], "rejected");
    assert_eq!(body["job"]["reasonCode"], "parent_link_required");

    let (status, _) = client.anchor(&job_id).await;
    assert_eq!(status, StatusCode::CONFLICT, "a rejected job must never reach anchor");
}

#[tokio::test]
async fn derivative_publish_with_matching_parent_and_terms_registers() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let (status, body) = client.start_job(SAMPLE_AUDIO_BYTES).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = job_id(&body);

    let (status, body) = client
        .preflight(&json!({
            "job_id": job_id,
            "title": "A Remix",
            "artist": "The Artist",
            "publishType": "derivative",
            "parentIpIds": [PARENT_IP_ID],
            "licenseTermsIds": [LICENSE_TERMS_ID],
        }))
        .await;
    assert_eq!(status, StatusCode::OK, "preflight failed: {body}");
    assert_eq!(body["job"]["status"], "policy_passed");

    let (status, _) = client.anchor(&job_id).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = client.metadata(&job_id).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = client
        .register(
            &job_id,
            &json!({
                "ipMetadataUri": "ipfs://ip-meta",
                "ipMetadataHash": IP_METADATA_HASH,
                "nftMetadataUri": "ipfs://nft-meta",
                "nftMetadataHash": NFT_METADATA_HASH,
                "parentIpIds": [PARENT_IP_ID],
                "licenseTermsIds": [LICENSE_TERMS_ID],
                "licenseTemplate": LICENSE_TEMPLATE,
                "royaltyContext": "0x",
                "maxMintingFee": "0",
                "maxRts": 0,
                "maxRevenueShare": 0,
                "allowDuplicates": false,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "register failed: {body}");
    assert_eq!(body["job"]["status"], "registered");
}
