//! Route table: wires the publish, study-set, and resolver handlers onto
//! one axum `Router`, plus the always-on `/healthz` endpoint.

use std::time::Duration;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::resolver::ResolveInput;
use crate::studyset::StudySetRequest;

use super::http_layers::log_requests;
use super::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/publish/start", post(crate::publish::handlers::start))
        .route(
            "/publish/{job_id}/artifacts/stage",
            post(crate::publish::handlers::stage_artifacts),
        )
        .route("/preflight", post(crate::publish::handlers::preflight))
        .route("/publish/{job_id}", get(crate::publish::handlers::get_job))
        .route("/publish/{job_id}/anchor", post(crate::publish::handlers::anchor))
        .route("/publish/{job_id}/metadata", post(crate::publish::handlers::metadata))
        .route("/publish/{job_id}/register", post(crate::publish::handlers::register))
        .route("/publish/{job_id}/finalize", post(crate::publish::handlers::finalize))
        .route("/studyset/generate", post(generate_study_set))
        .route("/resolve/track", post(resolve_track))
        .route_layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptimeSeconds": state.start_time.elapsed().as_secs(),
        "version": env!("APP_VERSION"),
        "gitHash": env!("GIT_HASH"),
    }))
}

async fn generate_study_set(
    State(state): State<AppState>,
    Json(req): Json<StudySetRequest>,
) -> Result<Json<Value>, ApiError> {
    let pack = crate::studyset::generate_study_set(&req, state.llm.as_ref())
        .await
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::to_value(pack).map_err(|e| ApiError::Internal(e.to_string()))?))
}

async fn resolve_track(
    State(state): State<AppState>,
    Json(req): Json<ResolveInput>,
) -> Result<Json<Value>, ApiError> {
    let result = state.resolver.resolve(&req).await.map_err(ApiError::from)?;
    Ok(Json(serde_json::to_value(result).map_err(|e| ApiError::Internal(e.to_string()))?))
}

/// Binds the main router on `port` and a metrics-only router on
/// `metrics_port`, running both until either exits.
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let port = state.config.port;
    let metrics_port = state.config.metrics_port;

    super::metrics::register_metrics();
    let app = build_router(state);

    let metrics_app = Router::new().route("/metrics", get(super::metrics::metrics_handler));
    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{metrics_port}")).await?;

    tracing::info!("starting HTTP server on port {port}");
    let main_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tokio::select! {
        result = axum::serve(main_listener, app.into_make_service()) => result?,
        result = axum::serve(metrics_listener, metrics_app) => result?,
    }

    Ok(())
}

#[allow(dead_code)]
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use std::time::Instant;
    use tower::ServiceExt;

    use crate::config::{AppConfig, ChainSettings, LlmSettings, PublishSettings, ResolverSettings, UploaderSettings};
    use crate::publish::chain::{ChainAdapter, ChainError, TxReceipt};
    use crate::publish::store::SqlitePublishJobStore;
    use crate::publish::uploader::{Uploader, UploaderError};
    use crate::resolver::{ResolveResult, ResolverCache, ResolverError, TrackResolver};
    use crate::studyset::{LlmClient, LlmError};
    use alloy_primitives::{Address, B256};
    use async_trait::async_trait;

    struct NullUploader;
    #[async_trait]
    impl Uploader for NullUploader {
        async fn upload(&self, _bytes: Vec<u8>, _tags: Vec<(String, String)>) -> Result<String, UploaderError> {
            Ok("cid".to_string())
        }
        async fn resolve_by_tags(&self, _tags: Vec<(String, String)>) -> Result<Option<String>, UploaderError> {
            Ok(None)
        }
        fn gateway_url(&self, piece_cid: &str) -> String {
            format!("http://gateway.local/resolve/{piece_cid}")
        }
    }

    struct NullChain;
    #[async_trait]
    impl ChainAdapter for NullChain {
        fn collection_address(&self) -> Address {
            Address::ZERO
        }

        async fn anchor_content(&self, _content_id: B256, _piece_cid: &str) -> Result<TxReceipt, ChainError> {
            Ok(TxReceipt { tx_hash: "0xdead".to_string(), block_number: 1, logs: vec![] })
        }

        async fn mint_and_register_ip(
            &self,
            _recipient: Address,
            _ip_metadata_uri: &str,
            _ip_metadata_hash: B256,
            _nft_metadata_uri: &str,
            _nft_metadata_hash: B256,
            _allow_duplicates: bool,
        ) -> Result<TxReceipt, ChainError> {
            Ok(TxReceipt { tx_hash: "0xbeef".to_string(), block_number: 2, logs: vec![] })
        }

        async fn mint_and_register_derivative_ip(
            &self,
            _recipient: Address,
            _ip_metadata_uri: &str,
            _ip_metadata_hash: B256,
            _nft_metadata_uri: &str,
            _nft_metadata_hash: B256,
            _parent_ip_ids: &[Address],
            _license_terms_ids: &[alloy_primitives::U256],
            _license_template: Address,
            _royalty_context: &[u8],
            _max_minting_fee: alloy_primitives::U256,
            _max_rts: u32,
            _max_revenue_share: u32,
            _allow_duplicates: bool,
        ) -> Result<TxReceipt, ChainError> {
            Ok(TxReceipt { tx_hash: "0xbeef".to_string(), block_number: 2, logs: vec![] })
        }

        async fn resolve_ip_id(&self, _token_id: alloy_primitives::U256) -> Result<Address, ChainError> {
            Ok(Address::ZERO)
        }

        async fn attached_license_terms(&self, _ip_id: Address) -> Result<Vec<alloy_primitives::U256>, ChainError> {
            Ok(vec![])
        }

        async fn is_track_registered(&self, _track_id: B256) -> Result<bool, ChainError> {
            Ok(false)
        }

        async fn register_track(&self, _track_id: B256, _owner: Address) -> Result<TxReceipt, ChainError> {
            Ok(TxReceipt { tx_hash: "0xbeef".to_string(), block_number: 2, logs: vec![] })
        }

        async fn set_track_cover(&self, _track_id: B256, _cover_ref: &str) -> Result<TxReceipt, ChainError> {
            Ok(TxReceipt { tx_hash: "0xc0ffee".to_string(), block_number: 3, logs: vec![] })
        }

        async fn is_content_active(&self, _content_id: B256) -> Result<bool, ChainError> {
            Ok(false)
        }

        async fn register_content_for(
            &self,
            _content_id: B256,
            _track_id: B256,
            _owner: Address,
        ) -> Result<TxReceipt, ChainError> {
            Ok(TxReceipt { tx_hash: "0xc0ffee".to_string(), block_number: 3, logs: vec![] })
        }
    }

    struct NullLlm;
    #[async_trait]
    impl LlmClient for NullLlm {
        async fn complete_json(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _schema_name: &str,
            _schema: Value,
        ) -> Result<Value, LlmError> {
            Ok(json!({}))
        }
    }

    fn test_state() -> AppState {
        let config = AppConfig {
            db_dir: std::env::temp_dir(),
            port: 0,
            metrics_port: 0,
            logging_level: Default::default(),
            chain: ChainSettings {
                rpc_url: "http://localhost:8545".to_string(),
                chain_id: 1337,
                registry_contract: "0x0000000000000000000000000000000000000001".to_string(),
                relayer_private_key: "0x01".repeat(1),
                tx_wait_deadline: Duration::from_secs(45),
            },
            uploader: UploaderSettings {
                base_url: "http://uploader.local".to_string(),
                gateway_url: "http://gateway.local".to_string(),
                api_key: None,
            },
            llm: LlmSettings {
                base_url: "http://llm.local".to_string(),
                model: "test".to_string(),
                api_key: None,
                request_timeout: Duration::from_secs(5),
            },
            publish: PublishSettings::default(),
            resolver: ResolverSettings::default(),
        };
        AppState {
            config: Arc::new(config),
            start_time: Instant::now(),
            publish_store: Arc::new(SqlitePublishJobStore::in_memory().unwrap()),
            uploader: Arc::new(NullUploader),
            chain: Arc::new(NullChain),
            llm: Arc::new(NullLlm),
            resolver: Arc::new(TrackResolver::new(
                ResolverSettings::default(),
                Arc::new(ResolverCache::in_memory().unwrap()),
            )),
        }
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_job_returns_404() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/publish/music_doesnotexist00")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[allow(dead_code)]
    fn silence_unused(_: ResolverError, _: ResolveResult) {}
}
