use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_control_plane::config::{
    AppConfig, ChainSettings, LlmSettings, PublishSettings, ResolverSettings, UploaderSettings,
};
use cadence_control_plane::publish::chain::ChainAdapter;
use cadence_control_plane::publish::store::SqlitePublishJobStore;
use cadence_control_plane::resolver::{ResolverCache, TrackResolver};
use cadence_control_plane::server::routes::build_router;
use cadence_control_plane::server::state::AppState;
use tokio::sync::oneshot;

use super::fakes::{FakeLlm, FakeUploader};

/// A publish control plane bound to a real loopback port, with fake
/// uploader/chain/LLM adapters behind it. Dropping it tears down the
/// background server task.
pub struct TestServer {
    pub base_url: String,
    _shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with_chain(Arc::new(super::fakes::FakeChain::new())).await
    }

    pub async fn spawn_with_chain(chain: Arc<dyn ChainAdapter>) -> Self {
        let config = AppConfig {
            db_dir: std::env::temp_dir(),
            port: 0,
            metrics_port: 0,
            logging_level: Default::default(),
            chain: ChainSettings {
                rpc_url: "http://localhost:8545".to_string(),
                chain_id: 1337,
                registry_contract: "0x0000000000000000000000000000000000000001".to_string(),
                relayer_private_key: "0x01".to_string(),
                tx_wait_deadline: Duration::from_secs(45),
            },
            uploader: UploaderSettings {
                base_url: "http://uploader.test".to_string(),
                gateway_url: "http://gateway.test".to_string(),
                api_key: None,
            },
            llm: LlmSettings {
                base_url: "http://llm.test".to_string(),
                model: "test".to_string(),
                api_key: None,
                request_timeout: Duration::from_secs(5),
            },
            publish: PublishSettings::default(),
            resolver: ResolverSettings::default(),
        };

        let state = AppState {
            config: Arc::new(config),
            start_time: Instant::now(),
            publish_store: Arc::new(SqlitePublishJobStore::in_memory().unwrap()),
            uploader: Arc::new(FakeUploader::new()),
            chain,
            llm: Arc::new(FakeLlm),
            resolver: Arc::new(TrackResolver::new(
                ResolverSettings::default(),
                Arc::new(ResolverCache::in_memory().unwrap()),
            )),
        };

        let app = build_router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        TestServer {
            base_url: format!("http://127.0.0.1:{port}"),
            _shutdown_tx: Some(shutdown_tx),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
