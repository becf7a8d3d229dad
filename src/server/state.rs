use std::sync::Arc;
use std::time::Instant;

use axum::extract::FromRef;

use crate::config::AppConfig;
use crate::publish::chain::ChainAdapter;
use crate::publish::store::PublishJobStore;
use crate::publish::uploader::Uploader;
use crate::resolver::TrackResolver;
use crate::studyset::LlmClient;

use super::http_layers::RequestsLoggingLevel;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub start_time: Instant,
    pub publish_store: Arc<dyn PublishJobStore>,
    pub uploader: Arc<dyn Uploader>,
    pub chain: Arc<dyn ChainAdapter>,
    pub llm: Arc<dyn LlmClient>,
    pub resolver: Arc<TrackResolver>,
}

impl FromRef<AppState> for RequestsLoggingLevel {
    fn from_ref(input: &AppState) -> Self {
        input.config.logging_level.clone()
    }
}
