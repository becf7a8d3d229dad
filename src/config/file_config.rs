use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Optional TOML overlay for [`super::AppConfig`]. Values set here win over
/// the corresponding CLI flag.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,

    pub chain: Option<ChainConfig>,
    pub uploader: Option<UploaderConfig>,
    pub llm: Option<LlmConfig>,
    pub publish: Option<PublishConfig>,
    pub resolver: Option<ResolverConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: Option<String>,
    pub chain_id: Option<u64>,
    pub registry_contract: Option<String>,
    pub relayer_private_key: Option<String>,
    pub tx_wait_deadline_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct UploaderConfig {
    pub base_url: Option<String>,
    pub gateway_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PublishConfig {
    pub max_jobs_per_24h: Option<u32>,
    pub max_bytes_per_24h: Option<u64>,
    pub max_artifact_bytes: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ResolverConfig {
    pub musicbrainz_base_url: Option<String>,
    pub acoustid_base_url: Option<String>,
    pub acoustid_api_key: Option<String>,
    pub text_search_enabled: Option<bool>,
    pub cache_ttl_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
