mod file_config;

pub use file_config::{
    ChainConfig as FileChainConfig, FileConfig, LlmConfig as FileLlmConfig,
    PublishConfig as FilePublishConfig, ResolverConfig as FileResolverConfig,
    UploaderConfig as FileUploaderConfig,
};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments mirrored into a plain struct so they can be merged with an
/// optional TOML file the same way regardless of where a value came from.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    pub rpc_url: Option<String>,
    pub chain_id: u64,
    pub registry_contract: Option<String>,
    pub relayer_private_key: Option<String>,

    pub uploader_base_url: Option<String>,
    pub uploader_gateway_url: Option<String>,
    pub uploader_api_key: Option<String>,

    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,

    pub musicbrainz_base_url: Option<String>,
    pub acoustid_base_url: Option<String>,
    pub acoustid_api_key: Option<String>,
    pub text_search_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
    pub chain_id: u64,
    pub registry_contract: String,
    pub relayer_private_key: String,
    pub tx_wait_deadline: Duration,
}

#[derive(Debug, Clone)]
pub struct UploaderSettings {
    pub base_url: String,
    pub gateway_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub max_jobs_per_24h: u32,
    pub max_bytes_per_24h: u64,
    pub max_artifact_bytes: u64,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            max_jobs_per_24h: 20,
            max_bytes_per_24h: 500 * 1024 * 1024,
            max_artifact_bytes: 250 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub musicbrainz_base_url: String,
    pub acoustid_base_url: String,
    pub acoustid_api_key: Option<String>,
    pub text_search_enabled: bool,
    pub cache_ttl: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            musicbrainz_base_url: "https://musicbrainz.org/ws/2".to_string(),
            acoustid_base_url: "https://api.acoustid.org/v2".to_string(),
            acoustid_api_key: None,
            text_search_enabled: false,
            cache_ttl: Duration::from_secs(86400),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    pub chain: ChainSettings,
    pub uploader: UploaderSettings,
    pub llm: LlmSettings,
    pub publish: PublishSettings,
    pub resolver: ResolverSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and an optional TOML file.
    /// TOML values override CLI values where present, matching the merge
    /// order the rest of this crate's config loading has always used.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| anyhow::anyhow!("db_dir must be specified via --db-dir or in config file"))?;
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        let logging_level = file
            .logging_level
            .and_then(|s| RequestsLoggingLevel::parse(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let chain_file = file.chain.unwrap_or_default();
        let rpc_url = chain_file
            .rpc_url
            .or_else(|| cli.rpc_url.clone())
            .ok_or_else(|| anyhow::anyhow!("chain rpc_url must be specified"))?;
        let registry_contract = chain_file
            .registry_contract
            .or_else(|| cli.registry_contract.clone())
            .ok_or_else(|| anyhow::anyhow!("chain registry_contract must be specified"))?;
        let relayer_private_key = chain_file
            .relayer_private_key
            .or_else(|| cli.relayer_private_key.clone())
            .ok_or_else(|| anyhow::anyhow!("chain relayer_private_key must be specified"))?;
        let tx_wait_deadline_secs = chain_file.tx_wait_deadline_secs.unwrap_or(45).clamp(1, 300);
        let chain = ChainSettings {
            rpc_url,
            chain_id: chain_file.chain_id.unwrap_or(cli.chain_id),
            registry_contract,
            relayer_private_key,
            tx_wait_deadline: Duration::from_secs(tx_wait_deadline_secs),
        };

        let uploader_file = file.uploader.unwrap_or_default();
        let uploader = UploaderSettings {
            base_url: uploader_file
                .base_url
                .or_else(|| cli.uploader_base_url.clone())
                .ok_or_else(|| anyhow::anyhow!("uploader base_url must be specified"))?,
            gateway_url: uploader_file
                .gateway_url
                .or_else(|| cli.uploader_gateway_url.clone())
                .ok_or_else(|| anyhow::anyhow!("uploader gateway_url must be specified"))?,
            api_key: uploader_file.api_key.or_else(|| cli.uploader_api_key.clone()),
        };

        let llm_file = file.llm.unwrap_or_default();
        let llm = LlmSettings {
            base_url: llm_file
                .base_url
                .or_else(|| cli.llm_base_url.clone())
                .ok_or_else(|| anyhow::anyhow!("llm base_url must be specified"))?,
            model: llm_file
                .model
                .or_else(|| cli.llm_model.clone())
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            api_key: llm_file.api_key.or_else(|| cli.llm_api_key.clone()),
            request_timeout: Duration::from_secs(llm_file.request_timeout_secs.unwrap_or(30)),
        };

        let publish_defaults = PublishSettings::default();
        let publish_file = file.publish.unwrap_or_default();
        let publish = PublishSettings {
            max_jobs_per_24h: publish_file
                .max_jobs_per_24h
                .unwrap_or(publish_defaults.max_jobs_per_24h),
            max_bytes_per_24h: publish_file
                .max_bytes_per_24h
                .unwrap_or(publish_defaults.max_bytes_per_24h),
            max_artifact_bytes: publish_file
                .max_artifact_bytes
                .unwrap_or(publish_defaults.max_artifact_bytes),
        };

        let resolver_defaults = ResolverSettings::default();
        let resolver_file = file.resolver.unwrap_or_default();
        let resolver = ResolverSettings {
            musicbrainz_base_url: resolver_file
                .musicbrainz_base_url
                .or_else(|| cli.musicbrainz_base_url.clone())
                .unwrap_or(resolver_defaults.musicbrainz_base_url),
            acoustid_base_url: resolver_file
                .acoustid_base_url
                .or_else(|| cli.acoustid_base_url.clone())
                .unwrap_or(resolver_defaults.acoustid_base_url),
            acoustid_api_key: resolver_file
                .acoustid_api_key
                .or_else(|| cli.acoustid_api_key.clone()),
            text_search_enabled: resolver_file
                .text_search_enabled
                .unwrap_or(cli.text_search_enabled),
            cache_ttl: resolver_file
                .cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(resolver_defaults.cache_ttl),
        };

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            chain,
            uploader,
            llm,
            publish,
            resolver,
        })
    }

    pub fn publish_db_path(&self) -> PathBuf {
        self.db_dir.join("publish.db")
    }

    pub fn resolver_cache_db_path(&self) -> PathBuf {
        self.db_dir.join("resolver_cache.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base_cli(db_dir: &TempDir) -> CliConfig {
        CliConfig {
            db_dir: Some(db_dir.path().to_path_buf()),
            port: 3001,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Path,
            rpc_url: Some("http://localhost:8545".to_string()),
            chain_id: 1337,
            registry_contract: Some("0x0000000000000000000000000000000000000001".to_string()),
            relayer_private_key: Some("0x01".repeat(1).to_string()),
            uploader_base_url: Some("http://uploader.local".to_string()),
            uploader_gateway_url: Some("http://gateway.local".to_string()),
            uploader_api_key: None,
            llm_base_url: Some("http://llm.local".to_string()),
            llm_model: None,
            llm_api_key: None,
            musicbrainz_base_url: None,
            acoustid_base_url: None,
            acoustid_api_key: None,
            text_search_enabled: false,
        }
    }

    #[test]
    fn resolve_cli_only_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let cli = base_cli(&dir);
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.publish.max_jobs_per_24h, 20);
        assert_eq!(config.chain.tx_wait_deadline, Duration::from_secs(45));
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn resolve_missing_db_dir_errors() {
        let cli = CliConfig::default();
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("db_dir"));
    }

    #[test]
    fn resolve_missing_rpc_url_errors() {
        let dir = TempDir::new().unwrap();
        let mut cli = base_cli(&dir);
        cli.rpc_url = None;
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("rpc_url"));
    }

    #[test]
    fn resolve_clamps_tx_wait_deadline() {
        let dir = TempDir::new().unwrap();
        let cli = base_cli(&dir);
        let file = FileConfig {
            chain: Some(FileChainConfig {
                tx_wait_deadline_secs: Some(10_000),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, Some(file)).unwrap();
        assert_eq!(config.chain.tx_wait_deadline, Duration::from_secs(300));
    }
}
