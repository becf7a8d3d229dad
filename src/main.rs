use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cadence_control_plane::config::{self, AppConfig, CliConfig};
use cadence_control_plane::publish::chain::EvmChainAdapter;
use cadence_control_plane::publish::store::SqlitePublishJobStore;
use cadence_control_plane::publish::uploader::HttpUploader;
use cadence_control_plane::resolver::{ResolverCache, TrackResolver};
use cadence_control_plane::server::run_server;
use cadence_control_plane::server::state::AppState;
use cadence_control_plane::studyset::OpenAiLikeLlmClient;
use cadence_control_plane::RequestsLoggingLevel;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing database files (publish.db, resolver_cache.db).
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// JSON-RPC URL of the chain the MusicRegistry contract is deployed on.
    #[clap(long)]
    pub rpc_url: Option<String>,

    /// Chain ID of the target chain.
    #[clap(long, default_value_t = 1)]
    pub chain_id: u64,

    /// Address of the MusicRegistry contract.
    #[clap(long)]
    pub registry_contract: Option<String>,

    /// Private key of the relayer account submitting anchor/register transactions.
    #[clap(long)]
    pub relayer_private_key: Option<String>,

    /// Base URL of the content-addressed uploader service.
    #[clap(long)]
    pub uploader_base_url: Option<String>,

    /// Public gateway URL used to build resolvable links to uploaded content.
    #[clap(long)]
    pub uploader_gateway_url: Option<String>,

    /// API key for the uploader service, if required.
    #[clap(long)]
    pub uploader_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible LLM endpoint used for study-set generation.
    #[clap(long)]
    pub llm_base_url: Option<String>,

    /// Model name to request from the LLM endpoint.
    #[clap(long)]
    pub llm_model: Option<String>,

    /// API key for the LLM endpoint, if required.
    #[clap(long)]
    pub llm_api_key: Option<String>,

    /// Base URL of the MusicBrainz API used by the scrobble resolver cascade.
    #[clap(long)]
    pub musicbrainz_base_url: Option<String>,

    /// Base URL of the AcoustID API used for fingerprint lookups.
    #[clap(long)]
    pub acoustid_base_url: Option<String>,

    /// API key for AcoustID fingerprint lookups.
    #[clap(long)]
    pub acoustid_api_key: Option<String>,

    /// Enable the resolver's fallback free-text search stage.
    #[clap(long, default_value_t = false)]
    pub text_search_enabled: bool,
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            rpc_url: args.rpc_url.clone(),
            chain_id: args.chain_id,
            registry_contract: args.registry_contract.clone(),
            relayer_private_key: args.relayer_private_key.clone(),
            uploader_base_url: args.uploader_base_url.clone(),
            uploader_gateway_url: args.uploader_gateway_url.clone(),
            uploader_api_key: args.uploader_api_key.clone(),
            llm_base_url: args.llm_base_url.clone(),
            llm_model: args.llm_model.clone(),
            llm_api_key: args.llm_api_key.clone(),
            musicbrainz_base_url: args.musicbrainz_base_url.clone(),
            acoustid_base_url: args.acoustid_base_url.clone(),
            acoustid_api_key: args.acoustid_api_key.clone(),
            text_search_enabled: args.text_search_enabled,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    info!(
        "cadence-control-plane {} ({})",
        env!("APP_VERSION"),
        env!("GIT_HASH")
    );

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    let cli_config: CliConfig = (&cli_args).into();
    let app_config = Arc::new(AppConfig::resolve(&cli_config, file_config)?);

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  port: {}", app_config.port);
    info!("  chain.rpc_url: {}", app_config.chain.rpc_url);
    info!("  chain.chain_id: {}", app_config.chain.chain_id);

    let publish_db_path = app_config.publish_db_path();
    if !publish_db_path.exists() {
        info!("Creating new publish database at {:?}", publish_db_path);
    }
    let publish_store = Arc::new(SqlitePublishJobStore::new(&publish_db_path)?);

    let resolver_cache_path = app_config.resolver_cache_db_path();
    if !resolver_cache_path.exists() {
        info!("Creating new resolver cache database at {:?}", resolver_cache_path);
    }
    let resolver_cache = Arc::new(ResolverCache::new(&resolver_cache_path)?);

    let uploader = Arc::new(HttpUploader::new(app_config.uploader.clone()));
    let chain = Arc::new(EvmChainAdapter::new(app_config.chain.clone())?);
    let llm = Arc::new(OpenAiLikeLlmClient::new(app_config.llm.clone()));
    let resolver = Arc::new(TrackResolver::new(app_config.resolver.clone(), resolver_cache));

    let state = AppState {
        config: app_config.clone(),
        start_time: std::time::Instant::now(),
        publish_store,
        uploader,
        chain,
        llm,
        resolver,
    };

    info!("Ready to serve at port {}!", app_config.port);
    info!("Metrics available at port {}!", app_config.metrics_port);

    run_server(state).await
}
