//! Zentinel SPID Agent
//!
//! Builds the SPID trust configuration, keeps the anti-replay request cache
//! tidy and refreshes IdP metadata in the background. This binary handles
//! only trust refresh and cache upkeep; the login flow itself runs inside
//! the host through the library's `SpidSamlClient`.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use zentinel_agent_spid::cache::{
    spawn_cleanup_task, CacheBackend, MemoryRequestCache, RedbRequestCache, RequestCache,
};
use zentinel_agent_spid::dsig::OpensslXmlSigner;
use zentinel_agent_spid::trust::{SharedTrust, TrustConfigurationBuilder};
use zentinel_agent_spid::AgentConfig;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "zentinel-spid-agent")]
#[command(about = "SPID Service Provider agent for Zentinel reverse proxy")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "/etc/zentinel/spid.json", env = "SPID_CONFIG")]
    config: PathBuf,

    /// Override the SPID test environment base URL
    #[arg(long, env = "SPID_TESTENV_URL")]
    testenv_url: Option<String>,

    /// Override the request cache path
    #[arg(long, env = "SPID_CACHE_PATH")]
    cache_path: Option<String>,

    /// Print the SP metadata document and exit
    #[arg(long)]
    print_sp_metadata: bool,

    /// Build the trust configuration, report and exit
    #[arg(long)]
    check: bool,

    /// Enable verbose logging
    #[arg(short, long, env = "SPID_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("{}={}", env!("CARGO_CRATE_NAME"), log_level))
        .json()
        .init();

    let mut config = AgentConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

    if let Some(url) = args.testenv_url {
        config.metadata.testenv_url = url;
    }
    if let Some(path) = args.cache_path {
        config.replay.store_path = path;
    }

    if args.print_sp_metadata {
        println!("{}", config.service_provider.metadata_xml());
        return Ok(());
    }

    info!(
        issuer = %config.service_provider.issuer,
        recognized_idps = config.metadata.recognized_idps.len(),
        validator = config.metadata.validator_url.is_some(),
        "Configuration loaded"
    );

    if config.service_provider.private_key_pem.trim().is_empty() {
        warn!("No SP private key configured, AuthnRequests cannot be signed");
    } else {
        OpensslXmlSigner::from_sp_config(&config.service_provider)
            .context("Invalid SP signing key")?;
        info!("SP signing key matches the SP certificate");
    }

    let (trust, report) =
        TrustConfigurationBuilder::from_config(config.service_provider.clone(), &config.metadata)
            .build_with_report()
            .await
            .context("Failed to build trust configuration")?;

    info!(
        idp_count = trust.len(),
        missing = ?report.missing_entities,
        certificate = ?report.certificate,
        "Trust configuration ready"
    );

    if args.check {
        return Ok(());
    }

    let ttl = config
        .replay
        .record_ttl(config.service_provider.clock_skew());
    let cache: Arc<dyn RequestCache> = match config.replay.backend {
        CacheBackend::Redb => {
            let cache = RedbRequestCache::open(&config.replay.store_path, ttl)
                .with_context(|| format!("Failed to open request cache {}", config.replay.store_path))?;
            info!(path = %config.replay.store_path, "Request cache initialized");
            Arc::new(cache)
        }
        CacheBackend::Memory => {
            warn!("In-memory request cache: replay protection is per instance only");
            Arc::new(MemoryRequestCache::new(ttl))
        }
    };

    let _cleanup_handle = spawn_cleanup_task(Arc::clone(&cache), config.replay.cleanup_interval_secs);

    let shared = SharedTrust::new(trust);

    if config.metadata_refresh_secs == 0 {
        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.metadata_refresh_secs));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let builder = TrustConfigurationBuilder::from_config(
                    config.service_provider.clone(),
                    &config.metadata,
                );
                // failures are logged and the current trust stays active
                let _ = shared.reload(builder).await;
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}
