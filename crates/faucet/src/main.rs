//! Faucet service binary

use anyhow::Context;
use clap::Parser;
use drip_common::utils::logging::init_logging;
use drip_crypto::KeyPair;
use drip_faucet::chain::JsonRpcChainClient;
use drip_faucet::cooldown::{CooldownStore, MemoryCooldownStore, RedisCooldownStore};
use drip_faucet::limiter::{AdmissionLimiter, MemoryAdmissionLimiter, RedisAdmissionLimiter, WindowPolicy};
use drip_faucet::{router, ClaimCoordinator, ClaimSettings, FaucetConfig, FaucetMetrics, NetworkRegistry};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Faucet service CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server address
    #[arg(long)]
    server_addr: Option<String>,

    /// Redis URL for shared cooldown and rate limit state
    #[arg(long)]
    redis_url: Option<String>,

    /// Claims admitted per network per window
    #[arg(long)]
    window_capacity: Option<u32>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = FaucetConfig::load(args.config.as_deref())?;

    // Override with CLI arguments
    if let Some(addr) = args.server_addr {
        config.server_addr = addr;
    }

    if let Some(url) = args.redis_url {
        config.redis_url = Some(url);
    }

    if let Some(capacity) = args.window_capacity {
        config.window_capacity = capacity;
    }

    if args.debug {
        config.logging.level = "debug".to_string();
    }

    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting Drip Faucet v{}", env!("CARGO_PKG_VERSION"));

    let private_key = config
        .relayer_private_key
        .as_deref()
        .context("RELAYER_PRIVATE_KEY is not set")?;
    let relayer = Arc::new(KeyPair::from_private_key_hex(private_key).context("Invalid relayer private key")?);

    let registry = Arc::new(NetworkRegistry::from_config(&config.networks)?);

    info!("Configuration:");
    info!("  Server address: {}", config.server_addr);
    info!("  Relayer address: {}", relayer.address());
    info!("  Networks: {}", registry.len());
    info!("  User cooldown: {}s", config.cooldown_secs);
    info!(
        "  Network rate limit: {} claims / {}s",
        config.window_capacity, config.window_secs
    );

    let policy = WindowPolicy {
        capacity: config.window_capacity,
        window: config.window_duration(),
    };

    let (limiter, cooldowns): (Arc<dyn AdmissionLimiter>, Arc<dyn CooldownStore>) = match &config.redis_url {
        Some(url) => {
            let client = Arc::new(redis::Client::open(url.as_str()).context("Invalid REDIS_URL")?);
            let mut conn = client
                .get_multiplexed_async_connection()
                .await
                .context("Failed to connect to Redis")?;
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .context("Redis did not answer PING")?;
            info!("Using Redis for cooldowns and rate limits");
            (
                Arc::new(RedisAdmissionLimiter::new(client.clone(), policy)),
                Arc::new(RedisCooldownStore::new(client, config.cooldown_duration())),
            )
        }
        None => {
            warn!("REDIS_URL not set; cooldowns and rate limits live in memory and reset on restart");
            (
                Arc::new(MemoryAdmissionLimiter::new(policy)),
                Arc::new(MemoryCooldownStore::new(config.cooldown_duration())),
            )
        }
    };

    let settings = ClaimSettings {
        gas_headroom_percent: config.gas_headroom_percent,
        chain_timeout: config.chain_timeout(),
    };

    let mut coordinator = ClaimCoordinator::new(registry.clone(), relayer.address(), limiter, cooldowns, settings)
        .with_metrics(FaucetMetrics::new()?);

    for network in registry.iter() {
        let client = JsonRpcChainClient::new(network.rpc_url.clone(), network.chain_id, relayer.clone());
        coordinator = coordinator.with_chain_client(network.chain_id, Arc::new(client));
    }

    let app = router(Arc::new(coordinator), config.cors_enabled);
    if config.cors_enabled {
        info!("CORS enabled");
    }

    // Start server
    let addr: SocketAddr = config.server_addr.parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down gracefully");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
