//! Crashline Server Binary
//!
//! Crash game settlement engine with its HTTP API.

use clap::Parser;
use crashline::api::ApiServer;
use crashline::config::{CrashConfig, StorageBackend};
use crashline::games::{GameService, SystemClock};
use crashline::storage::{MemoryStore, RocksStore, SharedStore};
use crashline::CrashResult;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "crashline")]
#[command(about = "Crash game settlement engine", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// API server host
    #[arg(long)]
    host: Option<String>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Database directory
    #[arg(long)]
    db_path: Option<String>,

    /// Keep all state in memory (nothing survives a restart)
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CrashConfig::from_file(path)?,
        None => CrashConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.monitoring.log_filter.clone().into()),
        )
        .init();

    info!("🚀 Starting Crashline v{}", env!("CARGO_PKG_VERSION"));

    if config.crash_point_unreachable() {
        warn!(
            "⚠️  max multiplier {:.2}x exceeds display cap {:.2}x; games will never auto-crash",
            config.game.max_multiplier, config.engine.display_cap
        );
    }

    let store = open_store(&config)?;
    seed_store(&store, &config)?;

    let games = Arc::new(GameService::new(
        store,
        Arc::new(SystemClock),
        config.engine.clone(),
    ));
    games.recover_active_games()?;
    games.ensure_sweeper();

    let server = ApiServer::new(
        config.server.clone(),
        games.clone(),
        config.monitoring.enable_metrics,
    );
    let outcome = server.run().await;

    games.sweeper().shutdown();
    outcome
}

fn apply_overrides(config: &mut CrashConfig, args: &Args) {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(db_path) = &args.db_path {
        config.storage.data_directory = db_path.clone();
    }
    if args.memory {
        config.storage.backend = StorageBackend::Memory;
    }
}

fn open_store(config: &CrashConfig) -> CrashResult<SharedStore> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("💾 Using in-memory storage");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Rocksdb => {
            info!("💾 Opening RocksDB at {}", config.storage.data_directory);
            Ok(Arc::new(RocksStore::new_with_config(&config.storage)?))
        }
    }
}

/// Install the configured settings row and demo users when missing
fn seed_store(store: &SharedStore, config: &CrashConfig) -> CrashResult<()> {
    if store.active_settings()?.is_none() {
        store.put_settings(&config.game)?;
        info!(
            "⚙️  Seeded game settings (max multiplier {:.2}x, bets {:.0}-{:.0})",
            config.game.max_multiplier, config.game.min_bet_amount, config.game.max_bet_amount
        );
    }

    let now = chrono::Utc::now();
    for seed in &config.seed.users {
        if store.find_user_by_name(&seed.username)?.is_some() {
            continue;
        }
        let user = store.create_user(&seed.username, seed.balance, &seed.currency, now)?;
        info!(
            "👤 Created demo user {} (id {}, balance {:.2} {})",
            user.username, user.id, seed.balance, seed.currency
        );
    }

    Ok(())
}
