//! ASSETWATCH — on-chain asset detection & reconciliation engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the registry, sources, store, detector, and composer together,
//! and runs the detection scheduler with graceful shutdown.

use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use assetwatch::config::AppConfig;
use assetwatch::engine::composer::{forward_assets, forward_detection, StateComposer};
use assetwatch::engine::reconcile::Detector;
use assetwatch::engine::scheduler::DetectionScheduler;
use assetwatch::registry::ContractRegistry;
use assetwatch::sources::balances::RpcBalanceClient;
use assetwatch::sources::marketplace::MarketplaceClient;
use assetwatch::store::{AssetStore, MemoryStore};
use assetwatch::types::{parse_address, AccountSnapshot, ChainId};

const BANNER: &str = r#"
    _    ____ ____  _____ _____      _    _____ ____ _   _
   / \  / ___/ ___|| ____|_   _|    / \  |_   _/ ___| | | |
  / _ \ \___ \___ \|  _|   | |_____/ _ \   | || |   | |_| |
 / ___ \ ___) |__) | |___  | |_____/ ___ \ | || |___|  _  |
/_/   \_\____/____/|_____| |_|    /_/   \_\|_| \____|_| |_|

  On-chain Asset Detection & Reconciliation Engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    println!("{BANNER}");
    info!(
        interval_secs = cfg.detection.interval_secs,
        enabled = cfg.detection.enabled,
        chain_id = cfg.detection.chain_id,
        "ASSETWATCH starting up"
    );

    // -- Contract registry -------------------------------------------------

    let registry = Arc::new(match &cfg.registry.file {
        Some(path) => {
            let registry = ContractRegistry::from_toml_file(path)?;
            info!(path = %path, contracts = registry.len(), "Registry loaded from file");
            registry
        }
        None => {
            let registry = ContractRegistry::builtin();
            info!(contracts = registry.len(), "Using builtin registry");
            registry
        }
    });

    // -- External sources ---------------------------------------------------

    let checker = parse_address(&cfg.sources.balance_checker)
        .map_err(|e| anyhow::anyhow!("Bad balance_checker in config: {e}"))?;
    let balances = Arc::new(RpcBalanceClient::new(cfg.sources.rpc_url.clone(), checker)?);

    let api_key = match cfg.sources.marketplace_api_key_env.as_deref() {
        Some(env) => match std::env::var(env) {
            Ok(key) => Some(SecretString::new(key)),
            Err(_) => {
                warn!(env, "Marketplace API key env var not set, continuing unauthenticated");
                None
            }
        },
        None => None,
    };
    let marketplace = Arc::new(MarketplaceClient::new(
        cfg.sources.marketplace_url.clone(),
        api_key,
    )?);

    // -- Store, detector, scheduler ------------------------------------------

    let store: Arc<dyn AssetStore> = Arc::new(MemoryStore::new());

    let initial_account = AccountSnapshot {
        address: match &cfg.detection.owner_address {
            Some(raw) => Some(
                parse_address(raw)
                    .map_err(|e| anyhow::anyhow!("Bad owner_address in config: {e}"))?,
            ),
            None => None,
        },
        chain: ChainId(cfg.detection.chain_id),
    };

    let (account_tx, account_rx) = watch::channel(initial_account);

    let detector = Arc::new(Detector::new(
        registry,
        balances,
        marketplace,
        store.clone(),
        account_rx,
    ));
    detector.set_enabled(cfg.detection.enabled);

    let (scheduler, handle) = DetectionScheduler::new(
        detector,
        Duration::from_secs(cfg.detection.interval_secs),
        account_tx,
    );

    // -- State composer ------------------------------------------------------

    let composer = Arc::new(StateComposer::new());
    tokio::spawn(forward_assets(composer.clone(), store.subscribe()));
    tokio::spawn(forward_detection(composer.clone(), scheduler.reports()));

    // -- Run -----------------------------------------------------------------

    // Kick one out-of-band cycle at startup instead of waiting a full
    // interval for the first tick.
    handle.account_changed(initial_account).await;

    info!("Entering detection loop. Press Ctrl+C to stop.");

    tokio::select! {
        _ = scheduler.run() => {
            info!("Scheduler exited.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received.");
        }
    }

    let tracked = store.snapshot();
    info!(
        tokens = tracked.tokens.len(),
        collectibles = tracked.collectibles.len(),
        "ASSETWATCH shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("assetwatch=info"));

    let json_logging = std::env::var("ASSETWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
