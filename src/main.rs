//! AHBOT: auction-house trading bot.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores market settings from disk (or takes them from config.toml),
//! and runs the scheduler tick loop with graceful shutdown.

use anyhow::Result;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use ahbot::admin::{self, routes::AdminState, service::AdminService};
use ahbot::config::{self, MarketSettings};
use ahbot::engine::traders::TraderRegistry;
use ahbot::engine::{BotContext, BotRunner, SharedSettings, TickReport};
use ahbot::market::memory::InMemoryMarket;
use ahbot::market::Ports;
use ahbot::storage;
use ahbot::types::MarketId;

const BANNER: &str = r#"
    _    _   _ ____   ___ _____
   / \  | | | | __ ) / _ \_   _|
  / _ \ | |_| |  _ \| | | || |
 / ___ \|  _  | |_) | |_| || |
/_/   \_\_| |_|____/ \___/ |_|

  Auction House Trading Bot
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        bot_name = %cfg.bot.name,
        tick_interval_secs = cfg.bot.tick_interval_secs,
        account = cfg.bot.account,
        seed = ?cfg.bot.seed,
        "AHBOT starting up"
    );

    // -- Market and identities -------------------------------------------

    let market = Arc::new(InMemoryMarket::from_catalog_file(&cfg.bot.catalog_path)?);
    if cfg.bot.account != 0 && !cfg.bot.traders.is_empty() {
        // The in-memory world has no account table of its own.
        market.register_account(cfg.bot.account, cfg.bot.traders.clone());
    }
    let ports = Ports::in_memory(market.clone());
    let traders = TraderRegistry::resolve(cfg.bot.account, &cfg.bot.traders, market.as_ref()).await?;

    // -- Restore or take settings ----------------------------------------

    let settings = match storage::load_settings(Some(&cfg.bot.settings_path))? {
        Some(saved) => {
            info!(markets = saved.len(), "Resumed from saved settings");
            merge_settings(saved)
        }
        None => cfg.markets.clone(),
    };
    for (market_id, s) in &settings {
        if let Err(e) = s.validate() {
            warn!(market = %market_id, error = %e, "Market settings fail validation");
        }
    }
    let shared: SharedSettings = Arc::new(RwLock::new(settings));

    // -- Admin surface ---------------------------------------------------

    if cfg.admin.enabled {
        let token = match cfg.admin.token_env.as_deref() {
            Some(env) => Some(config::AppConfig::resolve_env(env)?),
            None => {
                warn!("Admin token not configured, mutating endpoints are open");
                None
            }
        };
        let service = AdminService::new(
            shared.clone(),
            ports.clone(),
            traders.ids(),
            cfg.bot.settings_path.clone(),
        );
        admin::spawn_admin(Arc::new(AdminState { service, token }), cfg.admin.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let ctx = BotContext {
        ports,
        traders,
        settings: shared,
    };
    let mut runner = BotRunner::new(ctx, cfg.bot.seed, Utc::now());

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.bot.tick_interval_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.bot.tick_interval_secs,
        traders = runner.context().traders.len(),
        "Entering main loop. Press Ctrl+C to stop."
    );

    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                let expired = market.sweep_expired(now);
                if expired > 0 {
                    info!(expired, "Expired listings removed");
                }
                let report = runner.run_tick(now).await;
                ticks += 1;
                log_tick_report(ticks, &report);
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    let snapshot = runner.context().settings.read().await.clone();
    if let Err(e) = storage::save_settings(&snapshot, Some(&cfg.bot.settings_path)) {
        error!(error = %e, "Failed to save settings");
    }
    info!(
        ticks,
        live_listings = market.all_listings().len(),
        "AHBOT shut down cleanly."
    );

    Ok(())
}

/// Saved files may predate a market; fill the gap with stock settings.
fn merge_settings(mut saved: BTreeMap<MarketId, MarketSettings>) -> BTreeMap<MarketId, MarketSettings> {
    for market in MarketId::ALL {
        saved.entry(market).or_default();
    }
    saved
}

fn log_tick_report(tick: u64, report: &TickReport) {
    if report.sells.is_empty() && report.buys.is_empty() {
        return;
    }
    info!(
        tick,
        listed = report.listings_created(),
        settled = report.settlements(),
        failures = report.failures,
        "Tick summary"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ahbot=info"));

    let json_logging = std::env::var("AHBOT_LOG_JSON").is_ok();

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
