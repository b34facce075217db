//! ZENITH — Institutional Order-Flow Scanner
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the alert ledger from disk (or creates fresh), and runs the
//! scan→detect→dedup→notify loop alongside the control server, with
//! graceful shutdown.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use zenith::calendar::MarketCalendar;
use zenith::config::AppConfig;
use zenith::detect::{DetectorConfig, SignalDetector};
use zenith::engine::{Intervals, Scanner};
use zenith::feed::dhan::DhanClient;
use zenith::ledger::{lock, AlertLedger};
use zenith::notify::telegram::TelegramNotifier;
use zenith::server::{self, AppState};
use zenith::session::SessionManager;

const BANNER: &str = r#"
 ______ _____ _   _ ___ _____ _   _
|__  / | ____| \ | |_ _|_   _| | | |
  / /  |  _| |  \| || |  | | | |_| |
 / /_  | |___| |\  || |  | | |  _  |
/____| |_____|_| \_|___| |_| |_| |_|

  Institutional Order-Flow Scanner
  v0.1.0 — NIFTY / BANKNIFTY option chains
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        instruments = cfg.instruments.len(),
        cycle_secs = cfg.scanner.cycle_interval_secs,
        dedup_policy = ?cfg.scanner.dedup_policy,
        require_momentum = cfg.scanner.require_momentum,
        "ZENITH starting up"
    );

    // -- Restore or create alert ledger ----------------------------------

    let ledger = AlertLedger::open(
        Some(PathBuf::from(&cfg.scanner.ledger_path)),
        cfg.scanner.dedup_policy,
    )?
    .into_shared();
    info!(
        path = %cfg.scanner.ledger_path,
        records = lock(&ledger).len(),
        "Alert ledger ready"
    );

    // -- Initialise components -------------------------------------------

    let session = SessionManager::new();
    let calendar = MarketCalendar::from_config(&cfg.market)?;

    let client_id = AppConfig::resolve_env(&cfg.feed.client_id_env)?;
    let feed = Arc::new(DhanClient::new(cfg.feed.base_url.clone(), client_id)?);

    let bot_token = AppConfig::resolve_env(&cfg.alerts.bot_token_env)?;
    let chat_id = AppConfig::resolve_env(&cfg.alerts.chat_id_env)?;
    let notifier = Arc::new(TelegramNotifier::new(
        cfg.alerts.telegram_base_url.clone(),
        bot_token,
        chat_id,
    )?);

    let scanner = Scanner::new(
        feed,
        session.clone(),
        calendar,
        SignalDetector::new(DetectorConfig::from(&cfg.scanner)),
        Arc::clone(&ledger),
        notifier,
        cfg.instruments.clone(),
        Intervals::from(&cfg.scanner),
    );

    // -- Run tasks --------------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server_state = AppState {
        session: session.clone(),
        ledger: Arc::clone(&ledger),
    };
    let server_port = cfg.server.port;
    let server_shutdown = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::serve(server_state, server_port, server_shutdown).await {
            error!(error = %e, "Control server failed");
        }
    });

    let scanner_handle = tokio::spawn(scanner.run(shutdown_rx));

    info!(
        port = cfg.server.port,
        "Running. POST the daily token to /arm to start scanning. Ctrl+C to stop."
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    let _ = shutdown_tx.send(true);

    scanner_handle.await?;
    server_handle.await?;
    info!("ZENITH shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("zenith=info"));

    let json_logging = std::env::var("ZENITH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
