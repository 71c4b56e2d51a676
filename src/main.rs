//! Funding Rate Signal Bot
//!
//! Entry point. Loads configuration from the environment, initialises
//! logging, wires the page source, extractor and GitHub store into the
//! scheduler and runs it until Ctrl+C.

use anyhow::Result;
use tracing::{error, info, warn};

use funding_signal_bot::config::AppConfig;
use funding_signal_bot::engine::Scheduler;
use funding_signal_bot::scraper::coinglass::CoinglassSource;
use funding_signal_bot::scraper::text_scan::TextScanExtractor;
use funding_signal_bot::storage::github::GitHubStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load()?;

    init_logging();

    let pair_labels: Vec<String> = cfg.scraper.pairs.iter().map(|p| p.to_string()).collect();
    info!("🤖 Funding Rate Signal Bot started");
    info!(pairs = %pair_labels.join(", "), "📊 Monitoring");
    info!(repo = %cfg.github.repo, path = %cfg.github.signals_path, "📁 Target");
    info!(
        interval_secs = cfg.scheduler.interval_secs,
        backoff_secs = cfg.scheduler.error_backoff_secs,
        "🔄 Interval"
    );

    if cfg.github.has_placeholder_token() {
        warn!("GITHUB_TOKEN not set, pushes will be rejected by GitHub");
    }

    // -- Initialise components -------------------------------------------

    let source = CoinglassSource::new(&cfg.scraper)?;
    let extractor = TextScanExtractor::new(cfg.extractor.clone())?;
    let store = GitHubStore::new(&cfg.github)?;

    match store.read_document().await {
        Ok(Some(doc)) => info!(
            signals = doc.signals.len(),
            sha = doc.revision.as_ref().map(|r| r.as_str()).unwrap_or("-"),
            "Found published signals"
        ),
        Ok(None) => info!("No published signals yet, first push will create the file"),
        Err(e) => warn!(error = %e, "Could not read published signals"),
    }

    let mut scheduler = Scheduler::new(
        Box::new(source),
        Box::new(extractor),
        Box::new(store),
        cfg.scraper.pairs.clone(),
        cfg.scheduler.clone(),
    );

    // -- Main loop -------------------------------------------------------

    info!("Entering main loop. Press Ctrl+C to stop.");

    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C; running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("funding_signal_bot=info"));

    fmt().with_env_filter(env_filter).with_target(false).init();
}
