//! ARBITER: Collectible Card Arbitrage Valuation Engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! reads the scraped listing feed, runs the batch valuation pipeline
//! with graceful cancellation, and writes the ranked run report.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use arbiter::config;
use arbiter::engine::decision::rank_results;
use arbiter::engine::ValuationEngine;
use arbiter::lookup::archive::SalesArchiveClient;
use arbiter::storage;
use arbiter::types::RunReport;
use arbiter::vision::DefectScanClient;

const BANNER: &str = r#"
    _    ____  ____ ___ _____ _____ ____
   / \  |  _ \| __ )_ _|_   _| ____|  _ \
  / _ \ | |_) |  _ \| |  | | |  _| | |_) |
 / ___ \|  _ <| |_) | |  | | | |___|  _ <
/_/   \_\_| \_\____/___| |_| |_____|_| \_\

  Collectible Card Arbitrage Valuation Engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load and validate configuration; a bad config never evaluates
    // a single listing.
    let cfg = config::AppConfig::load("config.toml")?;
    cfg.validate()?;

    init_logging();

    println!("{BANNER}");
    info!(
        listings_file = %cfg.engine.listings_file,
        report_file = %cfg.engine.report_file,
        concurrency = cfg.engine.concurrency,
        include_grading = cfg.engine.include_grading,
        profit_threshold = %cfg.pricing.profit_threshold,
        "ARBITER starting up"
    );

    // -- Collaborator clients --------------------------------------------

    let lookup = Arc::new(SalesArchiveClient::new(&cfg.lookup)?);
    let analyzer = Arc::new(DefectScanClient::new(&cfg.vision)?);

    let engine = ValuationEngine::new(&cfg, lookup, analyzer);

    // -- Graceful cancellation -------------------------------------------

    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received; in-flight evaluations will finish");
            cancel.cancel();
        }
    });

    // -- Batch evaluation ------------------------------------------------

    let listings = storage::load_listings(&cfg.engine.listings_file)?;
    if listings.is_empty() {
        warn!(path = %cfg.engine.listings_file, "Listing feed is empty, nothing to evaluate");
    }

    let run_id = uuid::Uuid::new_v4();
    let started_at = Utc::now();

    let mut results = engine.evaluate_all(listings).await;
    rank_results(&mut results);

    let report = RunReport::from_results(run_id, started_at, Utc::now(), results);
    storage::save_report(&report, &cfg.engine.report_file)?;

    // -- Summary ----------------------------------------------------------

    for result in &report.results {
        if let (true, Some(roi), Some(profit)) =
            (result.is_profitable(), result.roi, result.profit_usd)
        {
            info!(
                listing_id = %result.listing_id,
                title = %result.title,
                roi = format!("{roi:.2}"),
                profit = format!("${profit:.2}"),
                url = %result.url,
                "Profitable opportunity"
            );
        }
    }

    info!(
        run_id = %report.run_id,
        evaluated = report.listings_evaluated,
        profitable = report.profitable,
        rejected = report.rejected,
        insufficient = report.insufficient_data,
        report_file = %cfg.engine.report_file,
        "ARBITER run complete."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arbiter=info"));

    let json_logging = std::env::var("ARBITER_LOG_JSON").is_ok();

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
