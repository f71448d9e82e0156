//! Ghost Shopper - QA audit runner
//!
//! Runs one audit session against the configured target and prints the
//! session report as JSON on stdout. The process exit code reflects the
//! pass/fail verdict so cron and CI callers need not parse the report.
//!
//! Environment variables:
//! - `GHOST_MODE` - `STANDARD` (default) or `OMNI_SCAN`
//! - `GHOST_QA_EMAIL` / `GHOST_QA_PASSWORD` - QA login credentials

use std::process::ExitCode;

use tracing::{error, info, warn};

use ghost_shopper::{init_logging, log_dir, run_session, BrowserServer, Mode, ShopperConfig};

#[tokio::main]
async fn main() -> ExitCode {
    // Held until main returns so the rolling file appender flushes its
    // buffered lines; never bypass it with process::exit.
    let _guard = init_logging();

    info!("Starting Ghost Shopper QA session...");
    if let Some(dir) = log_dir() {
        info!("Log files saved to: {}", dir.display());
    }

    let config = ShopperConfig::load();
    let mode = Mode::from_env();

    if config.credentials.email.is_empty() {
        warn!("GHOST_QA_EMAIL not set; login stages will exercise the empty-credentials path");
    }

    let server = BrowserServer::new();
    let result = run_session(&server, &config, mode).await;
    server.stop().await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!("Session failed before a report could be produced: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Report serialization failed: {}", e),
    }

    if report.is_failed(config.issues_threshold) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
