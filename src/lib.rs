//! Ghost Shopper
//!
//! A headless-browser QA agent that plays a real customer against the booking
//! and login journey of the target site, instruments the pages with monitoring
//! probes and produces a structured audit report with screenshots.

pub mod browser;
pub mod config;
pub mod crawl;
pub mod interactions;
pub mod orchestrator;
pub mod probes;
pub mod report;
pub mod scenarios;

use std::path::PathBuf;

pub use browser::{BrowserError, BrowserServer};
pub use config::{Mode, ShopperConfig};
pub use orchestrator::run_session;
pub use report::{Issue, IssueKind, SessionReport};

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ghost-shopper").join("logs"))
}

/// Initialize logging: console layer plus a daily-rolling file layer when a
/// log directory is available.
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "ghost-shopper.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}
