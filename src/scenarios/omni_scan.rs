//! Omni-scan scenario
//!
//! Breadth-first crawl of the application's same-origin pages: authenticate
//! (best effort), then dequeue URLs in FIFO order, probe each page, harvest
//! its links and run the methodical interaction pass. A failure on one page
//! never aborts the crawl.

use std::time::Duration;

use chromiumoxide::Page;
use tracing::{info, warn};

use crate::browser::dom;
use crate::browser::BrowserError;
use crate::config::ShopperConfig;
use crate::crawl::CrawlFrontier;
use crate::interactions;
use crate::probes::Probes;
use crate::report::{IssueKind, SharedReport};

use super::standard::submit_login;

const LOADING_OVERLAY: &str = "#indicateur-chargement";

pub async fn run(
    page: &Page,
    report: &SharedReport,
    probes: &Probes,
    config: &ShopperConfig,
) -> Result<(), BrowserError> {
    info!("Starting full-site scan...");
    report.lock().step("Mode Omni-Scan Activé");

    bypass_login(page, report, config).await;

    let origin_host = config.site_host().unwrap_or_default();
    let mut frontier = CrawlFrontier::new(origin_host, config.max_pages);
    frontier.seed(config.dashboard_url.clone());
    frontier.seed(config.site_url.clone());

    while let Some(current_url) = frontier.next() {
        info!(
            "Scanning: {} ({}/{})",
            current_url,
            frontier.scanned(),
            config.max_pages
        );

        if let Err(e) = scan_page(page, report, probes, config, &mut frontier, &current_url).await {
            warn!("Scan error on {}: {}", current_url, e);
            report.lock().issue(
                IssueKind::ScanCrash,
                format!("{}: {}", current_url, e),
            );
        }
    }

    report
        .lock()
        .step(format!("Fin Omni-Scan: {} pages visitées.", frontier.scanned()));
    Ok(())
}

/// Probe one page: navigate, record reachability, harvest links, interact.
async fn scan_page(
    page: &Page,
    report: &SharedReport,
    probes: &Probes,
    config: &ShopperConfig,
    frontier: &mut CrawlFrontier,
    current_url: &str,
) -> Result<(), BrowserError> {
    // Reset the latch so this read cannot see the previous page's status
    probes.reset_document_status();
    tokio::time::timeout(Duration::from_secs(30), page.goto(current_url))
        .await
        .map_err(|_| BrowserError::Timeout(format!("navigation to {} timed out", current_url)))?
        .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;

    if let Some(status) = probes.wait_document_status(Duration::from_secs(1)).await {
        if status >= 400 {
            report.lock().issue(
                IssueKind::Scan(status),
                format!("Impossible d'accéder à {}", current_url),
            );
            return Ok(());
        }
    }

    dom::wait_for_hidden(page, LOADING_OVERLAY, Duration::from_secs(10)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    report
        .lock()
        .step(format!("Scan Page: {}", page_label(current_url)));

    // Harvest links before interacting: clicks may navigate away
    for link in dom::collect_links(page).await? {
        frontier.admit(&link);
    }

    interactions::methodical_interact(page, config).await;
    Ok(())
}

/// Quick authentication pass. Failures are swallowed: either we are already
/// authenticated or the scan continues on the anonymous surface.
async fn bypass_login(page: &Page, report: &SharedReport, config: &ShopperConfig) {
    info!("Attempting login bypass...");

    let nav = tokio::time::timeout(Duration::from_secs(30), page.goto(config.login_url.as_str())).await;
    if !matches!(nav, Ok(Ok(_))) {
        warn!("Login page unreachable, continuing unauthenticated");
        return;
    }

    match submit_login(page, config).await {
        Ok(()) => {
            if dom::wait_for_url_contains(page, "/dashboard", Duration::from_secs(15)).await {
                info!("Login bypass succeeded");
                report.lock().step("Login Bypass: Succès");
            } else {
                info!("Login bypass inconclusive (or already logged in), continuing...");
            }
        }
        Err(e) => {
            info!("Login bypass failed ({}), continuing...", e);
        }
    }
}

/// Human-readable label for a scanned page: last path segment, or `home`
fn page_label(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "home".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_label() {
        assert_eq!(page_label("https://mediconvoi.fr/dashboard"), "dashboard");
        assert_eq!(page_label("https://mediconvoi.fr/admin/users"), "users");
        assert_eq!(page_label("https://mediconvoi.fr/"), "home");
        assert_eq!(page_label("https://mediconvoi.fr"), "home");
    }
}
