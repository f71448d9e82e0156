//! Session orchestrator
//!
//! Top-level entry point for one audit run: acquire a connection from the
//! shared browser server, open an isolated context and page, arm stealth and
//! probes, dispatch the selected scenario, evaluate the issue threshold and
//! return the finished report. The browser context is torn down on every exit
//! path; the caller always gets a report unless the failure happened before a
//! page existed.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chromiumoxide::cdp::browser_protocol::browser::{GrantPermissionsParams, PermissionType};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, Page};
use tracing::{error, info, warn};

use crate::browser::{BrowserError, BrowserServer};
use crate::config::{Mode, ShopperConfig};
use crate::probes::{inject_stealth, Probes};
use crate::report::{SessionReport, SharedReport};
use crate::scenarios;

/// Run one complete audit session and return its report.
pub async fn run_session(
    server: &BrowserServer,
    config: &ShopperConfig,
    mode: Mode,
) -> Result<SessionReport, BrowserError> {
    info!("Starting QA session (mode: {:?})...", mode);

    // Failures before a page exists propagate: there is no report scaffold yet.
    let connection = server.connect(config).await?;
    let browser = &connection.browser;

    let context_id = browser
        .execute(CreateBrowserContextParams::default())
        .await
        .map_err(|e| BrowserError::ConnectFailed(format!("createBrowserContext: {}", e)))?
        .result
        .browser_context_id;

    let page = match open_session_page(browser, config, &context_id).await {
        Ok(page) => page,
        Err(e) => {
            dispose_context(browser, &context_id).await;
            return Err(e);
        }
    };

    let report = SessionReport::shared();
    let outcome = drive_session(&page, &report, config, mode).await;

    // Mandatory cleanup, regardless of which path was taken
    if let Err(e) = page.clone().close().await {
        warn!("Page close failed: {}", e);
    }
    dispose_context(browser, &context_id).await;
    drop(connection);

    if let Err(ref e) = outcome {
        error!("Session crashed: {}", e);
        // Covers failures that escaped before the scenario branch could
        // annotate the report (stealth injection, probe attach)
        let mut report = report.lock();
        report.success = false;
        if report.error.is_none() {
            report.error = Some(e.to_string());
        }
    }

    let report = std::sync::Arc::try_unwrap(report)
        .map(|mutex| mutex.into_inner())
        .unwrap_or_else(|shared| shared.lock().clone());

    log_summary(&report);
    Ok(report)
}

/// Open the isolated page for this session with fixed emulation settings
async fn open_session_page(
    browser: &Browser,
    config: &ShopperConfig,
    context_id: &chromiumoxide::cdp::browser_protocol::browser::BrowserContextId,
) -> Result<Page, BrowserError> {
    let target = CreateTargetParams::builder()
        .url("about:blank")
        .browser_context_id(context_id.clone())
        .build()
        .map_err(BrowserError::ConnectFailed)?;

    let page = browser
        .new_page(target)
        .await
        .map_err(|e| BrowserError::ConnectFailed(format!("newPage: {}", e)))?;

    // Fixed viewport + locale, same for every run so evidence is comparable
    let metrics = SetDeviceMetricsOverrideParams::builder()
        .width(config.viewport_width as i64)
        .height(config.viewport_height as i64)
        .device_scale_factor(1.0)
        .mobile(false)
        .build()
        .map_err(BrowserError::ConnectFailed)?;
    page.execute(metrics)
        .await
        .map_err(|e| BrowserError::ConnectFailed(format!("setDeviceMetrics: {}", e)))?;

    let ua = SetUserAgentOverrideParams::builder()
        .user_agent(config.user_agent.clone())
        .accept_language(format!("{},fr;q=0.9,en;q=0.8", config.locale))
        .build()
        .map_err(BrowserError::ConnectFailed)?;
    page.execute(ua)
        .await
        .map_err(|e| BrowserError::ConnectFailed(format!("setUserAgent: {}", e)))?;

    let permissions = GrantPermissionsParams::builder()
        .permission(PermissionType::Geolocation)
        .browser_context_id(context_id.clone())
        .build()
        .map_err(BrowserError::ConnectFailed)?;
    browser
        .execute(permissions)
        .await
        .map_err(|e| BrowserError::ConnectFailed(format!("grantPermissions: {}", e)))?;

    Ok(page)
}

/// Arm the page, run the scenario and finalize the report. Returns the
/// scenario error, if any, after the report has been completed.
async fn drive_session(
    page: &Page,
    report: &SharedReport,
    config: &ShopperConfig,
    mode: Mode,
) -> Result<(), BrowserError> {
    inject_stealth(page).await?;
    let mut probes = Probes::attach(page, report.clone()).await?;

    let t_start = Instant::now();
    let result = match mode {
        Mode::OmniScan => scenarios::omni_scan::run(page, report, &probes, config).await,
        Mode::Standard => scenarios::standard::run(page, report, &probes, config, t_start).await,
    };

    match result {
        Ok(()) => {
            {
                let mut report = report.lock();
                if report.apply_threshold(config.issues_threshold) {
                    warn!(
                        "Issue threshold breached ({} issues)",
                        report.issues.len()
                    );
                }
            }

            let tag = if report.lock().issues.is_empty() { "OK" } else { "WARN" };
            let path = screenshot_path(&config.screenshot_dir, &format!("QA_{}", tag));
            match capture_screenshot(page, &path).await {
                Ok(()) => report.lock().screenshot_path = Some(path),
                Err(e) => warn!("Final screenshot failed: {}", e),
            }

            probes.detach();
            info!("Audit finished.");
            Ok(())
        }
        Err(e) => {
            let path = screenshot_path(&config.screenshot_dir, "expert_crash");
            let shot = capture_screenshot(page, &path).await;

            {
                let mut report = report.lock();
                report.success = false;
                report.error = Some(e.to_string());
                if shot.is_ok() {
                    report.screenshot_path = Some(path);
                }
            }

            probes.detach();
            Err(e)
        }
    }
}

/// Evidence file path: `<dir>/<prefix>_<timestamp>.png`
fn screenshot_path(dir: &Path, prefix: &str) -> PathBuf {
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S%3fZ");
    dir.join(format!("{}_{}.png", prefix, timestamp))
}

/// Write a PNG of the current page, creating the evidence directory on demand
async fn capture_screenshot(page: &Page, path: &Path) -> Result<(), BrowserError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let params = ScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Png)
        .build();

    page.save_screenshot(params, path)
        .await
        .map_err(|e| BrowserError::ScreenshotFailed(e.to_string()))?;

    info!("Screenshot saved: {}", path.display());
    Ok(())
}

/// Mirror the anomaly list into the log, the way operators skim a run
fn log_summary(report: &SessionReport) {
    if report.issues.is_empty() {
        return;
    }
    warn!("ANOMALIES DETECTED:");
    for issue in &report.issues {
        warn!("   - {}", issue);
    }
}

/// Dispose the session's browser context; failures are logged only, since
/// this runs on cleanup paths.
async fn dispose_context(
    browser: &Browser,
    context_id: &chromiumoxide::cdp::browser_protocol::browser::BrowserContextId,
) {
    let params = DisposeBrowserContextParams::builder()
        .browser_context_id(context_id.clone())
        .build();

    match params {
        Ok(params) => {
            if let Err(e) = browser.execute(params).await {
                warn!("Context dispose failed: {}", e);
            }
        }
        Err(e) => warn!("Context dispose failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screenshot_path_shape() {
        let path = screenshot_path(Path::new("screenshots"), "QA_OK");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("QA_OK_"));
        assert!(name.ends_with(".png"));
        // ISO-like timestamp with dashes, no colons (filesystem safe)
        assert!(!name.contains(':'));
    }

    #[test]
    fn test_screenshot_dir_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("evidence").join("run1");
        let path = screenshot_path(&nested, "QA_WARN");

        // capture_screenshot creates parents before writing; mimic that here
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        assert!(nested.exists());
    }
}
