//! Monitoring probes
//!
//! Passive listeners wired to a page for the lifetime of a session: console
//! errors, uncaught page exceptions and HTTP responses >= 400 all land in the
//! shared session report. The probes also latch the status of the most recent
//! document response so scenarios can read the navigation status code.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::browser::BrowserError;
use crate::report::{IssueKind, SharedReport};

/// Console noise that never counts as an anomaly
const CONSOLE_NOISE: &[&str] = &["DevTools", "third-party cookie", "React Router"];

/// Whether a console message matches the known-noise denylist
pub fn is_noise(text: &str) -> bool {
    CONSOLE_NOISE.iter().any(|needle| text.contains(needle))
}

/// Issue category for a console message level; `None` means log-only
pub fn console_issue_kind(level: &ConsoleApiCalledType) -> Option<IssueKind> {
    match level {
        ConsoleApiCalledType::Error => Some(IssueKind::JsError),
        ConsoleApiCalledType::Warning => Some(IssueKind::JsWarning),
        _ => None,
    }
}

/// Whether a response should be recorded as a network anomaly.
/// Favicon misses and 401s from the core auth backend (expected
/// unauthenticated probing) are not faults.
pub fn should_record_response(status: u16, url: &str) -> bool {
    if status < 400 {
        return false;
    }
    if url.contains("favicon") {
        return false;
    }
    if status == 401 && url.contains("supabase") {
        return false;
    }
    true
}

/// Render a console argument the way the browser console would
fn render_arg(arg: &RemoteObject) -> String {
    if let Some(value) = &arg.value {
        match value.as_str() {
            Some(s) => s.to_string(),
            None => value.to_string(),
        }
    } else {
        arg.description.clone().unwrap_or_default()
    }
}

/// Latched status of the most recent main-document response.
///
/// The listener task writes it, the scenario reads it. Must be reset before
/// each navigation whose status will be read: a navigation that produces no
/// document response (client-side route change, cached load) would otherwise
/// inherit the previous page's status. The CDP event can also land shortly
/// after `goto` resolves, so reads go through the bounded `wait`.
#[derive(Clone, Default)]
struct DocumentLatch(Arc<AtomicI64>);

impl DocumentLatch {
    fn record(&self, status: u16) {
        self.0.store(status as i64, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    fn get(&self) -> Option<u16> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            status => Some(status as u16),
        }
    }

    async fn wait(&self, timeout: Duration) -> Option<u16> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(status) = self.get() {
                return Some(status);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Attached probe set for one session
pub struct Probes {
    tasks: Vec<JoinHandle<()>>,
    document_status: DocumentLatch,
}

impl Probes {
    /// Wire the three passive listeners to the page, feeding the shared report.
    pub async fn attach(page: &Page, report: SharedReport) -> Result<Self, BrowserError> {
        let document_status = DocumentLatch::default();
        let mut tasks = Vec::with_capacity(3);

        // 1. Console probe (JS errors & warnings)
        let mut console_events = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(|e| BrowserError::ProbeFailed(e.to_string()))?;
        let console_report = report.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = console_events.next().await {
                let text = event
                    .args
                    .iter()
                    .map(render_arg)
                    .collect::<Vec<_>>()
                    .join(" ");

                if is_noise(&text) {
                    continue;
                }

                match console_issue_kind(&event.r#type) {
                    Some(kind) => {
                        warn!("JS ({:?}): {}", event.r#type, text);
                        console_report.lock().issue(kind, text);
                    }
                    None => debug!("JS (log): {}", text),
                }
            }
        }));

        // 2. Page crash probe (uncaught exceptions)
        let mut exception_events = page
            .event_listener::<EventExceptionThrown>()
            .await
            .map_err(|e| BrowserError::ProbeFailed(e.to_string()))?;
        let crash_report = report.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = exception_events.next().await {
                let details = &event.exception_details;
                let message = details
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                let stack = details
                    .stack_trace
                    .as_ref()
                    .map(|trace| {
                        trace
                            .call_frames
                            .iter()
                            .map(|f| {
                                format!(
                                    "    at {} ({}:{}:{})",
                                    f.function_name, f.url, f.line_number, f.column_number
                                )
                            })
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .unwrap_or_else(|| "<no stack>".to_string());

                error!("Uncaught page exception: {}", message);
                crash_report
                    .lock()
                    .issue(IssueKind::JsCrash, format!("{}\nSTACK: {}", message, stack));
            }
        }));

        // 3. Network probe (4xx/5xx responses)
        let mut response_events = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| BrowserError::ProbeFailed(e.to_string()))?;
        let network_report = report.clone();
        let latched_status = document_status.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = response_events.next().await {
                let status = event.response.status as u16;
                let url = event.response.url.clone();

                if matches!(event.r#type, ResourceType::Document) {
                    latched_status.record(status);
                }

                if should_record_response(status, &url) {
                    warn!("HTTP {}: {}", status, url);
                    network_report.lock().issue(IssueKind::Network(status), url);
                }
            }
        }));

        info!("Monitoring probes attached");
        Ok(Self {
            tasks,
            document_status,
        })
    }

    /// Status of the most recent main-document response, if any was seen
    /// since the last reset
    pub fn last_document_status(&self) -> Option<u16> {
        self.document_status.get()
    }

    /// Clear the status latch. Call right before a navigation whose status
    /// will be read, so a stale status from the previous page cannot leak
    /// into the verdict on this one.
    pub fn reset_document_status(&self) {
        self.document_status.reset();
    }

    /// Bounded wait for the document status of the navigation in flight.
    /// Returns `None` when no document response arrived within the timeout.
    pub async fn wait_document_status(&self, timeout: Duration) -> Option<u16> {
        self.document_status.wait(timeout).await
    }

    /// Stop the listener tasks
    pub fn detach(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Probes {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Patch the automation marker before any page script runs, so headless
/// detection heuristics see a normal browser.
pub async fn inject_stealth(page: &Page) -> Result<(), BrowserError> {
    let script = AddScriptToEvaluateOnNewDocumentParams::builder()
        .source(
            "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });",
        )
        .build()
        .map_err(BrowserError::JavaScriptError)?;

    page.execute(script)
        .await
        .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

    debug!("Stealth script injected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SessionReport;

    #[test]
    fn test_noise_denylist() {
        assert!(is_noise("DevTools listening on ws://..."));
        assert!(is_noise("Reading third-party cookie is blocked"));
        assert!(is_noise("React Router will soon require..."));
        assert!(!is_noise("Uncaught TypeError: NullPointer"));
    }

    #[test]
    fn test_console_level_mapping() {
        assert_eq!(
            console_issue_kind(&ConsoleApiCalledType::Error),
            Some(IssueKind::JsError)
        );
        assert_eq!(
            console_issue_kind(&ConsoleApiCalledType::Warning),
            Some(IssueKind::JsWarning)
        );
        assert_eq!(console_issue_kind(&ConsoleApiCalledType::Log), None);
        assert_eq!(console_issue_kind(&ConsoleApiCalledType::Info), None);
    }

    #[test]
    fn test_response_filter() {
        assert!(should_record_response(404, "https://mediconvoi.fr/api/missing"));
        assert!(should_record_response(500, "https://mediconvoi.fr/api/quote"));
        assert!(!should_record_response(200, "https://mediconvoi.fr/"));
        assert!(!should_record_response(404, "https://mediconvoi.fr/favicon.ico"));
        assert!(!should_record_response(401, "https://xyz.supabase.co/auth/v1/user"));
        // 401 elsewhere is still a fault
        assert!(should_record_response(401, "https://mediconvoi.fr/api/orders"));
    }

    #[test]
    fn test_document_latch_reset_between_navigations() {
        // A navigation that yields no document response must not inherit the
        // previous page's status.
        let latch = DocumentLatch::default();
        assert_eq!(latch.get(), None);

        latch.record(404);
        assert_eq!(latch.get(), Some(404));

        latch.reset();
        assert_eq!(latch.get(), None);

        latch.record(200);
        assert_eq!(latch.get(), Some(200));
    }

    #[tokio::test]
    async fn test_document_latch_wait_sees_late_event() {
        // The listener task can record the status shortly after goto resolves
        let latch = DocumentLatch::default();
        let writer = latch.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer.record(500);
        });

        assert_eq!(latch.wait(Duration::from_secs(2)).await, Some(500));
    }

    #[tokio::test]
    async fn test_document_latch_wait_times_out_empty() {
        let latch = DocumentLatch::default();
        assert_eq!(latch.wait(Duration::from_millis(120)).await, None);
    }

    #[test]
    fn test_console_error_filtering_end_to_end() {
        // Same shape as a session that logs one noisy and one real error:
        // only the real one lands in the report.
        let report = SessionReport::shared();
        for text in ["DevTools failed to load source map", "NullPointer in booking.js"] {
            if is_noise(text) {
                continue;
            }
            if let Some(kind) = console_issue_kind(&ConsoleApiCalledType::Error) {
                report.lock().issue(kind, text);
            }
        }

        let report = report.lock();
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].to_string(), "[JS ERROR] NullPointer in booking.js");
    }
}
