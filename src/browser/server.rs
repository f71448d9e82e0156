//! Persistent browser server
//!
//! One headless Chromium process serves every audit session; sessions connect
//! over the DevTools websocket instead of paying a full launch per run. The
//! handle is an explicit service object constructed once at startup, with a
//! mutex serializing start/stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ShopperConfig;

use super::BrowserError;

/// Find Chrome/Chromium executable on the system
fn find_chrome() -> Option<std::path::PathBuf> {
    let candidates: Vec<std::path::PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            std::path::PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            std::path::PathBuf::from(
                r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            ),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(std::path::PathBuf::from(format!(
                r"{}\Google\Chrome\Application\chrome.exe",
                local
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![std::path::PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        )]
    } else {
        vec![
            std::path::PathBuf::from("/usr/bin/chromium"),
            std::path::PathBuf::from("/usr/bin/chromium-browser"),
            std::path::PathBuf::from("/usr/bin/google-chrome"),
            std::path::PathBuf::from("/usr/bin/google-chrome-stable"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// A running server process
struct ServerHandle {
    browser: Browser,
    endpoint: String,
    handler_task: JoinHandle<()>,
    /// Cleared by the handler task when the CDP stream ends (Chrome exited)
    alive: Arc<AtomicBool>,
}

impl ServerHandle {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }
}

/// A client connection to the shared server. Owns its CDP event loop task;
/// dropping the connection never shuts the server down.
pub struct BrowserConnection {
    pub browser: Browser,
    handler_task: JoinHandle<()>,
}

impl Drop for BrowserConnection {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// Lifecycle manager for the shared Chromium server process
pub struct BrowserServer {
    inner: Mutex<Option<ServerHandle>>,
}

impl BrowserServer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Launch the server process if it is not already running and return the
    /// DevTools websocket endpoint. Idempotent: a live server keeps its
    /// endpoint; a handle whose process died is replaced.
    pub async fn start(&self, config: &ShopperConfig) -> Result<String, BrowserError> {
        let mut inner = self.inner.lock().await;

        let stale = match inner.as_ref() {
            Some(handle) if handle.is_alive() => {
                debug!("Browser server already running at {}", handle.endpoint);
                return Ok(handle.endpoint.clone());
            }
            Some(_) => true,
            None => false,
        };

        if stale {
            warn!("Browser server handle is stale (process gone), relaunching");
            if let Some(mut old) = inner.take() {
                old.handler_task.abort();
                let _ = old.browser.kill().await;
            }
        }

        let handle = Self::launch(config).await?;
        let endpoint = handle.endpoint.clone();
        *inner = Some(handle);
        Ok(endpoint)
    }

    async fn launch(config: &ShopperConfig) -> Result<ServerHandle, BrowserError> {
        info!("Launching persistent headless Chromium...");

        let mut builder = BrowserConfig::builder();

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        } else if let Some(chrome_path) = find_chrome() {
            info!("Auto-detected Chrome at: {}", chrome_path.display());
            builder = builder.chrome_executable(chrome_path);
        } else {
            return Err(BrowserError::LaunchFailed(
                "Chrome/Chromium not found on this system".to_string(),
            ));
        }

        // Hardening flags: sandbox off (container/VPS friendly), automation
        // banners suppressed, fixed user agent so headless is not obvious.
        builder = builder
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--window-position=0,0")
            .arg("--ignore-certificate-errors")
            .arg(format!("--user-agent={}", config.user_agent))
            .window_size(config.viewport_width, config.viewport_height);

        let browser_config = builder.build().map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let endpoint = browser.websocket_address().to_string();

        let alive = Arc::new(AtomicBool::new(true));
        let alive_for_handler = alive.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser server handler error: {}", e);
                }
            }
            // Stream ended: Chrome exited or the connection dropped
            warn!("Browser server disconnected (event handler ended)");
            alive_for_handler.store(false, Ordering::Relaxed);
        });

        info!("Browser server ready at: {}", truncate(&endpoint, 60));

        Ok(ServerHandle {
            browser,
            endpoint,
            handler_task,
            alive,
        })
    }

    /// Connect a new CDP client to the running server, starting it first when
    /// needed.
    pub async fn connect(&self, config: &ShopperConfig) -> Result<BrowserConnection, BrowserError> {
        let endpoint = self.start(config).await?;

        let (browser, mut handler) = Browser::connect(endpoint)
            .await
            .map_err(|e| BrowserError::ConnectFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Session handler error: {}", e);
                }
            }
        });

        Ok(BrowserConnection {
            browser,
            handler_task,
        })
    }

    /// Current endpoint, if a server handle exists
    pub async fn endpoint(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .as_ref()
            .map(|h| h.endpoint.clone())
    }

    /// Terminate the server process. No-op when not running.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(mut handle) = inner.take() {
            info!("Shutting down browser server...");
            handle.handler_task.abort();
            let _ = handle.browser.close().await;
            let _ = handle.browser.kill().await;
        }
    }

    /// Restart the server when the handle has none running. Also covers the
    /// crashed-process case via the handler-task alive flag.
    pub async fn health_check(&self, config: &ShopperConfig) -> Result<(), BrowserError> {
        let needs_start = {
            let inner = self.inner.lock().await;
            match inner.as_ref() {
                Some(handle) => !handle.is_alive(),
                None => true,
            }
        };

        if needs_start {
            warn!("Browser server not running, restarting...");
            self.start(config).await?;
        }
        Ok(())
    }

    /// Whether a live server handle is held
    pub async fn is_running(&self) -> bool {
        self.inner
            .lock()
            .await
            .as_ref()
            .map(|h| h.is_alive())
            .unwrap_or(false)
    }
}

impl Default for BrowserServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Safe prefix of a string for logging
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("ws://localhost:9222/devtools", 8), "ws://loc");
        assert_eq!(truncate("short", 60), "short");
    }

    #[tokio::test]
    async fn test_new_server_has_no_endpoint() {
        let server = BrowserServer::new();
        assert!(server.endpoint().await.is_none());
        assert!(!server.is_running().await);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let server = BrowserServer::new();
        server.stop().await;
        assert!(!server.is_running().await);
    }
}
