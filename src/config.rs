//! Audit target configuration
//!
//! Targets, thresholds and scan bounds are injected configuration, never
//! hardcoded in the scenarios. Credentials come from the environment so they
//! never land in the config file.

use std::path::PathBuf;

use tracing::{error, info, warn};

/// Scenario selected for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Standard,
    OmniScan,
}

impl Mode {
    /// Resolve the mode from the `GHOST_MODE` environment flag.
    /// Anything other than `OMNI_SCAN` falls back to the standard flow.
    pub fn from_env() -> Self {
        match std::env::var("GHOST_MODE").as_deref() {
            Ok("OMNI_SCAN") => Mode::OmniScan,
            _ => Mode::Standard,
        }
    }
}

/// QA login credentials (key-value lookup from the environment)
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaCredentials {
    pub email: String,
    pub password: String,
}

/// Configuration for one audit target
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopperConfig {
    /// Base site URL
    pub site_url: String,
    /// Login page URL
    pub login_url: String,
    /// Post-login dashboard URL
    pub dashboard_url: String,

    /// QA credentials (not persisted, filled from env)
    #[serde(skip)]
    pub credentials: QaCredentials,

    /// Max acceptable initial page load in milliseconds
    #[serde(default = "default_page_load_ms")]
    pub page_load_ms: u64,
    /// Max acceptable API response in milliseconds
    #[serde(default = "default_api_response_ms")]
    pub api_response_ms: u64,

    /// Omni-scan page budget
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Methodical interactions per page
    #[serde(default = "default_max_interactions")]
    pub max_interactions: usize,
    /// Chaos Monkey click budget
    #[serde(default = "default_max_chaos_clicks")]
    pub max_chaos_clicks: usize,
    /// Issue count above which a run fails
    #[serde(default = "default_issues_threshold")]
    pub issues_threshold: usize,

    /// Directory for evidence screenshots (created on demand)
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,

    /// Browser viewport
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    /// Accept-Language sent by the audit browser
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Fixed user agent (hides the headless signature)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Path to Chrome/Chromium executable (auto-detected when unset)
    #[serde(default)]
    pub chrome_path: Option<String>,
}

fn default_page_load_ms() -> u64 { 8000 }
fn default_api_response_ms() -> u64 { 2000 }
fn default_max_pages() -> usize { 30 }
fn default_max_interactions() -> usize { 5 }
fn default_max_chaos_clicks() -> usize { 15 }
fn default_issues_threshold() -> usize { 5 }
fn default_screenshot_dir() -> PathBuf { PathBuf::from("screenshots") }
fn default_viewport_width() -> u32 { 1280 }
fn default_viewport_height() -> u32 { 720 }
fn default_locale() -> String { "fr-FR".to_string() }
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

impl Default for ShopperConfig {
    fn default() -> Self {
        Self {
            site_url: "https://mediconvoi.fr".to_string(),
            login_url: "https://mediconvoi.fr/login".to_string(),
            dashboard_url: "https://mediconvoi.fr/dashboard".to_string(),
            credentials: QaCredentials::default(),
            page_load_ms: default_page_load_ms(),
            api_response_ms: default_api_response_ms(),
            max_pages: default_max_pages(),
            max_interactions: default_max_interactions(),
            max_chaos_clicks: default_max_chaos_clicks(),
            issues_threshold: default_issues_threshold(),
            screenshot_dir: default_screenshot_dir(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            locale: default_locale(),
            user_agent: default_user_agent(),
            chrome_path: None,
        }
    }
}

impl ShopperConfig {
    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ghost-shopper").join("config.json"))
    }

    /// Load config from file, then overlay credentials from the environment
    /// (`GHOST_QA_EMAIL` / `GHOST_QA_PASSWORD`).
    pub fn load() -> Self {
        let mut config = Self::load_file();
        config.credentials = QaCredentials {
            email: std::env::var("GHOST_QA_EMAIL").unwrap_or_default(),
            password: std::env::var("GHOST_QA_PASSWORD").unwrap_or_default(),
        };
        config
    }

    fn load_file() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str(&content) {
                        Ok(config) => {
                            info!("Loaded config from {:?}", path);
                            return config;
                        }
                        Err(e) => {
                            warn!("Failed to parse config file: {}", e);
                        }
                    },
                    Err(e) => {
                        warn!("Failed to read config file: {}", e);
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to file (credentials excluded)
    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Failed to create config directory: {}", e);
                    return;
                }
            }

            match serde_json::to_string_pretty(self) {
                Ok(content) => {
                    if let Err(e) = std::fs::write(&path, content) {
                        error!("Failed to save config: {}", e);
                    } else {
                        info!("Config saved to {:?}", path);
                    }
                }
                Err(e) => {
                    error!("Failed to serialize config: {}", e);
                }
            }
        }
    }

    /// Host of the audited site, used for same-origin link admission
    pub fn site_host(&self) -> Option<String> {
        url::Url::parse(&self.site_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_and_bounds() {
        let config = ShopperConfig::default();
        assert_eq!(config.page_load_ms, 8000);
        assert_eq!(config.api_response_ms, 2000);
        assert_eq!(config.max_pages, 30);
        assert_eq!(config.max_interactions, 5);
        assert_eq!(config.max_chaos_clicks, 15);
        assert_eq!(config.issues_threshold, 5);
        assert_eq!(config.viewport_width, 1280);
        assert_eq!(config.viewport_height, 720);
    }

    #[test]
    fn test_site_host() {
        let config = ShopperConfig::default();
        assert_eq!(config.site_host().as_deref(), Some("mediconvoi.fr"));
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let config: ShopperConfig = serde_json::from_str(
            r#"{"siteUrl":"https://example.org","loginUrl":"https://example.org/login","dashboardUrl":"https://example.org/dashboard"}"#,
        )
        .unwrap();
        assert_eq!(config.site_url, "https://example.org");
        assert_eq!(config.max_pages, 30);
        assert_eq!(config.issues_threshold, 5);
    }
}
