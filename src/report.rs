//! Session report model
//!
//! One audit run produces exactly one `SessionReport`. Scenarios append steps,
//! probes and scenarios append issues; both lists are append-only and keep
//! execution order.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

/// Report shared between the running scenario and the probe listener tasks.
pub type SharedReport = Arc<Mutex<SessionReport>>;

/// Category of a recorded anomaly.
///
/// Each variant maps to the bracket tag shown in the rendered issue line,
/// e.g. `Network(404)` renders as `[NETWORK 404]`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    /// Console message at error level
    JsError,
    /// Console message at warning level
    JsWarning,
    /// Uncaught page exception
    JsCrash,
    /// HTTP response with the given status (>= 400)
    Network(u16),
    /// Performance threshold breach
    Perf,
    /// Navigation deviation (missing redirect, wrong URL)
    Nav,
    /// UX deviation (expected control did not appear)
    Ux,
    /// Login produced neither an error nor a redirect
    Login,
    /// No bookable slot available
    Stock,
    /// Crawled page answered with the given status (>= 400)
    Scan(u16),
    /// Exception while processing one crawled page
    ScanCrash,
    /// Chaos exploration itself failed
    Chaos,
    /// Scenario entry point missing (the only fatal deviation)
    Blocker,
}

impl IssueKind {
    /// Bracket tag used when rendering the issue line
    pub fn tag(&self) -> String {
        match self {
            IssueKind::JsError => "JS ERROR".to_string(),
            IssueKind::JsWarning => "JS WARNING".to_string(),
            IssueKind::JsCrash => "CRASH JS".to_string(),
            IssueKind::Network(status) => format!("NETWORK {}", status),
            IssueKind::Perf => "PERF".to_string(),
            IssueKind::Nav => "NAV".to_string(),
            IssueKind::Ux => "UX".to_string(),
            IssueKind::Login => "LOGIN".to_string(),
            IssueKind::Stock => "STOCK".to_string(),
            IssueKind::Scan(status) => format!("SCAN {}", status),
            IssueKind::ScanCrash => "SCAN CRASH".to_string(),
            IssueKind::Chaos => "CHAOS".to_string(),
            IssueKind::Blocker => "EXPERT ERROR".to_string(),
        }
    }
}

/// One recorded anomaly
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.tag(), self.message)
    }
}

/// Mutable aggregate record for one audit run
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub success: bool,
    pub steps: Vec<String>,
    pub issues: Vec<Issue>,
    pub screenshot_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl SessionReport {
    pub fn new() -> Self {
        Self {
            success: true,
            steps: Vec::new(),
            issues: Vec::new(),
            screenshot_path: None,
            error: None,
        }
    }

    /// Wrap a fresh report for sharing with the probe tasks
    pub fn shared() -> SharedReport {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Append a narrative step (insertion order = execution order)
    pub fn step(&mut self, step: impl Into<String>) {
        self.steps.push(step.into());
    }

    /// Append an anomaly
    pub fn issue(&mut self, kind: IssueKind, message: impl Into<String>) {
        self.issues.push(Issue {
            kind,
            message: message.into(),
        });
    }

    /// A report counts as failed when the success flag was cleared or the
    /// accumulated anomalies exceed the configured threshold.
    pub fn is_failed(&self, issues_threshold: usize) -> bool {
        !self.success || self.issues.len() > issues_threshold
    }

    /// Terminal threshold evaluation: clears the success flag with a summary
    /// error when the run accumulated more anomalies than allowed. Returns
    /// whether the threshold was breached.
    pub fn apply_threshold(&mut self, issues_threshold: usize) -> bool {
        if self.issues.len() > issues_threshold {
            self.success = false;
            self.error = Some(format!(
                "Trop d'anomalies détectées ({})",
                self.issues.len()
            ));
            true
        } else {
            false
        }
    }
}

impl Default for SessionReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_report_is_successful_and_empty() {
        let report = SessionReport::new();
        assert!(report.success);
        assert!(report.steps.is_empty());
        assert!(report.issues.is_empty());
        assert!(report.screenshot_path.is_none());
        assert!(report.error.is_none());
    }

    #[test]
    fn test_issue_display_tags() {
        let js = Issue {
            kind: IssueKind::JsError,
            message: "NullPointer".to_string(),
        };
        assert_eq!(js.to_string(), "[JS ERROR] NullPointer");

        let net = Issue {
            kind: IssueKind::Network(404),
            message: "https://mediconvoi.fr/api/missing".to_string(),
        };
        assert_eq!(net.to_string(), "[NETWORK 404] https://mediconvoi.fr/api/missing");

        let scan = Issue {
            kind: IssueKind::Scan(500),
            message: "Impossible d'accéder à /admin".to_string(),
        };
        assert!(scan.to_string().starts_with("[SCAN 500]"));
    }

    #[test]
    fn test_threshold_breach_clears_success() {
        let mut report = SessionReport::new();
        for i in 0..6 {
            report.issue(IssueKind::Nav, format!("issue {}", i));
        }

        assert!(report.apply_threshold(5));
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("Trop d'anomalies détectées (6)"));
        assert!(report.is_failed(5));
    }

    #[test]
    fn test_threshold_not_breached_keeps_success() {
        let mut report = SessionReport::new();
        for i in 0..5 {
            report.issue(IssueKind::Perf, format!("issue {}", i));
        }

        assert!(!report.apply_threshold(5));
        assert!(report.success);
        assert!(report.error.is_none());
        assert!(!report.is_failed(5));
    }

    #[test]
    fn test_steps_and_issues_keep_insertion_order() {
        let mut report = SessionReport::new();
        report.step("first");
        report.issue(IssueKind::Perf, "slow");
        report.step("second");
        report.issue(IssueKind::Login, "no reaction");

        assert_eq!(report.steps, vec!["first", "second"]);
        assert_eq!(report.issues[0].kind, IssueKind::Perf);
        assert_eq!(report.issues[1].kind, IssueKind::Login);
    }
}
