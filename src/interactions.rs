//! Interaction engine
//!
//! Two strategies over a live page: Chaos Monkey (blind clicking across
//! interactive elements) and methodical interaction (fill inputs, open detail
//! views, never touch destructive controls). Both tolerate elements vanishing
//! mid-iteration: a failed single-element action is logged and skipped, never
//! propagated.

use std::time::Duration;

use chromiumoxide::Page;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::browser::dom;
use crate::config::ShopperConfig;
use crate::report::{IssueKind, SharedReport};

/// Elements the Chaos Monkey is allowed to hit
const CHAOS_SELECTOR: &str = "button, a, [role=\"button\"]";

/// Elements the methodical pass exercises
const METHODICAL_SELECTOR: &str = "button:not([disabled]), input:not([type=\"hidden\"]), select";

/// Marker string typed into every exercised input
const QA_FILL_VALUE: &str = "QA Test";

/// Minimum pause between chaos clicks
const CHAOS_PAUSE_BASE_MS: u64 = 400;
/// Random jitter added on top of the base pause
const CHAOS_PAUSE_JITTER_MS: u64 = 300;

/// Actions that must never be triggered during a scan
const DESTRUCTIVE_PATTERNS: &[&str] = &["supprimer", "delete", "logout", "deconnexion", "déconnexion"];

/// Texts that identify a safe detail/config affordance worth opening
const DETAIL_PATTERNS: &[&str] = &["voir", "détail", "detail", "config", "edit", "modifier"];

/// Case-insensitive match against the destructive-action denylist
pub fn is_destructive(text: &str) -> bool {
    let lower = text.to_lowercase();
    DESTRUCTIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Case-insensitive match against the detail-view patterns
pub fn is_detail_action(text: &str) -> bool {
    let lower = text.to_lowercase();
    DETAIL_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Number of click attempts the chaos pass will make
pub fn chaos_click_budget(available: usize, max_chaos_clicks: usize) -> usize {
    available.min(max_chaos_clicks)
}

/// Jittered pause between chaos clicks, like a distracted human
fn chaos_pause() -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=CHAOS_PAUSE_JITTER_MS);
    Duration::from_millis(CHAOS_PAUSE_BASE_MS + jitter)
}

/// Chaos Monkey: click through interactive elements in DOM order, bounded by
/// the configured click budget. Individual click failures are ignored; one
/// summary step is recorded at the end.
pub async fn chaos_explore(page: &Page, report: &SharedReport, config: &ShopperConfig) {
    let interactibles = dom::query_all(page, CHAOS_SELECTOR).await;
    debug!("{} interactive elements found", interactibles.len());

    let budget = chaos_click_budget(interactibles.len(), config.max_chaos_clicks);
    let mut clicked = 0usize;

    for element in interactibles.into_iter().take(budget) {
        if !dom::is_visible(&element).await || !dom::is_enabled(&element).await {
            continue;
        }

        let label = dom::element_text(&element).await;
        let label: String = label.chars().take(20).collect();
        debug!(
            "Chaos click on \"{}\"",
            if label.is_empty() { "<sans texte>" } else { label.as_str() }
        );

        match dom::click_with_timeout(&element, Duration::from_secs(2)).await {
            Ok(()) => clicked += 1,
            Err(e) => debug!("Chaos click failed (ignored): {}", e),
        }

        tokio::time::sleep(chaos_pause()).await;
    }

    info!("Chaos Monkey finished: {} clicks", clicked);
    report.lock().step(format!("Chaos Monkey: {} clics effectués", clicked));
}

/// Chaos pass with its outer failure recorded instead of propagated
pub async fn chaos_explore_guarded(
    page: &Page,
    report: &SharedReport,
    config: &ShopperConfig,
) {
    // query_all and the per-click paths already swallow their own errors, so
    // the only remaining failure mode is the page itself going away.
    if dom::current_url(page).await.is_empty() {
        report.lock().issue(
            IssueKind::Chaos,
            "Erreur durant l'exploration: page indisponible",
        );
        return;
    }
    chaos_explore(page, report, config).await;
}

/// Methodical pass: exercise up to `max_interactions` affordances on the page.
/// Inputs get the QA marker value, detail-style buttons are hovered and
/// clicked, everything else is hovered only. Destructive controls are skipped
/// without consuming budget.
pub async fn methodical_interact(page: &Page, config: &ShopperConfig) {
    let interactibles = dom::query_all(page, METHODICAL_SELECTOR).await;
    debug!("{} interactive elements detected", interactibles.len());

    let mut interactions = 0usize;

    for element in interactibles {
        if interactions >= config.max_interactions {
            break;
        }

        if !dom::is_visible(&element).await {
            continue;
        }

        let text = dom::element_text(&element).await;
        if is_destructive(&text) {
            warn!("Element \"{}\" skipped (safety filter)", text);
            continue;
        }

        let tag = match element
            .call_js_fn("function() { return this.tagName.toLowerCase(); }", false)
            .await
        {
            Ok(ret) => ret
                .result
                .value
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .unwrap_or_default(),
            Err(e) => {
                debug!("Element vanished mid-scan (ignored): {}", e);
                continue;
            }
        };

        let label: String = text.chars().take(20).collect();
        debug!("Testing action on <{}>: \"{}\"", tag, label);

        if let Err(e) = dom::hover(page, &element).await {
            debug!("Hover failed (ignored): {}", e);
            continue;
        }

        if tag == "input" {
            if let Err(e) = dom::fill_element(&element, QA_FILL_VALUE).await {
                debug!("Fill failed (ignored): {}", e);
            }
        } else if is_detail_action(&text) {
            match dom::click_with_timeout(&element, Duration::from_secs(1)).await {
                Ok(()) => interactions += 1,
                Err(e) => debug!("Detail click failed (ignored): {}", e),
            }
        }
    }
}

/// Pick the first enabled button whose label looks like a time slot (contains
/// a colon). Returns whether a slot was selected.
pub async fn select_available_slot(page: &Page, report: &SharedReport) -> bool {
    for button in dom::query_all(page, "button").await {
        let text = dom::element_text(&button).await;
        if !text.contains(':') {
            continue;
        }
        if !dom::is_enabled(&button).await {
            continue;
        }

        if let Err(e) = dom::click_with_timeout(&button, Duration::from_secs(2)).await {
            debug!("Slot click failed (ignored): {}", e);
            continue;
        }

        info!("Slot selected: {}", text);
        report.lock().step(format!("Modale: Créneau {} sélectionné", text));
        return true;
    }

    report.lock().issue(IssueKind::Stock, "Aucun créneau disponible dans la modale");
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destructive_filter() {
        assert!(is_destructive("Supprimer la tournée"));
        assert!(is_destructive("DELETE"));
        assert!(is_destructive("Logout"));
        assert!(is_destructive("Déconnexion"));
        assert!(is_destructive("deconnexion"));
        assert!(!is_destructive("Voir le détail"));
        assert!(!is_destructive("Confirmer pour 14:30"));
        assert!(!is_destructive(""));
    }

    #[test]
    fn test_detail_filter() {
        assert!(is_detail_action("Voir les créneaux"));
        assert!(is_detail_action("Détail"));
        assert!(is_detail_action("Configurer"));
        assert!(is_detail_action("Modifier"));
        assert!(is_detail_action("Edit"));
        assert!(!is_detail_action("Commander une course"));
        assert!(!is_detail_action("Supprimer"));
    }

    #[test]
    fn test_chaos_pause_stays_in_bounds() {
        for _ in 0..200 {
            let pause = chaos_pause().as_millis() as u64;
            assert!(pause >= CHAOS_PAUSE_BASE_MS);
            assert!(pause <= CHAOS_PAUSE_BASE_MS + CHAOS_PAUSE_JITTER_MS);
        }
    }

    #[test]
    fn test_chaos_click_budget() {
        // 50 clickable elements, budget of 15: at most 15 attempts
        assert_eq!(chaos_click_budget(50, 15), 15);
        assert_eq!(chaos_click_budget(7, 15), 7);
        assert_eq!(chaos_click_budget(0, 15), 0);
    }
}
