//! Bounded DOM primitives
//!
//! Thin helpers over chromiumoxide pages and elements. Every operation that
//! touches the page carries an explicit timeout; callers decide whether a
//! failure is swallowed or propagated.

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::{Element, Page};
use tracing::debug;

use super::BrowserError;

/// Poll interval for the wait_* helpers
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Quote a string for safe embedding inside an evaluated script
fn js_quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Evaluate an expression expected to yield a boolean; anything else counts
/// as `false`.
async fn eval_bool(page: &Page, expr: &str) -> bool {
    match page.evaluate(expr).await {
        Ok(result) => result.into_value::<bool>().unwrap_or(false),
        Err(e) => {
            debug!("eval_bool failed: {}", e);
            false
        }
    }
}

/// Query all elements matching a selector; query failures yield an empty list
pub async fn query_all(page: &Page, selector: &str) -> Vec<Element> {
    match page.find_elements(selector).await {
        Ok(elements) => elements,
        Err(e) => {
            debug!("Selector query failed ({}): {}", selector, e);
            Vec::new()
        }
    }
}

/// Visible text of an element, falling back to the input value
pub async fn element_text(element: &Element) -> String {
    if let Ok(Some(text)) = element.inner_text().await {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    if let Ok(Some(value)) = element.attribute("value").await {
        return value.trim().to_string();
    }
    String::new()
}

/// Whether the element takes up layout space and is not hidden by style
pub async fn is_visible(element: &Element) -> bool {
    let check = element
        .call_js_fn(
            "function() { \
                const r = this.getBoundingClientRect(); \
                const s = window.getComputedStyle(this); \
                return r.width > 0 && r.height > 0 \
                    && s.visibility !== 'hidden' && s.display !== 'none'; \
            }",
            false,
        )
        .await;

    match check {
        Ok(ret) => ret.result.value.and_then(|v| v.as_bool()).unwrap_or(false),
        Err(_) => false,
    }
}

/// Whether the element is not disabled
pub async fn is_enabled(element: &Element) -> bool {
    let check = element
        .call_js_fn("function() { return !this.disabled; }", false)
        .await;

    match check {
        Ok(ret) => ret.result.value.and_then(|v| v.as_bool()).unwrap_or(false),
        Err(_) => false,
    }
}

/// Click with a bounded timeout
pub async fn click_with_timeout(element: &Element, timeout: Duration) -> Result<(), BrowserError> {
    tokio::time::timeout(timeout, element.click())
        .await
        .map_err(|_| BrowserError::Timeout("click timed out".into()))?
        .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
    Ok(())
}

/// Dispatch the click from inside the page. Bypasses hit testing, so it works
/// when an overlay intercepts pointer events.
pub async fn force_click(element: &Element) -> Result<(), BrowserError> {
    element
        .call_js_fn("function() { this.click(); }", false)
        .await
        .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
    Ok(())
}

/// Move the mouse over an element via a CDP mouse event
pub async fn hover(page: &Page, element: &Element) -> Result<(), BrowserError> {
    let point = element
        .clickable_point()
        .await
        .map_err(|e| BrowserError::ElementNotFound(e.to_string()))?;

    let move_event = DispatchMouseEventParams::builder()
        .r#type(DispatchMouseEventType::MouseMoved)
        .x(point.x)
        .y(point.y)
        .button(MouseButton::None)
        .build()
        .map_err(BrowserError::JavaScriptError)?;

    page.execute(move_event)
        .await
        .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
    Ok(())
}

/// Find the first clickable element (`button`, `a`, `[role="button"]`) whose
/// text contains `needle`.
pub async fn find_clickable_by_text(page: &Page, needle: &str) -> Option<Element> {
    for element in query_all(page, "button, a, [role=\"button\"]").await {
        if element_text(&element).await.contains(needle) {
            return Some(element);
        }
    }
    None
}

/// Poll until a clickable element with the given text is visible
pub async fn wait_for_clickable_by_text(
    page: &Page,
    needle: &str,
    timeout: Duration,
) -> Option<Element> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(element) = find_clickable_by_text(page, needle).await {
            if is_visible(&element).await {
                return Some(element);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Poll until the page body contains the given text
pub async fn wait_for_text(page: &Page, needle: &str, timeout: Duration) -> bool {
    let expr = format!(
        "document.body ? document.body.innerText.includes({}) : false",
        js_quote(needle)
    );
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if eval_bool(page, &expr).await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Poll until an element matching the selector exists
pub async fn wait_for_selector(
    page: &Page,
    selector: &str,
    timeout: Duration,
) -> Result<Element, BrowserError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Ok(element);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(BrowserError::ElementNotFound(format!(
                "{} (after {:?})",
                selector, timeout
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Poll until the selector matches nothing visible. Absence of the element
/// counts as hidden, so this tolerates pages without the overlay at all.
pub async fn wait_for_hidden(page: &Page, selector: &str, timeout: Duration) {
    let expr = format!(
        "(function() {{ \
            const el = document.querySelector({}); \
            if (!el) return true; \
            const s = window.getComputedStyle(el); \
            return s.display === 'none' || s.visibility === 'hidden'; \
        }})()",
        js_quote(selector)
    );
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if eval_bool(page, &expr).await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            debug!("Overlay {} still visible after {:?}", selector, timeout);
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Poll until the page URL contains the given substring
pub async fn wait_for_url_contains(page: &Page, needle: &str, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if current_url(page).await.contains(needle) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Current page URL, empty string when unavailable
pub async fn current_url(page: &Page) -> String {
    match page.url().await {
        Ok(Some(url)) => url,
        _ => String::new(),
    }
}

/// Fill the first element matching a selector by setting its value and firing
/// an input event, the way the framework under audit expects form updates.
pub async fn fill_first(page: &Page, selector: &str, value: &str) -> Result<(), BrowserError> {
    let element = page
        .find_element(selector)
        .await
        .map_err(|e| BrowserError::ElementNotFound(format!("{}: {}", selector, e)))?;
    fill_element(&element, value).await
}

/// Set an element's value and fire an input event
pub async fn fill_element(element: &Element, value: &str) -> Result<(), BrowserError> {
    let _ = element.focus().await;
    let script = format!(
        "function() {{ \
            this.value = {}; \
            this.dispatchEvent(new Event('input', {{ bubbles: true }})); \
            this.dispatchEvent(new Event('change', {{ bubbles: true }})); \
        }}",
        js_quote(value)
    );
    element
        .call_js_fn(&script, false)
        .await
        .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
    Ok(())
}

/// Absolute `href` targets of every anchor on the page
pub async fn collect_links(page: &Page) -> Result<Vec<String>, BrowserError> {
    let result = page
        .evaluate("Array.from(document.querySelectorAll('a[href]')).map(a => a.href)")
        .await
        .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

    result
        .into_value::<Vec<String>>()
        .map_err(|e| BrowserError::JavaScriptError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_quote_escapes() {
        assert_eq!(js_quote("QA Test"), "\"QA Test\"");
        assert_eq!(js_quote("a\"b"), "\"a\\\"b\"");
        assert_eq!(js_quote("line\nbreak"), "\"line\\nbreak\"");
    }
}
