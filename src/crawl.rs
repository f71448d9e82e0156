//! Crawl state for the omni-scan scenario
//!
//! Strict FIFO frontier over same-origin URLs: first-discovered links are
//! visited first, no URL is ever visited twice, and the traversal is bounded
//! by the page budget rather than the size of the link graph.

use std::collections::{HashSet, VecDeque};

use tracing::debug;
use url::Url;

/// FIFO crawl frontier with visited-set de-duplication and a page budget
pub struct CrawlFrontier {
    visited: HashSet<String>,
    queue: VecDeque<String>,
    scanned: usize,
    max_pages: usize,
    /// Host the crawl is confined to
    origin_host: String,
}

impl CrawlFrontier {
    pub fn new(origin_host: impl Into<String>, max_pages: usize) -> Self {
        Self {
            visited: HashSet::new(),
            queue: VecDeque::new(),
            scanned: 0,
            max_pages,
            origin_host: origin_host.into(),
        }
    }

    /// Enqueue a seed URL without any admission filtering
    pub fn seed(&mut self, url: impl Into<String>) {
        self.queue.push_back(url.into());
    }

    /// Dequeue the next URL to scan. Skips URLs already visited, marks the
    /// returned one as visited and counts it against the budget. Returns
    /// `None` once the queue is drained or the budget is exhausted.
    pub fn next(&mut self) -> Option<String> {
        if self.scanned >= self.max_pages {
            return None;
        }
        while let Some(url) = self.queue.pop_front() {
            if self.visited.contains(&url) {
                continue;
            }
            self.visited.insert(url.clone());
            self.scanned += 1;
            return Some(url);
        }
        None
    }

    /// Admit a discovered link into the queue if it passes the filters:
    /// http(s) only (drops `mailto:`/`tel:`), no fragment, same origin host,
    /// no logout link, not already visited.
    pub fn admit(&mut self, link: &str) {
        if !self.admits(link) {
            return;
        }
        self.queue.push_back(link.to_string());
    }

    /// Admission check without enqueueing
    pub fn admits(&self, link: &str) -> bool {
        let parsed = match Url::parse(link) {
            Ok(u) => u,
            Err(_) => {
                debug!("Skipping unparseable link: {}", link);
                return false;
            }
        };

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return false;
        }
        if parsed.fragment().is_some() {
            return false;
        }
        if parsed.host_str() != Some(self.origin_host.as_str()) {
            return false;
        }
        if link.contains("logout") {
            return false;
        }
        if self.visited.contains(link) {
            return false;
        }
        true
    }

    /// Pages handed out so far
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Whether a URL was already handed out
    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontier(max_pages: usize) -> CrawlFrontier {
        CrawlFrontier::new("mediconvoi.fr", max_pages)
    }

    #[test]
    fn test_fifo_order() {
        let mut f = frontier(10);
        f.seed("https://mediconvoi.fr/dashboard");
        f.seed("https://mediconvoi.fr");
        f.admit("https://mediconvoi.fr/tarifs");

        assert_eq!(f.next().as_deref(), Some("https://mediconvoi.fr/dashboard"));
        assert_eq!(f.next().as_deref(), Some("https://mediconvoi.fr"));
        assert_eq!(f.next().as_deref(), Some("https://mediconvoi.fr/tarifs"));
        assert_eq!(f.next(), None);
    }

    #[test]
    fn test_budget_bounds_adversarial_graph() {
        // Every page yields fresh links forever; the budget must still win.
        let mut f = frontier(30);
        f.seed("https://mediconvoi.fr");

        let mut visited = 0;
        let mut counter = 0;
        while let Some(_url) = f.next() {
            visited += 1;
            for _ in 0..5 {
                counter += 1;
                f.admit(&format!("https://mediconvoi.fr/page/{}", counter));
            }
        }

        assert_eq!(visited, 30);
        assert_eq!(f.scanned(), 30);
    }

    #[test]
    fn test_no_duplicate_visits() {
        let mut f = frontier(50);
        f.seed("https://mediconvoi.fr/a");
        f.seed("https://mediconvoi.fr/a");
        f.admit("https://mediconvoi.fr/b");

        let mut handed_out = Vec::new();
        while let Some(url) = f.next() {
            // A visited URL is no longer admitted
            f.admit(&url);
            f.admit("https://mediconvoi.fr/b");
            handed_out.push(url);
        }

        assert_eq!(
            handed_out,
            vec!["https://mediconvoi.fr/a", "https://mediconvoi.fr/b"]
        );
    }

    #[test]
    fn test_admission_filters() {
        let f = frontier(10);
        assert!(f.admits("https://mediconvoi.fr/tarifs"));
        assert!(!f.admits("mailto:contact@mediconvoi.fr"));
        assert!(!f.admits("tel:+33123456789"));
        assert!(!f.admits("https://mediconvoi.fr/faq#pricing"));
        assert!(!f.admits("https://mediconvoi.fr/logout"));
        assert!(!f.admits("https://evil.example.com/phish"));
        assert!(!f.admits("not a url"));
    }

    #[test]
    fn test_five_page_budget_with_branching_links() {
        // Two seeds, three fresh links per page, budget of five: exactly five
        // pages come out of the frontier.
        let mut f = frontier(5);
        f.seed("https://mediconvoi.fr/dashboard");
        f.seed("https://mediconvoi.fr");

        let mut pages = Vec::new();
        let mut n = 0;
        while let Some(url) = f.next() {
            pages.push(url);
            for _ in 0..3 {
                n += 1;
                f.admit(&format!("https://mediconvoi.fr/p{}", n));
            }
        }

        assert_eq!(pages.len(), 5);
        assert_eq!(f.scanned(), 5);
    }
}
