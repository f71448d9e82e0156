//! Audit scenarios
//!
//! Two ways to walk the target application: the fixed customer booking
//! journey and the breadth-first omni-scan crawl.

pub mod omni_scan;
pub mod standard;
