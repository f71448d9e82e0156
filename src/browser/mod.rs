//! Browser layer
//!
//! Owns the persistent Chromium server process and the bounded DOM primitives
//! the scenarios are built from.

pub mod dom;
mod errors;
mod server;

pub use errors::BrowserError;
pub use server::{BrowserConnection, BrowserServer};
