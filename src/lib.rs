//! Funding Rate Signal Bot
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod scraper;
pub mod storage;
pub mod engine;
