//! Funding-rate page scraping.
//!
//! Split into two seams so each side can be replaced on its own:
//! a `PageSource` that fetches raw page text, and a `RateExtractor`
//! that turns that text into signals. The current extractor is a
//! heuristic text scan; a structured parser can implement the same
//! trait without touching the scheduler or the store.

pub mod coinglass;
pub mod text_scan;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Signal, TradingPair};

/// Fetches the raw text of the funding-rate page.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the page body. Errors on transport failure or non-2xx status.
    async fn fetch_page(&self) -> Result<String>;
}

/// Turns page text into one signal per pair that could be read.
///
/// Pairs that cannot be located are skipped, not reported as errors.
/// An `Err` means the extractor itself is unusable for this page.
#[cfg_attr(test, mockall::automock)]
pub trait RateExtractor: Send + Sync {
    fn extract(&self, page_text: &str, pairs: &[TradingPair]) -> Result<Vec<Signal>>;
}
